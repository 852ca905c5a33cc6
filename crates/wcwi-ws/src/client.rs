//! Outbound WebSocket connections for the joiner role

use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream};
use tracing::{debug, info};

use wcwi_core::Role;

use crate::config::WsTransportConfig;
use crate::error::{Result, WsTransportError};
use crate::session::WsSession;

/// Joiner-side session over an outbound connection
pub type ClientSession = WsSession<MaybeTlsStream<TcpStream>>;

/// Connect to a host's chat endpoint
///
/// Fails with a connect error when the host refuses or the handshake does not
/// complete within the configured timeout; no data has been exchanged yet.
pub async fn connect(host: IpAddr, port: u16, config: &WsTransportConfig) -> Result<ClientSession> {
    let url = config.url_for(host, port);
    debug!(url = %url, "Connecting to host");

    let (socket, _response) = match timeout(config.connect_timeout(), connect_async(url.as_str())).await {
        Ok(Ok(connected)) => connected,
        Ok(Err(e)) => {
            return Err(WsTransportError::ConnectFailed {
                url,
                reason: e.to_string(),
            })
        }
        Err(_) => {
            return Err(WsTransportError::ConnectTimeout {
                url,
                timeout_ms: config.connect_timeout_ms,
            })
        }
    };

    info!(url = %url, "Connected to host");
    Ok(WsSession::start(
        socket,
        SocketAddr::new(host, port).to_string(),
        Role::Host,
    ))
}
