//! WebSocket listener for the host role
//!
//! The listener accepts TCP connections and upgrades those that request the
//! configured path; anything else is refused with 404 during the handshake.

use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, info};

use wcwi_core::Role;

use crate::config::WsTransportConfig;
use crate::error::{Result, WsTransportError};
use crate::session::WsSession;

/// Host-side session over an accepted TCP connection
pub type ServerSession = WsSession<TcpStream>;

#[derive(Debug)]
pub struct WsListener {
    listener: TcpListener,
    path: String,
}

impl WsListener {
    /// Bind to the configured address and port
    pub async fn bind(config: &WsTransportConfig) -> Result<Self> {
        let addr = SocketAddr::new(config.bind_address, config.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| WsTransportError::Bind { addr, source })?;
        info!(addr = %listener.local_addr()?, path = %config.path, "WebSocket listener bound");
        Ok(Self {
            listener,
            path: config.path.clone(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for the next joiner and complete its WebSocket handshake
    ///
    /// A failed handshake is returned as an error; the listener stays usable.
    pub async fn accept(&self) -> Result<ServerSession> {
        let (stream, peer) = self.listener.accept().await?;
        debug!(peer = %peer, "Accepted TCP connection");

        let expected = self.path.clone();
        let check_path = move |request: &Request, response: Response| {
            let path = request.uri().path();
            if path == expected {
                Ok(response)
            } else {
                let mut refusal = ErrorResponse::new(Some(format!("unknown path {}", path)));
                *refusal.status_mut() = StatusCode::NOT_FOUND;
                Err(refusal)
            }
        };

        let socket = accept_hdr_async(stream, check_path)
            .await
            .map_err(|e| WsTransportError::Handshake {
                peer: peer.to_string(),
                reason: e.to_string(),
            })?;

        Ok(WsSession::start(socket, peer.to_string(), Role::Joiner))
    }
}
