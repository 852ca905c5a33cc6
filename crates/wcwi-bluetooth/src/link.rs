//! Blocking byte-stream link
//!
//! An RFCOMM socket is a reliable byte stream read with blocking calls. A
//! [`SerialLink`] splits such a socket into a reader, a writer and a shutdown
//! handle; shutting the socket down is the only way to wake a reader blocked
//! in `read`.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

/// Closes the underlying socket from any thread
pub trait LinkShutdown: Send + Sync {
    fn shutdown(&self) -> io::Result<()>;
}

impl LinkShutdown for TcpStream {
    fn shutdown(&self) -> io::Result<()> {
        match TcpStream::shutdown(self, Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

pub struct SerialLink {
    peer: String,
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
    shutdown: Box<dyn LinkShutdown>,
}

impl fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialLink").field("peer", &self.peer).finish()
    }
}

impl SerialLink {
    pub fn new(
        peer: impl Into<String>,
        reader: impl Read + Send + 'static,
        writer: impl Write + Send + 'static,
        shutdown: impl LinkShutdown + 'static,
    ) -> Self {
        Self {
            peer: peer.into(),
            reader: Box::new(reader),
            writer: Box::new(writer),
            shutdown: Box::new(shutdown),
        }
    }

    /// Link over a connected TCP stream, used for loopback testing
    pub fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?.to_string();
        let reader = stream.try_clone()?;
        let shutdown = stream.try_clone()?;
        Ok(Self::new(peer, reader, stream, shutdown))
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        String,
        Box<dyn Read + Send>,
        Box<dyn Write + Send>,
        Box<dyn LinkShutdown>,
    ) {
        (self.peer, self.reader, self.writer, self.shutdown)
    }
}
