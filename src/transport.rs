//! Transport seam
//!
//! Every exchange runs over a freshly connected byte stream; whichever
//! component is mid-exchange owns the stream exclusively and drops it
//! before the next connection is opened. [`Connect`] is the injection
//! point: production uses [`TcpConnector`], tests substitute scripted
//! duplex streams. TLS termination (stunnel, a local proxy, an on-device
//! TLS socket) sits below this seam and is not this crate's concern.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Opens a fresh connection to the tenant.
pub trait Connect {
    type Stream: AsyncRead + AsyncWrite + Unpin;

    async fn connect(&self) -> io::Result<Self::Stream>;
}

/// Plain TCP connector
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Connect for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> io::Result<TcpStream> {
        TcpStream::connect((self.host.as_str(), self.port)).await
    }
}
