use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Address of the DGI adapter factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Opens fresh stream connections to the peer.
///
/// The handshake opens a new stream for every attempt, so it is handed a
/// connector rather than a stream.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn connect(&self) -> io::Result<Self::Stream>;
}

/// Plain TCP connector with a bounded connect time.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    info: ConnectionInfo,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(info: ConnectionInfo, timeout: Duration) -> Self {
        Self { info, timeout }
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> io::Result<TcpStream> {
        let addr = self.info.to_string();
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(addr.as_str()))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {addr} timed out after {:?}", self.timeout),
                )
            })??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}
