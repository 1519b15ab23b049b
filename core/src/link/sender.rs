//! Outbound link transport: one short-lived TCP connection per message

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("Connection to {addr} failed: {reason}")]
    ConnectionFailed { addr: SocketAddr, reason: String },
    #[error("Connection to {0} timed out")]
    ConnectTimeout(SocketAddr),
    #[error("Write to {addr} failed: {reason}")]
    WriteFailed { addr: SocketAddr, reason: String },
    #[error("Write to {0} timed out")]
    WriteTimeout(SocketAddr),
}

/// Delivers one encoded message to a neighbor, best effort
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkSender: Send + Sync {
    async fn send(&self, addr: SocketAddr, payload: &[u8]) -> Result<(), SendError>;
}

/// [`LinkSender`] over plain TCP: connect, write, close. Connect and write are
/// each bounded by their own timeout so a dead neighbor costs at most
/// `connect_timeout + io_timeout`.
#[derive(Debug, Clone)]
pub struct TcpLinkSender {
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl TcpLinkSender {
    pub fn new(connect_timeout: Duration, io_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            io_timeout,
        }
    }
}

#[async_trait]
impl LinkSender for TcpLinkSender {
    async fn send(&self, addr: SocketAddr, payload: &[u8]) -> Result<(), SendError> {
        let mut stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| SendError::ConnectTimeout(addr))?
            .map_err(|e| SendError::ConnectionFailed {
                addr,
                reason: e.to_string(),
            })?;

        let write = async {
            stream.write_all(payload).await?;
            stream.flush().await?;
            stream.shutdown().await
        };
        timeout(self.io_timeout, write)
            .await
            .map_err(|_| SendError::WriteTimeout(addr))?
            .map_err(|e| SendError::WriteFailed {
                addr,
                reason: e.to_string(),
            })
    }
}
