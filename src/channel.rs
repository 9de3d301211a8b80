//! Outbound delivery of encoded lines.

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::trace;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum SendFailure {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("write failed: {0}")]
    Io(#[from] io::Error),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    #[error("send aborted: {0}")]
    Aborted(String),

    #[error("channel closed")]
    Closed,
}

/// Sink for one encoded line. Implementations own their own timeout.
#[async_trait]
pub trait TelemetryChannel: Send + Sync {
    async fn send(&self, line: &str) -> Result<(), SendFailure>;

    fn describe(&self) -> String {
        "channel".to_string()
    }
}

/// Connect, write one line, disconnect.
#[derive(Debug, Clone)]
pub struct EphemeralTcpChannel {
    addr: String,
    timeout: Duration,
}

impl EphemeralTcpChannel {
    pub fn new(addr: impl Into<String>) -> Self {
        Self::with_timeout(addr, DEFAULT_SEND_TIMEOUT)
    }

    pub fn with_timeout(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect_and_write(&self, line: &str) -> Result<(), SendFailure> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| SendFailure::Connect {
                addr: self.addr.clone(),
                source,
            })?;
        stream.write_all(line.as_bytes()).await?;
        stream.shutdown().await?;
        trace!(addr = %self.addr, bytes = line.len(), "line delivered");
        Ok(())
    }
}

#[async_trait]
impl TelemetryChannel for EphemeralTcpChannel {
    async fn send(&self, line: &str) -> Result<(), SendFailure> {
        match tokio::time::timeout(self.timeout, self.connect_and_write(line)).await {
            Ok(result) => result,
            Err(_) => Err(SendFailure::Timeout(self.timeout)),
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

/// In-process delivery, e.g. to a local consumer task.
#[async_trait]
impl TelemetryChannel for mpsc::UnboundedSender<String> {
    async fn send(&self, line: &str) -> Result<(), SendFailure> {
        mpsc::UnboundedSender::send(self, line.to_string()).map_err(|_| SendFailure::Closed)
    }

    fn describe(&self) -> String {
        "in-process".to_string()
    }
}
