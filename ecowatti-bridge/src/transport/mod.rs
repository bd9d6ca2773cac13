pub mod mock;
pub mod serial;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

/// Failures at the byte-stream boundary. Never retried by the poller.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport closed")]
    Closed,
}

/// A duplex byte stream to the controller.
///
/// The transport has a single owner. Only the poller (or the capture loop)
/// holding it may write or read.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Write a complete frame.
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read up to `max_bytes`, waiting at most `timeout`.
    ///
    /// An empty result means no data arrived in time and is not an error.
    async fn read(&mut self, max_bytes: usize, timeout: Duration)
    -> Result<Vec<u8>, TransportError>;
}

