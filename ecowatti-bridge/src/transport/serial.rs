use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_serial::{DataBits, Parity, SerialStream, StopBits};
use tracing::{info, trace, warn};

use super::{Transport, TransportError};

/// The controller's serial line (8N1).
pub struct SerialTransport {
    port: SerialStream,
}

impl SerialTransport {
    /// Open the device. The port is closed again when the transport is dropped.
    pub fn open(path: &Path, baud_rate: u32) -> Result<Self, TransportError> {
        let builder = tokio_serial::new(path.to_string_lossy(), baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None);

        let port = SerialStream::open(&builder).map_err(|source| TransportError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = ?path, baud_rate, "Opened serial port");

        Ok(Self { port })
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes).await?;
        self.port.flush().await?;
        trace!(len = bytes.len(), "Wrote frame");
        Ok(())
    }

    async fn read(
        &mut self,
        max_bytes: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        read_chunk(&mut self.port, max_bytes, timeout).await
    }
}

/// One timeout-bounded read. End of stream means the device went away.
async fn read_chunk<R>(
    reader: &mut R,
    max_bytes: usize,
    timeout: Duration,
) -> Result<Vec<u8>, TransportError>
where
    R: AsyncRead + Unpin,
{
    if max_bytes == 0 {
        return Ok(Vec::new());
    }

    let mut buf = vec![0u8; max_bytes];

    match tokio::time::timeout(timeout, reader.read(&mut buf)).await {
        Err(_elapsed) => Ok(Vec::new()),
        Ok(Ok(0)) => {
            warn!("Serial device reported end of stream");
            Err(TransportError::Closed)
        }
        Ok(Ok(n)) => {
            buf.truncate(n);
            Ok(buf)
        }
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
        Ok(Err(e)) => Err(TransportError::Io(e)),
    }
}
