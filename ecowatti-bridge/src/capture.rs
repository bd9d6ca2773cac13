use std::fmt;

use ecowatti_core::protocol::{Frame, RequestPacket, StreamReassembler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::config::PollerConfig;
use crate::transport::{Transport, TransportError};

/// A frame seen on the bus, with the time it was drained.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub timestamp: jiff::Timestamp,
    pub frame: Frame,
}

impl fmt::Display for CapturedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frame = &self.frame;

        write!(
            f,
            "{} id={:02X} size={} payload=",
            self.timestamp.strftime("%Y-%m-%d %H:%M:%S"),
            frame.communicator_id,
            frame.declared_size()
        )?;
        for byte in &frame.payload {
            write!(f, "{byte:02X}")?;
        }

        if let Some(request) = RequestPacket::from_frame(frame) {
            write!(f, " memory_address={:02X}", request.memory_address)?;
        }
        if let Some(packet_id) = frame.packet_id() {
            write!(f, " packet_id={packet_id:02X}")?;
        }
        if let Some(measurement) = frame.measurement() {
            write!(f, " measurement={}", measurement.value())?;
        }

        Ok(())
    }
}

/// Log every frame on the bus without ever writing to it.
///
/// Runs until `cancel` fires, handing each drained frame to `on_frame`.
/// Returns the number of frames captured.
#[instrument(skip_all)]
pub async fn capture<T, F>(
    transport: &mut T,
    config: &PollerConfig,
    cancel: CancellationToken,
    mut on_frame: F,
) -> Result<u64, TransportError>
where
    T: Transport,
    F: FnMut(CapturedFrame),
{
    let mut reassembler = StreamReassembler::new();
    let mut captured = 0u64;

    info!("Capture started");

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = transport.read(config.read_chunk_size, config.read_timeout()) => chunk?,
        };
        if chunk.is_empty() {
            continue;
        }

        reassembler.feed(&chunk);
        for frame in reassembler.drain_frames() {
            debug!(communicator_id = frame.communicator_id, "Frame captured");
            captured += 1;
            on_frame(CapturedFrame {
                timestamp: jiff::Timestamp::now(),
                frame,
            });
        }
    }

    info!(captured, "Capture stopped");
    Ok(captured)
}
