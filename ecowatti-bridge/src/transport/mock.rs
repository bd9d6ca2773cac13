use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use ecowatti_core::protocol::{
    Decoded, FRAME_MARKER, Frame, Measurement, MeasurementPacket, RequestPacket,
    SENSOR_DISCONNECTED,
};
use rand::Rng;
use tracing::{debug, info};

use super::{Transport, TransportError};

/// Communicator id the simulated controller answers with.
const CONTROLLER_ID: u8 = 0x10;

/// Zero-size frame the controller emits between answers.
const KEEP_ALIVE: [u8; 3] = [FRAME_MARKER, CONTROLLER_ID, 0x00];

/// Simulated controller that answers read requests on one transmitter id.
///
/// Requests addressed to any other id go unanswered, the way the real unit
/// ignores ids it does not own. Replies come back in randomly sized chunks.
pub struct MockTransport {
    /// Transmitter id this controller answers on.
    unit_id: u8,
    /// Uniform noise added to every reading.
    noise: f64,
    /// Register values; anything else reads as disconnected.
    values: HashMap<u8, f64>,
    /// Bytes waiting to be read.
    pending: VecDeque<u8>,
}

impl MockTransport {
    pub fn new(unit_id: u8, noise: f64, values: impl IntoIterator<Item = (u8, f64)>) -> Self {
        let values: HashMap<u8, f64> = values.into_iter().collect();

        info!(
            unit_id,
            noise,
            registers = values.len(),
            "Starting simulated controller"
        );

        Self {
            unit_id,
            noise: noise.abs(),
            values,
            pending: VecDeque::new(),
        }
    }

    fn answer(&mut self, request: RequestPacket) {
        if request.destination_id != self.unit_id {
            return;
        }

        let raw = match self.values.get(&request.memory_address) {
            Some(value) => self.sample(*value),
            None => SENSOR_DISCONNECTED,
        };

        let reply = MeasurementPacket {
            communicator_id: CONTROLLER_ID,
            destination_id: request.destination_id,
            memory_address: request.memory_address,
            measurement: Measurement { raw },
        }
        .to_frame()
        .to_bytes();

        debug!(
            memory_address = request.memory_address,
            raw, "Simulated controller answering"
        );

        self.pending.extend(KEEP_ALIVE);
        self.pending.extend(reply);
    }

    fn sample(&self, value: f64) -> i16 {
        let offset = if self.noise > 0.0 {
            rand::rng().random_range(-self.noise..=self.noise)
        } else {
            0.0
        };

        ((value + offset) * 10.0)
            .round()
            .clamp(f64::from(i16::MIN), f64::from(i16::MAX - 1)) as i16
    }

    fn take_chunk(&mut self, max_bytes: usize) -> Vec<u8> {
        let available = self.pending.len().min(max_bytes);
        let len = rand::rng().random_range(1..=available);
        self.pending.drain(..len).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if let Ok(Decoded::Frame { frame, .. }) = Frame::decode(bytes) {
            if let Some(request) = RequestPacket::from_frame(&frame) {
                self.answer(request);
            }
        }
        Ok(())
    }

    async fn read(
        &mut self,
        max_bytes: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        if self.pending.is_empty() || max_bytes == 0 {
            tokio::time::sleep(timeout).await;
            return Ok(Vec::new());
        }

        Ok(self.take_chunk(max_bytes))
    }
}
