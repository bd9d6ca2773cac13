#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ecowatti_bridge::{PollerConfig, Transport, TransportError};
use ecowatti_core::protocol::{
    Decoded, FRAME_MARKER, Frame, Measurement, MeasurementPacket, RequestPacket,
    SENSOR_DISCONNECTED,
};

/// Bytes of a measurement response carrying `value`.
pub fn measurement(value: f64) -> Vec<u8> {
    raw_measurement((value * 10.0).round() as i16)
}

pub fn raw_measurement(raw: i16) -> Vec<u8> {
    MeasurementPacket {
        communicator_id: 0x10,
        destination_id: 0x41,
        memory_address: 0x01,
        measurement: Measurement { raw },
    }
    .to_frame()
    .to_bytes()
}

pub fn disconnected() -> Vec<u8> {
    raw_measurement(SENSOR_DISCONNECTED)
}

pub fn keep_alive() -> Vec<u8> {
    vec![FRAME_MARKER, 0x10, 0x00]
}

/// Concatenate frames and cut the result into chunks of `size` bytes.
pub fn chunked(frames: &[Vec<u8>], size: usize) -> Vec<Vec<u8>> {
    frames.concat().chunks(size).map(<[u8]>::to_vec).collect()
}

/// A short sweep so polls finish in a few seconds of virtual time.
pub fn poller_config() -> PollerConfig {
    PollerConfig {
        address_range_start: 0x40,
        address_range_end: 0x43,
        ..Default::default()
    }
}

/// Transport that replays one scripted batch of reads per sweep.
///
/// A batch is released whenever a request for the first id of the sweep is
/// written. Once the released chunks are used up, reads wait out their
/// timeout and return nothing.
#[derive(Default)]
pub struct ScriptedTransport {
    sweep_start: u8,
    batches: VecDeque<Vec<Vec<u8>>>,
    pending: VecDeque<Vec<u8>>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ScriptedTransport {
    pub fn new(sweep_start: u8, batches: impl IntoIterator<Item = Vec<Vec<u8>>>) -> Self {
        Self {
            sweep_start,
            batches: batches.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Reads available from the start, without any request written.
    pub fn with_pending(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            pending: chunks.into(),
            ..Default::default()
        }
    }

    /// Shared handle to every frame written so far.
    pub fn writes(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        self.writes.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.writes.lock().unwrap().push(bytes.to_vec());

        let request = match Frame::decode(bytes) {
            Ok(Decoded::Frame { frame, .. }) => RequestPacket::from_frame(&frame),
            _ => None,
        };
        if request.is_some_and(|r| r.destination_id == self.sweep_start) {
            if let Some(batch) = self.batches.pop_front() {
                self.pending.extend(batch);
            }
        }
        Ok(())
    }

    async fn read(
        &mut self,
        max_bytes: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        match self.pending.pop_front() {
            Some(mut chunk) => {
                if chunk.len() > max_bytes {
                    let rest = chunk.split_off(max_bytes);
                    self.pending.push_front(rest);
                }
                Ok(chunk)
            }
            None => {
                tokio::time::sleep(timeout).await;
                Ok(Vec::new())
            }
        }
    }
}

/// Transport whose line is gone.
pub struct BrokenTransport;

#[async_trait]
impl Transport for BrokenTransport {
    async fn write(&mut self, _bytes: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "device unplugged",
        )))
    }

    async fn read(
        &mut self,
        _max_bytes: usize,
        _timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::Closed)
    }
}
