use std::ops::RangeInclusive;

use ecowatti_core::protocol::{RequestPacket, StreamReassembler};
use ecowatti_core::{MemoryAddress, PollResult};
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::PollerConfig;
use crate::transport::{Transport, TransportError};

/// Reads one sensor register at a time by sweeping the transmitter id space.
///
/// The poller owns its transport for as long as it lives. Polls are strictly
/// sequential: `poll` takes `&mut self` and only returns once the register has
/// produced a reading or the attempt bound has been used up.
pub struct SensorPoller<T> {
    transport: T,
    config: PollerConfig,
    reassembler: StreamReassembler,
}

impl<T: Transport> SensorPoller<T> {
    pub fn new(transport: T, config: PollerConfig) -> Self {
        Self {
            transport,
            config,
            reassembler: StreamReassembler::new(),
        }
    }

    /// Give the transport back, ending the session.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Run sweep, collect and aggregate until a plausible reading is found.
    ///
    /// Running out of attempts is not an error and yields
    /// [`PollResult::NoReading`]. Transport failures end the poll immediately.
    #[instrument(skip_all, fields(address = %address))]
    pub async fn poll(&mut self, address: MemoryAddress) -> Result<PollResult, TransportError> {
        for attempt in 1..=self.config.max_attempts {
            self.sweep(address).await?;
            let values = self.collect().await?;

            match aggregate(&values, self.config.plausible_range()) {
                Some(value) => {
                    info!(attempt, value, samples = values.len(), "Sensor read");
                    return Ok(PollResult::from(Some(value)));
                }
                None => {
                    debug!(
                        attempt,
                        samples = values.len(),
                        "No plausible reading, retrying"
                    );
                }
            }
        }

        warn!(
            attempts = self.config.max_attempts,
            "Giving up on sensor, no plausible reading"
        );
        Ok(PollResult::NoReading)
    }

    /// Send one request per destination id, pausing after each.
    async fn sweep(&mut self, address: MemoryAddress) -> Result<(), TransportError> {
        let delay = self.config.inter_packet_delay();

        for destination_id in self.config.destination_ids() {
            let request = RequestPacket::new(self.config.sender_id, destination_id, address.0);
            self.transport.write(&request.encode()).await?;
            trace!(destination_id, "Request sent");
            tokio::time::sleep(delay).await;
        }

        Ok(())
    }

    /// Gather measurement values until the collection window closes.
    async fn collect(&mut self) -> Result<Vec<f64>, TransportError> {
        let deadline = Instant::now() + self.config.collection_window();
        let read_timeout = self.config.read_timeout();
        let mut values = Vec::new();

        self.reassembler.clear();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let chunk = self
                .transport
                .read(self.config.read_chunk_size, read_timeout.min(remaining))
                .await?;
            if chunk.is_empty() {
                continue;
            }

            self.reassembler.feed(&chunk);
            for frame in self.reassembler.drain_frames() {
                let Some(measurement) = frame.measurement() else {
                    continue;
                };
                if measurement.is_disconnected() {
                    trace!(communicator_id = frame.communicator_id, "Sensor not connected");
                    continue;
                }
                values.push(measurement.value());
            }
        }

        Ok(values)
    }
}

/// Mean of `values` rounded to one decimal, if any values exist and the
/// mean lies within `range`.
pub fn aggregate(values: &[f64], range: RangeInclusive<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let rounded = round_to_tenth(mean)?;

    range.contains(&rounded).then_some(rounded)
}

/// Round to one decimal place on the exact binary value, ties to even.
///
/// Scaling by ten first would round the product instead of the value, so
/// the decimal formatter does the rounding.
fn round_to_tenth(value: f64) -> Option<f64> {
    format!("{value:.1}").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANGE: RangeInclusive<f64> = -40.0..=100.0;

    #[test]
    fn mean_is_rounded_to_one_decimal() {
        assert_eq!(aggregate(&[21.0, 21.2, 20.8], RANGE), Some(21.0));
        assert_eq!(aggregate(&[21.0, 21.4], RANGE), Some(21.2));
        assert_eq!(aggregate(&[-3.4, -3.5, -3.5], RANGE), Some(-3.5));
    }

    #[test]
    fn exact_ties_round_to_even() {
        assert_eq!(aggregate(&[21.2, 21.3], RANGE), Some(21.2));
        assert_eq!(aggregate(&[2.25], RANGE), Some(2.2));
        assert_eq!(aggregate(&[2.75], RANGE), Some(2.8));
        assert_eq!(aggregate(&[-2.25], RANGE), Some(-2.2));
    }

    #[test]
    fn rounding_follows_the_stored_value() {
        // 0.15 is stored just below the tie.
        assert_eq!(aggregate(&[0.15], RANGE), Some(0.1));
        // 0.1 + 0.2 lands just above 0.3, so the mean is above 0.15.
        assert_eq!(aggregate(&[0.1, 0.2], RANGE), Some(0.2));
    }

    #[test]
    fn empty_input_has_no_mean() {
        assert_eq!(aggregate(&[], RANGE), None);
    }

    #[test]
    fn implausible_mean_is_rejected() {
        assert_eq!(aggregate(&[150.0, 160.0], RANGE), None);
        assert_eq!(aggregate(&[-41.0], RANGE), None);
        assert_eq!(aggregate(&[100.0], RANGE), Some(100.0));
        assert_eq!(aggregate(&[-40.0], RANGE), Some(-40.0));
    }

    #[test]
    fn one_outlier_can_push_the_mean_out_of_range() {
        assert_eq!(aggregate(&[20.0, 20.0, 3000.0], RANGE), None);
    }
}
