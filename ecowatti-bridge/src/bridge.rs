use std::time::Duration;

use ecowatti_core::{SensorDescriptor, SensorReading};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::config::Config;
use crate::poller::SensorPoller;
use crate::publish::{Publisher, discovery_message, state_message};
use crate::transport::{Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Poll every configured sensor on a fixed schedule and publish the results.
///
/// The poller task owns `transport`; the publishing task only receives
/// finished readings over a channel. Runs until `cancel` fires or the
/// transport fails, in which case the failure is returned. Readings already
/// taken when `cancel` fires are still published.
pub async fn run_bridge<T, P>(
    transport: T,
    config: &Config,
    publisher: P,
    cancel: CancellationToken,
) -> Result<(), BridgeError>
where
    T: Transport,
    P: Publisher,
{
    let (tx, rx) = mpsc::channel(config.sensors.len().max(1));

    info!(
        sensors = config.sensors.len(),
        sensor_interval_mins = config.schedule.sensor_interval_mins,
        discovery_interval_mins = config.schedule.discovery_interval_mins,
        "Starting bridge"
    );

    let poller = SensorPoller::new(transport, config.poller.clone());
    let sensors_for_poller = config.sensors.clone();
    let sensor_interval = config.schedule.sensor_interval();
    let poller_handle = tokio::spawn(async move {
        run_poller(poller, sensors_for_poller, sensor_interval, tx, cancel).await
    });

    let sensors_for_publisher = config.sensors.clone();
    let topic_prefix = config.publish.topic_prefix.clone();
    let discovery_interval = config.schedule.discovery_interval();
    let publisher_handle = tokio::spawn(async move {
        run_publisher(
            publisher,
            topic_prefix,
            sensors_for_publisher,
            discovery_interval,
            rx,
        )
        .await;
    });

    // The poller drops its sender when it ends, which lets the publisher
    // drain the queue and stop.
    let polled = poller_handle.await;
    publisher_handle.await?;

    match polled? {
        Ok(()) => {
            info!("Bridge shut down");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Bridge stopped by transport failure");
            Err(e.into())
        }
    }
}

#[instrument(skip_all)]
async fn run_poller<T: Transport>(
    mut poller: SensorPoller<T>,
    sensors: Vec<SensorDescriptor>,
    interval: Duration,
    tx: mpsc::Sender<SensorReading>,
    cancel: CancellationToken,
) -> Result<(), TransportError> {
    info!(interval_secs = interval.as_secs(), "Poller started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Poller shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        for sensor in &sensors {
            // A poll is never interrupted; shutdown waits for it to finish.
            if cancel.is_cancelled() {
                break;
            }

            let result = poller.poll(sensor.address).await?;
            let reading = SensorReading {
                sensor: sensor.clone(),
                result,
                timestamp: jiff::Timestamp::now(),
            };

            if tx.send(reading).await.is_err() {
                info!("Publisher gone, poller stopping");
                return Ok(());
            }
        }
    }
}

#[instrument(skip_all)]
async fn run_publisher<P: Publisher>(
    publisher: P,
    topic_prefix: String,
    sensors: Vec<SensorDescriptor>,
    interval: Duration,
    mut rx: mpsc::Receiver<SensorReading>,
) {
    info!(interval_secs = interval.as_secs(), "Publisher started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for sensor in &sensors {
                    let message = discovery_message(&topic_prefix, sensor);
                    if let Err(e) = publisher.publish(message).await {
                        error!(error = ?e, sensor = %sensor.name, "Failed to publish discovery");
                    }
                }
                debug!(sensors = sensors.len(), "Discovery published");
            }
            reading = rx.recv() => {
                let Some(reading) = reading else {
                    info!("Publisher shutting down");
                    break;
                };

                let message = state_message(&topic_prefix, &reading);
                match publisher.publish(message).await {
                    Ok(()) => {
                        debug!(sensor = %reading.sensor.name, value = ?reading.result.value(), "Published state");
                    }
                    Err(e) => {
                        error!(error = ?e, sensor = %reading.sensor.name, "Failed to publish state");
                    }
                }
            }
        }
    }
}
