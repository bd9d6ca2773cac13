use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use ecowatti_core::{SensorDescriptor, SensorKind, SensorReading};
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{info, trace, warn};

use crate::config::BrokerConfig;

/// Requests buffered between the client handle and the connection task.
const MQTT_REQUEST_CAPACITY: usize = 32;
/// Pause after a failed connection attempt before the next one.
const MQTT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// A payload addressed to a topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Sink for discovery and state payloads.
///
/// Implementations never see the transport; they only receive finished
/// messages from the publishing task.
#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn publish(&self, message: PublishMessage) -> Result<(), Self::Error>;
}

fn sensor_topic(prefix: &str, sensor: &SensorDescriptor) -> String {
    format!("{prefix}/sensor-{}", sensor.name)
}

/// Discovery payload announcing a sensor to the home automation side.
pub fn discovery_message(prefix: &str, sensor: &SensorDescriptor) -> PublishMessage {
    let base = sensor_topic(prefix, sensor);
    let (device_class, icon) = match sensor.kind {
        SensorKind::Temperature => ("temperature", "hass:thermometer"),
        SensorKind::Current => ("current", "hass:flash"),
    };

    PublishMessage {
        topic: format!("{base}/config"),
        payload: json!({
            "unique_id": format!("sensor-{}", sensor.name),
            "device_class": device_class,
            "name": format!("{} - {}", sensor.name, sensor.description),
            "state_topic": format!("{base}/state"),
            "unit_of_measurement": sensor.kind.unit().symbol(),
            "icon": icon,
            "value_template": "{{ value_json.value }}",
        }),
    }
}

/// State payload for one poll. A missing reading is published as `null`.
pub fn state_message(prefix: &str, reading: &SensorReading) -> PublishMessage {
    PublishMessage {
        topic: format!("{}/state", sensor_topic(prefix, &reading.sensor)),
        payload: json!({ "value": reading.result.value() }),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StdoutPublisherError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes every message to stdout as one JSON line.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutPublisher;

#[async_trait]
impl Publisher for StdoutPublisher {
    type Error = StdoutPublisherError;

    async fn publish(&self, message: PublishMessage) -> Result<(), Self::Error> {
        let line = serde_json::to_string(&message)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MqttPublisherError {
    #[error("MQTT client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Publishes to an MQTT broker at QoS 0, not retained.
///
/// While the broker is unreachable the request queue fills up; further
/// messages are then rejected with an error rather than stalling the bridge.
///
/// Messages are queued on the client handle; the broker connection itself is
/// driven by the task returned from [`MqttPublisher::connect`].
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Start the connection task. The task ends once [`disconnect`] has been
    /// sent or every handle is dropped.
    ///
    /// [`disconnect`]: MqttPublisher::disconnect
    pub fn connect(config: &BrokerConfig) -> (Self, JoinHandle<()>) {
        let (client, eventloop) = AsyncClient::new(mqtt_options(config), MQTT_REQUEST_CAPACITY);

        info!(
            host = %config.host,
            port = config.port,
            client_name = %config.client_name,
            "Connecting to MQTT broker"
        );

        let connection = tokio::spawn(drive_connection(eventloop));
        (Self { client }, connection)
    }

    /// Queue a clean disconnect after everything published so far. Fails
    /// instead of waiting when the request queue is full.
    pub fn disconnect(&self) -> Result<(), MqttPublisherError> {
        self.client.try_disconnect()?;
        Ok(())
    }
}

fn mqtt_options(config: &BrokerConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_name, &config.host, config.port);
    options.set_keep_alive(config.keep_alive());
    if let Some(username) = &config.username {
        options.set_credentials(username, config.password.as_deref().unwrap_or_default());
    }
    options
}

async fn drive_connection(mut eventloop: EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => info!("Connected to MQTT broker"),
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("Disconnected from MQTT broker");
                break;
            }
            Ok(event) => trace!(?event, "MQTT event"),
            Err(ConnectionError::RequestsDone) => break,
            Err(e) => {
                warn!(error = %e, "MQTT connection error, retrying");
                tokio::time::sleep(MQTT_RETRY_DELAY).await;
            }
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    type Error = MqttPublisherError;

    async fn publish(&self, message: PublishMessage) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&message.payload)?;
        self.client
            .try_publish(message.topic, QoS::AtMostOnce, false, payload)?;
        Ok(())
    }
}

/// Records messages in memory. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    messages: Arc<Mutex<Vec<PublishMessage>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryPublisherError {
    #[error("message log lock poisoned: {0}")]
    Poisoned(String),
}

impl<T> From<PoisonError<T>> for MemoryPublisherError {
    fn from(err: PoisonError<T>) -> Self {
        MemoryPublisherError::Poisoned(err.to_string())
    }
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, oldest first.
    pub fn messages(&self) -> Result<Vec<PublishMessage>, MemoryPublisherError> {
        Ok(self.messages.lock()?.clone())
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    type Error = MemoryPublisherError;

    async fn publish(&self, message: PublishMessage) -> Result<(), Self::Error> {
        self.messages.lock()?.push(message);
        Ok(())
    }
}
