pub mod bridge;
pub mod capture;
pub mod config;
pub mod poller;
pub mod publish;
pub mod transport;

pub use bridge::{BridgeError, run_bridge};
pub use capture::{CapturedFrame, capture};
pub use config::{
    BrokerConfig, Config, ConfigError, MockValue, PollerConfig, PublishConfig, ScheduleConfig,
    TransportConfig,
};
pub use poller::{SensorPoller, aggregate};
pub use publish::{
    MemoryPublisher, MqttPublisher, PublishMessage, Publisher, StdoutPublisher, discovery_message,
    state_message,
};
pub use transport::mock::MockTransport;
pub use transport::serial::SerialTransport;
pub use transport::{Transport, TransportError};
