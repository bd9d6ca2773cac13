use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ecowatti_core::{MemoryAddress, SensorDescriptor, SensorKind};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub transport: TransportConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    pub publish: PublishConfig,
    pub schedule: ScheduleConfig,
    pub sensors: Vec<SensorDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    Serial {
        /// Serial device path
        device: PathBuf,
        /// Line speed in baud
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    Mock {
        /// Transmitter id the simulated controller answers on
        unit_id: u8,
        /// Uniform noise added to every simulated reading
        #[serde(default)]
        noise: f64,
        /// Simulated register values; unlisted registers read as disconnected
        #[serde(default)]
        values: Vec<MockValue>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct MockValue {
    pub address: u8,
    pub value: f64,
}

fn default_baud_rate() -> u32 {
    115_200
}

const MAX_DELAY_MS: u64 = 60_000;
const MAX_COLLECTION_WINDOW_SECS: f64 = 3_600.0;
const MAX_ATTEMPTS: u32 = 100;
const MAX_INTERVAL_MINS: u64 = 7 * 24 * 60;
const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// Parameters of the sweep/collect/aggregate cycle.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Communicator id written into every request
    pub sender_id: u8,
    /// First transmitter id of a sweep
    pub address_range_start: u8,
    /// Last transmitter id of a sweep (inclusive)
    pub address_range_end: u8,
    /// Pause after each request of a sweep
    pub inter_packet_delay_ms: u64,
    /// Length of the collection window following a sweep
    pub collection_window_secs: f64,
    /// Sweep/collect cycles before giving up on a sensor
    pub max_attempts: u32,
    /// Lowest aggregate accepted as a real reading
    pub plausible_min: f64,
    /// Highest aggregate accepted as a real reading
    pub plausible_max: f64,
    /// Upper bound on bytes requested per read
    pub read_chunk_size: usize,
    /// Upper bound on a single blocking read
    pub read_timeout_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            sender_id: 0xFD,
            address_range_start: 0x40,
            address_range_end: 0x7F,
            inter_packet_delay_ms: 250,
            collection_window_secs: 2.5,
            max_attempts: 3,
            plausible_min: -40.0,
            plausible_max: 100.0,
            read_chunk_size: 100,
            read_timeout_ms: 1000,
        }
    }
}

impl PollerConfig {
    pub fn destination_ids(&self) -> RangeInclusive<u8> {
        self.address_range_start..=self.address_range_end
    }

    /// Number of requests in one sweep.
    pub fn sweep_len(&self) -> usize {
        self.destination_ids().count()
    }

    pub fn inter_packet_delay(&self) -> Duration {
        Duration::from_millis(self.inter_packet_delay_ms)
    }

    pub fn collection_window(&self) -> Duration {
        Duration::try_from_secs_f64(self.collection_window_secs).unwrap_or_default()
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn plausible_range(&self) -> RangeInclusive<f64> {
        self.plausible_min..=self.plausible_max
    }

    /// Worst-case wall-clock time of one poll.
    pub fn max_poll_duration(&self) -> Duration {
        let sweep = self
            .inter_packet_delay()
            .saturating_mul(self.sweep_len() as u32);
        sweep
            .saturating_add(self.collection_window())
            .saturating_mul(self.max_attempts)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address_range_start > self.address_range_end {
            return Err(ConfigError::EmptyAddressRange {
                start: self.address_range_start,
                end: self.address_range_end,
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if self.max_attempts > MAX_ATTEMPTS {
            return Err(ConfigError::OutOfRange {
                field: "poller.max_attempts",
                max: u64::from(MAX_ATTEMPTS),
            });
        }
        if self.inter_packet_delay_ms > MAX_DELAY_MS {
            return Err(ConfigError::OutOfRange {
                field: "poller.inter_packet_delay_ms",
                max: MAX_DELAY_MS,
            });
        }
        if !self.collection_window_secs.is_finite()
            || self.collection_window_secs <= 0.0
            || self.collection_window_secs > MAX_COLLECTION_WINDOW_SECS
        {
            return Err(ConfigError::InvalidCollectionWindow(
                self.collection_window_secs,
            ));
        }
        // Negated so that NaN bounds are rejected too.
        if !(self.plausible_min <= self.plausible_max) {
            return Err(ConfigError::InvalidPlausibleRange {
                min: self.plausible_min,
                max: self.plausible_max,
            });
        }
        if self.read_chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::ZeroDuration("poller.read_timeout_ms"));
        }
        if self.read_timeout_ms > MAX_DELAY_MS {
            return Err(ConfigError::OutOfRange {
                field: "poller.read_timeout_ms",
                max: MAX_DELAY_MS,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    /// Prefix of every published topic
    pub topic_prefix: String,
    /// MQTT broker; without one, messages are written to stdout
    #[serde(default)]
    pub broker: Option<BrokerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Client id presented to the broker
    #[serde(default = "default_client_name")]
    pub client_name: String,
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// MQTT keep-alive interval
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_client_name() -> String {
    "ecowatti-bridge".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_keep_alive_secs() -> u64 {
    60
}

impl BrokerConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::MissingBrokerHost);
        }
        if !(MIN_KEEP_ALIVE_SECS..=u64::from(u16::MAX)).contains(&self.keep_alive_secs) {
            return Err(ConfigError::InvalidKeepAlive(self.keep_alive_secs));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(ConfigError::PasswordWithoutUsername);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Interval in minutes between discovery publications
    pub discovery_interval_mins: u64,
    /// Interval in minutes between sensor refreshes
    pub sensor_interval_mins: u64,
}

impl ScheduleConfig {
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_mins.saturating_mul(60))
    }

    pub fn sensor_interval(&self) -> Duration {
        Duration::from_secs(self.sensor_interval_mins.saturating_mul(60))
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("address range {start:#04X}..={end:#04X} is empty")]
    EmptyAddressRange { start: u8, end: u8 },

    #[error("max_attempts must be at least 1")]
    NoAttempts,

    #[error("collection window must be a positive number of seconds, got {0}")]
    InvalidCollectionWindow(f64),

    #[error("plausible range {min}..={max} is empty")]
    InvalidPlausibleRange { min: f64, max: f64 },

    #[error("read_chunk_size must be at least 1")]
    ZeroChunkSize,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("{field} must be at most {max}")]
    OutOfRange { field: &'static str, max: u64 },

    #[error("broker host must not be empty")]
    MissingBrokerHost,

    #[error("keep-alive must be between 5 and 65535 seconds, got {0}")]
    InvalidKeepAlive(u64),

    #[error("broker password given without a username")]
    PasswordWithoutUsername,

    #[error("no sensors configured")]
    NoSensors,

    #[error("sensor name {0:?} is configured more than once")]
    DuplicateSensor(String),
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.poller.validate()?;

        if self.schedule.discovery_interval_mins == 0 {
            return Err(ConfigError::ZeroDuration("schedule.discovery_interval_mins"));
        }
        if self.schedule.sensor_interval_mins == 0 {
            return Err(ConfigError::ZeroDuration("schedule.sensor_interval_mins"));
        }
        if self.schedule.discovery_interval_mins > MAX_INTERVAL_MINS {
            return Err(ConfigError::OutOfRange {
                field: "schedule.discovery_interval_mins",
                max: MAX_INTERVAL_MINS,
            });
        }
        if self.schedule.sensor_interval_mins > MAX_INTERVAL_MINS {
            return Err(ConfigError::OutOfRange {
                field: "schedule.sensor_interval_mins",
                max: MAX_INTERVAL_MINS,
            });
        }

        if let Some(broker) = &self.publish.broker {
            broker.validate()?;
        }

        if self.sensors.is_empty() {
            return Err(ConfigError::NoSensors);
        }
        let mut names = HashSet::new();
        for sensor in &self.sensors {
            if !names.insert(&sensor.name) {
                return Err(ConfigError::DuplicateSensor(sensor.name.to_string()));
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportConfig::Serial {
                device: PathBuf::from("/dev/ttyUSB0"),
                baud_rate: default_baud_rate(),
            },
            poller: PollerConfig::default(),
            publish: PublishConfig {
                topic_prefix: "homeassistant/sensor/ecowatti".to_string(),
                broker: None,
            },
            schedule: ScheduleConfig {
                discovery_interval_mins: 60,
                sensor_interval_mins: 5,
            },
            sensors: default_sensors(),
        }
    }
}

/// Registers known to carry sensors on the controller.
fn default_sensors() -> Vec<SensorDescriptor> {
    use SensorKind::{Current, Temperature};

    [
        (0x00, "T1", "Heating circuit supply water", Temperature),
        (0x01, "T2", "Outdoor temperature", Temperature),
        (0x03, "T4", "Buffer tank bottom", Temperature),
        (0x04, "T5", "Buffer tank top", Temperature),
        (0x05, "T6", "Heating circuit return water", Temperature),
        (0x08, "T9", "Domestic hot water", Temperature),
        (0x13, "Target", "Requested supply temperature", Temperature),
        (0x0C, "L1", "Current sensor L1", Current),
        (0x0D, "L2", "Current sensor L2", Current),
        (0x0E, "L3", "Current sensor L3", Current),
    ]
    .into_iter()
    .map(|(address, name, description, kind)| SensorDescriptor {
        address: MemoryAddress(address),
        name: name.into(),
        description: description.into(),
        kind,
    })
    .collect()
}
