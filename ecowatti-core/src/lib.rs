pub mod protocol;

use std::fmt;

use ordered_float::NotNan;
use serde::{Deserialize, Serialize};

// We use `Box<str>` for strings that are fixed once the configuration is
// loaded. This keeps descriptors compact and avoids accidental growth.
type BoxStr = Box<str>;

/// Register address of a sensor on the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryAddress(pub u8);

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04X}", self.0)
    }
}

/// A sensor the bridge polls, as named by the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    /// Register holding the sensor value.
    pub address: MemoryAddress,
    /// Short logical name, e.g. `T1`.
    pub name: BoxStr,
    /// Human readable description.
    pub description: BoxStr,
    /// Physical quantity measured.
    pub kind: SensorKind,
}

/// Supported sensor kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Temperature in degrees Celsius.
    Temperature,
    /// Phase current in amperes.
    Current,
}

impl SensorKind {
    pub fn unit(&self) -> MetricUnit {
        match self {
            SensorKind::Temperature => MetricUnit::Celsius,
            SensorKind::Current => MetricUnit::Ampere,
        }
    }
}

/// Units used by readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricUnit {
    /// Degrees Celsius (°C).
    Celsius,
    /// Amperes (A).
    Ampere,
}

impl MetricUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            MetricUnit::Celsius => "°C",
            MetricUnit::Ampere => "A",
        }
    }
}

/// Outcome of polling one sensor address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PollResult {
    /// Aggregated reading, rounded to one decimal place.
    Value(NotNan<f64>),
    /// No plausible reading within the attempt bound.
    NoReading,
}

impl PollResult {
    pub fn value(&self) -> Option<f64> {
        match self {
            PollResult::Value(value) => Some(value.into_inner()),
            PollResult::NoReading => None,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, PollResult::Value(_))
    }
}

impl From<Option<f64>> for PollResult {
    fn from(value: Option<f64>) -> Self {
        value
            .and_then(|v| NotNan::new(v).ok())
            .map_or(PollResult::NoReading, PollResult::Value)
    }
}

/// One poll outcome for a named sensor, handed to the publishing side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    /// The sensor that was polled.
    pub sensor: SensorDescriptor,
    /// Result of the poll.
    pub result: PollResult,
    /// Time the poll finished.
    pub timestamp: jiff::Timestamp,
}
