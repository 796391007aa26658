//! Core reading types shared by the scheduler and both sinks.
//!
//! A [`Reading`] is immutable once created: the scheduler produces one per
//! serviced channel and appends it to the batch buffer, after which it is
//! only ever viewed read-only by the storage and wireless sinks.

use embassy_time::{Duration, Instant};
use serde::Serialize;

/// The closed set of sensor kinds the acquisition loop knows how to drive.
///
/// Adding a kind means adding an enum variant and a driver, checked at
/// compile time; there is no runtime string dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    /// CO2 / temperature / humidity transceiver (SCD40).
    Climate,
    /// Oxygen concentration transceiver (Gravity electrochemical probe).
    Oxygen,
}

impl SensorKind {
    /// Wire tag for this kind, as consumed by the host-side receiver.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Climate => "CO2",
            Self::Oxygen => "O2",
        }
    }

    /// Default minimum interval between reads of a sensor of this kind.
    ///
    /// The climate sensor refreshes its measurement every 5 seconds; the
    /// oxygen probe is slower-moving and is polled at a third of that rate.
    pub const fn default_interval(self) -> Duration {
        match self {
            Self::Climate => Duration::from_secs(5),
            Self::Oxygen => Duration::from_secs(15),
        }
    }
}

/// Measurement payload of a single reading.
///
/// `Failed` is the explicit failure marker recorded when a driver could not
/// produce a value; the reading still carries its channel and kind so the
/// gap is visible downstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    Climate {
        co2_ppm: f32,
        temperature_c: f32,
        humidity_pct: f32,
    },
    Oxygen {
        o2_pct: f32,
    },
    Failed,
}

/// One timestamped sample from one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Tick time at which the sample was taken.
    pub timestamp: Instant,
    /// Multiplexer channel the sample came from.
    pub channel: u8,
    /// Kind of sensor assigned to the channel.
    pub kind: SensorKind,
    pub payload: Payload,
}

impl Reading {
    pub const fn new(timestamp: Instant, channel: u8, kind: SensorKind, payload: Payload) -> Self {
        Self {
            timestamp,
            channel,
            kind,
            payload,
        }
    }

    /// Whether this reading carries the failure marker instead of a value.
    pub const fn is_failure(&self) -> bool {
        matches!(self.payload, Payload::Failed)
    }

    /// Timestamp as seconds since boot, with millisecond resolution.
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp.as_millis() as f64 / 1000.0
    }

    /// View of this reading in the shape both external interfaces consume.
    pub fn wire_record(&self) -> WireRecord {
        WireRecord {
            timestamp: self.timestamp_secs(),
            channel: self.channel,
            sensor_type: self.kind.as_str(),
            data: WireData::from(self.payload),
        }
    }
}

/// Serialized form of a [`Reading`].
///
/// This exact shape is the contract with the host-side receiver: the
/// wireless sink sends JSON arrays of these, and the persisted CSV rows
/// carry the same logical fields.
#[derive(Debug, Serialize)]
pub struct WireRecord {
    pub timestamp: f64,
    pub channel: u8,
    pub sensor_type: &'static str,
    pub data: WireData,
}

/// Wire representation of a payload: a `[CO2, temperature, humidity]`
/// triple for the climate sensor, a bare number for oxygen, `null` for a
/// failed read.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WireData {
    Climate([f32; 3]),
    Oxygen(f32),
    Failed,
}

impl From<Payload> for WireData {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Climate {
                co2_ppm,
                temperature_c,
                humidity_pct,
            } => Self::Climate([co2_ppm, temperature_c, humidity_pct]),
            Payload::Oxygen { o2_pct } => Self::Oxygen(o2_pct),
            Payload::Failed => Self::Failed,
        }
    }
}
