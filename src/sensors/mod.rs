//! Sensor drivers for the multiplexed bus.
//!
//! Both drivers speak through a borrowed bus handle: the handle is acquired
//! for one read and released when the call returns, so no driver can hold a
//! transaction open across a channel switch. Dispatch between kinds is a
//! closed enum, so adding a sensor kind is a compile-time checked addition.

mod gravity_o2;
mod scd40;

pub use gravity_o2::{GRAVITY_O2_DEFAULT_ADDR, GravityO2};
pub use scd40::{SCD40_ADDR, Scd40};

#[cfg(test)]
pub(crate) use scd40::crc8;

use embedded_hal::i2c::{Error as I2cError, ErrorKind};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use thiserror_no_std::Error;

use crate::reading::{Payload, SensorKind};

/// Transient sensor faults. Every variant maps to a failure-tagged reading;
/// none of them aborts the scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SensorError<E> {
    #[error("bus transfer failed")]
    Bus(E),
    #[error("checksum mismatch (expected {expected:#04x}, computed {computed:#04x})")]
    Crc { expected: u8, computed: u8 },
    #[error("measurement not ready")]
    NotReady,
    #[error("sensor did not acknowledge its address")]
    NotPresent,
}

/// Folds a raw bus error into the sensor error taxonomy: an address NACK
/// means the sensor is absent from the routed channel, everything else is
/// a transfer fault.
pub(crate) fn bus_error<E: I2cError>(error: E) -> SensorError<E> {
    match error.kind() {
        ErrorKind::NoAcknowledge(_) => SensorError::NotPresent,
        _ => SensorError::Bus(error),
    }
}

/// Closed tagged union over the drivers, one variant per [`SensorKind`].
pub enum SensorDriver<D> {
    Climate(Scd40<D>),
    Oxygen(GravityO2<D>),
}

impl<D> SensorDriver<D>
where
    D: DelayNs,
{
    /// Instantiates the driver matching a configured channel's kind.
    pub fn for_kind(kind: SensorKind, delay: D) -> Self {
        match kind {
            SensorKind::Climate => Self::Climate(Scd40::new(delay)),
            SensorKind::Oxygen => Self::Oxygen(GravityO2::new(delay)),
        }
    }

    pub const fn kind(&self) -> SensorKind {
        match self {
            Self::Climate(_) => SensorKind::Climate,
            Self::Oxygen(_) => SensorKind::Oxygen,
        }
    }

    /// One-time start-up work while the channel is routed: the climate
    /// sensor is put into periodic measurement, the oxygen probe is probed
    /// for presence and its calibration key. Failure here is not fatal:
    /// reads will keep failing (and retrying) until the sensor appears.
    pub async fn bringup<I: I2c>(&mut self, i2c: &mut I) -> Result<(), SensorError<I::Error>> {
        match self {
            Self::Climate(sensor) => sensor.start(i2c).await,
            Self::Oxygen(sensor) => sensor.probe(i2c).await,
        }
    }

    /// Reads one sample from the routed sensor.
    pub async fn sample<I: I2c>(&mut self, i2c: &mut I) -> Result<Payload, SensorError<I::Error>> {
        match self {
            Self::Climate(sensor) => sensor.read(i2c).await,
            Self::Oxygen(sensor) => sensor.read(i2c).await,
        }
    }
}
