//! Gravity electrochemical oxygen probe driver.
//!
//! A read refreshes the linear calibration key from the probe's flash
//! register, fetches the 3-byte concentration register and converts it to
//! an oxygen percentage. The probe drifts slowly, so the reported value is
//! smoothed with a rolling mean over the last few samples.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use super::{SensorError, bus_error};
use crate::reading::Payload;

/// Default I2C address (the A0/A1 straps select 0x70..=0x73).
pub const GRAVITY_O2_DEFAULT_ADDR: u8 = 0x73;

const REG_OXYGEN_DATA: u8 = 0x03;
const REG_CALIBRATION_KEY: u8 = 0x0A;

/// Calibration factor reported by an uncalibrated probe (20.9 % in 120 mV).
const FACTORY_KEY: f32 = 20.9 / 120.0;
/// Settle time after touching the flash register.
const KEY_SETTLE_MS: u32 = 100;
/// Samples in the smoothing window.
const SMOOTHING_WINDOW: usize = 10;

pub struct GravityO2<D> {
    addr: u8,
    delay: D,
    key: f32,
    history: [f32; SMOOTHING_WINDOW],
    filled: usize,
    next: usize,
}

impl<D> GravityO2<D>
where
    D: DelayNs,
{
    pub const fn new(delay: D) -> Self {
        Self::with_address(GRAVITY_O2_DEFAULT_ADDR, delay)
    }

    pub const fn with_address(addr: u8, delay: D) -> Self {
        Self {
            addr,
            delay,
            key: FACTORY_KEY,
            history: [0.0; SMOOTHING_WINDOW],
            filled: 0,
            next: 0,
        }
    }

    /// Presence check while the channel is routed: fetches the calibration
    /// key once so the first real read starts from the right factor.
    pub async fn probe<I: I2c>(&mut self, i2c: &mut I) -> Result<(), SensorError<I::Error>> {
        let mut buf = [0u8; 1];
        i2c.write_read(self.addr, &[REG_OXYGEN_DATA], &mut buf)
            .await
            .map_err(bus_error)?;
        self.refresh_key(i2c).await
    }

    /// Re-reads the linear calibration key from flash. A raw key of zero
    /// means the probe was never calibrated and the factory factor applies.
    async fn refresh_key<I: I2c>(&mut self, i2c: &mut I) -> Result<(), SensorError<I::Error>> {
        let mut buf = [0u8; 1];
        i2c.write_read(self.addr, &[REG_CALIBRATION_KEY], &mut buf)
            .await
            .map_err(bus_error)?;
        self.key = if buf[0] == 0 {
            FACTORY_KEY
        } else {
            buf[0] as f32 / 1000.0
        };
        self.delay.delay_ms(KEY_SETTLE_MS).await;
        Ok(())
    }

    /// Reads one oxygen sample and folds it into the smoothing window.
    ///
    /// The register transfer is a single write-read transaction; the bus is
    /// idle again when this returns. A NACK of the probe's address yields
    /// [`SensorError::NotPresent`].
    pub async fn read<I: I2c>(&mut self, i2c: &mut I) -> Result<Payload, SensorError<I::Error>> {
        self.refresh_key(i2c).await?;

        let mut buf = [0u8; 3];
        i2c.write_read(self.addr, &[REG_OXYGEN_DATA], &mut buf)
            .await
            .map_err(bus_error)?;

        let pct = self.key * (buf[0] as f32 + buf[1] as f32 / 10.0 + buf[2] as f32 / 100.0);
        Ok(Payload::Oxygen {
            o2_pct: self.smooth(pct),
        })
    }

    fn smooth(&mut self, sample: f32) -> f32 {
        self.history[self.next] = sample;
        self.next = (self.next + 1) % SMOOTHING_WINDOW;
        if self.filled < SMOOTHING_WINDOW {
            self.filled += 1;
        }

        let sum: f32 = self.history[..self.filled].iter().sum();
        sum / self.filled as f32
    }
}
