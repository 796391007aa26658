//! SCD40 CO2 / temperature / humidity driver.
//!
//! The sensor runs in periodic measurement mode: [`start`](Scd40::start) is
//! issued once while the channel is routed, after which every
//! [`read`](Scd40::read) polls the data-ready word (bounded retries, short
//! backoff) and then fetches the 9-byte measurement frame. Each word of the
//! frame is covered by a CRC-8; a mismatch fails the attempt.
//!
//! Command set and conversions follow the Sensirion SCD4x datasheet.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use super::{SensorError, bus_error};
use crate::reading::Payload;

/// Fixed I2C address of the SCD40.
pub const SCD40_ADDR: u8 = 0x62;

const CMD_START_PERIODIC: [u8; 2] = [0x21, 0xB1];
const CMD_STOP_PERIODIC: [u8; 2] = [0x3F, 0x86];
const CMD_DATA_READY: [u8; 2] = [0xE4, 0xB8];
const CMD_READ_MEASUREMENT: [u8; 2] = [0xEC, 0x05];

/// Wait between issuing a fetch command and reading the response.
const CMD_DELAY_MS: u32 = 1;
/// Quiesce time after stopping periodic measurement.
const STOP_DELAY_MS: u32 = 500;
/// Read attempts per sample before giving up.
const READ_RETRIES: usize = 3;
/// Backoff between attempts.
const RETRY_DELAY_MS: u32 = 50;

/// CRC-8 over a measurement word: polynomial 0x31, init 0xFF.
pub(crate) fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

pub struct Scd40<D> {
    delay: D,
    started: bool,
}

impl<D> Scd40<D>
where
    D: DelayNs,
{
    pub const fn new(delay: D) -> Self {
        Self {
            delay,
            started: false,
        }
    }

    /// Puts the sensor into periodic measurement mode.
    ///
    /// Re-issuing the command on an already-running sensor is tolerated by
    /// the part, so a restart of the board does not need a stop first.
    pub async fn start<I: I2c>(&mut self, i2c: &mut I) -> Result<(), SensorError<I::Error>> {
        i2c.write(SCD40_ADDR, &CMD_START_PERIODIC)
            .await
            .map_err(bus_error)?;
        self.started = true;
        Ok(())
    }

    /// Stops periodic measurement and waits out the quiesce time.
    pub async fn stop<I: I2c>(&mut self, i2c: &mut I) -> Result<(), SensorError<I::Error>> {
        i2c.write(SCD40_ADDR, &CMD_STOP_PERIODIC)
            .await
            .map_err(bus_error)?;
        self.started = false;
        self.delay.delay_ms(STOP_DELAY_MS).await;
        Ok(())
    }

    async fn data_ready<I: I2c>(&mut self, i2c: &mut I) -> Result<bool, SensorError<I::Error>> {
        let mut buf = [0u8; 3];
        i2c.write(SCD40_ADDR, &CMD_DATA_READY)
            .await
            .map_err(bus_error)?;
        self.delay.delay_ms(CMD_DELAY_MS).await;
        i2c.read(SCD40_ADDR, &mut buf).await.map_err(bus_error)?;

        let word = parse_word::<I::Error>(&buf)?;
        // low 11 bits non-zero means a measurement is waiting
        Ok(word & 0x07FF != 0)
    }

    async fn read_frame<I: I2c>(
        &mut self,
        i2c: &mut I,
    ) -> Result<(u16, u16, u16), SensorError<I::Error>> {
        let mut buf = [0u8; 9];
        i2c.write(SCD40_ADDR, &CMD_READ_MEASUREMENT)
            .await
            .map_err(bus_error)?;
        self.delay.delay_ms(CMD_DELAY_MS).await;
        i2c.read(SCD40_ADDR, &mut buf).await.map_err(bus_error)?;

        Ok((
            parse_word::<I::Error>(&buf[0..3])?,
            parse_word::<I::Error>(&buf[3..6])?,
            parse_word::<I::Error>(&buf[6..9])?,
        ))
    }

    /// Reads one climate sample.
    ///
    /// Retries up to the attempt budget when the sensor is not ready or a
    /// frame fails its checksum; the last fault is returned once the budget
    /// is exhausted. Every attempt is a complete bus transaction, so the
    /// bus is idle when this returns, success or not.
    pub async fn read<I: I2c>(&mut self, i2c: &mut I) -> Result<Payload, SensorError<I::Error>> {
        if !self.started {
            self.start(i2c).await?;
        }

        let mut last_error = SensorError::NotReady;
        for attempt in 0..READ_RETRIES {
            if attempt > 0 {
                self.delay.delay_ms(RETRY_DELAY_MS).await;
            }
            match self.try_read(i2c).await {
                Ok(payload) => return Ok(payload),
                Err(error) => {
                    log::debug!("SCD40 read attempt {} failed: {:?}", attempt + 1, error);
                    last_error = error;
                }
            }
        }
        Err(last_error)
    }

    async fn try_read<I: I2c>(&mut self, i2c: &mut I) -> Result<Payload, SensorError<I::Error>> {
        if !self.data_ready(i2c).await? {
            return Err(SensorError::NotReady);
        }

        let (co2_raw, temp_raw, rh_raw) = self.read_frame(i2c).await?;
        Ok(Payload::Climate {
            co2_ppm: co2_raw as f32,
            temperature_c: -45.0 + 175.0 * (temp_raw as f32 / 65535.0),
            humidity_pct: 100.0 * (rh_raw as f32 / 65535.0),
        })
    }
}

/// Validates the CRC byte of a `word | crc` triple and extracts the word.
fn parse_word<E>(bytes: &[u8]) -> Result<u16, SensorError<E>> {
    let computed = crc8(&bytes[0..2]);
    if computed != bytes[2] {
        return Err(SensorError::Crc {
            expected: bytes[2],
            computed,
        });
    }
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}
