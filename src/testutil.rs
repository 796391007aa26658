//! Test doubles: a scripted I2C bus that emulates both sensor devices by
//! address, inert pins and delays, and recording sinks/links. Compiled for
//! tests only.

use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_async::i2c::{ErrorType, I2c, Operation};

use crate::ble::WirelessLink;
use crate::reading::Reading;
use crate::sampling::BatchSink;
use crate::sensors::crc8;

const SCD40_ADDR: u8 = 0x62;
const CMD_DATA_READY: [u8; 2] = [0xE4, 0xB8];
const CMD_READ_MEASUREMENT: [u8; 2] = [0xEC, 0x05];
const REG_OXYGEN_DATA: u8 = 0x03;
const REG_CALIBRATION_KEY: u8 = 0x0A;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBusError {
    Nack,
}

impl embedded_hal::i2c::Error for FakeBusError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    }
}

/// In-memory stand-in for the shared bus with an SCD40 at 0x62 and a
/// Gravity oxygen probe at 0x70..=0x73. The fake multiplexer routes every
/// channel here, which is exactly what the scheduler tests need.
#[derive(Debug, Default)]
pub struct FakeBus {
    pub co2: u16,
    pub temp_raw: u16,
    pub rh_raw: u16,
    pub climate_ready: bool,
    pub corrupt_climate_crc: bool,
    pub nack_climate: bool,
    /// Measurement frames served so far, for asserting retry counts.
    pub climate_frame_reads: usize,

    pub oxygen_raw: [u8; 3],
    pub oxygen_key: u8,
    pub nack_oxygen: bool,

    last_climate_cmd: Option<[u8; 2]>,
    last_oxygen_reg: Option<u8>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Healthy bus: plausible climate values, uncalibrated oxygen probe.
    pub fn with_defaults(self) -> Self {
        self.with_climate(600, 26214, 32767).with_oxygen([120, 0, 0], 0)
    }

    pub fn with_climate(mut self, co2: u16, temp_raw: u16, rh_raw: u16) -> Self {
        self.co2 = co2;
        self.temp_raw = temp_raw;
        self.rh_raw = rh_raw;
        self.climate_ready = true;
        self
    }

    pub fn with_oxygen(mut self, raw: [u8; 3], key: u8) -> Self {
        self.oxygen_raw = raw;
        self.oxygen_key = key;
        self
    }

    fn handle_write(&mut self, address: u8, bytes: &[u8]) -> Result<(), FakeBusError> {
        match address {
            SCD40_ADDR => {
                if self.nack_climate {
                    return Err(FakeBusError::Nack);
                }
                if bytes.len() >= 2 {
                    self.last_climate_cmd = Some([bytes[0], bytes[1]]);
                }
                Ok(())
            }
            0x70..=0x73 => {
                if self.nack_oxygen {
                    return Err(FakeBusError::Nack);
                }
                self.last_oxygen_reg = bytes.first().copied();
                Ok(())
            }
            _ => Err(FakeBusError::Nack),
        }
    }

    fn handle_read(&mut self, address: u8, buf: &mut [u8]) -> Result<(), FakeBusError> {
        match address {
            SCD40_ADDR => {
                if self.nack_climate {
                    return Err(FakeBusError::Nack);
                }
                match self.last_climate_cmd {
                    Some(CMD_DATA_READY) => {
                        let word: u16 = if self.climate_ready { 0x07FF } else { 0 };
                        write_word(word, &mut buf[0..3]);
                    }
                    Some(CMD_READ_MEASUREMENT) => {
                        self.climate_frame_reads += 1;
                        write_word(self.co2, &mut buf[0..3]);
                        write_word(self.temp_raw, &mut buf[3..6]);
                        write_word(self.rh_raw, &mut buf[6..9]);
                        if self.corrupt_climate_crc {
                            buf[2] ^= 0xFF;
                        }
                    }
                    _ => buf.fill(0),
                }
                Ok(())
            }
            0x70..=0x73 => {
                if self.nack_oxygen {
                    return Err(FakeBusError::Nack);
                }
                match self.last_oxygen_reg {
                    Some(REG_CALIBRATION_KEY) => buf[0] = self.oxygen_key,
                    Some(REG_OXYGEN_DATA) => {
                        let n = buf.len().min(3);
                        buf[..n].copy_from_slice(&self.oxygen_raw[..n]);
                    }
                    _ => buf.fill(0),
                }
                Ok(())
            }
            _ => Err(FakeBusError::Nack),
        }
    }
}

fn write_word(word: u16, out: &mut [u8]) {
    let bytes = word.to_be_bytes();
    out[0] = bytes[0];
    out[1] = bytes[1];
    out[2] = crc8(&bytes);
}

impl ErrorType for FakeBus {
    type Error = FakeBusError;
}

impl I2c for FakeBus {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        for operation in operations {
            match operation {
                Operation::Write(bytes) => self.handle_write(address, &**bytes)?,
                Operation::Read(buf) => self.handle_read(address, &mut **buf)?,
            }
        }
        Ok(())
    }
}

/// Output pin that just remembers its level.
#[derive(Debug, Default)]
pub struct FakePin {
    state: bool,
}

impl FakePin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_high(&self) -> bool {
        self.state
    }
}

impl embedded_hal::digital::ErrorType for FakePin {
    type Error = core::convert::Infallible;
}

impl OutputPin for FakePin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.state = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.state = true;
        Ok(())
    }
}

/// Delay that returns immediately, keeping `block_on` tests instant.
#[derive(Debug, Clone, Copy)]
pub struct NoopDelay;

impl embedded_hal_async::delay::DelayNs for NoopDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

#[derive(Debug)]
pub struct SinkRefused;

/// Batch sink that records every batch it is handed, optionally failing
/// afterwards, so invocation and outcome are observable separately.
pub struct RecordingSink {
    pub batches: Vec<Vec<Reading>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            batches: Vec::new(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            batches: Vec::new(),
            fail: true,
        }
    }
}

impl BatchSink for RecordingSink {
    type Error = SinkRefused;

    async fn flush(&mut self, batch: &[Reading]) -> Result<(), Self::Error> {
        self.batches.push(batch.to_vec());
        if self.fail { Err(SinkRefused) } else { Ok(()) }
    }
}

#[derive(Debug)]
pub struct NotifyFailed;

/// Wireless link double with a scripted subscription state and MTU.
pub struct MockLink {
    pub subscribed: bool,
    pub limit: usize,
    pub sent: Vec<Vec<u8>>,
    /// Fail the notification once this many have been accepted.
    pub fail_after: Option<usize>,
}

impl MockLink {
    pub fn subscribed(limit: usize) -> Self {
        Self {
            subscribed: true,
            limit,
            sent: Vec::new(),
            fail_after: None,
        }
    }

    pub fn unsubscribed() -> Self {
        Self {
            subscribed: false,
            limit: 20,
            sent: Vec::new(),
            fail_after: None,
        }
    }
}

impl WirelessLink for MockLink {
    type Error = NotifyFailed;

    fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    fn max_notification_len(&self) -> usize {
        self.limit
    }

    async fn notify(&mut self, payload: &[u8]) -> Result<(), Self::Error> {
        if let Some(limit) = self.fail_after {
            if self.sent.len() >= limit {
                return Err(NotifyFailed);
            }
        }
        self.sent.push(payload.to_vec());
        Ok(())
    }
}
