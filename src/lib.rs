//! Hardware-independent acquisition core for a multiplexed gas-sensing
//! data logger.
//!
//! This crate contains the board-resident data path: a time-gated
//! [`Sampler`] cycles CO2/climate and oxygen sensors behind one shared I2C
//! bus through a channel [`Multiplexer`](mux::Multiplexer), buffers the
//! timestamped readings, and periodically flushes the batch to two
//! independent sinks: append-only CSV rows on an SD card and JSON
//! notifications over a BLE characteristic.
//!
//! It is `#![no_std]` with `extern crate alloc` and generic over
//! `embedded-hal` traits, so it compiles for embedded targets and desktop
//! hosts alike (the test suite runs on the host against scripted bus and
//! sink doubles). Board bring-up (HAL construction, the BLE stack, SD/SPI
//! wiring, executor spawn) lives in the consuming firmware crate.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod batch;
pub mod ble;
pub mod config;
pub mod mux;
pub mod reading;
pub mod sampling;
pub mod sensors;
pub mod storage;

#[cfg(test)]
mod testutil;

pub use batch::BatchBuffer;
pub use ble::{BleBatchSender, WirelessError, WirelessLink};
pub use config::{ChannelConfig, ConfigError, SamplerConfig};
pub use mux::{Multiplexer, MuxError};
pub use reading::{Payload, Reading, SensorKind, WireRecord};
pub use sampling::{AcquisitionStats, BatchSink, Sampler};
pub use sensors::{SensorDriver, SensorError};
pub use storage::{SdCardLogger, StorageError};
