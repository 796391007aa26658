//! Static configuration surface for the acquisition loop.
//!
//! The channel map, per-channel minimum read intervals and the tick/flush
//! cadence are supplied once at startup and are immutable for the lifetime
//! of the run. Validation happens when the [`Sampler`](crate::Sampler) is
//! constructed; a bad configuration is a fatal startup error.

use embassy_time::Duration;
use heapless::Vec;
use thiserror_no_std::Error;

use crate::mux::CHANNEL_COUNT;
use crate::reading::SensorKind;

/// Maximum number of configurable channels, fixed by the multiplexer.
pub const MAX_CHANNELS: usize = CHANNEL_COUNT as usize;

/// Default scheduler tick period.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

/// Default interval between batch flushes to the sinks.
pub const DEFAULT_FLUSH_PERIOD: Duration = Duration::from_secs(60);

/// One logical sensor slot behind the multiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Multiplexer channel index, `0..CHANNEL_COUNT`.
    pub index: u8,
    /// Sensor kind wired to this channel.
    pub kind: SensorKind,
    /// Minimum interval between two successful reads of this channel.
    pub interval: Duration,
}

impl ChannelConfig {
    /// Channel with the kind's default read interval.
    pub const fn new(index: u8, kind: SensorKind) -> Self {
        Self {
            index,
            kind,
            interval: kind.default_interval(),
        }
    }

    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Full configuration handed to [`Sampler::new`](crate::Sampler::new).
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub channels: Vec<ChannelConfig, MAX_CHANNELS>,
    /// Period of the scheduler's cooperative tick loop.
    pub tick_period: Duration,
    /// Period after which the batch is drained and handed to both sinks.
    pub flush_period: Duration,
    /// Cap on buffered readings; beyond it the oldest reading is evicted.
    pub max_buffered_readings: usize,
}

impl SamplerConfig {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            tick_period: DEFAULT_TICK_PERIOD,
            flush_period: DEFAULT_FLUSH_PERIOD,
            max_buffered_readings: crate::batch::DEFAULT_MAX_READINGS,
        }
    }

    /// Appends a channel, ignoring the push only if the table is full;
    /// validation in `Sampler::new` reports duplicates and range errors.
    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        if self.channels.push(channel).is_err() {
            log::warn!("channel table full, dropping channel {}", channel.index);
        }
        self
    }

    pub const fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    pub const fn with_flush_period(mut self, period: Duration) -> Self {
        self.flush_period = period;
        self
    }

    pub const fn with_max_buffered_readings(mut self, max: usize) -> Self {
        self.max_buffered_readings = max;
        self
    }

    /// Checks the structural invariants the scheduler relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }
        if self.tick_period.as_ticks() == 0 || self.flush_period.as_ticks() == 0 {
            return Err(ConfigError::ZeroPeriod);
        }
        for (i, channel) in self.channels.iter().enumerate() {
            if channel.index >= CHANNEL_COUNT {
                return Err(ConfigError::ChannelOutOfRange(channel.index));
            }
            if channel.interval.as_ticks() == 0 {
                return Err(ConfigError::ZeroInterval(channel.index));
            }
            if self.channels[..i].iter().any(|c| c.index == channel.index) {
                return Err(ConfigError::DuplicateChannel(channel.index));
            }
        }
        Ok(())
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Fatal configuration faults, surfaced at startup and never recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no channels configured")]
    NoChannels,
    #[error("channel {0} is outside the multiplexer range")]
    ChannelOutOfRange(u8),
    #[error("channel {0} configured twice")]
    DuplicateChannel(u8),
    #[error("channel {0} has a zero read interval")]
    ZeroInterval(u8),
    #[error("tick or flush period is zero")]
    ZeroPeriod,
}
