//! The sample scheduler: the timing core of the acquisition loop.
//!
//! One [`Sampler`] owns the shared bus handle, the channel selector, the
//! per-channel timing state and the batch buffer, and drives everything
//! from a single cooperative loop. Mutual exclusion on the bus is
//! structural: only the active tick touches it, and drivers borrow it for
//! exactly one read.
//!
//! Per tick, every configured channel whose minimum interval has elapsed
//! since its last successful read is serviced in ascending index order.
//! Independently, once the flush period elapses the batch is drained and
//! handed to the storage and wireless sinks in turn; their outcomes are
//! independent, and a failed flush is never replayed: that interval's data
//! is lost rather than retried.

use core::future::Future;

use embassy_time::{Duration, Instant, Timer};
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use heapless::Vec;

use crate::batch::BatchBuffer;
use crate::config::{ConfigError, MAX_CHANNELS, SamplerConfig};
use crate::mux::Multiplexer;
use crate::reading::{Payload, Reading};
use crate::sensors::SensorDriver;

/// Destination for a flushed batch.
///
/// Both sinks receive the same read-only view of the batch; a sink reports
/// its outcome and must never assume anything about the other sink.
pub trait BatchSink {
    type Error: core::fmt::Debug;

    fn flush(&mut self, batch: &[Reading]) -> impl Future<Output = Result<(), Self::Error>>;
}

/// Counters for what the loop has done so far. Purely informational;
/// nothing in the loop branches on them.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcquisitionStats {
    pub readings_ok: u32,
    pub readings_failed: u32,
    pub selector_faults: u32,
    pub flushes: u32,
    pub storage_errors: u32,
    pub wireless_errors: u32,
    /// Readings evicted from a full buffer while both sinks were failing.
    pub readings_dropped: u32,
}

/// Per-channel scheduler state: configuration plus the driver instance and
/// the explicit last-successful-read timestamp.
struct ChannelSlot<D> {
    index: u8,
    interval: Duration,
    driver: SensorDriver<D>,
    last_read: Instant,
}

/// The acquisition scheduler.
pub struct Sampler<I2C, P, D, S, W> {
    bus: I2C,
    mux: Multiplexer<P, D>,
    channels: Vec<ChannelSlot<D>, MAX_CHANNELS>,
    batch: BatchBuffer,
    tick_period: Duration,
    flush_period: Duration,
    last_flush: Instant,
    storage: S,
    wireless: W,
    stats: AcquisitionStats,
}

impl<I2C, P, D, S, W> Sampler<I2C, P, D, S, W>
where
    I2C: I2c,
    P: OutputPin,
    D: DelayNs + Clone,
    S: BatchSink,
    W: BatchSink,
{
    /// Builds the scheduler from a validated configuration.
    ///
    /// `now` seeds every channel's last-read timestamp and the flush timer,
    /// so the first read of a channel happens one full interval after
    /// start-up. Configuration violations are fatal and surface here.
    pub fn new(
        bus: I2C,
        mux: Multiplexer<P, D>,
        config: &SamplerConfig,
        delay: D,
        storage: S,
        wireless: W,
        now: Instant,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut channels: Vec<ChannelSlot<D>, MAX_CHANNELS> = config
            .channels
            .iter()
            .map(|channel| ChannelSlot {
                index: channel.index,
                interval: channel.interval,
                driver: SensorDriver::for_kind(channel.kind, delay.clone()),
                last_read: now,
            })
            .collect();
        // deterministic service order: ascending channel index, every tick
        channels.sort_unstable_by_key(|slot| slot.index);

        Ok(Self {
            bus,
            mux,
            channels,
            batch: BatchBuffer::with_max_readings(config.max_buffered_readings),
            tick_period: config.tick_period,
            flush_period: config.flush_period,
            last_flush: now,
            storage,
            wireless,
            stats: AcquisitionStats::default(),
        })
    }

    /// Routes each configured channel once and runs its driver's start-up
    /// work. Individual failures are logged, not fatal: a sensor that is
    /// absent now simply fail-tags its readings until it appears.
    pub async fn bringup(&mut self) {
        for slot in self.channels.iter_mut() {
            if let Err(error) = self.mux.select(slot.index).await {
                log::warn!("channel {}: selector fault at bring-up: {}", slot.index, error);
                continue;
            }
            match slot.driver.bringup(&mut self.bus).await {
                Ok(()) => log::info!(
                    "channel {}: {} ready",
                    slot.index,
                    slot.driver.kind().as_str()
                ),
                Err(error) => log::warn!(
                    "channel {}: {} bring-up failed: {}",
                    slot.index,
                    slot.driver.kind().as_str(),
                    error
                ),
            }
        }
        if let Err(error) = self.mux.disable() {
            log::warn!("failed to park multiplexer: {}", error);
        }
    }

    /// One scheduler tick at time `now`.
    ///
    /// Services every due channel in ascending index order, then flushes
    /// the batch if the flush period has elapsed. `now` must not move
    /// backwards between calls.
    pub async fn service(&mut self, now: Instant) {
        for slot in self.channels.iter_mut() {
            let elapsed = now
                .checked_duration_since(slot.last_read)
                .unwrap_or(Duration::from_ticks(0));
            if elapsed < slot.interval {
                continue;
            }

            // selector fault: skip this channel for the tick, no reading
            if let Err(error) = self.mux.select(slot.index).await {
                log::warn!("channel {}: selector fault: {}", slot.index, error);
                self.stats.selector_faults += 1;
                continue;
            }

            let kind = slot.driver.kind();
            let payload = match slot.driver.sample(&mut self.bus).await {
                Ok(payload) => {
                    // only a successful read restarts the interval clock;
                    // a failed channel is re-attempted on the next tick
                    slot.last_read = now;
                    self.stats.readings_ok += 1;
                    log::debug!("channel {} ({}): {:?}", slot.index, kind.as_str(), payload);
                    payload
                }
                Err(error) => {
                    log::warn!("channel {} ({}): {}", slot.index, kind.as_str(), error);
                    self.stats.readings_failed += 1;
                    Payload::Failed
                }
            };

            if let Some(evicted) = self.batch.append(Reading::new(now, slot.index, kind, payload))
            {
                log::warn!(
                    "batch full, dropping oldest reading (channel {})",
                    evicted.channel
                );
                self.stats.readings_dropped += 1;
            }
        }

        let since_flush = now
            .checked_duration_since(self.last_flush)
            .unwrap_or(Duration::from_ticks(0));
        if since_flush >= self.flush_period {
            self.flush(now).await;
        }
    }

    /// Drains the batch and hands it to both sinks.
    ///
    /// The sinks run sequentially but independently: a storage failure
    /// never suppresses the wireless send, and vice versa. The batch is
    /// gone either way.
    async fn flush(&mut self, now: Instant) {
        self.last_flush = now;
        if self.batch.is_empty() {
            log::debug!("flush window elapsed with nothing buffered");
            return;
        }

        let batch = self.batch.drain();
        self.stats.flushes += 1;
        log::info!("flushing {} readings", batch.len());

        if let Err(error) = self.storage.flush(&batch).await {
            self.stats.storage_errors += 1;
            log::error!("storage flush failed: {:?}", error);
        }
        if let Err(error) = self.wireless.flush(&batch).await {
            self.stats.wireless_errors += 1;
            log::error!("wireless flush failed: {:?}", error);
        }
    }

    /// The cooperative acquisition loop. Runs until power-off.
    pub async fn run(&mut self) -> ! {
        self.bringup().await;
        loop {
            self.service(Instant::now()).await;
            Timer::after(self.tick_period).await;
        }
    }

    pub fn stats(&self) -> &AcquisitionStats {
        &self.stats
    }

    /// Readings currently buffered and awaiting the next flush.
    pub fn pending_readings(&self) -> usize {
        self.batch.len()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn wireless(&self) -> &W {
        &self.wireless
    }
}
