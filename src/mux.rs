//! Channel multiplexer control.
//!
//! The analog multiplexer routes the shared I2C bus to one physical sensor
//! at a time. Four binary select lines address the channel (MSB first) and
//! an active-low enable line gates the switch. After every switch-over the
//! selector waits a fixed settling delay before reporting success, so a
//! caller may talk to the newly routed sensor immediately afterwards.
//!
//! Only one channel is ever active; selecting a channel invalidates any
//! assumption about the previously routed one.

use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use thiserror_no_std::Error;

/// Number of channels the multiplexer can address.
pub const CHANNEL_COUNT: u8 = 16;

/// Settling time after driving the select lines.
const SETTLE_DELAY_MS: u32 = 10;

/// Errors from driving the multiplexer.
///
/// An invalid index is fatal only to the current channel's read attempt;
/// the scheduler skips the channel and proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MuxError<E> {
    #[error("channel {0} is outside the multiplexer range")]
    InvalidChannel(u8),
    #[error("select line fault")]
    Pin(E),
}

/// Driver for the select/enable lines of the channel multiplexer.
///
/// The pins are owned here and nowhere else; the lines are only touched
/// from [`select`](Self::select) and [`disable`](Self::disable), so the
/// active channel can never change underneath an in-flight bus
/// transaction.
pub struct Multiplexer<P, D> {
    select: [P; 4],
    enable: P,
    delay: D,
}

impl<P, D> Multiplexer<P, D>
where
    P: OutputPin,
    D: DelayNs,
{
    /// Takes ownership of the select lines (MSB first) and the active-low
    /// enable line. The lines are left untouched until the first
    /// [`select`](Self::select) or [`disable`](Self::disable) call.
    pub const fn new(select: [P; 4], enable: P, delay: D) -> Self {
        Self {
            select,
            enable,
            delay,
        }
    }

    /// Routes the shared bus to `channel` and waits out the settling delay.
    pub async fn select(&mut self, channel: u8) -> Result<(), MuxError<P::Error>> {
        if channel >= CHANNEL_COUNT {
            return Err(MuxError::InvalidChannel(channel));
        }

        self.enable.set_low().map_err(MuxError::Pin)?;
        for (bit, pin) in self.select.iter_mut().enumerate() {
            if channel >> (3 - bit) & 1 == 1 {
                pin.set_high().map_err(MuxError::Pin)?;
            } else {
                pin.set_low().map_err(MuxError::Pin)?;
            }
        }

        self.delay.delay_ms(SETTLE_DELAY_MS).await;
        Ok(())
    }

    /// Parks the multiplexer with no channel routed.
    pub fn disable(&mut self) -> Result<(), MuxError<P::Error>> {
        self.enable.set_high().map_err(MuxError::Pin)
    }
}
