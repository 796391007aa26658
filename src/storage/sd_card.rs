//! SD card plumbing for the persistence sink.
//!
//! SD card operations are blocking (the card shares its SPI bus with
//! nothing time-critical during a flush), so a flush simply runs them
//! inline from the scheduler's control flow.
//!
//! The storage handles are opened for the duration of one flush and
//! released on every exit path: the happy path closes them explicitly to
//! surface close errors, and early error returns release them through the
//! `embedded_sdmmc` wrappers' RAII drops.

use embedded_sdmmc::{Mode, SdCard, SdCardError, TimeSource, VolumeIdx, VolumeManager};
use thiserror_no_std::Error;

use super::{CSV_HEADER, encode_row};
use crate::reading::Reading;
use crate::sampling::BatchSink;

extern crate alloc;
use alloc::string::String;

/// Log file in the volume root. 8.3 name, as FAT requires.
pub const LOG_FILE: &str = "GASLOG.CSV";

/// Storage sink faults. Reported per flush; the scheduler carries on with
/// the next batch regardless.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sd card filesystem error: {0:?}")]
    Filesystem(embedded_sdmmc::Error<SdCardError>),
}

/// Append-only CSV logger on an SPI SD card.
pub struct SdCardLogger<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    volume_mgr: VolumeManager<SdCard<S, D>, T, 4, 4, 1>,
}

impl<S, D, T> SdCardLogger<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    /// Wraps an already-mounted card. The volume is opened per flush, not
    /// held across flushes.
    pub fn new(sd_card: SdCard<S, D>, time_source: T) -> Self {
        Self {
            volume_mgr: VolumeManager::new(sd_card, time_source),
        }
    }

    /// Appends one row per reading to the log file, creating it (with the
    /// CSV header) on first use.
    pub fn append_batch(
        &self,
        batch: &[Reading],
    ) -> Result<(), embedded_sdmmc::Error<SdCardError>> {
        let volume = self.volume_mgr.open_volume(VolumeIdx(0))?;
        let root_dir = volume.open_root_dir()?;
        let file = root_dir.open_file_in_dir(LOG_FILE, Mode::ReadWriteCreateOrAppend)?;

        if file.length() == 0 {
            file.write(CSV_HEADER.as_bytes())?;
        }

        let mut row = String::new();
        for reading in batch {
            row.clear();
            encode_row(reading, &mut row);
            file.write(row.as_bytes())?;
        }

        file.close()?;
        root_dir.close()?;
        volume.close()?;

        Ok(())
    }
}

impl<S, D, T> BatchSink for SdCardLogger<S, D, T>
where
    S: embedded_hal::spi::SpiDevice<u8>,
    D: embedded_hal::delay::DelayNs,
    T: TimeSource,
{
    type Error = StorageError;

    async fn flush(&mut self, batch: &[Reading]) -> Result<(), Self::Error> {
        self.append_batch(batch).map_err(StorageError::Filesystem)
    }
}
