//! Persistence sink: append-only CSV rows on the SD card.
//!
//! Row encoding lives here and is pure; the SD card plumbing is in
//! [`sd_card`]. One row is appended per reading, in arrival order, with
//! the same logical fields the wireless payload carries.

pub mod sd_card;

pub use sd_card::{LOG_FILE, SdCardLogger, StorageError};

extern crate alloc;
use alloc::string::String;
use core::fmt::Write;

use crate::reading::{Payload, Reading};

/// Header written once when the log file is created.
pub const CSV_HEADER: &str = "timestamp,channel,sensor_type,data\n";

/// Appends one CSV row for `reading`.
///
/// The data field is the comma-joined payload values (three for a climate
/// reading, one for oxygen) and empty for a failure marker, so a gap in
/// the record is visible without breaking the row shape.
pub fn encode_row(reading: &Reading, out: &mut String) {
    let _ = write!(
        out,
        "{:.3},{},{},",
        reading.timestamp_secs(),
        reading.channel,
        reading.kind.as_str()
    );
    match reading.payload {
        Payload::Climate {
            co2_ppm,
            temperature_c,
            humidity_pct,
        } => {
            let _ = write!(out, "{:.1},{:.2},{:.2}", co2_ppm, temperature_c, humidity_pct);
        }
        Payload::Oxygen { o2_pct } => {
            let _ = write!(out, "{:.2}", o2_pct);
        }
        Payload::Failed => {}
    }
    out.push('\n');
}

/// Encodes a whole batch, in arrival order, without the header.
pub fn encode_batch(batch: &[Reading]) -> String {
    let mut out = String::new();
    for reading in batch {
        encode_row(reading, &mut out);
    }
    out
}
