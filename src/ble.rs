//! Wireless sink: batch delivery over a BLE notify characteristic.
//!
//! The acquisition core assumes a peripheral that is already advertising
//! and (possibly) subscribed; the GATT stack itself lives in the firmware
//! layer behind the [`WirelessLink`] port. What this module owns is the
//! payload contract: a batch is serialized as UTF-8 JSON arrays of
//! [`WireRecord`](crate::reading::WireRecord)s and pushed as one or more
//! notifications.
//!
//! Every notification is a complete, self-contained JSON list: the peer
//! parses each one independently and never has to reassemble fragments.
//! Chunks are filled greedily up to the transport's notification limit.

use core::future::Future;

use thiserror_no_std::Error;

use crate::reading::Reading;
use crate::sampling::BatchSink;

extern crate alloc;
use alloc::vec::Vec;

/// Nordic-UART-style data service carried by the peripheral.
pub const SERVICE_UUID: u128 = 0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E;

/// Notify characteristic the batches are pushed through.
pub const DATA_CHAR_UUID: u128 = 0x6E400003_B5A3_F393_E0A9_E50E24DCCA9E;

/// Unnegotiated BLE MTU.
pub const DEFAULT_MTU: usize = 23;
/// MTU worth negotiating for batch payloads.
pub const PREFERRED_MTU: usize = 247;
/// ATT notification overhead; payload per notification is MTU minus this.
pub const ATT_HEADER_LEN: usize = 3;

/// Port to the firmware's BLE stack.
///
/// The link reports whether a central is currently subscribed to the data
/// characteristic and how large one notification payload may be; `notify`
/// pushes one payload and completes when the stack has accepted it.
pub trait WirelessLink {
    type Error: core::fmt::Debug;

    fn is_subscribed(&self) -> bool;

    /// Largest payload `notify` accepts, typically negotiated MTU minus
    /// [`ATT_HEADER_LEN`].
    fn max_notification_len(&self) -> usize;

    fn notify(&mut self, payload: &[u8]) -> impl Future<Output = Result<(), Self::Error>>;
}

/// Wireless sink faults. A flush-level status; the batch is not replayed.
#[derive(Debug, Error)]
pub enum WirelessError<E> {
    /// No central is subscribed; the send was a no-op.
    #[error("no subscribed peer")]
    NotSubscribed,
    #[error("payload serialization failed")]
    Encode(serde_json::Error),
    #[error("notification transport fault")]
    Transport(E),
}

/// Batch sink that serializes readings and notifies the subscribed peer.
pub struct BleBatchSender<L> {
    link: L,
    report_failures: bool,
    records_dropped: u32,
}

impl<L> BleBatchSender<L>
where
    L: WirelessLink,
{
    pub const fn new(link: L) -> Self {
        Self {
            link,
            report_failures: true,
            records_dropped: 0,
        }
    }

    /// Whether failure-tagged readings are sent (as `data: null`) or
    /// skipped. Sent by default so the peer sees the gaps.
    pub const fn with_report_failures(mut self, report_failures: bool) -> Self {
        self.report_failures = report_failures;
        self
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Records skipped because a single serialized record exceeded the
    /// notification limit. Such a record cannot be split without breaking
    /// the self-contained-list contract, so it is dropped and counted.
    pub const fn records_dropped(&self) -> u32 {
        self.records_dropped
    }

    /// Splits `batch` into self-contained JSON list payloads of at most
    /// `limit` bytes. Returns the payloads and the count of oversized
    /// records that had to be dropped.
    pub fn chunk_batch(
        batch: &[Reading],
        limit: usize,
        report_failures: bool,
    ) -> Result<(Vec<Vec<u8>>, u32), serde_json::Error> {
        let mut chunks: Vec<Vec<u8>> = Vec::new();
        let mut current: Vec<u8> = Vec::new();
        let mut dropped = 0u32;

        for reading in batch {
            if reading.is_failure() && !report_failures {
                continue;
            }

            let record = serde_json::to_vec(&reading.wire_record())?;
            // '[' + record + ']' must fit even when the record is alone
            if record.len() + 2 > limit {
                log::warn!(
                    "reading on channel {} serializes to {} bytes, over the {} byte \
                     notification limit; dropping",
                    reading.channel,
                    record.len(),
                    limit
                );
                dropped += 1;
                continue;
            }

            if current.is_empty() {
                current.push(b'[');
            } else if current.len() + 1 + record.len() + 1 <= limit {
                current.push(b',');
            } else {
                current.push(b']');
                chunks.push(core::mem::take(&mut current));
                current.push(b'[');
            }
            current.extend_from_slice(&record);
        }

        if !current.is_empty() {
            current.push(b']');
            chunks.push(current);
        }

        Ok((chunks, dropped))
    }
}

impl<L> BatchSink for BleBatchSender<L>
where
    L: WirelessLink,
{
    type Error = WirelessError<L::Error>;

    /// Pushes the batch to the subscribed peer, in order.
    ///
    /// Without a subscriber this is a non-blocking no-op that reports
    /// failure. A transport fault aborts the remainder of the flush; the
    /// batch is not retried either way.
    async fn flush(&mut self, batch: &[Reading]) -> Result<(), Self::Error> {
        if !self.link.is_subscribed() {
            return Err(WirelessError::NotSubscribed);
        }

        let limit = self.link.max_notification_len();
        let (chunks, dropped) = Self::chunk_batch(batch, limit, self.report_failures)
            .map_err(WirelessError::Encode)?;
        self.records_dropped += dropped;

        for chunk in &chunks {
            self.link
                .notify(chunk)
                .await
                .map_err(WirelessError::Transport)?;
        }
        log::debug!("notified {} chunks for {} readings", chunks.len(), batch.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{Payload, Reading, SensorKind};
    use crate::testutil::MockLink;
    use embassy_futures::block_on;
    use embassy_time::Instant;

    fn oxygen(channel: u8, t: u64) -> Reading {
        Reading::new(
            Instant::from_secs(t),
            channel,
            SensorKind::Oxygen,
            Payload::Oxygen { o2_pct: 20.9 },
        )
    }

    fn climate(channel: u8, t: u64) -> Reading {
        Reading::new(
            Instant::from_secs(t),
            channel,
            SensorKind::Climate,
            Payload::Climate {
                co2_ppm: 612.0,
                temperature_c: 24.5,
                humidity_pct: 41.2,
            },
        )
    }

    #[test]
    fn test_roundtrip_preserves_count_and_fields() {
        let batch = [climate(1, 5), oxygen(0, 5), climate(1, 10)];
        let (chunks, dropped) =
            BleBatchSender::<MockLink>::chunk_batch(&batch, 4096, true).unwrap();
        assert_eq!(dropped, 0);
        assert_eq!(chunks.len(), 1);

        let value: serde_json::Value = serde_json::from_slice(&chunks[0]).unwrap();
        let records = value.as_array().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["sensor_type"], "CO2");
        assert_eq!(records[1]["sensor_type"], "O2");
        assert_eq!(records[0]["channel"], 1);
        assert!((records[0]["timestamp"].as_f64().unwrap() - 5.0).abs() < 1e-9);
        assert!((records[1]["data"].as_f64().unwrap() - 20.9).abs() < 1e-3);
        assert_eq!(records[0]["data"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_chunks_are_self_contained_and_ordered() {
        let batch: std::vec::Vec<Reading> = (0..8).map(|i| oxygen(i, 5 + i as u64)).collect();
        // small limit forces several notifications
        let (chunks, dropped) =
            BleBatchSender::<MockLink>::chunk_batch(&batch, 160, true).unwrap();
        assert_eq!(dropped, 0);
        assert!(chunks.len() > 1);

        let mut seen = std::vec::Vec::new();
        for chunk in &chunks {
            assert!(chunk.len() <= 160);
            // every chunk parses on its own
            let value: serde_json::Value = serde_json::from_slice(chunk).unwrap();
            for record in value.as_array().unwrap() {
                seen.push(record["channel"].as_u64().unwrap() as u8);
            }
        }
        let expected: std::vec::Vec<u8> = (0..8).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_oversized_record_is_dropped_not_split() {
        let batch = [climate(0, 5), oxygen(1, 5)];
        // fits an oxygen record but never a climate record
        let oxygen_len = serde_json::to_vec(&batch[1].wire_record()).unwrap().len();
        let (chunks, dropped) =
            BleBatchSender::<MockLink>::chunk_batch(&batch, oxygen_len + 2, true).unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(chunks.len(), 1);

        let value: serde_json::Value = serde_json::from_slice(&chunks[0]).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
        assert_eq!(value[0]["sensor_type"], "O2");
    }

    #[test]
    fn test_failure_markers_follow_configuration() {
        let failed = Reading::new(Instant::from_secs(5), 2, SensorKind::Climate, Payload::Failed);
        let batch = [failed, oxygen(0, 5)];

        let (chunks, _) = BleBatchSender::<MockLink>::chunk_batch(&batch, 4096, true).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&chunks[0]).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert!(value[0]["data"].is_null());

        let (chunks, _) = BleBatchSender::<MockLink>::chunk_batch(&batch, 4096, false).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&chunks[0]).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
        assert_eq!(value[0]["sensor_type"], "O2");
    }

    #[test]
    fn test_flush_without_subscriber_is_failing_noop() {
        let mut sender = BleBatchSender::new(MockLink::unsubscribed());
        let result = block_on(sender.flush(&[oxygen(0, 5)]));
        assert!(matches!(result, Err(WirelessError::NotSubscribed)));
        assert!(sender.link().sent.is_empty());
    }

    #[test]
    fn test_flush_notifies_all_chunks_in_order() {
        let mut sender = BleBatchSender::new(MockLink::subscribed(160));
        let batch: std::vec::Vec<Reading> = (0..8).map(|i| oxygen(i, 5)).collect();

        block_on(sender.flush(&batch)).unwrap();

        let sent = &sender.link().sent;
        assert!(sent.len() > 1);
        for payload in sent {
            assert!(payload.len() <= 160);
            serde_json::from_slice::<serde_json::Value>(payload).unwrap();
        }
        assert_eq!(sender.records_dropped(), 0);
    }

    #[test]
    fn test_transport_fault_aborts_flush() {
        let mut link = MockLink::subscribed(80);
        link.fail_after = Some(1);
        let mut sender = BleBatchSender::new(link);
        let batch: std::vec::Vec<Reading> = (0..8).map(|i| oxygen(i, 5)).collect();

        let result = block_on(sender.flush(&batch));
        assert!(matches!(result, Err(WirelessError::Transport(_))));
        assert_eq!(sender.link().sent.len(), 1);
    }
}
