//! Rate computation between two snapshots of the same device.
//!
//! Snapshots carry raw cumulative counters. Rates are derived here, on the
//! consumer side, and only when the second snapshot is a continuation of the
//! first: a counter decrease (32-bit wrap, driver reset) or a changed device
//! number yields no rates rather than a bogus spike.

use serde::Serialize;

use crate::storage::model::DeviceSnapshot;

/// Size of one diskstats sector in bytes, regardless of the device's
/// logical block size.
pub const SECTOR_SIZE: u64 = 512;

// ---------------------------------------------------------------------------
// Delta helpers
// ---------------------------------------------------------------------------

/// Compute u64 delta, returning `None` on counter regression (wrap or reset).
pub fn du64(curr: u64, prev: u64) -> Option<u64> {
    curr.checked_sub(prev)
}

/// Whether `curr` continues `prev`: same device number and no cumulative
/// counter went backwards.
pub fn is_continuation(prev: &DeviceSnapshot, curr: &DeviceSnapshot) -> bool {
    if prev.identity.devnum != curr.identity.devnum {
        return false;
    }
    prev.counters
        .cumulative()
        .iter()
        .zip(curr.counters.cumulative().iter())
        .all(|((_, before), (_, after))| after >= before)
}

/// Per-second rates and averages over one interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceRates {
    /// Interval length in seconds.
    pub interval_secs: f64,
    pub read_iops: f64,
    pub write_iops: f64,
    pub discard_iops: f64,
    pub flush_iops: f64,
    pub read_bytes_per_sec: f64,
    pub write_bytes_per_sec: f64,
    pub discard_bytes_per_sec: f64,
    pub read_merges_per_sec: f64,
    pub write_merges_per_sec: f64,
    /// Average milliseconds per completed read.
    pub read_await_ms: f64,
    /// Average milliseconds per completed write.
    pub write_await_ms: f64,
    /// Share of wall time the device had I/O in flight, 0..=100.
    pub util_percent: f64,
    /// Average number of requests queued or in service.
    pub avg_queue_size: f64,
    /// Requests in flight at the end of the interval (not a rate).
    pub in_flight: u64,
}

impl DeviceRates {
    /// Computes rates from `prev` to `curr`.
    ///
    /// Returns `None` when `curr` is not a continuation of `prev` or the
    /// interval is not positive.
    pub fn between(prev: &DeviceSnapshot, curr: &DeviceSnapshot) -> Option<Self> {
        if !is_continuation(prev, curr) {
            return None;
        }
        let dt_us = curr.captured_at - prev.captured_at;
        if dt_us <= 0 {
            return None;
        }
        let dt = dt_us as f64 / 1_000_000.0;
        let dt_ms = dt * 1000.0;

        let (p, c) = (&prev.counters, &curr.counters);
        let read_ios = du64(c.read_ios, p.read_ios)?;
        let write_ios = du64(c.write_ios, p.write_ios)?;
        let read_ticks = du64(c.read_ticks, p.read_ticks)?;
        let write_ticks = du64(c.write_ticks, p.write_ticks)?;
        let io_ticks = du64(c.total_io_ticks, p.total_io_ticks)?;
        let time_in_queue = du64(c.total_time_in_queue, p.total_time_in_queue)?;

        let per_sec = |delta: u64| delta as f64 / dt;
        let bytes_per_sec = |sectors: u64| sectors as f64 * SECTOR_SIZE as f64 / dt;
        let await_ms = |ticks: u64, ios: u64| {
            if ios == 0 {
                0.0
            } else {
                ticks as f64 / ios as f64
            }
        };

        Some(Self {
            interval_secs: dt,
            read_iops: per_sec(read_ios),
            write_iops: per_sec(write_ios),
            discard_iops: per_sec(du64(c.discard_ios, p.discard_ios)?),
            flush_iops: per_sec(du64(c.flush_ios, p.flush_ios)?),
            read_bytes_per_sec: bytes_per_sec(du64(c.read_sectors, p.read_sectors)?),
            write_bytes_per_sec: bytes_per_sec(du64(c.write_sectors, p.write_sectors)?),
            discard_bytes_per_sec: bytes_per_sec(du64(c.discard_sectors, p.discard_sectors)?),
            read_merges_per_sec: per_sec(du64(c.read_merges, p.read_merges)?),
            write_merges_per_sec: per_sec(du64(c.write_merges, p.write_merges)?),
            read_await_ms: await_ms(read_ticks, read_ios),
            write_await_ms: await_ms(write_ticks, write_ios),
            util_percent: (io_ticks as f64 / dt_ms * 100.0).min(100.0),
            avg_queue_size: time_in_queue as f64 / dt_ms,
            in_flight: c.in_flight,
        })
    }
}
