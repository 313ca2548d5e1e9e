//! Utility modules for blkstat.

mod detached;

pub use detached::{DetachedHelpers, HelperSlot, Spawn};

/// Current wall-clock time in microseconds since the Unix epoch.
pub fn now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}
