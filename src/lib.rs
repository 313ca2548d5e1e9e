//! blkstat - Block-device I/O statistics collector library.
//!
//! This library provides the core functionality used by:
//! - `blkstatd` - background daemon polling `/proc/diskstats` and `/sys`
//!
//! Consumers read the latest per-device snapshots from
//! [`storage::SnapshotStore`] and derive rates with [`rates`].

pub mod collector;
pub mod config;
pub mod rates;
pub mod storage;
pub mod util;
