//! Block-device statistics collector for Linux.
//!
//! This module provides infrastructure for collecting per-device I/O counters
//! from `/proc/diskstats` and classifying devices through `/sys`, with support
//! for mocking for testing on macOS.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Collector                           │
//! │  ┌─────────────────────┐   ┌─────────────────────────────┐  │
//! │  │  DiskStatsReader    │   │  TopologyResolver           │  │
//! │  │  - /proc/diskstats  │   │  - /sys/dev/block/<maj:min> │  │
//! │  │  - DeviceFilter     │   │  QueueAttributeReader       │  │
//! │  └──────────┬──────────┘   │  - queue/*, inflight, size  │  │
//! │             │              └──────────────┬──────────────┘  │
//! │             └──────────────┬──────────────┘                 │
//! │                            │                                │
//! │                     ┌──────▼──────┐                         │
//! │                     │  FileSystem │ (trait)                 │
//! │                     └──────┬──────┘                         │
//! └────────────────────────────┼────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              │               │               │
//!       ┌──────▼──────┐ ┌──────▼──────┐ ┌──────▼──────┐
//!       │   RealFs    │ │   MockFs    │ │  Scenarios  │
//!       │ (Linux)     │ │ (Testing)   │ │ (Fixtures)  │
//!       └─────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! # Usage
//!
//! ## Production (Linux)
//!
//! ```ignore
//! use blkstat::collector::{Collector, RealFs};
//! use blkstat::config::CollectorConfig;
//!
//! let mut collector = Collector::new(RealFs::new(), &CollectorConfig::default());
//! let report = collector.poll();
//! let devices = collector.store().current();
//! ```
//!
//! ## Testing (with MockFs)
//!
//! ```
//! use blkstat::collector::{Collector, MockFs};
//! use blkstat::config::CollectorConfig;
//!
//! let mut collector = Collector::new(MockFs::typical_host(), &CollectorConfig::default());
//! let report = collector.poll();
//! assert!(report.is_ok());
//! assert!(collector.store().get("nvme0n1").is_some());
//! ```

#[allow(clippy::module_inception)]
mod collector;
pub mod error;
pub mod filter;
pub mod mock;
pub mod procfs;
pub mod sysfs;
pub mod traits;

pub use collector::{Collector, PollPhase, PollReport, PollTiming};
pub use error::CollectError;
pub use filter::DeviceFilter;
pub use mock::MockFs;
pub use procfs::DiskStatsReader;
pub use sysfs::{QueueAttributeReader, TopologyResolver};
pub use traits::{FileSystem, RealFs};
