//! Readers for the Linux `/proc` filesystem.
//!
//! - [`parser`]: pure parsing of `/proc/diskstats` lines
//! - [`diskstats`]: reads the whole file and applies the device filter

pub mod diskstats;
pub mod parser;

pub use diskstats::{DiskStatsRead, DiskStatsReader, TimedCounters};
pub use parser::{DiskStatsLine, ParseError, parse_diskstats_line};
