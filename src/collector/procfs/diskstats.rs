//! Reader for `/proc/diskstats`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::collector::error::CollectError;
use crate::collector::filter::DeviceFilter;
use crate::collector::procfs::parser::parse_diskstats_line;
use crate::collector::traits::FileSystem;
use crate::storage::model::CounterRecord;
use crate::util::now_micros;

/// Counters for one device with the wall-clock time its line was parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedCounters {
    pub counters: CounterRecord,
    /// Microseconds since the Unix epoch.
    pub captured_at: i64,
}

/// Result of reading the whole counters source once.
#[derive(Debug, Default)]
pub struct DiskStatsRead {
    /// Device name to counters, for devices that parsed and passed the filter.
    pub devices: BTreeMap<String, TimedCounters>,
    /// Lines dropped as malformed.
    pub skipped_lines: usize,
    /// Devices dropped by the filter.
    pub filtered: usize,
    /// One `MalformedLine` per skipped line.
    pub errors: Vec<CollectError>,
}

/// Reads and parses `/proc/diskstats`, applying a `DeviceFilter`.
pub struct DiskStatsReader<F: FileSystem> {
    fs: F,
    path: PathBuf,
    filter: DeviceFilter,
}

impl<F: FileSystem> DiskStatsReader<F> {
    /// Creates a reader for `<proc_path>/diskstats`.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    /// * `filter` - Devices to leave out
    pub fn new(fs: F, proc_path: impl AsRef<Path>, filter: DeviceFilter) -> Self {
        Self {
            fs,
            path: proc_path.as_ref().join("diskstats"),
            filter,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every device line.
    ///
    /// Fails only when the source cannot be read at all; a bad line is
    /// skipped, counted and reported in `errors`.
    pub fn read(&self) -> Result<DiskStatsRead, CollectError> {
        let content = self
            .fs
            .read_to_string(&self.path)
            .map_err(|source| CollectError::SourceUnavailable {
                path: self.path.clone(),
                source,
            })?;

        let mut result = DiskStatsRead::default();

        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            // Ignored devices are dropped before their counters are checked
            if line
                .split_whitespace()
                .nth(2)
                .is_some_and(|name| self.filter.is_excluded(name))
            {
                result.filtered += 1;
                continue;
            }

            let parsed = match parse_diskstats_line(line) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(line_no = idx + 1, "skipping diskstats line: {}", e.message);
                    result.skipped_lines += 1;
                    result.errors.push(CollectError::MalformedLine {
                        line_no: idx + 1,
                        line: line.to_string(),
                        reason: e.message,
                    });
                    continue;
                }
            };

            let timed = TimedCounters {
                counters: parsed.counters,
                captured_at: now_micros(),
            };
            if result.devices.insert(parsed.name.clone(), timed).is_some() {
                warn!(device = %parsed.name, "duplicate diskstats entry, keeping the last one");
            }
        }

        debug!(
            devices = result.devices.len(),
            skipped = result.skipped_lines,
            filtered = result.filtered,
            "read {}",
            self.path.display()
        );

        Ok(result)
    }
}
