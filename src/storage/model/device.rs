//! Device identity and cumulative I/O counters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Block device number (`major:minor`).
///
/// The only stable join key between `/proc/diskstats` and `/sys/dev/block`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct DeviceNumber {
    pub major: u32,
    pub minor: u32,
}

impl DeviceNumber {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for DeviceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

impl FromStr for DeviceNumber {
    type Err = String;

    /// Parses the contents of a sysfs `dev` file, e.g. `"259:1\n"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (major, minor) = s
            .split_once(':')
            .ok_or_else(|| format!("invalid device number '{}'", s))?;
        let major = major
            .parse()
            .map_err(|e| format!("invalid major in '{}': {}", s, e))?;
        let minor = minor
            .parse()
            .map_err(|e| format!("invalid minor in '{}': {}", s, e))?;
        Ok(Self { major, minor })
    }
}

/// Kernel-assigned device name plus its device number.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Device name (sda, nvme0n1p2, md127, dm-0, ...).
    pub name: String,
    pub devnum: DeviceNumber,
}

impl DeviceIdentity {
    pub fn new(name: impl Into<String>, devnum: DeviceNumber) -> Self {
        Self {
            name: name.into(),
            devnum,
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.devnum)
    }
}

/// Which generation of the diskstats line format a record was parsed from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterLayout {
    /// 11 counters, up through `total_time_in_queue` (kernels before 4.18).
    #[default]
    Legacy,
    /// 15 counters, adds the four `discard_*` fields (4.18+).
    Discard,
    /// 17 counters, adds `flush_ios` and `flush_ticks` (5.5+).
    Flush,
}

impl CounterLayout {
    /// Number of counter tokens following the device name.
    pub const fn counter_count(self) -> usize {
        match self {
            CounterLayout::Legacy => 11,
            CounterLayout::Discard => 15,
            CounterLayout::Flush => 17,
        }
    }

    /// Selects the layout matching a counter-token count.
    pub fn from_counter_count(count: usize) -> Option<Self> {
        match count {
            11 => Some(CounterLayout::Legacy),
            15 => Some(CounterLayout::Discard),
            17 => Some(CounterLayout::Flush),
            _ => None,
        }
    }

    pub fn has_discard(self) -> bool {
        matches!(self, CounterLayout::Discard | CounterLayout::Flush)
    }

    pub fn has_flush(self) -> bool {
        matches!(self, CounterLayout::Flush)
    }
}

/// Cumulative kernel counters for one device at a point in time.
///
/// All counters except `in_flight` are monotonically non-decreasing while the
/// device exists, but wrap at the kernel's native counter width. Values are
/// kept raw; wrap detection is left to rate computation.
///
/// Fields missing from `layout` are zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRecord {
    pub layout: CounterLayout,

    /// Block device major number.
    /// Source: `/proc/diskstats` column 1
    pub major: u32,

    /// Block device minor number.
    /// Source: `/proc/diskstats` column 2
    pub minor: u32,

    /// Reads completed successfully.
    /// Source: `/proc/diskstats` field 4
    pub read_ios: u64,

    /// Adjacent reads merged.
    /// Source: `/proc/diskstats` field 5
    pub read_merges: u64,

    /// Sectors read (512 bytes each regardless of device sector size).
    /// Source: `/proc/diskstats` field 6
    pub read_sectors: u64,

    /// Milliseconds spent reading.
    /// Source: `/proc/diskstats` field 7
    pub read_ticks: u64,

    /// Writes completed.
    /// Source: `/proc/diskstats` field 8
    pub write_ios: u64,

    /// Adjacent writes merged.
    /// Source: `/proc/diskstats` field 9
    pub write_merges: u64,

    /// Sectors written.
    /// Source: `/proc/diskstats` field 10
    pub write_sectors: u64,

    /// Milliseconds spent writing.
    /// Source: `/proc/diskstats` field 11
    pub write_ticks: u64,

    /// I/Os currently in progress. Instantaneous, not cumulative.
    /// Source: `/proc/diskstats` field 12
    pub in_flight: u64,

    /// Milliseconds the device had I/O in progress.
    /// Source: `/proc/diskstats` field 13
    pub total_io_ticks: u64,

    /// Weighted milliseconds spent doing I/O.
    /// Source: `/proc/diskstats` field 14
    pub total_time_in_queue: u64,

    /// Source: `/proc/diskstats` field 15 (4.18+)
    pub discard_ios: u64,

    /// Source: `/proc/diskstats` field 16 (4.18+)
    pub discard_merges: u64,

    /// Source: `/proc/diskstats` field 17 (4.18+)
    pub discard_sectors: u64,

    /// Source: `/proc/diskstats` field 18 (4.18+)
    pub discard_ticks: u64,

    /// Source: `/proc/diskstats` field 19 (5.5+)
    pub flush_ios: u64,

    /// Source: `/proc/diskstats` field 20 (5.5+)
    pub flush_ticks: u64,
}

impl CounterRecord {
    pub fn devnum(&self) -> DeviceNumber {
        DeviceNumber::new(self.major, self.minor)
    }

    /// Counter values in diskstats column order, limited to those present in
    /// `layout`. Major and minor are not included.
    pub fn counters(&self) -> Vec<u64> {
        let mut values = vec![
            self.read_ios,
            self.read_merges,
            self.read_sectors,
            self.read_ticks,
            self.write_ios,
            self.write_merges,
            self.write_sectors,
            self.write_ticks,
            self.in_flight,
            self.total_io_ticks,
            self.total_time_in_queue,
        ];
        if self.layout.has_discard() {
            values.extend([
                self.discard_ios,
                self.discard_merges,
                self.discard_sectors,
                self.discard_ticks,
            ]);
        }
        if self.layout.has_flush() {
            values.extend([self.flush_ios, self.flush_ticks]);
        }
        values
    }

    /// Renders the record back into a diskstats line for `name`.
    pub fn to_line(&self, name: &str) -> String {
        let mut line = format!("{} {} {}", self.major, self.minor, name);
        for value in self.counters() {
            line.push(' ');
            line.push_str(&value.to_string());
        }
        line
    }

    /// Cumulative counters by name (everything except `in_flight`).
    pub fn cumulative(&self) -> [(&'static str, u64); 16] {
        [
            ("read_ios", self.read_ios),
            ("read_merges", self.read_merges),
            ("read_sectors", self.read_sectors),
            ("read_ticks", self.read_ticks),
            ("write_ios", self.write_ios),
            ("write_merges", self.write_merges),
            ("write_sectors", self.write_sectors),
            ("write_ticks", self.write_ticks),
            ("total_io_ticks", self.total_io_ticks),
            ("total_time_in_queue", self.total_time_in_queue),
            ("discard_ios", self.discard_ios),
            ("discard_merges", self.discard_merges),
            ("discard_sectors", self.discard_sectors),
            ("discard_ticks", self.discard_ticks),
            ("flush_ios", self.flush_ios),
            ("flush_ticks", self.flush_ticks),
        ]
    }
}
