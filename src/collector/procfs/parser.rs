//! Parser for `/proc/diskstats` lines.
//!
//! Pure functions with no I/O, easily testable with string inputs.

use crate::storage::model::{CounterLayout, CounterRecord};

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// One parsed diskstats line: the device name and its counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskStatsLine {
    pub name: String,
    pub counters: CounterRecord,
}

fn parse_number<T: std::str::FromStr>(token: &str, field: &str) -> Result<T, ParseError> {
    token.parse().map_err(|_| {
        ParseError::new(format!("{} is not a non-negative integer: '{}'", field, token))
    })
}

/// Parses one line of `/proc/diskstats`.
///
/// Format: `major minor name` followed by 11, 15 or 17 counters
/// (legacy, +discard, +flush). The layout is chosen by counting the tokens
/// after the name; any other count is rejected rather than mapped
/// positionally.
pub fn parse_diskstats_line(line: &str) -> Result<DiskStatsLine, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 3 {
        return Err(ParseError::new(format!(
            "expected at least 3 fields, got {}",
            tokens.len()
        )));
    }

    let major: u32 = parse_number(tokens[0], "major")?;
    let minor: u32 = parse_number(tokens[1], "minor")?;
    let name = tokens[2];

    let raw = &tokens[3..];
    let layout = CounterLayout::from_counter_count(raw.len()).ok_or_else(|| {
        ParseError::new(format!(
            "{}: {} counters matches no known layout (11, 15 or 17)",
            name,
            raw.len()
        ))
    })?;

    let mut values = [0u64; 17];
    for (i, token) in raw.iter().enumerate() {
        values[i] = parse_number(token, &format!("{} counter {}", name, i + 4))?;
    }

    let [
        read_ios,
        read_merges,
        read_sectors,
        read_ticks,
        write_ios,
        write_merges,
        write_sectors,
        write_ticks,
        in_flight,
        total_io_ticks,
        total_time_in_queue,
        discard_ios,
        discard_merges,
        discard_sectors,
        discard_ticks,
        flush_ios,
        flush_ticks,
    ] = values;

    Ok(DiskStatsLine {
        name: name.to_string(),
        counters: CounterRecord {
            layout,
            major,
            minor,
            read_ios,
            read_merges,
            read_sectors,
            read_ticks,
            write_ios,
            write_merges,
            write_sectors,
            write_ticks,
            in_flight,
            total_io_ticks,
            total_time_in_queue,
            discard_ios,
            discard_merges,
            discard_sectors,
            discard_ticks,
            flush_ios,
            flush_ticks,
        },
    })
}
