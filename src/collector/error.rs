//! Error type for collection failures.

use std::path::PathBuf;

use crate::storage::model::QueueAttribute;

/// Error type for collection failures.
///
/// Only `SourceUnavailable` and `Cancelled` abort a poll cycle; the rest are
/// per-line or per-device and are reported alongside the results.
#[derive(Debug)]
pub enum CollectError {
    /// `/proc/diskstats` could not be opened or read.
    SourceUnavailable { path: PathBuf, source: std::io::Error },
    /// A diskstats line matched no known layout or had a bad integer.
    MalformedLine {
        line_no: usize,
        line: String,
        reason: String,
    },
    /// Device kept with `unknown` class.
    TopologyUnresolved { device: String, reason: String },
    /// An attribute file existed but could not be read; it is omitted.
    AttributeUnavailable {
        device: String,
        attribute: QueueAttribute,
        source: std::io::Error,
    },
    /// The poll was cancelled between devices; nothing was committed.
    Cancelled,
}

impl CollectError {
    /// Whether the error aborted the whole poll cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CollectError::SourceUnavailable { .. } | CollectError::Cancelled
        )
    }

    /// Device the error refers to, if it is a per-device error.
    pub fn device(&self) -> Option<&str> {
        match self {
            CollectError::TopologyUnresolved { device, .. }
            | CollectError::AttributeUnavailable { device, .. } => Some(device),
            _ => None,
        }
    }
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::SourceUnavailable { path, source } => {
                write!(f, "cannot read {}: {}", path.display(), source)
            }
            CollectError::MalformedLine {
                line_no,
                line,
                reason,
            } => write!(f, "malformed line {} ({:?}): {}", line_no, line, reason),
            CollectError::TopologyUnresolved { device, reason } => {
                write!(f, "{}: topology unresolved: {}", device, reason)
            }
            CollectError::AttributeUnavailable {
                device,
                attribute,
                source,
            } => write!(f, "{}: cannot read {}: {}", device, attribute, source),
            CollectError::Cancelled => write!(f, "poll cancelled"),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::SourceUnavailable { source, .. }
            | CollectError::AttributeUnavailable { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        let err = CollectError::SourceUnavailable {
            path: PathBuf::from("/proc/diskstats"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().starts_with("cannot read /proc/diskstats"));
        assert!(CollectError::Cancelled.is_fatal());

        let err = CollectError::TopologyUnresolved {
            device: "sdb".into(),
            reason: "broken symlink".into(),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.device(), Some("sdb"));
        assert_eq!(err.to_string(), "sdb: topology unresolved: broken symlink");
    }
}
