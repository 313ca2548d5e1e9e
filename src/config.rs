//! Collector configuration.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::collector::filter::{DEFAULT_IGNORED_PREFIXES, DeviceFilter};

/// Default number of workers resolving topology and queue attributes.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Settings consumed by [`Collector`](crate::collector::Collector).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    /// Base path to proc filesystem (usually "/proc").
    pub proc_path: PathBuf,
    /// Base path to sysfs (usually "/sys").
    pub sys_path: PathBuf,
    /// Device-name prefixes excluded from collection.
    pub ignored_prefixes: Vec<String>,
    /// Upper bound on each of a device's topology and queue reads; `None`
    /// reads inline and waits indefinitely.
    pub device_timeout: Option<Duration>,
    /// Maximum devices resolved in parallel.
    pub concurrency: NonZeroUsize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            proc_path: PathBuf::from("/proc"),
            sys_path: PathBuf::from("/sys"),
            ignored_prefixes: DEFAULT_IGNORED_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            device_timeout: None,
            concurrency: NonZeroUsize::new(DEFAULT_CONCURRENCY).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl CollectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_proc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.proc_path = path.into();
        self
    }

    pub fn with_sys_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sys_path = path.into();
        self
    }

    /// Replaces the ignored prefixes. An empty list keeps every device.
    pub fn with_ignored_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_device_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.device_timeout = timeout;
        self
    }

    /// Sets the fan-out limit; zero is treated as one.
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = NonZeroUsize::new(workers).unwrap_or(NonZeroUsize::MIN);
        self
    }

    pub fn device_filter(&self) -> DeviceFilter {
        DeviceFilter::new(self.ignored_prefixes.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CollectorConfig::default();
        assert_eq!(config.proc_path, PathBuf::from("/proc"));
        assert_eq!(config.sys_path, PathBuf::from("/sys"));
        assert_eq!(config.ignored_prefixes, vec!["loop", "ram"]);
        assert_eq!(config.device_timeout, None);
        assert_eq!(config.concurrency.get(), DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_builder() {
        let config = CollectorConfig::new()
            .with_proc_path("/host/proc")
            .with_sys_path("/host/sys")
            .with_ignored_prefixes(["zram"])
            .with_device_timeout(Some(Duration::from_millis(250)))
            .with_concurrency(0);

        assert_eq!(config.proc_path, PathBuf::from("/host/proc"));
        assert_eq!(config.sys_path, PathBuf::from("/host/sys"));
        assert!(config.device_filter().is_excluded("zram0"));
        assert!(!config.device_filter().is_excluded("loop0"));
        assert_eq!(config.device_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.concurrency.get(), 1);
    }
}
