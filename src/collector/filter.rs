//! Device-name exclusion by prefix.

/// Prefixes excluded when nothing else is configured: loopback and RAM disks.
pub const DEFAULT_IGNORED_PREFIXES: &[&str] = &["loop", "ram"];

/// Decides whether a device is left out of collection.
///
/// A pure prefix match on the kernel device name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFilter {
    prefixes: Vec<String>,
}

impl DeviceFilter {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    /// A filter that keeps every device.
    pub fn allow_all() -> Self {
        Self {
            prefixes: Vec::new(),
        }
    }

    /// Returns `true` if `name` should be excluded.
    pub fn is_excluded(&self, name: &str) -> bool {
        self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORED_PREFIXES.iter().copied())
    }
}
