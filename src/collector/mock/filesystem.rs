//! In-memory mock filesystem for testing collectors without real `/proc` or `/sys`.
//!
//! This module provides `MockFs` which simulates a filesystem in memory,
//! including symbolic links, so that sysfs device-number hierarchies can be
//! fabricated in tests running on macOS and in CI environments without Linux.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Maximum number of symlinks followed while resolving one path (matches Linux `MAXSYMLINKS`).
const MAX_LINK_FOLLOWS: usize = 40;

/// In-memory filesystem for testing.
///
/// Stores files, directories and symlinks in memory, allowing tests to
/// simulate various `/proc/diskstats` and `/sys/block` states.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Map from path to file contents.
    files: HashMap<PathBuf, String>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
    /// Map from link path to its (absolute or relative) target.
    symlinks: HashMap<PathBuf, PathBuf>,
    /// Files that exist but fail with `PermissionDenied` when read.
    denied: HashSet<PathBuf>,
    /// Artificial read latency per file.
    delays: HashMap<PathBuf, Duration>,
}

enum Part {
    Parent,
    Name(OsString),
}

fn parts_of(path: &Path) -> Vec<Part> {
    path.components()
        .filter_map(|c| match c {
            Component::ParentDir => Some(Part::Parent),
            Component::Normal(name) => Some(Part::Name(name.to_os_string())),
            _ => None,
        })
        .collect()
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    fn add_parents(&mut self, path: &Path) {
        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                self.directories.insert(p.to_path_buf());
            }
            parent = p.parent();
        }
    }

    /// Adds a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_parents(&path);
        self.directories.insert(path);
    }

    /// Adds a symbolic link at `link` pointing to `target`.
    ///
    /// Relative targets are resolved against the link's parent directory,
    /// as the kernel does for `/sys/dev/block/*` entries.
    pub fn add_symlink(&mut self, link: impl AsRef<Path>, target: impl AsRef<Path>) {
        let link = link.as_ref().to_path_buf();
        self.add_parents(&link);
        self.symlinks.insert(link, target.as_ref().to_path_buf());
    }

    /// Adds a file that exists but cannot be read (`PermissionDenied`).
    pub fn add_unreadable(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        self.add_file(&path, "");
        self.denied.insert(path);
    }

    /// Adds a file whose read blocks for `delay` before returning.
    pub fn add_slow_file(
        &mut self,
        path: impl AsRef<Path>,
        content: impl Into<String>,
        delay: Duration,
    ) {
        let path = path.as_ref().to_path_buf();
        self.add_file(&path, content);
        self.delays.insert(path, delay);
    }

    /// Replaces the contents of an existing (or new) file.
    pub fn set_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.add_file(path, content);
    }

    /// Removes a file, directory or symlink entry (children are left alone).
    pub fn remove(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.files.remove(path);
        self.directories.remove(path);
        self.symlinks.remove(path);
    }

    fn is_present(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.directories.contains(path)
    }

    fn resolve(&self, path: &Path) -> io::Result<PathBuf> {
        let mut remaining = parts_of(path);
        remaining.reverse();

        let mut resolved = PathBuf::from("/");
        let mut follows = 0;

        while let Some(part) = remaining.pop() {
            let name = match part {
                Part::Parent => {
                    resolved.pop();
                    continue;
                }
                Part::Name(name) => name,
            };

            let candidate = resolved.join(&name);
            if let Some(target) = self.symlinks.get(&candidate) {
                follows += 1;
                if follows > MAX_LINK_FOLLOWS {
                    return Err(io::Error::other(format!(
                        "too many levels of symbolic links: {:?}",
                        path
                    )));
                }
                if target.is_absolute() {
                    resolved = PathBuf::from("/");
                }
                let mut target_parts = parts_of(target);
                target_parts.reverse();
                remaining.extend(target_parts);
                continue;
            }

            if !self.is_present(&candidate) {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("path not found: {:?}", path),
                ));
            }
            resolved = candidate;
        }

        Ok(resolved)
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let path = if self.files.contains_key(path) {
            path.to_path_buf()
        } else {
            self.resolve(path)?
        };

        if self.denied.contains(&path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("permission denied: {:?}", path),
            ));
        }
        if let Some(delay) = self.delays.get(&path) {
            std::thread::sleep(*delay);
        }

        self.files.get(&path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            )
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.is_present(path) || self.resolve(path).is_ok()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let dir = self.resolve(path)?;
        if !self.directories.contains(&dir) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();

        // Direct children of any kind, reported under the requested path
        let children = self
            .files
            .keys()
            .chain(self.directories.iter())
            .chain(self.symlinks.keys());
        for child in children {
            if child != &dir
                && child.parent().is_some_and(|parent| parent == dir)
                && let Some(name) = child.file_name()
            {
                entries.insert(path.join(name));
            }
        }

        Ok(entries.into_iter().collect())
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        self.resolve(path)
    }
}
