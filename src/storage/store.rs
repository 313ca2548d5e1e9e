//! Latest-snapshot store shared between the collector and its readers.
//!
//! The store keeps exactly one generation: the most recent snapshot per
//! device name. A poll cycle commits all of its devices in a single write
//! critical section, so readers see either the previous cycle or the new one
//! for every device, never a mix within one record.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::debug;

use super::model::DeviceSnapshot;

/// A stored snapshot plus its presence bookkeeping.
#[derive(Clone, Debug, Serialize)]
pub struct StoredSnapshot {
    pub snapshot: Arc<DeviceSnapshot>,
    /// Not observed in the most recent committed poll.
    pub stale: bool,
    /// Generation of the last commit that contained this device.
    pub last_seen: u64,
}

/// What a commit changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub generation: u64,
    /// Devices seen for the first time.
    pub inserted: usize,
    /// Devices overwritten with a newer snapshot.
    pub updated: usize,
    /// Devices that went stale in this commit.
    pub newly_stale: Vec<String>,
    /// Names whose device number changed (a new device under an old name).
    pub replaced: Vec<String>,
    /// Timestamps that had to be bumped to stay strictly increasing.
    pub clock_adjusted: usize,
}

#[derive(Debug, Default)]
struct Inner {
    generation: u64,
    entries: HashMap<String, StoredSnapshot>,
}

/// Process-wide map of device name to most recent snapshot.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    inner: RwLock<Inner>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the entries for every device in `snapshots` and marks all
    /// other known devices stale.
    ///
    /// A `captured_at` not later than the stored one is bumped to the stored
    /// value plus one microsecond.
    pub fn commit(&self, snapshots: Vec<DeviceSnapshot>) -> CommitSummary {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.generation += 1;
        let generation = inner.generation;

        let mut summary = CommitSummary {
            generation,
            ..Default::default()
        };
        let present: BTreeSet<String> = snapshots.iter().map(|s| s.name().to_string()).collect();

        for (name, entry) in inner.entries.iter_mut() {
            if !present.contains(name) && !entry.stale {
                entry.stale = true;
                summary.newly_stale.push(name.clone());
            }
        }
        summary.newly_stale.sort();

        for mut snapshot in snapshots {
            let name = snapshot.name().to_string();
            match inner.entries.get(&name) {
                Some(previous) => {
                    let prev = &previous.snapshot;
                    if snapshot.captured_at <= prev.captured_at {
                        snapshot.captured_at = prev.captured_at + 1;
                        summary.clock_adjusted += 1;
                    }
                    if prev.identity.devnum != snapshot.identity.devnum {
                        debug!(
                            device = %name,
                            old = %prev.identity.devnum,
                            new = %snapshot.identity.devnum,
                            "device number changed, treating as a new device"
                        );
                        summary.replaced.push(name.clone());
                    }
                    summary.updated += 1;
                }
                None => summary.inserted += 1,
            }

            inner.entries.insert(
                name,
                StoredSnapshot {
                    snapshot: Arc::new(snapshot),
                    stale: false,
                    last_seen: generation,
                },
            );
        }

        summary
    }

    /// Returns the entry for `name`, including stale ones.
    pub fn get(&self, name: &str) -> Option<StoredSnapshot> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.get(name).cloned()
    }

    /// Copies every entry, stale ones included.
    pub fn entries(&self) -> BTreeMap<String, StoredSnapshot> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect()
    }

    /// Snapshots of devices present in the latest commit.
    pub fn current(&self) -> BTreeMap<String, Arc<DeviceSnapshot>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .entries
            .iter()
            .filter(|(_, entry)| !entry.stale)
            .map(|(name, entry)| (name.clone(), Arc::clone(&entry.snapshot)))
            .collect()
    }

    /// Names of devices missing from the latest commit.
    pub fn stale_devices(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.stale)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Number of commits so far. Zero means nothing was ever stored.
    pub fn generation(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
