//! Detached helper threads for reads that may block in the kernel.

use std::collections::HashMap;
use std::hash::Hash;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

/// Result of [`DetachedHelpers::spawn`].
#[derive(Debug)]
pub enum Spawn {
    Started,
    /// The previous helper for this key has not returned yet.
    Busy,
    Failed(io::Error),
}

/// Held by a running helper. Dropping it frees the helper's key.
#[derive(Debug)]
pub struct HelperSlot(Arc<AtomicBool>);

impl Drop for HelperSlot {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Detached helper threads, at most one outstanding per key.
///
/// A helper that never returns keeps its key busy, so a device stuck in the
/// kernel holds one thread no matter how many polls ask for it.
pub struct DetachedHelpers<K> {
    thread_name: String,
    running: Mutex<HashMap<K, Arc<AtomicBool>>>,
}

impl<K: Eq + Hash> DetachedHelpers<K> {
    pub fn new(thread_name: impl Into<String>) -> Self {
        Self {
            thread_name: thread_name.into(),
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `work` on a new detached thread unless the previous helper for
    /// `key` is still running.
    ///
    /// `work` receives the key's [`HelperSlot`]; the key is free again once
    /// the slot is dropped, at the latest when `work` returns or unwinds.
    pub fn spawn<W>(&self, key: K, work: W) -> Spawn
    where
        W: FnOnce(HelperSlot) + Send + 'static,
    {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        running.retain(|_, finished| !finished.load(Ordering::Acquire));
        if running.contains_key(&key) {
            return Spawn::Busy;
        }

        let finished = Arc::new(AtomicBool::new(false));
        let slot = HelperSlot(Arc::clone(&finished));
        match thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || work(slot))
        {
            Ok(_) => {
                running.insert(key, finished);
                Spawn::Started
            }
            Err(e) => Spawn::Failed(e),
        }
    }

    /// Whether a helper for `key` is still running.
    pub fn is_busy(&self, key: &K) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .is_some_and(|finished| !finished.load(Ordering::Acquire))
    }

    /// Helpers that have not returned yet.
    pub fn outstanding(&self) -> usize {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|finished| !finished.load(Ordering::Acquire))
            .count()
    }
}
