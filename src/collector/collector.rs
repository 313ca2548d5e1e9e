//! Poll-cycle orchestration.
//!
//! The `Collector` reads `/proc/diskstats` once, resolves topology and queue
//! attributes for every device on a bounded pool of scoped workers, merges
//! the results into `DeviceSnapshot`s and commits them to the
//! `SnapshotStore` in one step.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::collector::error::CollectError;
use crate::collector::procfs::{DiskStatsRead, DiskStatsReader, TimedCounters};
use crate::collector::sysfs::{QueueAttributeReader, TopologyResolver};
use crate::collector::traits::FileSystem;
use crate::config::CollectorConfig;
use crate::storage::model::{
    DeviceClass, DeviceIdentity, DeviceNumber, DeviceSnapshot, DeviceTopology, QueueAttribute,
    QueueAttributes,
};
use crate::storage::{CommitSummary, SnapshotStore};
use crate::util::{DetachedHelpers, Spawn};

/// Stage of a poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollPhase {
    #[default]
    Idle,
    Reading,
    Resolving,
    ReadingQueue,
    Merging,
    Stored,
}

impl PollPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollPhase::Idle => "idle",
            PollPhase::Reading => "reading",
            PollPhase::Resolving => "resolving",
            PollPhase::ReadingQueue => "reading_queue",
            PollPhase::Merging => "merging",
            PollPhase::Stored => "stored",
        }
    }
}

impl fmt::Display for PollPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing information for each poll phase.
///
/// Used for debugging and performance monitoring.
#[derive(Debug, Clone, Default)]
pub struct PollTiming {
    /// Whole poll cycle.
    pub total: Duration,
    /// Reading and parsing `/proc/diskstats`.
    pub diskstats: Duration,
    /// Topology and queue resolution across all workers.
    pub devices: Duration,
    /// Merging and committing to the store.
    pub commit: Duration,
    /// Workers used for the fan-out.
    pub workers: usize,
}

/// Outcome of one poll cycle.
///
/// A poll always produces a report. When `fatal` is set nothing was
/// committed and the store still holds the previous cycle.
#[derive(Debug, Default)]
pub struct PollReport {
    pub fatal: Option<CollectError>,
    /// Devices committed this cycle.
    pub devices: usize,
    /// Diskstats lines skipped as malformed.
    pub skipped_lines: usize,
    /// Devices excluded by the ignored-prefix filter.
    pub filtered: usize,
    /// Devices stored with `unknown` class.
    pub unresolved: usize,
    /// Non-fatal per-line and per-device errors, in device order.
    pub errors: Vec<CollectError>,
    pub commit: Option<CommitSummary>,
    pub timing: PollTiming,
}

impl PollReport {
    pub fn is_ok(&self) -> bool {
        self.fatal.is_none()
    }

    fn failed(error: CollectError, timing: PollTiming) -> Self {
        Self {
            fatal: Some(error),
            timing,
            ..Default::default()
        }
    }
}

/// One step of a device inspection, in the order it happens.
#[derive(Debug)]
enum Progress {
    Topology(Result<DeviceTopology, CollectError>),
    Attribute(QueueAttribute, Result<Option<String>, CollectError>),
}

/// Topology and queue result for one device.
#[derive(Debug)]
struct DeviceOutcome {
    topology: DeviceTopology,
    queue: QueueAttributes,
    errors: Vec<CollectError>,
}

impl DeviceOutcome {
    fn pending() -> Self {
        Self {
            topology: DeviceTopology::unknown(),
            queue: QueueAttributes::new(),
            errors: Vec::new(),
        }
    }

    fn unresolved(device: &str, reason: String) -> Self {
        let mut outcome = Self::pending();
        outcome.errors.push(CollectError::TopologyUnresolved {
            device: device.to_string(),
            reason,
        });
        outcome
    }

    fn apply(&mut self, device: &str, progress: Progress) {
        match progress {
            Progress::Topology(Ok(topology)) => self.topology = topology,
            Progress::Topology(Err(e)) => {
                warn!(device, "{}", e);
                self.errors.push(e);
            }
            Progress::Attribute(attribute, Ok(Some(value))) => self.queue.insert(attribute, value),
            Progress::Attribute(_, Ok(None)) => {}
            Progress::Attribute(_, Err(e)) => self.errors.push(e),
        }
    }
}

/// Resolves topology, then reads queue attributes one by one, handing every
/// step to `emit` as it completes. Stops when `emit` returns `false`.
fn inspect_device<F, E>(
    resolver: &TopologyResolver<F>,
    queue_reader: &QueueAttributeReader<F>,
    name: &str,
    devnum: DeviceNumber,
    known: &HashMap<String, DeviceNumber>,
    mut emit: E,
) where
    F: FileSystem,
    E: FnMut(Progress) -> bool,
{
    let resolved = resolver.resolve(name, devnum, known);
    let topology = resolved.as_ref().ok().cloned();
    if !emit(Progress::Topology(resolved)) {
        return;
    }
    if let Some(topology) = topology {
        queue_reader.visit_for(name, &topology, |attribute, result| {
            emit(Progress::Attribute(attribute, result))
        });
    }
}

/// Block-device statistics collector.
///
/// Owns the readers for one `/proc` + `/sys` pair and shares its
/// `SnapshotStore` with any number of readers.
pub struct Collector<F: FileSystem + Clone + 'static> {
    diskstats: DiskStatsReader<F>,
    resolver: Arc<TopologyResolver<F>>,
    queue_reader: Arc<QueueAttributeReader<F>>,
    store: Arc<SnapshotStore>,
    device_timeout: Option<Duration>,
    concurrency: NonZeroUsize,
    helpers: DetachedHelpers<DeviceNumber>,
    last_phase: PollPhase,
    last_timing: Option<PollTiming>,
}

impl<F: FileSystem + Clone + 'static> Collector<F> {
    /// Creates a collector with an empty store.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `config` - Paths, filter, timeout and fan-out limit
    pub fn new(fs: F, config: &CollectorConfig) -> Self {
        Self {
            diskstats: DiskStatsReader::new(fs.clone(), &config.proc_path, config.device_filter()),
            resolver: Arc::new(TopologyResolver::new(fs.clone(), config.sys_path.clone())),
            queue_reader: Arc::new(QueueAttributeReader::new(fs)),
            store: Arc::new(SnapshotStore::new()),
            device_timeout: config.device_timeout,
            concurrency: config.concurrency,
            helpers: DetachedHelpers::new("blkstat-io"),
            last_phase: PollPhase::Idle,
            last_timing: None,
        }
    }

    /// Commits into `store` instead of a private one.
    pub fn with_store(mut self, store: Arc<SnapshotStore>) -> Self {
        self.store = store;
        self
    }

    /// Shared handle to the store this collector commits into.
    pub fn store(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.store)
    }

    /// Last phase reached by the most recent poll.
    pub fn last_phase(&self) -> PollPhase {
        self.last_phase
    }

    /// Returns timing information from the last poll.
    pub fn last_timing(&self) -> Option<&PollTiming> {
        self.last_timing.as_ref()
    }

    /// Helper threads from timed-out inspections that are still blocked.
    ///
    /// At most one per device: a device whose previous helper has not
    /// returned is reported unresolved without starting another.
    pub fn outstanding_helpers(&self) -> usize {
        self.helpers.outstanding()
    }

    /// Runs one poll cycle to completion.
    pub fn poll(&mut self) -> PollReport {
        self.poll_with_cancel(&AtomicBool::new(false))
    }

    /// Runs one poll cycle, checking `cancel` before each device.
    ///
    /// A cancelled cycle reports `Cancelled` and commits nothing.
    pub fn poll_with_cancel(&mut self, cancel: &AtomicBool) -> PollReport {
        let total_start = Instant::now();
        let mut timing = PollTiming::default();

        self.last_phase = PollPhase::Reading;
        let start = Instant::now();
        let read = match self.diskstats.read() {
            Ok(read) => read,
            Err(e) => {
                warn!("poll aborted, keeping previous snapshots: {}", e);
                timing.diskstats = start.elapsed();
                timing.total = total_start.elapsed();
                self.last_timing = Some(timing.clone());
                return PollReport::failed(e, timing);
            }
        };
        timing.diskstats = start.elapsed();

        self.last_phase = PollPhase::Resolving;
        let start = Instant::now();
        let (outcomes, workers) = self.inspect_all(&read, cancel);
        timing.devices = start.elapsed();
        timing.workers = workers;

        if cancel.load(Ordering::Relaxed) {
            info!(devices = read.devices.len(), "poll cancelled, nothing committed");
            timing.total = total_start.elapsed();
            self.last_timing = Some(timing.clone());
            return PollReport::failed(CollectError::Cancelled, timing);
        }

        self.last_phase = PollPhase::Merging;
        let start = Instant::now();
        let mut report = PollReport {
            skipped_lines: read.skipped_lines,
            filtered: read.filtered,
            errors: read.errors,
            ..Default::default()
        };

        let mut snapshots = Vec::with_capacity(read.devices.len());
        for ((name, timed), outcome) in read.devices.into_iter().zip(outcomes) {
            let outcome = outcome.unwrap_or_else(|| {
                DeviceOutcome::unresolved(&name, "device worker failed".to_string())
            });
            if outcome.topology.class == DeviceClass::Unknown {
                report.unresolved += 1;
            }
            report.errors.extend(outcome.errors);

            let TimedCounters {
                counters,
                captured_at,
            } = timed;
            snapshots.push(DeviceSnapshot {
                identity: DeviceIdentity::new(name, counters.devnum()),
                counters,
                topology: outcome.topology,
                queue: outcome.queue,
                captured_at,
            });
        }
        report.devices = snapshots.len();

        let summary = self.store.commit(snapshots);
        if !summary.newly_stale.is_empty() {
            info!(devices = ?summary.newly_stale, "devices disappeared, marked stale");
        }
        if !summary.replaced.is_empty() {
            info!(devices = ?summary.replaced, "device numbers changed, treating as new devices");
        }
        timing.commit = start.elapsed();
        timing.total = total_start.elapsed();
        self.last_phase = PollPhase::Stored;

        debug!(
            generation = summary.generation,
            devices = report.devices,
            skipped = report.skipped_lines,
            unresolved = report.unresolved,
            errors = report.errors.len(),
            "poll committed in {:?}",
            timing.total
        );

        report.commit = Some(summary);
        report.timing = timing.clone();
        self.last_timing = Some(timing);
        report
    }

    /// Fans device inspection out over at most `concurrency` scoped workers.
    ///
    /// Returns one slot per device in `read.devices` order (`None` for
    /// devices skipped by cancellation or lost to a panicked worker) and the
    /// number of workers used.
    fn inspect_all(
        &self,
        read: &DiskStatsRead,
        cancel: &AtomicBool,
    ) -> (Vec<Option<DeviceOutcome>>, usize) {
        let targets: Vec<(&String, DeviceNumber)> = read
            .devices
            .iter()
            .map(|(name, timed)| (name, timed.counters.devnum()))
            .collect();
        let known: Arc<HashMap<String, DeviceNumber>> = Arc::new(
            targets
                .iter()
                .map(|(name, devnum)| ((*name).clone(), *devnum))
                .collect(),
        );

        let mut outcomes: Vec<Option<DeviceOutcome>> = targets.iter().map(|_| None).collect();
        let workers = self.concurrency.get().min(targets.len());
        let next = AtomicUsize::new(0);
        let (next, targets, known) = (&next, &targets, &known);

        thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            if cancel.load(Ordering::Relaxed) {
                                break;
                            }
                            let idx = next.fetch_add(1, Ordering::Relaxed);
                            let Some((name, devnum)) = targets.get(idx) else {
                                break;
                            };
                            done.push((idx, self.inspect(name, *devnum, known)));
                        }
                        done
                    })
                })
                .collect();

            for handle in handles {
                match handle.join() {
                    Ok(done) => {
                        for (idx, outcome) in done {
                            outcomes[idx] = Some(outcome);
                        }
                    }
                    Err(_) => warn!("device worker panicked"),
                }
            }
        });

        (outcomes, workers)
    }

    /// Inspects one device, inline or bounded by the per-device timeout.
    fn inspect(
        &self,
        name: &str,
        devnum: DeviceNumber,
        known: &Arc<HashMap<String, DeviceNumber>>,
    ) -> DeviceOutcome {
        match self.device_timeout {
            Some(timeout) => self.inspect_detached(name, devnum, known, timeout),
            None => {
                let mut outcome = DeviceOutcome::pending();
                inspect_device(&self.resolver, &self.queue_reader, name, devnum, known, |progress| {
                    outcome.apply(name, progress);
                    true
                });
                outcome
            }
        }
    }

    /// Runs the inspection on a detached helper and gives topology and queue
    /// reads `timeout` each.
    ///
    /// A stuck topology step leaves the device `unknown`. A stuck queue step
    /// keeps the resolved topology and the attributes read so far, and
    /// reports the attribute being read as `AttributeUnavailable`.
    fn inspect_detached(
        &self,
        name: &str,
        devnum: DeviceNumber,
        known: &Arc<HashMap<String, DeviceNumber>>,
        timeout: Duration,
    ) -> DeviceOutcome {
        let resolver = Arc::clone(&self.resolver);
        let queue_reader = Arc::clone(&self.queue_reader);
        let known = Arc::clone(known);
        let device = name.to_string();
        let (tx, rx) = mpsc::channel();

        let spawned = self.helpers.spawn(devnum, move |slot| {
            inspect_device(&resolver, &queue_reader, &device, devnum, &known, |progress| {
                tx.send(progress).is_ok()
            });
            // Free the slot before the channel disconnects
            drop(slot);
        });
        match spawned {
            Spawn::Started => {}
            Spawn::Busy => {
                warn!(device = name, "previous inspection still blocked, not retrying");
                return DeviceOutcome::unresolved(
                    name,
                    "previous inspection is still blocked".to_string(),
                );
            }
            Spawn::Failed(e) => {
                warn!(device = name, "cannot start helper thread: {}", e);
                return DeviceOutcome::unresolved(name, format!("cannot start helper thread: {}", e));
            }
        }

        let mut outcome = DeviceOutcome::pending();
        let mut step = PollPhase::Resolving;
        let mut attributes_seen = 0;
        let mut deadline = Instant::now() + timeout;
        loop {
            match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(progress) => {
                    match progress {
                        Progress::Topology(_) => {
                            step = PollPhase::ReadingQueue;
                            deadline = Instant::now() + timeout;
                        }
                        Progress::Attribute(..) => attributes_seen += 1,
                    }
                    outcome.apply(name, progress);
                }
                Err(RecvTimeoutError::Disconnected) => return outcome,
                Err(RecvTimeoutError::Timeout) => break,
            }
        }

        warn!(device = name, phase = %step, "no result within {:?}", timeout);
        let error = match (step, QueueAttribute::ALL.get(attributes_seen)) {
            (PollPhase::ReadingQueue, Some(&attribute)) => CollectError::AttributeUnavailable {
                device: name.to_string(),
                attribute,
                source: io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no result within {:?}", timeout),
                ),
            },
            // Every attribute arrived; only the disconnect was late
            (PollPhase::ReadingQueue, None) => return outcome,
            _ => CollectError::TopologyUnresolved {
                device: name.to_string(),
                reason: format!("timed out after {:?} while {}", timeout, step),
            },
        };
        outcome.errors.push(error);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    const NVME_SCHEDULER: &str =
        "/sys/devices/pci0000:00/0000:00:1d.0/0000:3d:00.0/nvme/nvme0/nvme0n1/queue/scheduler";
    const MD_LEVEL: &str = "/sys/devices/virtual/block/md127/md/level";

    fn collector(fs: MockFs) -> Collector<MockFs> {
        Collector::new(fs, &CollectorConfig::default())
    }

    fn class_of(store: &SnapshotStore, name: &str) -> DeviceClass {
        store.get(name).unwrap().snapshot.topology.class
    }

    #[test]
    fn test_poll_typical_host() {
        let mut collector = collector(MockFs::typical_host());
        let report = collector.poll();

        assert!(report.is_ok());
        assert_eq!(report.devices, 11);
        assert_eq!(report.filtered, 2);
        assert_eq!(report.skipped_lines, 0);
        assert_eq!(report.unresolved, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].device(), Some("sdc"));
        assert_eq!(collector.last_phase(), PollPhase::Stored);
        assert!(collector.last_timing().is_some());

        let store = collector.store();
        assert_eq!(class_of(&store, "sda"), DeviceClass::WholeDisk);
        assert_eq!(class_of(&store, "sda1"), DeviceClass::Partition);
        assert_eq!(class_of(&store, "nvme0n1"), DeviceClass::Namespace);
        assert_eq!(class_of(&store, "nvme0n1p1"), DeviceClass::NamespacePartition);
        assert_eq!(class_of(&store, "md127"), DeviceClass::Raid);
        assert_eq!(class_of(&store, "dm-0"), DeviceClass::DeviceMapper);
        assert_eq!(class_of(&store, "sdc"), DeviceClass::Unknown);
        assert!(store.get("loop0").is_none());
        assert!(store.get("ram0").is_none());

        let nvme = store.get("nvme0n1").unwrap().snapshot;
        assert_eq!(nvme.identity.devnum, DeviceNumber::new(259, 0));
        assert_eq!(nvme.counters.read_ios, 107146);
        assert_eq!(nvme.counters.flush_ios, 0);
        assert_eq!(nvme.queue.get(QueueAttribute::Rotational), Some("0"));

        // Unknown devices keep their counters with an empty queue
        let sdc = store.get("sdc").unwrap().snapshot;
        assert_eq!(sdc.counters.read_ios, 10);
        assert!(sdc.queue.is_empty());
    }

    #[test]
    fn test_consecutive_polls_increase_captured_at() {
        let store = Arc::new(SnapshotStore::new());
        let config = CollectorConfig::default();

        let mut fs = MockFs::typical_host();
        fs.set_diskstats("   8       0 sda 100 0 800 10 50 0 400 5 0 15 15\n");
        Collector::new(fs.clone(), &config)
            .with_store(Arc::clone(&store))
            .poll();
        let first = store.get("sda").unwrap().snapshot;

        fs.set_diskstats("   8       0 sda 150 0 1200 14 80 0 640 8 0 22 22\n");
        Collector::new(fs, &config)
            .with_store(Arc::clone(&store))
            .poll();
        let second = store.get("sda").unwrap().snapshot;

        assert!(second.captured_at > first.captured_at);
        for ((name, before), (_, after)) in first
            .counters
            .cumulative()
            .iter()
            .zip(second.counters.cumulative().iter())
        {
            assert!(after >= before, "{} decreased", name);
        }
    }

    #[test]
    fn test_counter_decrease_is_stored_unclamped() {
        let store = Arc::new(SnapshotStore::new());
        let config = CollectorConfig::default();

        let mut fs = MockFs::typical_host();
        fs.set_diskstats("   8       0 sda 4294967200 0 800 10 50 0 400 5 0 15 15\n");
        Collector::new(fs.clone(), &config)
            .with_store(Arc::clone(&store))
            .poll();

        fs.set_diskstats("   8       0 sda 40 0 1200 14 80 0 640 8 0 22 22\n");
        Collector::new(fs, &config)
            .with_store(Arc::clone(&store))
            .poll();

        assert_eq!(store.get("sda").unwrap().snapshot.counters.read_ios, 40);
    }

    #[test]
    fn test_removed_device_is_marked_stale() {
        let store = Arc::new(SnapshotStore::new());
        let config = CollectorConfig::default();

        let fs = MockFs::typical_host();
        Collector::new(fs.clone(), &config)
            .with_store(Arc::clone(&store))
            .poll();

        let mut fs = fs;
        fs.set_diskstats("   8       0 sda 1 0 8 1 0 0 0 0 0 1 1\n");
        let report = Collector::new(fs, &config)
            .with_store(Arc::clone(&store))
            .poll();

        let summary = report.commit.unwrap();
        assert_eq!(summary.newly_stale.len(), 10);
        assert!(summary.newly_stale.contains(&"nvme0n1".to_string()));
        assert!(store.get("nvme0n1").unwrap().stale);
        assert!(!store.get("sda").unwrap().stale);
        assert_eq!(store.current().len(), 1);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let mut collector = collector(MockFs::with_malformed_diskstats());
        let report = collector.poll();

        assert!(report.is_ok());
        assert_eq!(report.devices, 3);
        assert_eq!(report.skipped_lines, 3);
        let malformed = report
            .errors
            .iter()
            .filter(|e| matches!(e, CollectError::MalformedLine { .. }))
            .count();
        assert_eq!(malformed, 3);
        assert!(collector.store().get("sda1").is_none());
        assert!(collector.store().get("md127").is_some());
    }

    #[test]
    fn test_missing_source_keeps_previous_snapshots() {
        let store = Arc::new(SnapshotStore::new());
        let config = CollectorConfig::default();

        let mut fs = MockFs::typical_host();
        Collector::new(fs.clone(), &config)
            .with_store(Arc::clone(&store))
            .poll();
        let generation = store.generation();

        fs.remove("/proc/diskstats");
        let mut collector = Collector::new(fs, &config).with_store(Arc::clone(&store));
        let report = collector.poll();

        assert!(matches!(
            report.fatal,
            Some(CollectError::SourceUnavailable { .. })
        ));
        assert_eq!(report.devices, 0);
        assert!(report.commit.is_none());
        assert_eq!(collector.last_phase(), PollPhase::Reading);
        assert_eq!(store.generation(), generation);
        assert!(store.stale_devices().is_empty());
        assert_eq!(store.len(), 11);
    }

    #[test]
    fn test_cancelled_before_start_commits_nothing() {
        let mut collector = collector(MockFs::typical_host());
        let cancel = AtomicBool::new(true);
        let report = collector.poll_with_cancel(&cancel);

        assert!(matches!(report.fatal, Some(CollectError::Cancelled)));
        assert!(collector.store().is_empty());
        assert_eq!(collector.store().generation(), 0);
    }

    #[test]
    fn test_cancelled_between_devices() {
        let mut fs = MockFs::typical_host();
        fs.add_slow_file(NVME_SCHEDULER, "[none] mq-deadline\n", Duration::from_millis(300));
        let config = CollectorConfig::default().with_concurrency(1);
        let mut collector = Collector::new(fs, &config);
        let store = collector.store();

        let cancel = AtomicBool::new(false);
        let report = thread::scope(|scope| {
            scope.spawn(|| {
                thread::sleep(Duration::from_millis(50));
                cancel.store(true, Ordering::Relaxed);
            });
            collector.poll_with_cancel(&cancel)
        });

        assert!(matches!(report.fatal, Some(CollectError::Cancelled)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_slow_queue_read_keeps_resolved_topology() {
        let mut fs = MockFs::typical_host();
        fs.add_slow_file(NVME_SCHEDULER, "[none] mq-deadline\n", Duration::from_secs(2));
        let config =
            CollectorConfig::default().with_device_timeout(Some(Duration::from_millis(100)));
        let mut collector = Collector::new(fs, &config);

        let started = Instant::now();
        let report = collector.poll();
        assert!(started.elapsed() < Duration::from_secs(2));

        assert!(report.is_ok());
        assert_eq!(report.devices, 11);
        assert_eq!(report.unresolved, 1);
        let store = collector.store();

        let nvme = store.get("nvme0n1").unwrap().snapshot;
        assert_eq!(nvme.topology.class, DeviceClass::Namespace);
        assert_eq!(nvme.counters.read_ios, 107146);
        assert_eq!(nvme.queue.get(QueueAttribute::Rotational), Some("0"));
        assert!(!nvme.queue.contains(QueueAttribute::Scheduler));
        assert!(!nvme.queue.contains(QueueAttribute::WriteCache));

        // Partitions read the parent's queue and hit the same slow file
        let part = store.get("nvme0n1p1").unwrap().snapshot;
        assert_eq!(part.topology.class, DeviceClass::NamespacePartition);
        assert_eq!(
            part.topology.parent.as_ref().map(|p| p.name.as_str()),
            Some("nvme0n1")
        );

        let timed_out = report
            .errors
            .iter()
            .find(|e| e.device() == Some("nvme0n1"))
            .unwrap();
        match timed_out {
            CollectError::AttributeUnavailable {
                attribute, source, ..
            } => {
                assert_eq!(*attribute, QueueAttribute::Scheduler);
                assert_eq!(source.kind(), io::ErrorKind::TimedOut);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(class_of(&store, "sda"), DeviceClass::WholeDisk);
    }

    #[test]
    fn test_slow_topology_read_leaves_device_unknown() {
        let mut fs = MockFs::typical_host();
        fs.add_slow_file(MD_LEVEL, "raid1\n", Duration::from_secs(2));
        let config =
            CollectorConfig::default().with_device_timeout(Some(Duration::from_millis(100)));
        let mut collector = Collector::new(fs, &config);
        let report = collector.poll();

        assert!(report.is_ok());
        let md = collector.store().get("md127").unwrap().snapshot;
        assert_eq!(md.topology.class, DeviceClass::Unknown);
        assert!(md.queue.is_empty());
        let timed_out = report
            .errors
            .iter()
            .find(|e| e.device() == Some("md127"))
            .unwrap();
        assert!(matches!(timed_out, CollectError::TopologyUnresolved { .. }));
        assert!(timed_out.to_string().contains("resolving"));
    }

    #[test]
    fn test_hung_device_holds_one_helper_across_polls() {
        let mut fs = MockFs::typical_host();
        fs.add_slow_file(MD_LEVEL, "raid1\n", Duration::from_secs(5));
        let config =
            CollectorConfig::default().with_device_timeout(Some(Duration::from_millis(200)));
        let mut collector = Collector::new(fs, &config);

        for poll in 0..3 {
            let report = collector.poll();
            assert!(report.is_ok());
            assert_eq!(report.devices, 11);
            assert_eq!(collector.outstanding_helpers(), 1, "after poll {}", poll);
            assert_eq!(class_of(&collector.store(), "md127"), DeviceClass::Unknown);
            assert_eq!(class_of(&collector.store(), "sda"), DeviceClass::WholeDisk);

            if poll > 0 {
                let skipped = report
                    .errors
                    .iter()
                    .find(|e| e.device() == Some("md127"))
                    .unwrap();
                assert!(skipped.to_string().contains("still blocked"));
            }
        }
    }

    #[test]
    fn test_concurrency_limit_is_respected() {
        let config = CollectorConfig::default().with_concurrency(1);
        let report = Collector::new(MockFs::typical_host(), &config).poll();
        assert_eq!(report.timing.workers, 1);
        assert_eq!(report.devices, 11);

        let report = collector(MockFs::typical_host()).poll();
        assert_eq!(report.timing.workers, 4);
    }

    #[test]
    fn test_legacy_kernel_reports_unreadable_attribute() {
        let mut collector = collector(MockFs::legacy_kernel());
        let report = collector.poll();

        assert!(report.is_ok());
        assert_eq!(report.devices, 2);
        assert!(report.errors.iter().any(|e| matches!(
            e,
            CollectError::AttributeUnavailable {
                attribute: QueueAttribute::IoTimeout,
                ..
            }
        )));

        let sda1 = collector.store().get("sda1").unwrap().snapshot;
        assert_eq!(sda1.topology.class, DeviceClass::Partition);
        assert!(!sda1.queue.contains(QueueAttribute::IoTimeout));
        assert!(!sda1.queue.contains(QueueAttribute::WriteCache));
        assert_eq!(sda1.queue.get(QueueAttribute::Rotational), Some("1"));
    }
}
