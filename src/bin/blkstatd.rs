//! blkstatd - Block-device statistics collector daemon.
//!
//! Polls `/proc/diskstats` and `/sys` on an interval, keeps the latest
//! snapshot per device in memory and logs per-device rates. With `--json`
//! every cycle is also written to stdout as one JSON line.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(target_os = "linux")]
use blkstat::collector::RealFs;
#[cfg(not(target_os = "linux"))]
use blkstat::collector::mock::MockFs;
use blkstat::collector::{Collector, FileSystem, PollReport};
use blkstat::config::CollectorConfig;
use blkstat::rates::DeviceRates;
use blkstat::storage::StoredSnapshot;
use blkstat::storage::model::DeviceSnapshot;

/// Block-device statistics collector daemon.
#[derive(Parser)]
#[command(name = "blkstatd", about = "Block-device statistics collector daemon", version)]
struct Args {
    /// Poll interval in seconds.
    #[arg(short, long, default_value = "10")]
    interval: u64,

    /// Stop after this many poll cycles (runs until interrupted by default).
    #[arg(short, long)]
    count: Option<u64>,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Path to /sys filesystem (for testing/mocking).
    #[arg(long, default_value = "/sys")]
    sys_path: String,

    /// Device-name prefix to ignore. Repeatable; replaces the default
    /// "loop" and "ram" set. Pass an empty string to keep every device.
    #[arg(long = "ignore-prefix", value_name = "PREFIX")]
    ignore_prefixes: Vec<String>,

    /// Per-device time limit in milliseconds, applied separately to topology and attribute reads.
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Maximum devices resolved in parallel.
    #[arg(long, default_value = "4")]
    concurrency: usize,

    /// Print every cycle as a JSON line on stdout.
    #[arg(long)]
    json: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn collector_config(&self) -> CollectorConfig {
        let mut config = CollectorConfig::new()
            .with_proc_path(&self.proc_path)
            .with_sys_path(&self.sys_path)
            .with_device_timeout(self.timeout_ms.map(Duration::from_millis))
            .with_concurrency(self.concurrency);
        if !self.ignore_prefixes.is_empty() {
            config = config.with_ignored_prefixes(self.ignore_prefixes.iter().cloned());
        }
        config
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["blkstatd", "blkstat"] {
        match format!("{}={}", target, level).parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("invalid log directive for {}: {}", target, e),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// One poll cycle as written with `--json`.
#[derive(Serialize)]
struct CycleRecord<'a> {
    cycle: u64,
    generation: u64,
    devices: &'a BTreeMap<String, StoredSnapshot>,
    rates: &'a BTreeMap<String, DeviceRates>,
}

/// Logs the per-cycle summary.
fn log_report(cycle: u64, report: &PollReport) {
    if let Some(ref fatal) = report.fatal {
        error!("Poll #{} failed: {}", cycle, fatal);
        return;
    }

    let stale = report
        .commit
        .as_ref()
        .map(|c| c.newly_stale.len())
        .unwrap_or(0);
    info!(
        "Poll #{}: {} devices, {} skipped lines, {} filtered, {} unresolved, {} newly stale, {} errors ({:?})",
        cycle,
        report.devices,
        report.skipped_lines,
        report.filtered,
        report.unresolved,
        stale,
        report.errors.len(),
        report.timing.total
    );
    for e in &report.errors {
        debug!("{}", e);
    }
}

/// Rates for every device present in both `previous` and `current`.
fn compute_rates(
    previous: &BTreeMap<String, Arc<DeviceSnapshot>>,
    current: &BTreeMap<String, Arc<DeviceSnapshot>>,
) -> BTreeMap<String, DeviceRates> {
    let mut rates = BTreeMap::new();
    for (name, curr) in current {
        let Some(prev) = previous.get(name) else {
            continue;
        };
        match DeviceRates::between(prev, curr) {
            Some(r) => {
                rates.insert(name.clone(), r);
            }
            None => debug!(device = %name, "counters restarted, skipping rates this cycle"),
        }
    }
    rates
}

fn log_rates(current: &BTreeMap<String, Arc<DeviceSnapshot>>, rates: &BTreeMap<String, DeviceRates>) {
    for (name, r) in rates {
        let class = current
            .get(name)
            .map(|s| s.topology.class.as_str())
            .unwrap_or("unknown");
        info!(
            "{:<12} {:<19} r/s={:.1} w/s={:.1} rkB/s={:.1} wkB/s={:.1} r_await={:.2} w_await={:.2} aqu={:.2} util={:.1}%",
            name,
            class,
            r.read_iops,
            r.write_iops,
            r.read_bytes_per_sec / 1024.0,
            r.write_bytes_per_sec / 1024.0,
            r.read_await_ms,
            r.write_await_ms,
            r.avg_queue_size,
            r.util_percent
        );
    }
}

fn run<F: FileSystem + Clone + 'static>(mut collector: Collector<F>, args: &Args) {
    let interval = Duration::from_secs(args.interval);
    let store = collector.store();

    // Setup graceful shutdown; the same flag cancels a poll in progress
    let shutdown = Arc::new(AtomicBool::new(false));
    let s = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        s.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let mut previous: BTreeMap<String, Arc<DeviceSnapshot>> = BTreeMap::new();
    let mut cycle: u64 = 0;

    info!("Starting collection loop");

    while !shutdown.load(Ordering::SeqCst) {
        cycle += 1;
        let report = collector.poll_with_cancel(&shutdown);
        log_report(cycle, &report);

        if report.is_ok() {
            let current = store.current();
            let rates = compute_rates(&previous, &current);
            log_rates(&current, &rates);

            if args.json {
                let record = CycleRecord {
                    cycle,
                    generation: store.generation(),
                    devices: &store.entries(),
                    rates: &rates,
                };
                match serde_json::to_string(&record) {
                    Ok(line) => {
                        let mut stdout = std::io::stdout().lock();
                        if let Err(e) = writeln!(stdout, "{}", line).and_then(|_| stdout.flush()) {
                            error!("Failed to write JSON output: {}", e);
                        }
                    }
                    Err(e) => error!("Failed to serialize cycle: {}", e),
                }
            }

            previous = current;
        }

        if args.count.is_some_and(|count| cycle >= count) {
            break;
        }

        // Sleep with periodic checks for shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && !shutdown.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!(
        "Shutting down after {} cycles, {} devices tracked ({} stale)",
        cycle,
        store.len(),
        store.stale_devices().len()
    );
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    let config = args.collector_config();

    info!("blkstatd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: interval={}s, proc={}, sys={}, ignore={:?}, timeout={:?}, concurrency={}",
        args.interval,
        config.proc_path.display(),
        config.sys_path.display(),
        config.ignored_prefixes,
        config.device_timeout,
        config.concurrency
    );

    #[cfg(target_os = "linux")]
    let collector = Collector::new(RealFs::new(), &config);
    #[cfg(not(target_os = "linux"))]
    let collector = Collector::new(MockFs::typical_host(), &config);

    run(collector, &args);
}
