//! Brings the engine up: loads config, opens the log sink, installs the
//! fault handler, builds the codec registry and measurement-test group,
//! and publishes the resulting [`Engine`] as a process-wide singleton.
//!
//! This is the one fallible entry point in the whole crate (§7/ERROR
//! HANDLING DESIGN): every hook and every measurement test operation past
//! this point is infallible by construction, matching
//! `hooking-lib/src/call_guard.rs`'s and `user-agent/src/cleanup.rs`'s use
//! of a single lazily-initialized, process-wide container in place of the
//! original's static constructors.

use crate::compressor::CodecRegistry;
use crate::config::{self, Config};
use crate::hugepages::HugePageTable;
use crate::registry::Registry;
use crate::scheduler::Scheduler;
use crate::tests::{
    AccessPatternTest, CompressionGranularity, CompressionTest, GenerationalTest, GroupTest,
    LivenessTest, MeasurementTest, PageTrackingTest,
};
use crate::{access, oracle};
use flexi_logger::LoggerHandle;
use once_cell::sync::OnceCell;
use shared::errors::BootstrapError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub struct Engine {
    pub registry: Mutex<Registry>,
    pub hugepages: Mutex<HugePageTable>,
    pub tests: Mutex<GroupTest>,
    pub scheduler: Scheduler,
    pub codecs: CodecRegistry,
    pub config: Config,
    pub interval_number: AtomicU64,
    pub alloc_count: AtomicU64,
    pub free_count: AtomicU64,
    pub mmap_count: AtomicU64,
    pub munmap_count: AtomicU64,
    stats_timer: Mutex<crate::scheduler::Timer>,
    #[allow(dead_code)]
    logger: LoggerHandle,
}

impl Engine {
    pub fn output_dir(&self) -> &Path {
        Path::new(&self.config.output_dir)
    }

    /// Logs coarse hook counters on a cadence independent of the
    /// measurement interval, matching the original's STATS_INTERVAL_MS.
    /// Best-effort: a losing `try_lock` just skips this round.
    pub fn maybe_log_stats(&self) {
        let Ok(mut timer) = self.stats_timer.try_lock() else {
            return;
        };
        if timer.elapsed_ms() < shared::constants::STATS_INTERVAL_MS {
            return;
        }
        timer.reset();
        log::info!(
            "hooks: {} allocs, {} frees, {} mmaps, {} munmaps observed",
            self.alloc_count.load(Ordering::Relaxed),
            self.free_count.load(Ordering::Relaxed),
            self.mmap_count.load(Ordering::Relaxed),
            self.munmap_count.load(Ordering::Relaxed),
        );
    }
}

static ENGINE: OnceCell<Engine> = OnceCell::new();

pub fn engine() -> Option<&'static Engine> {
    ENGINE.get()
}

/// Idempotent bootstrap entry point. `config_path` overrides the usual
/// environment-variable/exe-relative resolution (see
/// [`config::find_config_file`]) — primarily useful for tests and for
/// allocators that want to pin a config path at link time.
pub fn init(config_path: Option<&Path>) -> Result<(), BootstrapError> {
    if ENGINE.get().is_some() {
        return Err(BootstrapError::AlreadyInitialized);
    }

    let path: PathBuf = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::find_config_file);
    let cfg = Config::load(&path)?;

    let logger = crate::logger::init_logger(&cfg.log_file)?;
    log::info!("heappulse bootstrap starting, interval={}ms", cfg.interval_ms);

    access::install_fault_handler().map_err(BootstrapError::SignalHandler)?;

    let codecs = CodecRegistry::from_names(&cfg.codecs);
    let default_codec = cfg.codecs.first().cloned().unwrap_or_else(|| "zstd".into());

    let mut tests = GroupTest::new();
    if cfg.tests.access_pattern {
        tests.add(Box::new(AccessPatternTest::default()));
    }
    if cfg.tests.generational {
        tests.add(Box::new(GenerationalTest::default()));
    }
    if cfg.tests.page_tracking {
        tests.add(Box::new(PageTrackingTest::default()));
    }
    if cfg.tests.object_liveness {
        tests.add(Box::new(LivenessTest::default()));
    }
    if cfg.tests.access_compression {
        tests.add(Box::new(CompressionTest::new(
            CompressionGranularity::Object,
            default_codec.clone(),
        )));
        tests.add(Box::new(CompressionTest::new(
            CompressionGranularity::Page,
            default_codec.clone(),
        )));
        tests.add(Box::new(CompressionTest::new(
            CompressionGranularity::HugePage,
            default_codec,
        )));
    }
    if tests.is_empty() {
        log::warn!("no measurement tests enabled; engine will only track allocations");
    }
    tests.setup(Path::new(&cfg.output_dir));

    let scheduler = Scheduler::new(cfg.interval_ms);
    let engine = Engine {
        registry: Mutex::new(Registry::new()),
        hugepages: Mutex::new(HugePageTable::new()),
        tests: Mutex::new(tests),
        scheduler,
        codecs,
        config: cfg,
        interval_number: AtomicU64::new(0),
        alloc_count: AtomicU64::new(0),
        free_count: AtomicU64::new(0),
        mmap_count: AtomicU64::new(0),
        munmap_count: AtomicU64::new(0),
        stats_timer: Mutex::new(crate::scheduler::Timer::new()),
        logger,
    };

    ENGINE
        .set(engine)
        .map_err(|_| BootstrapError::AlreadyInitialized)?;
    log::info!("heappulse bootstrap complete");
    Ok(())
}

/// Runs one full interval pass: ages every tracked record, drains the
/// fault set, re-arms page protection for the next interval, optionally
/// clears soft-dirty bits, and broadcasts to every enabled measurement
/// test. Always called from inside [`Scheduler::maybe_run_interval`], so
/// the hook mutex is already held and `is_in_interval` is already `true`.
pub fn run_interval(engine: &Engine) {
    let interval_number = engine.interval_number.fetch_add(1, Ordering::SeqCst);
    let _working = access::WorkingThreadGuard::acquire();

    let mut registry = engine.registry.lock().unwrap_or_else(|e| e.into_inner());
    let mut hugepages = engine.hugepages.lock().unwrap_or_else(|e| e.into_inner());

    registry.age_all();
    hugepages.age_all();

    let touched: std::collections::HashSet<usize> =
        access::drain_faulted_pages().into_iter().collect();

    // Dispatch on_access/on_read/on_write for every live record whose page
    // faulted since the last interval, classifying write-vs-read-only from
    // the page's dirty bit (Invariant I6) before re-protecting anything.
    {
        let mut tests = engine.tests.lock().unwrap_or_else(|e| e.into_inner());
        registry.snapshot_live_records(|record| {
            let page = record.base / shared::constants::PAGE_SIZE * shared::constants::PAGE_SIZE;
            if !touched.contains(&page) {
                return;
            }
            let infos: shared::containers::FixedVec<oracle::PageInfo, 1> =
                oracle::query(page, shared::constants::PAGE_SIZE);
            let is_write = infos.iter().next().map(|info| info.dirty).unwrap_or(true);
            tests.on_access(record.base, is_write);
            if is_write {
                tests.on_write(record.base);
            } else {
                tests.on_read(record.base);
            }
        });
    }

    registry.snapshot_live_records(|record| {
        access::protect_range(record.base, record.size);
    });

    if engine.config.clear_soft_dirty {
        oracle::clear_soft_dirty_bits();
    }

    let ctx = crate::tests::IntervalContext {
        interval_number,
        registry: &registry,
        hugepages: &hugepages,
        touched_pages: &touched,
        codecs: &engine.codecs,
    };

    let mut tests = engine.tests.lock().unwrap_or_else(|e| e.into_inner());
    tests.interval(&ctx);
}
