//! Capacities and file names shared between the engine and its reports.

/// Architectural page size assumed by the page-info oracle. HeapPulse targets
/// x86-64/arm64 Linux, both of which use 4 KiB base pages.
pub const PAGE_SIZE: usize = 4096;

/// Lower bound on what counts as a "huge page" for the huge-page tracking path.
pub const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// Maximum number of distinct allocation sites (return addresses) tracked at once.
pub const TRACKED_ALLOCATION_SITES: usize = 1000;

/// Maximum number of live allocations tracked per site.
pub const TRACKED_ALLOCATIONS_PER_SITE: usize = 1000;

/// Maximum number of distinct pages the access-detection subsystem can hold
/// as "faulted this interval" before new faults are silently dropped.
pub const MAX_TRACKED_ACCESSES: usize = 100_000;

/// Maximum number of live huge-page blocks tracked at once.
pub const TRACKED_HUGE_PAGES: usize = 4096;

/// Upper bound on rows buffered in memory before a CSV table must be flushed.
pub const CSV_TABLE_ROWS: usize = 256;

/// Default interval period, matching the original tool's INTERVAL_CONFIG default.
pub const DEFAULT_INTERVAL_MS: u64 = 1000;

/// Cadence, independent of the measurement interval, at which coarse hook
/// counters (allocs/frees/mmaps/munmaps observed) are logged. Carried over
/// from the original implementation's STATS_INTERVAL_MS.
pub const STATS_INTERVAL_MS: u64 = 5000;

pub const REPORT_ACCESS_PATTERNS: &str = "access-patterns.csv";
pub const REPORT_ACCESS_COMPRESSION_OBJECT: &str = "access-compression-object.csv";
pub const REPORT_ACCESS_COMPRESSION_PAGE: &str = "access-compression-page.csv";
pub const REPORT_HUGE_PAGE_COMPRESSION: &str = "huge-page-compression.csv";
pub const REPORT_GENERATIONAL: &str = "generational.csv";
pub const REPORT_PAGE_TRACKING: &str = "page-tracking.csv";
pub const REPORT_OBJECT_LIVENESS: &str = "object-liveness.csv";
