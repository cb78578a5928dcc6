//! The allocation-tracking registry: a two-level map of allocation site
//! (return address) to live allocation records at that site.
//!
//! Grounded on the original's `AllocationSite`/`IntervalTestSuite` bookkeeping:
//! capacity is bounded at both levels, a full per-site map drops the new
//! allocation, a full top-level site map drops the entire new site, and
//! neither ever evicts an existing entry to make room. Freeing and
//! "contains" scan every tracked site rather than keeping a reverse index
//! from address to site, trading O(sites) lookups for zero extra
//! bookkeeping on the allocation hot path.

use shared::constants::{TRACKED_ALLOCATIONS_PER_SITE, TRACKED_ALLOCATION_SITES};
use shared::containers::FixedMap;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct AllocationRecord {
    pub base: usize,
    pub size: usize,
    pub age: u32,
    pub born_at: Instant,
    pub site: u64,
}

/// Buckets a record's age, in intervals, into the four-level
/// classification reports use to group objects: `new` at birth, `young`
/// for the next four intervals, `middle` for the five after that, `old`
/// from ten intervals on.
pub fn age_class(age: u32) -> &'static str {
    match age {
        0 => "new",
        1..=4 => "young",
        5..=9 => "middle",
        _ => "old",
    }
}

pub struct AllocationSite {
    pub return_address: u64,
    pub allocations: FixedMap<usize, AllocationRecord, TRACKED_ALLOCATIONS_PER_SITE>,
}

impl AllocationSite {
    fn new(return_address: u64) -> Self {
        Self {
            return_address,
            allocations: FixedMap::new(),
        }
    }
}

/// Two-level site -> allocation map. Each [`AllocationSite`] is boxed: at
/// `TRACKED_ALLOCATIONS_PER_SITE` slots, one inline would make every one of
/// the top-level table's `TRACKED_ALLOCATION_SITES` slots as large as the
/// whole per-site table, rather than a pointer's width — boxing is what
/// keeps a `Registry` value itself small enough to construct on a thread's
/// stack without risking overflow in the process this crate instruments.
#[derive(Default)]
pub struct Registry {
    sites: FixedMap<u64, Box<AllocationSite>, TRACKED_ALLOCATION_SITES>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new live allocation at `site`. A zero-size allocation is
    /// accepted (the hook still fires and counters still advance) but is
    /// never entered into the registry — there is nothing to age, report on,
    /// or compress. Drops the allocation silently if its site's per-site
    /// capacity is full, and drops it if a *new* site would be needed but
    /// the top-level site table is full. Never evicts an existing record or
    /// site to make room.
    pub fn record_alloc(&mut self, site: u64, base: usize, size: usize) {
        if size == 0 {
            return;
        }

        if let Some(existing) = self.sites.get_mut(&site) {
            let record = AllocationRecord {
                base,
                size,
                age: 0,
                born_at: Instant::now(),
                site,
            };
            if !existing.allocations.put(base, record) {
                log::trace!("registry: site {site:#x} full, dropping allocation {base:#x}");
            }
            return;
        }

        if self.sites.is_full() {
            log::trace!("registry: site table full, dropping new site {site:#x}");
            return;
        }

        let mut new_site = Box::new(AllocationSite::new(site));
        new_site.allocations.put(
            base,
            AllocationRecord {
                base,
                size,
                age: 0,
                born_at: Instant::now(),
                site,
            },
        );
        self.sites.put(site, new_site);
    }

    /// Removes the allocation at `base`, scanning every tracked site since
    /// there is no reverse index. Returns the removed record, if any.
    pub fn record_free(&mut self, base: usize) -> Option<AllocationRecord> {
        for (_, site) in self.sites.iter_mut() {
            if let Some(record) = site.allocations.remove(&base) {
                return Some(record);
            }
        }
        None
    }

    pub fn contains(&self, base: usize) -> bool {
        self.sites
            .iter()
            .any(|(_, site)| site.allocations.contains_key(&base))
    }

    /// Increments `age` on every live record by one. Called once per
    /// interval.
    pub fn age_all(&mut self) {
        for (_, site) in self.sites.iter_mut() {
            for (_, record) in site.allocations.iter_mut() {
                record.age += 1;
            }
        }
    }

    /// Calls `visitor` once per live record. Used by measurement tests to
    /// take a read-only snapshot without cloning the whole registry.
    pub fn snapshot_live_records(&self, mut visitor: impl FnMut(&AllocationRecord)) {
        for (_, site) in self.sites.iter() {
            for (_, record) in site.allocations.iter() {
                visitor(record);
            }
        }
    }

    /// Records whose `[base, base+size)` overlaps `[range_start, range_end)`
    /// — a read-only derived view used by the huge-page containment checks,
    /// never stored directly (invariant I4).
    pub fn records_within(&self, range_start: usize, range_end: usize) -> Vec<AllocationRecord> {
        let mut out = Vec::new();
        self.snapshot_live_records(|record| {
            let record_end = record.base + record.size;
            if record.base < range_end && record_end > range_start {
                out.push(record.clone());
            }
        });
        out
    }

    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    pub fn live_count(&self) -> usize {
        self.sites
            .iter()
            .map(|(_, site)| site.allocations.len())
            .sum()
    }
}
