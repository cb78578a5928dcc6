//! Tracking for huge-page (>=2 MiB) blocks, reported on separately from
//! individual object allocations via `block_new`/`block_release` hooks.
//!
//! Mirrors the shape of [`crate::registry::Registry`] but keyed directly by
//! block base address (there is no "site" concept for huge pages — the
//! original groups these purely by address and age). See invariant I4 in
//! the data model: containment of ordinary allocations within a huge page
//! is always derived from [`crate::registry::Registry::records_within`],
//! never duplicated here.

use shared::constants::TRACKED_HUGE_PAGES;
use shared::containers::FixedMap;

#[derive(Debug, Clone)]
pub struct HugePageRecord {
    pub base: usize,
    pub size: usize,
    pub age: u32,
    pub first_seen_interval: u64,
}

#[derive(Default)]
pub struct HugePageTable {
    blocks: FixedMap<usize, HugePageRecord, TRACKED_HUGE_PAGES>,
}

impl HugePageTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_new(&mut self, base: usize, size: usize, interval: u64) {
        let record = HugePageRecord {
            base,
            size,
            age: 0,
            first_seen_interval: interval,
        };
        if !self.blocks.put(base, record) {
            log::trace!("huge page table full, dropping block {base:#x}");
        }
    }

    pub fn record_release(&mut self, base: usize) -> Option<HugePageRecord> {
        self.blocks.remove(&base)
    }

    pub fn contains(&self, base: usize) -> bool {
        self.blocks.contains_key(&base)
    }

    pub fn age_all(&mut self) {
        for (_, block) in self.blocks.iter_mut() {
            block.age += 1;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &HugePageRecord> {
        self.blocks.values()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
