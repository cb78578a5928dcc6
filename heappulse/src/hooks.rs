//! Hook adapter: the `extern "C"` ABI an instrumented allocator calls into.
//!
//! Every entry point follows the same three-step discipline (§4.H): skip
//! immediately if an interval pass is already running on some thread
//! (`is_in_interval`), try (or, for frees, block) to take the hook mutex,
//! mutate the registry, then give the scheduler a chance to run an
//! interval. Return-address capture is a caller-supplied parameter rather
//! than a thread-local or a backtrace walk: the spec's hot-path contract
//! ("a single register read... is sufficient") is best satisfied in
//! portable, safe Rust by asking the instrumented allocator to pass its own
//! caller's return address through, the same way it already passes size
//! and pointer.

use crate::bootstrap::{self, run_interval, Engine};
use crate::tests::MeasurementTest;
use std::sync::atomic::Ordering;

fn with_engine(f: impl FnOnce(&Engine)) {
    if let Some(engine) = bootstrap::engine() {
        f(engine);
    }
}

/// Called after an allocator has returned a new live pointer.
#[unsafe(no_mangle)]
pub extern "C" fn heappulse_post_alloc(ptr: *mut u8, size: usize, return_address: u64) {
    with_engine(|engine| {
        engine.alloc_count.fetch_add(1, Ordering::Relaxed);
        if engine.scheduler.is_in_interval() {
            return;
        }
        let Some(_hook_guard) = engine.scheduler.try_enter_hook() else {
            return;
        };

        {
            let mut registry = engine.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.record_alloc(return_address, ptr as usize, size);
        }
        {
            let mut tests = engine.tests.lock().unwrap_or_else(|e| e.into_inner());
            tests.on_alloc(ptr as usize, size, return_address);
        }
        drop(_hook_guard);

        engine.maybe_log_stats();
        engine.scheduler.maybe_run_interval(|| run_interval(engine));
    });
}

/// Called before an allocator frees a live pointer.
///
/// Unlike `post_alloc`/`post_mmap`, this blocks on the hook mutex when the
/// address is known to be tracked: letting a free silently race past a
/// concurrent interval pass would leave a freed range's page-protection
/// dangling, which is worse than the mutator paying a brief, bounded wait.
#[unsafe(no_mangle)]
pub extern "C" fn heappulse_pre_free(ptr: *mut u8) {
    with_engine(|engine| {
        engine.free_count.fetch_add(1, Ordering::Relaxed);
        if engine.scheduler.is_in_interval() {
            return;
        }

        let addr = ptr as usize;
        let definitely_tracked = {
            let registry = engine.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.contains(addr)
        };

        let _hook_guard = if definitely_tracked {
            Some(engine.scheduler.enter_hook_blocking())
        } else {
            engine.scheduler.try_enter_hook()
        };
        let Some(_hook_guard) = _hook_guard else {
            return;
        };

        {
            let mut registry = engine.registry.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(record) = registry.record_free(addr) {
                crate::access::unprotect_range(record.base, record.size);
            }
        }
        {
            let mut tests = engine.tests.lock().unwrap_or_else(|e| e.into_inner());
            tests.on_free(addr);
        }
        drop(_hook_guard);

        engine.maybe_log_stats();
        engine.scheduler.maybe_run_interval(|| run_interval(engine));
    });
}

/// Called after a fresh `mmap`-backed region has been mapped. Tracked the
/// same way as a heap allocation; distinguished from `post_alloc` only
/// because some allocators source huge pages through a separate code path
/// that doesn't go through their small-object allocator at all.
#[unsafe(no_mangle)]
pub extern "C" fn heappulse_post_mmap(ptr: *mut u8, size: usize, return_address: u64) {
    with_engine(|engine| {
        engine.mmap_count.fetch_add(1, Ordering::Relaxed);
        if engine.scheduler.is_in_interval() {
            return;
        }
        let Some(_hook_guard) = engine.scheduler.try_enter_hook() else {
            return;
        };

        {
            let mut registry = engine.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.record_alloc(return_address, ptr as usize, size);
        }
        {
            let mut tests = engine.tests.lock().unwrap_or_else(|e| e.into_inner());
            tests.on_alloc(ptr as usize, size, return_address);
        }
        drop(_hook_guard);

        engine.maybe_log_stats();
        engine.scheduler.maybe_run_interval(|| run_interval(engine));
    });
}

/// Called before an `munmap`-backed region is unmapped. Blocking semantics
/// mirror `pre_free`.
#[unsafe(no_mangle)]
pub extern "C" fn heappulse_post_munmap(ptr: *mut u8) {
    with_engine(|engine| {
        engine.munmap_count.fetch_add(1, Ordering::Relaxed);
        if engine.scheduler.is_in_interval() {
            return;
        }

        let addr = ptr as usize;
        let definitely_tracked = {
            let registry = engine.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.contains(addr)
        };
        let _hook_guard = if definitely_tracked {
            Some(engine.scheduler.enter_hook_blocking())
        } else {
            engine.scheduler.try_enter_hook()
        };
        let Some(_hook_guard) = _hook_guard else {
            return;
        };

        {
            let mut registry = engine.registry.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(record) = registry.record_free(addr) {
                crate::access::unprotect_range(record.base, record.size);
            }
        }
        {
            let mut tests = engine.tests.lock().unwrap_or_else(|e| e.into_inner());
            tests.on_free(addr);
        }
        drop(_hook_guard);

        engine.scheduler.maybe_run_interval(|| run_interval(engine));
    });
}

/// Called after a new huge-page-backed block is carved out by the
/// allocator (the spec's external ABI names this `block_new`).
#[unsafe(no_mangle)]
pub extern "C" fn heappulse_block_new(ptr: *mut u8, size: usize) {
    with_engine(|engine| {
        if engine.scheduler.is_in_interval() {
            return;
        }
        let Some(_hook_guard) = engine.scheduler.try_enter_hook() else {
            return;
        };

        let interval_number = engine.interval_number.load(Ordering::Relaxed);
        {
            let mut hugepages = engine.hugepages.lock().unwrap_or_else(|e| e.into_inner());
            hugepages.record_new(ptr as usize, size, interval_number);
        }
        {
            let mut tests = engine.tests.lock().unwrap_or_else(|e| e.into_inner());
            tests.on_huge_page_alloc(ptr as usize, size);
        }
    });
}

/// Called before a huge-page-backed block is released (spec's `block_release`).
#[unsafe(no_mangle)]
pub extern "C" fn heappulse_block_release(ptr: *mut u8) {
    with_engine(|engine| {
        if engine.scheduler.is_in_interval() {
            return;
        }
        let _hook_guard = engine.scheduler.enter_hook_blocking();

        {
            let mut hugepages = engine.hugepages.lock().unwrap_or_else(|e| e.into_inner());
            hugepages.record_release(ptr as usize);
        }
        {
            let mut tests = engine.tests.lock().unwrap_or_else(|e| e.into_inner());
            tests.on_huge_page_free(ptr as usize);
        }
    });
}
