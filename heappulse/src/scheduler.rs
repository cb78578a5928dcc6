//! Interval scheduler: decides when a measurement interval should run and
//! enforces the strict lock ordering `schedule -> hook -> registry`.
//!
//! State machine `Idle -> Pending -> Running -> Idle`, grounded on
//! `IntervalTestSuite::schedule`/`heart_beat`/`interval` in
//! `examples/original_source/src/include/interval_test.hpp`: any hook may
//! attempt the `Idle -> Pending` transition via a non-blocking try-lock; the
//! thread that wins runs the full interval synchronously and returns the
//! state to `Idle`. No interval work happens on a dedicated thread — it
//! always runs inline on whichever mutator thread's hook call noticed the
//! period had elapsed (see `SYSTEM OVERVIEW`/"no thread is spawned").

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Idle = 0,
    Pending = 1,
    Running = 2,
}

impl State {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => State::Idle,
            1 => State::Pending,
            _ => State::Running,
        }
    }
}

/// A simple elapsed-time timer, grounded on
/// `examples/original_source/src/include/timer.hpp`.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn reset(&mut self) {
        self.start = Instant::now();
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Scheduler {
    state: AtomicU8,
    period_ms: AtomicU64,
    /// Guards the `Idle -> Pending` transition; held for the duration of a
    /// full interval pass by whichever thread wins it.
    schedule_mutex: Mutex<()>,
    /// Guards registry mutation from hook entry points; also held by the
    /// interval pass itself while it mutates the registry, per the
    /// `schedule -> hook -> registry` ordering.
    hook_mutex: Mutex<()>,
    /// Reentrancy guard: sampled by every hook *before* attempting the hook
    /// lock, so a hook invoked synchronously from within an interval pass
    /// (e.g. a measurement test's own allocation) never recurses into the
    /// scheduler.
    is_in_interval: AtomicBool,
    timer: Mutex<Timer>,
}

impl Scheduler {
    pub fn new(period_ms: u64) -> Self {
        Self {
            state: AtomicU8::new(State::Idle as u8),
            period_ms: AtomicU64::new(period_ms),
            schedule_mutex: Mutex::new(()),
            hook_mutex: Mutex::new(()),
            is_in_interval: AtomicBool::new(false),
            timer: Mutex::new(Timer::new()),
        }
    }

    pub fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_in_interval(&self) -> bool {
        self.is_in_interval.load(Ordering::Acquire)
    }

    /// Non-blocking attempt to take the hook mutex. Hook entry points call
    /// this after checking [`Scheduler::is_in_interval`]; on contention they
    /// skip their registry update for this call rather than blocking the
    /// mutator, except for the free/`munmap` path, which blocks when the
    /// address is known-tracked (see `hooks.rs`).
    pub fn try_enter_hook(&self) -> Option<MutexGuard<'_, ()>> {
        self.hook_mutex.try_lock().ok()
    }

    pub fn enter_hook_blocking(&self) -> MutexGuard<'_, ()> {
        self.hook_mutex.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Called by every hook after releasing its hook-mutex guard. Checks
    /// whether the configured period has elapsed and, if so, tries to
    /// transition `Idle -> Pending`; on success runs the interval via
    /// `run` and returns to `Idle`. A losing thread (lock contention, or
    /// the period hasn't elapsed) returns immediately.
    pub fn maybe_run_interval(&self, run: impl FnOnce()) {
        let elapsed = {
            let timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
            timer.elapsed_ms()
        };
        if elapsed < self.period_ms.load(Ordering::Relaxed) {
            return;
        }

        let Ok(_schedule_guard) = self.schedule_mutex.try_lock() else {
            return;
        };
        self.state.store(State::Pending as u8, Ordering::Release);

        let _hook_guard = self.enter_hook_blocking();
        self.state.store(State::Running as u8, Ordering::Release);
        self.is_in_interval.store(true, Ordering::Release);

        run();

        {
            let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
            timer.reset();
        }
        self.is_in_interval.store(false, Ordering::Release);
        self.state.store(State::Idle as u8, Ordering::Release);
    }
}
