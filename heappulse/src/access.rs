//! Access-detection subsystem: page-protection based fault tracking.
//!
//! Grounded on `examples/original_source/src/include/interval_test.hpp`'s
//! `protection_handler`/`Allocation::protect`/`Allocation::unprotect`: a
//! page is made inaccessible (`PROT_NONE`) at the start of an interval; the
//! first touch afterward raises `SIGSEGV`, and the handler records the
//! faulting page and immediately restores `PROT_READ|PROT_WRITE|PROT_EXEC`
//! so the mutator is never blocked waiting on the interval pass. The
//! handler itself never allocates and never takes the registry mutex
//! (invariant per spec "H1: async-signal-safe"), so the fault set below is
//! a lock-free fixed array rather than the `Mutex`-guarded containers used
//! everywhere else in this crate.
//!
//! Three mutually exclusive build-time modes mirror the original's
//! `#ifdef`-selected protection strategy: `mprotect` (default, portable),
//! `pkey` (x86 protection keys, lower overhead, narrower availability), and
//! `disabled` (soft-dirty bits only, no page-protection at all — for
//! environments where `mprotect`-per-interval is too expensive to tolerate).

use shared::constants::{MAX_TRACKED_ACCESSES, PAGE_SIZE};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;

const EMPTY: usize = 0;

/// A lock-free, fixed-capacity set of page addresses, written to from
/// signal-handler context and drained only by the interval pass.
///
/// Address `0` is reserved as the "empty slot" sentinel; a real fault can
/// never occur at the null page on a normally configured process.
struct FaultSet {
    slots: Box<[AtomicUsize]>,
}

impl FaultSet {
    fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| AtomicUsize::new(EMPTY)).collect(),
        }
    }

    /// Async-signal-safe insert: linear probe with CAS, silently drops the
    /// address if the set is full or already contains it.
    fn insert(&self, addr: usize) {
        let n = self.slots.len();
        let start = (addr / PAGE_SIZE) % n;
        for offset in 0..n {
            let idx = (start + offset) % n;
            let slot = &self.slots[idx];
            match slot.compare_exchange(EMPTY, addr, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return,
                Err(existing) if existing == addr => return,
                Err(_) => continue,
            }
        }
    }

    /// Drains every recorded address, resetting the set to empty. Intended
    /// to be called only while holding the registry lock during an
    /// interval pass, never concurrently with itself.
    fn drain(&self) -> Vec<usize> {
        let mut out = Vec::new();
        for slot in self.slots.iter() {
            let addr = slot.swap(EMPTY, Ordering::SeqCst);
            if addr != EMPTY {
                out.push(addr);
            }
        }
        out
    }
}

static FAULT_SET: OnceLock<FaultSet> = OnceLock::new();

fn fault_set() -> &'static FaultSet {
    FAULT_SET.get_or_init(|| FaultSet::new(MAX_TRACKED_ACCESSES))
}

/// OS thread id of the thread currently running an interval pass, or `0`
/// if none. The fault handler does not consult this (every fault is
/// restored unconditionally, per the original's design), but the scheduler
/// uses it to decide whether the *current* thread is the one doing interval
/// work, to avoid a thread re-entering its own interval via a hook fired
/// from inside the pass.
static WORKING_THREAD: AtomicU64 = AtomicU64::new(0);

fn current_thread_id() -> u64 {
    unsafe { libc::pthread_self() as u64 }
}

pub fn is_working_thread() -> bool {
    WORKING_THREAD.load(Ordering::Acquire) == current_thread_id()
}

/// RAII marker: held by the interval scheduler for the duration of a pass.
pub struct WorkingThreadGuard;

impl WorkingThreadGuard {
    pub fn acquire() -> Self {
        WORKING_THREAD.store(current_thread_id(), Ordering::Release);
        Self
    }
}

impl Drop for WorkingThreadGuard {
    fn drop(&mut self) {
        WORKING_THREAD.store(0, Ordering::Release);
    }
}

extern "C" fn protection_handler(
    _signum: libc::c_int,
    info: *mut libc::siginfo_t,
    _ucontext: *mut libc::c_void,
) {
    let fault_addr = unsafe { (*info).si_addr() as usize };
    let page = fault_addr / PAGE_SIZE * PAGE_SIZE;
    fault_set().insert(page);
    unsafe {
        libc::mprotect(
            page as *mut libc::c_void,
            PAGE_SIZE,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
        );
    }
}

/// Installs the `SIGSEGV` handler with its own alternate signal stack, so a
/// fault that occurs with a nearly-exhausted stack can still be serviced.
/// Idempotent-by-caller: intended to be invoked exactly once, from
/// [`crate::bootstrap::init`].
pub fn install_fault_handler() -> Result<(), String> {
    if cfg!(feature = "disabled") {
        return Ok(());
    }

    unsafe {
        let stack_size = libc::SIGSTKSZ.max(32 * 1024);
        let stack_ptr = libc::malloc(stack_size);
        if stack_ptr.is_null() {
            return Err("failed to allocate signal alt-stack".into());
        }
        let stack = libc::stack_t {
            ss_sp: stack_ptr,
            ss_flags: 0,
            ss_size: stack_size,
        };
        if libc::sigaltstack(&stack, std::ptr::null_mut()) != 0 {
            return Err("sigaltstack failed".into());
        }

        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = protection_handler as usize;
        action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
        libc::sigemptyset(&mut action.sa_mask);

        if libc::sigaction(libc::SIGSEGV, &action, std::ptr::null_mut()) != 0 {
            return Err("sigaction failed".into());
        }
    }
    Ok(())
}

fn align_down(addr: usize) -> usize {
    addr / PAGE_SIZE * PAGE_SIZE
}

fn align_up(len: usize) -> usize {
    len.div_ceil(PAGE_SIZE) * PAGE_SIZE
}

/// Makes `[base, base+len)` inaccessible so the next touch raises a fault
/// the access-detection subsystem can observe. A failing `mprotect` call is
/// logged and that range is simply left unprotected for this interval
/// (never a panic).
#[cfg(any(feature = "mprotect", feature = "pkey"))]
pub fn protect_range(base: usize, len: usize) {
    let aligned_base = align_down(base);
    let aligned_len = align_up(base - aligned_base + len);
    let rc = unsafe {
        libc::mprotect(
            aligned_base as *mut libc::c_void,
            aligned_len,
            libc::PROT_NONE,
        )
    };
    if rc != 0 {
        log::debug!("mprotect(PROT_NONE) failed for {aligned_base:#x}+{aligned_len:#x}");
    }
}

#[cfg(feature = "disabled")]
pub fn protect_range(_base: usize, _len: usize) {}

/// Restores full access to `[base, base+len)` without waiting for a fault.
/// Used when cleaning up a protected range whose allocation was freed
/// before it was ever touched.
#[cfg(any(feature = "mprotect", feature = "pkey"))]
pub fn unprotect_range(base: usize, len: usize) {
    let aligned_base = align_down(base);
    let aligned_len = align_up(base - aligned_base + len);
    unsafe {
        libc::mprotect(
            aligned_base as *mut libc::c_void,
            aligned_len,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
        );
    }
}

#[cfg(feature = "disabled")]
pub fn unprotect_range(_base: usize, _len: usize) {}

/// Takes every page address recorded by the fault handler since the last
/// call, resetting the set. Intended to be called once per interval, under
/// the registry lock.
pub fn drain_faulted_pages() -> Vec<usize> {
    fault_set().drain()
}
