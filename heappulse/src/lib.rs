//! HeapPulse: in-process heap-instrumentation research framework.
//!
//! Linked into an instrumented allocator as a shared object, this crate
//! tracks live allocations through a small set of `extern "C"` hooks
//! (`hooks.rs`), periodically characterizes them along access, age, and
//! compressibility axes (`tests/`), and appends the results to CSV reports
//! under the configured output directory. See `bootstrap::init` for the
//! single fallible entry point; everything past it runs inline on whatever
//! thread the instrumented program happens to call a hook from (no thread
//! is spawned by this crate).

pub mod access;
pub mod bootstrap;
pub mod compressor;
pub mod config;
pub mod hooks;
pub mod hugepages;
pub mod logger;
pub mod oracle;
pub mod registry;
pub mod scheduler;
pub mod tests;

/// Called once by the instrumented allocator at process start, before any
/// other hook fires. `config_path`, if non-null, overrides the usual
/// environment/exe-relative config resolution.
///
/// # Safety
/// `config_path`, if non-null, must point at a valid, NUL-terminated C
/// string for the duration of this call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn heappulse_init(config_path: *const std::os::raw::c_char) -> i32 {
    let path = if config_path.is_null() {
        None
    } else {
        unsafe { std::ffi::CStr::from_ptr(config_path) }
            .to_str()
            .ok()
            .map(std::path::PathBuf::from)
    };

    match bootstrap::init(path.as_deref()) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("heappulse: bootstrap failed: {err}");
            1
        }
    }
}

/// Called once by the instrumented allocator at process exit, so buffered
/// report rows are flushed even if the last interval's table wasn't full.
#[unsafe(no_mangle)]
pub extern "C" fn heappulse_shutdown() {
    if let Some(engine) = bootstrap::engine() {
        let mut tests = engine.tests.lock().unwrap_or_else(|e| e.into_inner());
        tests.cleanup();
    }
}
