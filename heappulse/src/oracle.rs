//! Page-info oracle: `/proc/<pid>/pagemap` + `/proc/kpageflags` parsing, and
//! soft-dirty-bit clearing via `/proc/<pid>/clear_refs`.
//!
//! Grounded bit-for-bit on the kernel's pagemap/kpageflags formats as used
//! by the original tool: present = bit 63, soft-dirty = bit 55, file/shared
//! = bit 61, and the page frame number occupies the low 55 bits of the
//! pagemap entry; kpageflags' dirty = bit 4, zero-page = bit 24. Every
//! operation here is best-effort: a read failure yields a truncated result,
//! never a panic or a bubbled-up error, since a stalled hook is worse than
//! an incomplete report.

use once_cell::sync::OnceCell;
use shared::constants::PAGE_SIZE;
use shared::containers::FixedVec;
use std::fs::File;
use std::os::unix::io::AsRawFd;

bitflags::bitflags! {
    /// Subset of the kernel's kpageflags bits this oracle interprets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KPageFlags: u64 {
        const DIRTY     = 1 << 4;
        const ZERO_PAGE = 1 << 24;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub page_frame_number: u64,
    pub start_address: usize,
    pub end_address: usize,
    pub read: bool,
    pub write: bool,
    pub exec: bool,
    pub present: bool,
    pub is_zero_page: bool,
    pub dirty: bool,
    pub soft_dirty: bool,
    pub file_mapped: bool,
}

impl PageInfo {
    pub fn is_resident(&self) -> bool {
        self.present && !self.is_zero_page
    }
}

fn pagemap_path() -> String {
    format!("/proc/{}/pagemap", std::process::id())
}

fn clear_refs_path() -> String {
    format!("/proc/{}/clear_refs", std::process::id())
}

struct Fds {
    pagemap: Option<File>,
    kpageflags: Option<File>,
}

static FDS: OnceCell<Fds> = OnceCell::new();
static CLEAR_REFS: OnceCell<Option<File>> = OnceCell::new();

fn fds() -> &'static Fds {
    FDS.get_or_init(|| Fds {
        pagemap: File::open(pagemap_path()).ok(),
        kpageflags: File::open("/proc/kpageflags").ok(),
    })
}

fn pread_u64(file: &File, index: u64) -> Option<u64> {
    let mut buf = [0u8; 8];
    let n = unsafe {
        libc::pread(
            file.as_raw_fd(),
            buf.as_mut_ptr() as *mut libc::c_void,
            8,
            index as libc::off_t,
        )
    };
    if n != 8 {
        return None;
    }
    Some(u64::from_ne_bytes(buf))
}

/// Queries page residency/access info for `[base, base+len)`, aligning
/// outward to page boundaries. Truncates silently at `N` entries or on the
/// first I/O failure encountered mid-walk (matching the original's
/// `break`-on-`pread`-failure behavior).
pub fn query<const N: usize>(base: usize, len: usize) -> FixedVec<PageInfo, N> {
    let mut out = FixedVec::new();
    let fds = fds();
    let (Some(pagemap), Some(kpageflags)) = (&fds.pagemap, &fds.kpageflags) else {
        return out;
    };

    let aligned_base = base / PAGE_SIZE * PAGE_SIZE;
    let aligned_end = (base + len).div_ceil(PAGE_SIZE) * PAGE_SIZE;

    let mut addr = aligned_base;
    while addr < aligned_end {
        let index = (addr / PAGE_SIZE) as u64 * 8;
        let Some(data) = pread_u64(pagemap, index) else {
            break;
        };

        let present = data & (1 << 63) != 0;
        if !present {
            addr += PAGE_SIZE;
            continue;
        }
        let file_mapped = data & (1 << 61) != 0;
        if file_mapped {
            addr += PAGE_SIZE;
            continue;
        }

        let page_frame_number = data & 0x7FFF_FFFF_FFFF_FF;
        let soft_dirty = data & (1 << 55) != 0;
        let read = data & (1 << 2) != 0;
        let write = data & (1 << 4) != 0;
        let exec = data & (1 << 5) != 0;

        let Some(flags_raw) = pread_u64(kpageflags, page_frame_number * 8) else {
            break;
        };
        let flags = KPageFlags::from_bits_truncate(flags_raw);

        let info = PageInfo {
            page_frame_number,
            start_address: addr,
            end_address: addr + PAGE_SIZE,
            read,
            write,
            exec,
            present,
            is_zero_page: flags.contains(KPageFlags::ZERO_PAGE),
            dirty: flags.contains(KPageFlags::DIRTY),
            soft_dirty,
            file_mapped,
        };

        if out.push(info).is_err() {
            break;
        }
        addr += PAGE_SIZE;
    }

    out
}

/// Clears this process's soft-dirty bits via `/proc/<pid>/clear_refs`. A
/// no-op, logged at debug level, if the file can't be opened or written.
pub fn clear_soft_dirty_bits() {
    let slot = CLEAR_REFS.get_or_init(|| {
        std::fs::OpenOptions::new()
            .write(true)
            .open(clear_refs_path())
            .ok()
    });
    let Some(file) = slot else {
        log::debug!("clear_refs unavailable; skipping soft-dirty clear");
        return;
    };
    let written = unsafe {
        libc::write(file.as_raw_fd(), b"4".as_ptr() as *const libc::c_void, 1)
    };
    if written != 1 {
        log::debug!("write to clear_refs did not complete");
    }
}
