/// Process memory statistics for the `memstats` sampler.
///
/// Heap figures come from [`TrackingAllocator`], which must be installed as the
/// `#[global_allocator]`. Resident size is read from procfs when available.
use crate::sampler::Probe;
use std::alloc::{GlobalAlloc, Layout, System};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const BYTES_PER_MIB: u64 = 1024 * 1024;

static LIVE_BYTES: AtomicU64 = AtomicU64::new(0);
static TOTAL_BYTES: AtomicU64 = AtomicU64::new(0);
static PEAK_BYTES: AtomicU64 = AtomicU64::new(0);

/// System allocator wrapper that counts live and cumulative heap bytes.
pub struct TrackingAllocator;

unsafe impl GlobalAlloc for TrackingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc_zeroed(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        record_free(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = System.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            record_free(layout.size());
            record_alloc(new_size);
        }
        new_ptr
    }
}

fn record_alloc(size: usize) {
    let size = size as u64;
    TOTAL_BYTES.fetch_add(size, Ordering::Relaxed);
    let live = LIVE_BYTES.fetch_add(size, Ordering::Relaxed) + size;
    PEAK_BYTES.fetch_max(live, Ordering::Relaxed);
}

fn record_free(size: usize) {
    LIVE_BYTES.fetch_sub(size as u64, Ordering::Relaxed);
}

/// Truncating conversion, 1 MiB = 1024 * 1024 bytes.
pub fn bytes_to_mib(bytes: u64) -> u64 {
    bytes / BYTES_PER_MIB
}

/// One snapshot of process memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemStats {
    /// Heap bytes allocated and not yet freed.
    pub alloc_bytes: u64,
    /// Heap bytes allocated over the process lifetime. Never decreases.
    pub total_alloc_bytes: u64,
    /// Memory obtained from the OS (resident set size).
    pub sys_bytes: u64,
    /// Completed garbage-collection cycles. Rust has no collector, so always 0.
    pub num_gc: u32,
}

impl MemStats {
    pub fn read() -> Self {
        let sys_bytes =
            read_resident_bytes().unwrap_or_else(|| PEAK_BYTES.load(Ordering::Relaxed));
        Self {
            alloc_bytes: LIVE_BYTES.load(Ordering::Relaxed),
            total_alloc_bytes: TOTAL_BYTES.load(Ordering::Relaxed),
            sys_bytes,
            num_gc: 0,
        }
    }
}

impl fmt::Display for MemStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Alloc = {} MiB\tTotalAlloc = {} MiB\tSys = {} MiB\tNumGC = {}",
            bytes_to_mib(self.alloc_bytes),
            bytes_to_mib(self.total_alloc_bytes),
            bytes_to_mib(self.sys_bytes),
            self.num_gc
        )
    }
}

fn read_resident_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

/// Extract `VmRSS` (reported in kB) from a `/proc/<pid>/status` body, in bytes.
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: u64 = line
        .trim_start_matches("VmRSS:")
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    Some(kb * 1024)
}

/// Samples [`MemStats`] on every tick.
#[derive(Debug, Default)]
pub struct MemoryProbe;

impl Probe for MemoryProbe {
    type Sample = MemStats;

    fn sample(&mut self) -> MemStats {
        MemStats::read()
    }
}

/// One-time line printed before sampling starts.
pub fn startup_notice(interval_secs: u64) -> String {
    format!("Getting memory stats each {interval_secs} seconds...")
}
