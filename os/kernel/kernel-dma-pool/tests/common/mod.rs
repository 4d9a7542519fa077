#![allow(dead_code, clippy::cast_possible_truncation)]

use kernel_dma_pool::{
    AllocFlags, BackingError, BackingStore, BusAddress, PAGE_SIZE, SegmentGrant, SyncOps,
};
use log::{LevelFilter, Log, Metadata, Record};
use std::alloc::{Layout, alloc, dealloc};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex, Once};
use std::time::Duration;

/// Byte pattern freshly imported segments are filled with.
pub const POISON: u8 = 0xA5;

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= LevelFilter::Debug
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

pub fn init_logging() {
    static INIT: Once = Once::new();
    static LOGGER: StderrLogger = StderrLogger;
    INIT.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Debug);
        }
    });
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SyncCall {
    pub segment: BusAddress,
    pub offset: u64,
    pub len: u64,
    pub ops: SyncOps,
}

/// Everything a test wants to know about what the pool asked of its store.
#[derive(Default)]
pub struct StoreStats {
    pub allocs: AtomicUsize,
    pub failed_allocs: AtomicUsize,
    pub releases: AtomicUsize,
    pub granted: Mutex<Vec<BusAddress>>,
    pub released: Mutex<Vec<BusAddress>>,
    pub requests: Mutex<Vec<(u64, AllocFlags)>>,
    pub syncs: Mutex<Vec<SyncCall>>,
}

impl StoreStats {
    pub fn allocs(&self) -> usize {
        self.allocs.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

pub struct HeapToken {
    bus: BusAddress,
    ptr: NonNull<u8>,
    layout: Layout,
}

// Safety: the token only carries the allocation for `dealloc`.
unsafe impl Send for HeapToken {}
unsafe impl Sync for HeapToken {}

/// Backing store carving segments out of the process heap and inventing bus
/// addresses for them.
pub struct HeapStore {
    next_bus: AtomicU64,
    /// Extra bus space left between consecutive segments.
    gap: u64,
    granularity: u64,
    /// Number of segments that may be granted before failing with OOM.
    limit: usize,
    /// Fail every `NOWAIT` request, as if memory were only available after
    /// waiting.
    needs_wait: bool,
    delay: Option<Duration>,
    /// Every grant waits here first, so concurrent growers overlap.
    rendezvous: Option<Arc<Barrier>>,
    stats: Arc<StoreStats>,
}

impl HeapStore {
    pub fn new(bus_base: u64) -> Self {
        Self {
            next_bus: AtomicU64::new(bus_base),
            gap: PAGE_SIZE,
            granularity: PAGE_SIZE,
            limit: usize::MAX,
            needs_wait: false,
            delay: None,
            rendezvous: None,
            stats: Arc::default(),
        }
    }

    /// Segments follow each other on the bus without a gap.
    pub fn adjacent(mut self) -> Self {
        self.gap = 0;
        self
    }

    pub fn with_granularity(mut self, granularity: u64) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn needing_wait(mut self) -> Self {
        self.needs_wait = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_rendezvous(mut self, barrier: Arc<Barrier>) -> Self {
        self.rendezvous = Some(barrier);
        self
    }

    pub fn stats(&self) -> Arc<StoreStats> {
        Arc::clone(&self.stats)
    }

    fn fail(&self, err: BackingError) -> Result<SegmentGrant<HeapToken>, BackingError> {
        self.stats.failed_allocs.fetch_add(1, Ordering::SeqCst);
        Err(err)
    }
}

unsafe impl BackingStore for HeapStore {
    type Token = HeapToken;

    fn granularity(&self) -> u64 {
        self.granularity
    }

    fn alloc_segment(
        &self,
        min_size: u64,
        flags: AllocFlags,
    ) -> Result<SegmentGrant<HeapToken>, BackingError> {
        self.stats.requests.lock().unwrap().push((min_size, flags));
        if self.needs_wait && !flags.may_block() {
            return self.fail(BackingError::WouldBlock);
        }
        if self.stats.allocs() >= self.limit {
            return self.fail(BackingError::OutOfMemory);
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(barrier) = &self.rendezvous {
            barrier.wait();
        }

        let len = min_size.div_ceil(self.granularity) * self.granularity;
        let layout = Layout::from_size_align(len as usize, self.granularity as usize).unwrap();
        let ptr = NonNull::new(unsafe { alloc(layout) }).ok_or(BackingError::OutOfMemory)?;
        unsafe { ptr.as_ptr().write_bytes(POISON, layout.size()) };

        let bus = BusAddress::new(self.next_bus.fetch_add(len + self.gap, Ordering::SeqCst));
        self.stats.allocs.fetch_add(1, Ordering::SeqCst);
        self.stats.granted.lock().unwrap().push(bus);

        Ok(SegmentGrant {
            bus,
            len,
            local: ptr,
            token: HeapToken { bus, ptr, layout },
        })
    }

    fn release_segment(&self, token: HeapToken) {
        unsafe { dealloc(token.ptr.as_ptr(), token.layout) };
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
        self.stats.released.lock().unwrap().push(token.bus);
    }

    fn sync_segment(&self, token: &HeapToken, offset: u64, len: u64, ops: SyncOps) {
        assert!(offset + len <= token.layout.size() as u64);
        self.stats.syncs.lock().unwrap().push(SyncCall {
            segment: token.bus,
            offset,
            len,
            ops,
        });
    }
}

/// Reads `len` bytes at `ptr`.
pub fn bytes(ptr: NonNull<u8>, len: u64) -> Vec<u8> {
    unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len as usize) }.to_vec()
}

/// Fills `len` bytes at `ptr` with `value`.
pub fn fill(ptr: NonNull<u8>, len: u64, value: u8) {
    unsafe { ptr.as_ptr().write_bytes(value, len as usize) };
}
