//! # DMA pool
//!
//! Glue between the [arena](crate::arena), the [segment index](crate::segment)
//! and the [backing store](crate::BackingStore).
//!
//! ## Locking
//! One spin lock guards both the arena and the segment index. It is never held
//! across a call into the backing store: importing a segment may sleep, and
//! holding the lock meanwhile would stall every `free` and `synchronize` on the
//! pool behind it. Growth therefore runs as
//!
//! ```text
//!   lock ─► reserve? ──yes──────────────────────────────► translate ─► unlock
//!              │ no
//!           unlock ─► store.alloc_segment() ─► lock ─► index + span ─► reserve?
//! ```
//!
//! Two threads growing at the same time simply both import a segment.

use crate::arena::AddressSpaceArena;
use crate::segment::{Segment, SegmentIndex};
use crate::sync::SpinLock;
use crate::{
    AllocError, AllocFlags, BackingStore, BusAddress, BusRange, PoolConfig, PoolConfigError,
    SyncOps,
};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::ptr::NonNull;
use log::{debug, trace, warn};

/// A block handed out by [`DmaPool::allocate`].
///
/// `ptr` is the CPU's view of the block, `handle` the device's. The handle is
/// what identifies the block to [`DmaPool::free`] and [`DmaPool::synchronize`].
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct DmaBlock {
    ptr: NonNull<u8>,
    handle: BusAddress,
}

// Safety: a block is exclusively owned by whoever allocated it.
unsafe impl Send for DmaBlock {}

impl DmaBlock {
    /// Local pointer to the first byte of the block.
    #[inline]
    #[must_use]
    pub const fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Bus address of the first byte of the block.
    #[inline]
    #[must_use]
    pub const fn handle(&self) -> BusAddress {
        self.handle
    }
}

impl fmt::Debug for DmaBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmaBlock")
            .field("ptr", &self.ptr)
            .field("handle", &self.handle)
            .finish()
    }
}

struct PoolState<T> {
    arena: AddressSpaceArena,
    segments: SegmentIndex<T>,
}

/// Fixed-size block allocator over bus-addressable memory.
///
/// See the [crate documentation](crate) for an overview.
pub struct DmaPool<B: BackingStore> {
    name: String,
    config: PoolConfig,
    store: B,
    state: SpinLock<PoolState<B::Token>>,
}

impl<B: BackingStore> DmaPool<B> {
    /// Create an empty pool. No memory is imported until the first
    /// allocation.
    ///
    /// # Errors
    /// If `config` fails [`PoolConfig::validate`].
    pub fn create(
        name: impl Into<String>,
        store: B,
        config: PoolConfig,
    ) -> Result<Self, PoolConfigError> {
        config.validate()?;
        let name = name.into();
        debug!(
            "dma pool {name}: created (block {:#x}, align {:#x}, boundary {:#x})",
            config.block_size, config.align, config.boundary
        );
        Ok(Self {
            name,
            config,
            store,
            state: SpinLock::new(PoolState {
                arena: AddressSpaceArena::new(),
                segments: SegmentIndex::new(),
            }),
        })
    }

    /// Release all backing segments and the pool itself.
    ///
    /// Blocks still allocated at this point dangle; this is not detected
    /// beyond a warning.
    pub fn destroy(self) {
        debug!("dma pool {}: destroying", self.name);
        drop(self);
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &B {
        &self.store
    }

    /// Number of segments imported so far.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.state.with_lock(|state| state.segments.len())
    }

    /// Bus ranges of all imported segments, in ascending order.
    #[must_use]
    pub fn segment_ranges(&self) -> Vec<BusRange> {
        self.state
            .with_lock(|state| state.segments.iter().map(Segment::range).collect())
    }

    /// Total bytes of bus space imported from the backing store.
    #[must_use]
    pub fn capacity_bytes(&self) -> u64 {
        self.state.with_lock(|state| state.arena.span_bytes())
    }

    /// Bytes of imported bus space not currently handed out.
    #[must_use]
    pub fn free_bytes(&self) -> u64 {
        self.state.with_lock(|state| state.arena.free_bytes())
    }

    /// Bytes of imported bus space currently handed out.
    #[must_use]
    pub fn in_use_bytes(&self) -> u64 {
        self.state.with_lock(|state| state.arena.in_use_bytes())
    }

    /// Allocate one block.
    ///
    /// With [`AllocFlags::ZERO`] the block is zero-filled; with
    /// [`AllocFlags::NOWAIT`] growing the pool must not block. All flags are
    /// forwarded to the backing store if a new segment has to be imported.
    ///
    /// # Errors
    /// - [`AllocError::Backing`] if the pool had to grow and the backing store
    ///   failed,
    /// - [`AllocError::Exhausted`] if the freshly imported segment cannot hold
    ///   a block either, e.g. because the store granted it off the
    ///   granularity and the alignment slack no longer suffices. The segment
    ///   stays imported.
    ///
    /// A backing failure leaves the pool unchanged.
    pub fn allocate(&self, flags: AllocFlags) -> Result<DmaBlock, AllocError> {
        let block = match self.state.with_lock(|state| self.take_block(state)) {
            Some(block) => block,
            None => self.grow_and_take(flags)?,
        };

        if flags.contains(AllocFlags::ZERO) {
            // Safety: the block lies inside a live segment and now belongs to us.
            unsafe { block.ptr.as_ptr().write_bytes(0, self.block_len()) };
        }

        trace!("dma pool {}: allocated {}", self.name, block.handle);
        Ok(block)
    }

    /// [`allocate`](Self::allocate) with [`AllocFlags::ZERO`] added.
    ///
    /// # Errors
    /// As [`allocate`](Self::allocate).
    pub fn allocate_zeroed(&self, flags: AllocFlags) -> Result<DmaBlock, AllocError> {
        self.allocate(flags | AllocFlags::ZERO)
    }

    /// Return a block to the pool. Its memory is left as is.
    ///
    /// # Panics
    /// If `handle` was not handed out by this pool or is already free.
    pub fn free(&self, handle: BusAddress) {
        assert!(
            handle.is_aligned(self.config.align),
            "dma pool {}: free of misaligned handle {handle}",
            self.name
        );
        self.state
            .with_lock(|state| state.arena.release(handle, self.config.block_size));
        trace!("dma pool {}: freed {handle}", self.name);
    }

    /// Perform cache maintenance for the block at `handle` before or after a
    /// device transfer.
    ///
    /// Must be called with PRE operations before the device accesses the block
    /// and with POST operations afterwards. The caller must not free the block
    /// concurrently.
    ///
    /// # Panics
    /// - If `ops` mixes PRE and POST operations.
    /// - If `handle` does not belong to any segment of this pool.
    pub fn synchronize(&self, handle: BusAddress, ops: SyncOps) {
        assert!(
            !ops.mixes_phases(),
            "dma pool {}: sync of {handle} mixes PRE and POST operations ({ops:?})",
            self.name
        );

        let segment = self
            .state
            .with_lock(|state| Arc::clone(state.segments.find_owner(handle)));

        // Segments stay put until the pool is dropped, so the actual cache
        // maintenance can run without the lock.
        let offset = handle - segment.base();
        debug_assert!(offset + self.config.block_size <= segment.len());
        trace!("dma pool {}: sync {handle} {ops:?}", self.name);
        self.store
            .sync_segment(segment.token(), offset, self.config.block_size, ops);
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn block_len(&self) -> usize {
        // A block always fits inside one locally mapped segment.
        self.config.block_size as usize
    }

    /// Reserve a block from existing free space and translate it.
    fn take_block(&self, state: &mut PoolState<B::Token>) -> Option<DmaBlock> {
        let PoolConfig {
            block_size,
            align,
            boundary,
        } = self.config;
        let handle = state.arena.reserve(block_size, align, boundary)?;
        let ptr = state.segments.find_owner(handle).local_at(handle);
        Some(DmaBlock { ptr, handle })
    }

    /// Import one new segment, then retry the reservation once under the
    /// same lock acquisition that inserts the segment.
    fn grow_and_take(&self, flags: AllocFlags) -> Result<DmaBlock, AllocError> {
        let min_size = self.config.segment_request(self.store.granularity());
        let grant = self.store.alloc_segment(min_size, flags).inspect_err(|e| {
            warn!(
                "dma pool {}: failed to import {min_size:#x} byte segment: {e}",
                self.name
            );
        })?;
        debug_assert!(grant.len >= min_size);

        let range = grant.range();
        let segment = Segment::from_grant(grant);
        let mut state = self.state.lock();
        state.segments.insert(segment);
        state.arena.add_span(range);
        debug!(
            "dma pool {}: imported segment {range} ({:#x} bytes, {} total)",
            self.name,
            range.len,
            state.segments.len()
        );

        self.take_block(&mut state).ok_or_else(|| {
            warn!(
                "dma pool {}: imported segment {range} cannot hold a block",
                self.name
            );
            AllocError::Exhausted
        })
    }
}

impl<B: BackingStore> Drop for DmaPool<B> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let in_use = state.arena.in_use_bytes();
        if in_use != 0 {
            warn!(
                "dma pool {}: destroyed with {in_use:#x} bytes still allocated",
                self.name
            );
        }

        let mut released = 0usize;
        for segment in state.segments.drain() {
            // Only `synchronize` clones segments, and never past its return.
            let Some(segment) = Arc::into_inner(segment) else {
                unreachable!("dma pool {}: segment still referenced", self.name);
            };
            self.store.release_segment(segment.into_token());
            released += 1;
        }
        debug!("dma pool {}: released {released} segments", self.name);
    }
}

impl<B: BackingStore> fmt::Debug for DmaPool<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmaPool")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
