//! # Backing store capability
//!
//! The pool never allocates or maps memory itself. It asks the host for whole
//! *segments*: physically contiguous regions that are already mapped into the
//! local address space and loaded for the device, so that a bus address is
//! known for them.
//!
//! Typical implementations:
//! - **Kernel**: allocate contiguous pages, map them, load them into an IOMMU
//!   or bus mapping and return the resulting bus address.
//! - **Tests**: carve aligned chunks out of the heap and invent bus addresses.

use crate::config::PAGE_SIZE;
use crate::{AllocFlags, BackingError, BusAddress, BusRange, SyncOps};
use core::ptr::NonNull;

/// A freshly imported segment as handed out by
/// [`BackingStore::alloc_segment`].
#[derive(Debug)]
pub struct SegmentGrant<T> {
    /// Bus address of the first byte.
    pub bus: BusAddress,
    /// Length in bytes; at least the requested minimum.
    pub len: u64,
    /// Local mapping of the first byte.
    pub local: NonNull<u8>,
    /// Whatever the store needs to release or synchronize the segment later.
    pub token: T,
}

impl<T> SegmentGrant<T> {
    #[inline]
    #[must_use]
    pub const fn range(&self) -> BusRange {
        BusRange::new(self.bus, self.len)
    }
}

/// Host capability producing bus-addressable segments.
///
/// All methods take `&self`: the pool calls into the store **without** holding
/// its own lock, so several threads may grow the same pool at once. The store
/// synchronizes internally as it needs.
///
/// # Safety
/// Implementors guarantee that every [`SegmentGrant`] returned from
/// [`alloc_segment`](Self::alloc_segment)
/// - describes `len` bytes at `local` that are valid for reads and writes,
///   exclusively owned by the pool until handed back via
///   [`release_segment`](Self::release_segment),
/// - maps one-to-one onto the bus range `[bus, bus + len)`, and
/// - does not overlap the bus range of any other segment that has not been
///   released yet.
///
/// The pool writes through `local` (zero-filling blocks) and hands derived
/// pointers to its callers, relying on these guarantees.
pub unsafe trait BackingStore: Sync {
    /// Per-segment state needed to release or synchronize it.
    type Token: Send + Sync;

    /// Segment size granularity; requests are rounded up to it. Must be a
    /// power of two. Segment bus addresses are expected to be aligned to it.
    fn granularity(&self) -> u64 {
        PAGE_SIZE
    }

    /// Produce one new segment of at least `min_size` bytes.
    ///
    /// `flags` are the caller's allocation flags. When
    /// [`AllocFlags::may_block`] is `false` the store must not wait for
    /// memory and should fail with [`BackingError::WouldBlock`] instead.
    ///
    /// # Errors
    /// Any [`BackingError`]; the pool surfaces it to the allocating caller.
    fn alloc_segment(
        &self,
        min_size: u64,
        flags: AllocFlags,
    ) -> Result<SegmentGrant<Self::Token>, BackingError>;

    /// Give a segment back. Called exactly once per granted segment, when the
    /// owning pool is destroyed.
    fn release_segment(&self, token: Self::Token);

    /// Perform cache maintenance for `[offset, offset + len)` of a segment.
    ///
    /// `ops` never mixes PRE and POST phases.
    fn sync_segment(&self, token: &Self::Token, offset: u64, len: u64, ops: SyncOps);
}
