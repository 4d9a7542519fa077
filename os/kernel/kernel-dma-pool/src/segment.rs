//! # Segments and the segment index
//!
//! A segment is one contiguous chunk of backing memory: a fixed bus range
//! plus the local mapping of that range. The index answers "which segment owns
//! this bus address?" with a floor lookup over segment base addresses:
//!
//! ```text
//!   bus ──►  ┌──────────┐      ┌────────────────┐   ┌──────┐
//!            │ seg A    │      │ seg B          │   │ seg C│
//!            └──────────┘      └────────────────┘   └──────┘
//!            ^ base A          ^ base B   ▲          ^ base C
//!                                         │
//!                         addr ───────────┘  floor(addr) = B, B contains addr
//! ```
//!
//! Segments are immutable once created and are only removed when the owning
//! pool is torn down, so a segment found under the pool lock stays valid after
//! the lock is dropped.

use crate::backing::SegmentGrant;
use crate::{BusAddress, BusRange};
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::ptr::NonNull;

/// One imported chunk of bus-addressable memory.
#[derive(Debug)]
pub struct Segment<T> {
    range: BusRange,
    local: NonNull<u8>,
    token: T,
}

// Safety: the local mapping is only dereferenced by whoever owns a block in it;
// the segment itself merely carries the address.
unsafe impl<T: Send> Send for Segment<T> {}
unsafe impl<T: Sync> Sync for Segment<T> {}

impl<T> Segment<T> {
    pub(crate) fn from_grant(grant: SegmentGrant<T>) -> Self {
        Self {
            range: grant.range(),
            local: grant.local,
            token: grant.token,
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> BusAddress {
        self.range.start
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.range.len
    }

    #[inline]
    #[must_use]
    pub const fn range(&self) -> BusRange {
        self.range
    }

    #[inline]
    #[must_use]
    pub const fn token(&self) -> &T {
        &self.token
    }

    /// Local pointer for the byte at bus address `addr`.
    ///
    /// `addr` must lie inside this segment.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn local_at(&self, addr: BusAddress) -> NonNull<u8> {
        debug_assert!(self.range.contains(addr));
        let offset = addr - self.base();
        // The whole segment is mapped locally, so its offsets fit a usize.
        unsafe { self.local.add(offset as usize) }
    }

    pub(crate) fn into_token(self) -> T {
        self.token
    }
}

/// Ordered set of segments keyed by bus base address.
pub(crate) struct SegmentIndex<T> {
    segments: BTreeMap<BusAddress, Arc<Segment<T>>>,
}

impl<T> Default for SegmentIndex<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SegmentIndex<T> {
    pub(crate) const fn new() -> Self {
        Self {
            segments: BTreeMap::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.segments.len()
    }

    /// Add a segment.
    ///
    /// # Panics
    /// If its bus range overlaps a segment already in the index.
    pub(crate) fn insert(&mut self, segment: Segment<T>) {
        let range = segment.range();
        let below = self.segments.range(..=range.start).next_back();
        let above = self.segments.range(range.start..).next();
        for (_, other) in below.into_iter().chain(above) {
            assert!(
                !other.range().overlaps(&range),
                "segment {range} overlaps existing segment {}",
                other.range()
            );
        }
        self.segments.insert(range.start, Arc::new(segment));
    }

    /// Segment whose bus range contains `addr`, if any.
    pub(crate) fn lookup(&self, addr: BusAddress) -> Option<&Arc<Segment<T>>> {
        self.segments
            .range(..=addr)
            .next_back()
            .map(|(_, segment)| segment)
            .filter(|segment| segment.range().contains(addr))
    }

    /// Segment owning `addr`.
    ///
    /// # Panics
    /// If no segment contains `addr`, i.e. for foreign or corrupted handles.
    pub(crate) fn find_owner(&self, addr: BusAddress) -> &Arc<Segment<T>> {
        match self.lookup(addr) {
            Some(segment) => segment,
            None => panic!("pool segment not found: {addr}"),
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Segment<T>> {
        self.segments.values().map(|segment| &**segment)
    }

    /// Remove every segment, leaving the index empty.
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = Arc<Segment<T>>> {
        core::mem::take(&mut self.segments).into_values()
    }
}
