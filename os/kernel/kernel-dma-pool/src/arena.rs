//! # Bus address-space arena
//!
//! A first-fit, split-and-coalesce interval allocator over bus addresses.
//!
//! Unlike a heap free list, the bookkeeping cannot live inside the free
//! memory: the arena deals in *bus* addresses, which the CPU cannot
//! dereference. Free ranges are therefore tracked out of band in an
//! address-ordered map.
//!
//! ```text
//!   span (one imported segment)
//!   ┌──────────────────────────────────────────────────────────┐
//!   │ used │ free ░░░░░ │ used │ used │ free ░░░░░░░░░░░░░░░░░ │
//!   └──────────────────────────────────────────────────────────┘
//!            ▲ first fit: lowest free range that can hold an aligned,
//!              boundary-respecting block; split into head/tail remainders
//! ```
//!
//! # Invariants
//! - Spans are pairwise disjoint.
//! - Every free range lies inside exactly one span. Free ranges are never
//!   merged across span boundaries, even if two spans happen to be adjacent on
//!   the bus, so a reservation never straddles two segments.
//! - Free ranges are disjoint and non-empty; adjacent free ranges of the same
//!   span are always coalesced.
//! - Every reserved block is recorded by its start, so only exact block
//!   starts can be released.
//! - `free_bytes` equals the sum of all free range lengths.

use crate::{BusAddress, BusRange};
use alloc::collections::BTreeMap;

pub(crate) struct AddressSpaceArena {
    /// Imported spans, base → length.
    spans: BTreeMap<BusAddress, u64>,
    /// Free ranges, start → length.
    free: BTreeMap<BusAddress, u64>,
    /// Reserved blocks, start → length.
    reserved: BTreeMap<BusAddress, u64>,
    span_bytes: u64,
    free_bytes: u64,
}

impl Default for AddressSpaceArena {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpaceArena {
    pub(crate) const fn new() -> Self {
        Self {
            spans: BTreeMap::new(),
            free: BTreeMap::new(),
            reserved: BTreeMap::new(),
            span_bytes: 0,
            free_bytes: 0,
        }
    }

    /// Total bytes of all imported spans.
    pub(crate) const fn span_bytes(&self) -> u64 {
        self.span_bytes
    }

    pub(crate) const fn free_bytes(&self) -> u64 {
        self.free_bytes
    }

    pub(crate) const fn in_use_bytes(&self) -> u64 {
        self.span_bytes - self.free_bytes
    }

    /// Free ranges in ascending address order.
    #[cfg(test)]
    pub(crate) fn free_ranges(&self) -> impl Iterator<Item = BusRange> + '_ {
        self.free
            .iter()
            .map(|(&start, &len)| BusRange::new(start, len))
    }

    /// Make `range` available for reservations.
    ///
    /// # Panics
    /// If `range` is empty, wraps around the bus address space, or overlaps a
    /// span that was added before.
    pub(crate) fn add_span(&mut self, range: BusRange) {
        assert!(range.len > 0, "empty span at {}", range.start);
        assert!(
            range.start.as_u64().checked_add(range.len).is_some(),
            "span {range} wraps around the bus address space"
        );
        let below = self.spans.range(..=range.start).next_back();
        let above = self.spans.range(range.start..).next();
        for (&start, &len) in below.into_iter().chain(above) {
            let other = BusRange::new(start, len);
            assert!(!other.overlaps(&range), "span {range} overlaps span {other}");
        }

        self.spans.insert(range.start, range.len);
        self.free.insert(range.start, range.len);
        self.span_bytes += range.len;
        self.free_bytes += range.len;
    }

    /// Reserve `size` bytes aligned to `align`, not crossing a multiple of
    /// `boundary` (0 = unconstrained). First fit in ascending address order.
    ///
    /// Returns `None` without touching any state if nothing fits.
    pub(crate) fn reserve(&mut self, size: u64, align: u64, boundary: u64) -> Option<BusAddress> {
        debug_assert!(size > 0);
        debug_assert!(align.is_power_of_two());
        debug_assert!(boundary == 0 || (boundary.is_power_of_two() && boundary >= size));

        let (region_start, region_len, at) = self.free.iter().find_map(|(&start, &len)| {
            place(start, start.as_u64() + len, size, align, boundary).map(|at| (start, len, at))
        })?;

        let region_end = region_start.as_u64() + region_len;
        let alloc_end = at.as_u64() + size;

        self.free.remove(&region_start);
        let head_remainder = at - region_start;
        if head_remainder > 0 {
            self.free.insert(region_start, head_remainder);
        }
        let tail_remainder = region_end - alloc_end;
        if tail_remainder > 0 {
            self.free.insert(BusAddress::new(alloc_end), tail_remainder);
        }

        self.reserved.insert(at, size);
        self.free_bytes -= size;
        Some(at)
    }

    /// Return `[addr, addr + size)` to the free ranges, coalescing with free
    /// neighbours inside the same span.
    ///
    /// # Panics
    /// If the range is not fully inside one span, or is not exactly a block
    /// handed out by [`reserve`](Self::reserve) and not yet released.
    pub(crate) fn release(&mut self, addr: BusAddress, size: u64) {
        debug_assert!(size > 0);
        let Some(end) = addr.as_u64().checked_add(size) else {
            panic!("release of {addr} (+{size:#x}) wraps around the bus address space");
        };

        let span = self
            .spans
            .range(..=addr)
            .next_back()
            .map(|(&start, &len)| BusRange::new(start, len))
            .filter(|span| span.contains(addr) && end <= span.end());
        let Some(span) = span else {
            panic!("release of {addr} (+{size:#x}) outside of any imported span");
        };

        let prev = self
            .free
            .range(..=addr)
            .next_back()
            .map(|(&start, &len)| BusRange::new(start, len));
        let next = self
            .free
            .range(addr..)
            .next()
            .map(|(&start, &len)| BusRange::new(start, len));

        let released = BusRange::new(addr, size);
        match self.reserved.get(&addr).copied() {
            Some(len) => assert_eq!(
                len, size,
                "release of {released}: block was reserved with {len:#x} bytes"
            ),
            None => {
                for neighbour in prev.iter().chain(next.iter()) {
                    assert!(
                        !neighbour.overlaps(&released),
                        "double free of {released}: overlaps free range {neighbour}"
                    );
                }
                panic!("release of {released}: not the start of a reserved block");
            }
        }
        self.reserved.remove(&addr);

        let mut start = addr;
        let mut len = size;

        // Coalesce with the free range directly below, unless `addr` starts
        // the span (the range below would then belong to a different span).
        if let Some(prev) = prev
            && prev.end() == addr.as_u64()
            && addr != span.start
        {
            self.free.remove(&prev.start);
            start = prev.start;
            len += prev.len;
        }

        // Same for the range directly above.
        if let Some(next) = next
            && next.start.as_u64() == end
            && end != span.end()
        {
            self.free.remove(&next.start);
            len += next.len;
        }

        self.free.insert(start, len);
        self.free_bytes += size;
    }
}

/// Lowest address within `[start, end)` where `size` bytes aligned to `align`
/// fit without crossing a multiple of `boundary`.
fn place(start: BusAddress, end: u64, size: u64, align: u64, boundary: u64) -> Option<BusAddress> {
    let mut at = start.align_up(align).as_u64();
    if at < start.as_u64() {
        return None;
    }
    if boundary != 0 {
        let last = at.checked_add(size - 1)?;
        if (at ^ last) & !(boundary - 1) != 0 {
            // Straddles; move to the next boundary, which is also aligned
            // because `align <= boundary`.
            at = (at | (boundary - 1)).checked_add(1)?;
        }
    }
    let alloc_end = at.checked_add(size)?;
    (alloc_end <= end).then_some(BusAddress::new(at))
}
