use core::fmt;
use core::ops::{Add, Sub};

/// Bus address.
///
/// An address as seen by a device performing direct memory transfers. It is
/// not necessarily equal to the CPU-physical address and never equal to the
/// local (virtual) pointer the CPU uses for the same bytes; keeping it in its
/// own type prevents handing a local pointer to a device or vice versa.
///
/// Handles returned by [`DmaPool::allocate`](crate::DmaPool::allocate) are bus
/// addresses.
///
/// ### Examples
/// ```rust
/// # use kernel_dma_pool::BusAddress;
/// let ba = BusAddress::new(0x8000_1040);
/// assert_eq!(ba.align_down(0x1000).as_u64(), 0x8000_1000);
/// assert_eq!(ba.align_up(0x1000).as_u64(), 0x8000_2000);
/// assert_eq!((ba + 0x40).as_u64(), 0x8000_1080);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BusAddress(u64);

impl BusAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Rounds down to a multiple of `align` (a power of two).
    #[inline]
    #[must_use]
    pub const fn align_down(self, align: u64) -> Self {
        debug_assert!(align.is_power_of_two());
        Self(self.0 & !(align - 1))
    }

    /// Rounds up to a multiple of `align` (a power of two).
    ///
    /// Saturates at the highest aligned address instead of wrapping.
    #[inline]
    #[must_use]
    pub const fn align_up(self, align: u64) -> Self {
        debug_assert!(align.is_power_of_two());
        match self.0.checked_add(align - 1) {
            Some(v) => Self(v & !(align - 1)),
            None => Self(u64::MAX & !(align - 1)),
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned(self, align: u64) -> bool {
        debug_assert!(align.is_power_of_two());
        self.0 & (align - 1) == 0
    }

    /// Byte distance from `base` up to `self`, or `None` if `self < base`.
    #[inline]
    #[must_use]
    pub const fn offset_from(self, base: Self) -> Option<u64> {
        self.0.checked_sub(base.0)
    }
}

impl fmt::Debug for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}

impl From<u64> for BusAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<BusAddress> for u64 {
    #[inline]
    fn from(value: BusAddress) -> Self {
        value.as_u64()
    }
}

impl Add<u64> for BusAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Sub<BusAddress> for BusAddress {
    type Output = u64;
    #[inline]
    fn sub(self, rhs: BusAddress) -> Self::Output {
        self.0 - rhs.0
    }
}

/// Half-open bus address range `[start, start + len)`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct BusRange {
    pub start: BusAddress,
    pub len: u64,
}

impl BusRange {
    #[inline]
    #[must_use]
    pub const fn new(start: BusAddress, len: u64) -> Self {
        Self { start, len }
    }

    /// One past the last byte. Saturates for ranges touching the top of the bus.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start.as_u64().saturating_add(self.len)
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, addr: BusAddress) -> bool {
        addr.as_u64() >= self.start.as_u64() && addr.as_u64() < self.end()
    }

    #[inline]
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start.as_u64() < other.end() && other.start.as_u64() < self.end()
    }
}

impl fmt::Display for BusRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..0x{:016X})", self.start, self.end())
    }
}
