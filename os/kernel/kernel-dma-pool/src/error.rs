/// Failure reported by a [`BackingStore`](crate::BackingStore) when it cannot
/// produce a new segment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackingError {
    #[error("out of bus-addressable memory")]
    OutOfMemory,
    #[error("backing memory unavailable without blocking")]
    WouldBlock,
    #[error("memory could not be mapped as a single contiguous bus range")]
    Unmappable,
}

/// Recoverable allocation failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    /// No free block fits, and the segment imported to grow the pool could
    /// not hold one either. That segment stays part of the pool.
    #[error("dma pool exhausted")]
    Exhausted,
    /// The backing store failed; the pool is unchanged.
    #[error("failed to import a new segment: {0}")]
    Backing(#[from] BackingError),
}

/// Rejected pool parameters.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolConfigError {
    #[error("block size must not be zero")]
    ZeroBlockSize,
    #[error("alignment {0:#x} is not a power of two")]
    AlignNotPowerOfTwo(u64),
    #[error("boundary {0:#x} is not a power of two")]
    BoundaryNotPowerOfTwo(u64),
    #[error("boundary {boundary:#x} is smaller than the block size {block_size:#x}")]
    BoundaryTooSmall { boundary: u64, block_size: u64 },
    #[error("alignment {align:#x} exceeds the boundary {boundary:#x}")]
    AlignExceedsBoundary { align: u64, boundary: u64 },
}
