use crate::PoolConfigError;

/// Default granularity of backing segments.
pub const PAGE_SIZE: u64 = 4096;

/// Immutable parameters of a [`DmaPool`](crate::DmaPool).
///
/// - `block_size`: size of every block handed out, in bytes.
/// - `align`: bus-address alignment of every block (the arena quantum).
/// - `boundary`: if non-zero, no block may straddle a multiple of it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PoolConfig {
    pub block_size: u64,
    pub align: u64,
    pub boundary: u64,
}

impl PoolConfig {
    #[must_use]
    pub const fn new(block_size: u64, align: u64, boundary: u64) -> Self {
        Self {
            block_size,
            align,
            boundary,
        }
    }

    /// Checks the creation-time preconditions.
    ///
    /// # Errors
    /// - the block size is zero,
    /// - `align` is not a power of two,
    /// - a non-zero `boundary` is not a power of two, is smaller than the
    ///   block (no placement could ever satisfy it) or smaller than `align`.
    pub const fn validate(&self) -> Result<(), PoolConfigError> {
        if self.block_size == 0 {
            return Err(PoolConfigError::ZeroBlockSize);
        }
        if !self.align.is_power_of_two() {
            return Err(PoolConfigError::AlignNotPowerOfTwo(self.align));
        }
        if self.boundary != 0 {
            if !self.boundary.is_power_of_two() {
                return Err(PoolConfigError::BoundaryNotPowerOfTwo(self.boundary));
            }
            if self.boundary < self.block_size {
                return Err(PoolConfigError::BoundaryTooSmall {
                    boundary: self.boundary,
                    block_size: self.block_size,
                });
            }
            if self.boundary < self.align {
                return Err(PoolConfigError::AlignExceedsBoundary {
                    align: self.align,
                    boundary: self.boundary,
                });
            }
        }
        Ok(())
    }

    /// Minimum segment size to request so that one block always fits,
    /// whatever the placement constraints, given segments aligned to
    /// `granularity`.
    pub(crate) const fn segment_request(&self, granularity: u64) -> u64 {
        let mut want = self.block_size;
        if self.align > granularity {
            want += self.align - granularity;
        }
        if self.boundary != 0 {
            // Worst case the first aligned slot straddles a boundary and the
            // block has to move up to the next one.
            want += self.block_size;
        }
        want.div_ceil(granularity) * granularity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_configs() {
        assert_eq!(PoolConfig::new(64, 64, 0).validate(), Ok(()));
        assert_eq!(PoolConfig::new(48, 16, 4096).validate(), Ok(()));
        assert_eq!(PoolConfig::new(4096, 1, 4096).validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_parameters() {
        assert_eq!(
            PoolConfig::new(0, 64, 0).validate(),
            Err(PoolConfigError::ZeroBlockSize)
        );
        assert_eq!(
            PoolConfig::new(64, 48, 0).validate(),
            Err(PoolConfigError::AlignNotPowerOfTwo(48))
        );
        assert_eq!(
            PoolConfig::new(64, 0, 0).validate(),
            Err(PoolConfigError::AlignNotPowerOfTwo(0))
        );
        assert_eq!(
            PoolConfig::new(64, 64, 96).validate(),
            Err(PoolConfigError::BoundaryNotPowerOfTwo(96))
        );
        assert_eq!(
            PoolConfig::new(128, 64, 64).validate(),
            Err(PoolConfigError::BoundaryTooSmall {
                boundary: 64,
                block_size: 128
            })
        );
        assert_eq!(
            PoolConfig::new(32, 128, 64).validate(),
            Err(PoolConfigError::AlignExceedsBoundary {
                align: 128,
                boundary: 64
            })
        );
    }

    #[test]
    fn segment_request_rounds_to_granularity() {
        assert_eq!(PoolConfig::new(64, 64, 0).segment_request(PAGE_SIZE), 4096);
        assert_eq!(PoolConfig::new(5000, 8, 0).segment_request(PAGE_SIZE), 8192);
        // 16 KiB alignment on 4 KiB segments needs 12 KiB of slack.
        assert_eq!(
            PoolConfig::new(4096, 16384, 0).segment_request(PAGE_SIZE),
            16384
        );
        assert_eq!(
            PoolConfig::new(3000, 8, 4096).segment_request(PAGE_SIZE),
            8192
        );
    }
}
