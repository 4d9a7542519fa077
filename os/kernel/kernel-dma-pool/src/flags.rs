bitflags::bitflags! {
    /// Flags accepted by [`DmaPool::allocate`](crate::DmaPool::allocate).
    ///
    /// Only [`ZERO`](Self::ZERO) is interpreted by the pool itself.
    /// [`NOWAIT`](Self::NOWAIT) is honoured by the backing store when the pool
    /// has to grow. Every other bit is opaque to the pool and handed to
    /// [`BackingStore::alloc_segment`](crate::BackingStore::alloc_segment)
    /// unchanged.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct AllocFlags: u32 {
        /// Fill the returned block with zeroes.
        const ZERO   = 1 << 0;

        /// Do not wait for backing memory.
        ///
        /// If satisfying the request requires importing a new segment and
        /// the backing store cannot produce one without blocking, the
        /// allocation fails instead.
        const NOWAIT = 1 << 1;

        // Host-specific bits (e.g. memory zone or cacheability hints).
        const _ = !0;
    }
}

impl AllocFlags {
    /// Whether the caller is willing to wait for backing memory.
    #[inline]
    #[must_use]
    pub const fn may_block(self) -> bool {
        !self.contains(Self::NOWAIT)
    }
}

bitflags::bitflags! {
    /// Cache maintenance around a device transfer.
    ///
    /// `PRE_*` operations are issued before the device touches the block,
    /// `POST_*` operations after it is done. `READ` means the device reads
    /// from memory (memory → device), `WRITE` means the device writes to
    /// memory (device → memory). A single request may combine read and write
    /// variants of one phase but must never combine the two phases.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct SyncOps: u8 {
        const PRE_READ   = 1 << 0;
        const POST_READ  = 1 << 1;
        const PRE_WRITE  = 1 << 2;
        const POST_WRITE = 1 << 3;

        const PRE  = Self::PRE_READ.bits() | Self::PRE_WRITE.bits();
        const POST = Self::POST_READ.bits() | Self::POST_WRITE.bits();
    }
}

impl SyncOps {
    /// `true` when the request contains both a PRE and a POST operation.
    #[inline]
    #[must_use]
    pub const fn mixes_phases(self) -> bool {
        self.intersects(Self::PRE) && self.intersects(Self::POST)
    }
}
