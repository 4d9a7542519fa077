//! # DMA Pool: Fixed-Size Blocks of Bus-Addressable Memory
//!
//! This crate hands out equally sized, aligned blocks of memory that a device
//! can reach over the bus, for drivers that need many small DMA buffers
//! (descriptor rings or command packets) without paying for a whole
//! page mapping per buffer.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    DmaPool                          │
//! │    • allocate / free / synchronize / destroy        │
//! │    • bus address ──► local pointer translation      │
//! │    • one spin lock, never held across growth        │
//! └──────────┬───────────────────────────┬──────────────┘
//!            │                           │
//! ┌──────────▼──────────────┐ ┌──────────▼──────────────┐
//! │   AddressSpaceArena     │ │     SegmentIndex        │
//! │  • first-fit intervals  │ │  • floor lookup by bus  │
//! │  • align / boundary     │ │    address              │
//! │  • coalescing release   │ │  • fatal on foreign     │
//! └──────────┬──────────────┘ │    handles              │
//!            │ grows via      └──────────▲──────────────┘
//! ┌──────────▼───────────────────────────┴──────────────┐
//! │                  BackingStore (host)                │
//! │    • contiguous, mapped, bus-loaded segments        │
//! │    • release at teardown, cache maintenance         │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The pool starts empty. When no free block fits, it imports one more
//! segment from the [`BackingStore`], registers the segment's bus range as
//! free space, and retries. Segments are only handed back when the pool is
//! destroyed.
//!
//! ## Handles
//!
//! An allocation returns a [`DmaBlock`]: a local pointer for the CPU and a
//! bus address ("handle") for the device. The handle alone identifies the
//! block afterwards. Passing a handle that this pool never issued to
//! [`DmaPool::free`] or [`DmaPool::synchronize`] panics: continuing could
//! direct a device at unrelated memory.
//!
//! ## Synchronization
//!
//! Pool memory is not assumed to be coherent. Bracket every transfer with
//! [`DmaPool::synchronize`]: [`SyncOps::PRE`] operations before the device
//! touches the block, [`SyncOps::POST`] operations after. A single call must
//! not mix the two phases.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kernel_dma_pool::{AllocFlags, DmaPool, PoolConfig, SyncOps};
//!
//! let pool = DmaPool::create("xhci-trb", store, PoolConfig::new(64, 64, 4096))?;
//! let block = pool.allocate_zeroed(AllocFlags::empty())?;
//! // fill the descriptor through block.ptr(), then
//! pool.synchronize(block.handle(), SyncOps::PRE_WRITE);
//! // ... device runs ...
//! pool.synchronize(block.handle(), SyncOps::POST_WRITE);
//! pool.free(block.handle());
//! pool.destroy();
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod addresses;
mod arena;
mod backing;
mod config;
mod error;
mod flags;
mod pool;
mod segment;
mod sync;

pub use addresses::{BusAddress, BusRange};
pub use backing::{BackingStore, SegmentGrant};
pub use config::{PAGE_SIZE, PoolConfig};
pub use error::{AllocError, BackingError, PoolConfigError};
pub use flags::{AllocFlags, SyncOps};
pub use pool::{DmaBlock, DmaPool};
