//! Heap allocator core for the MemFlex project.
//!
//! This crate manages a single caller-supplied contiguous memory region as a
//! kernel-style heap. The region is carved into *blocks*, each consisting of a
//! [`BlockHeader`](block) followed by its payload, linked into one
//! address-ordered singly-linked list that covers the whole region with no
//! gaps and no overlaps.
//!
//! # Algorithm
//!
//! - **Placement**: each allocation scans the block list for a free block
//!   large enough for the request, under the currently selected
//!   [`PlacementStrategy`] (first-fit, best-fit or worst-fit)
//! - **Split**: when the chosen block has enough surplus to host another
//!   header plus a nonzero payload, its tail is carved off as a new free
//!   block; otherwise the whole block is handed out as-is
//! - **Coalesce**: freeing a block merges it with its physically adjacent
//!   free neighbors, forward first and then backward, so a run of adjacent
//!   free blocks always collapses into one regardless of the order in which
//!   they were freed
//!
//! # Memory Layout
//!
//! ```text
//! Block Layout:
//! ┌───────────────────────────────────────┬───────────────────────┐
//! │ BlockHeader                           │ Payload               │
//! │ ┌─────────────┬──────────┬──────────┐ │                       │
//! │ │ size: usize │ is_free  │ next: *  │ │  `size` bytes usable  │
//! │ └─────────────┴──────────┴──────────┘ │                       │
//! └───────────────────────────────────────┴───────────────────────┘
//!                                         ▲
//!                                         └── pointer returned to caller
//! ```
//!
//! # Usage Example
//!
//! ```rust
//! use kalloc::{Heap, PlacementStrategy};
//!
//! let mut region = vec![0u8; 4096];
//! let mut heap = Heap::empty();
//! unsafe {
//!     heap.init(region.as_mut_ptr(), region.len());
//! }
//! heap.set_strategy(PlacementStrategy::BestFit);
//!
//! if let Some(ptr) = heap.allocate(128) {
//!     // Use the allocated memory...
//!
//!     unsafe {
//!         heap.free(ptr);
//!     }
//! }
//! ```
//!
//! # Performance Characteristics
//!
//! - **Allocation**: O(n) in the number of blocks, one scan per call
//! - **Deallocation**: O(n), one scan locating the block and its predecessor
//! - **Memory Overhead**: one header per block, free or used
//!
//! # Thread Safety
//!
//! [`Heap`] is `Send` but not `Sync`. It can be moved behind a lock but
//! requires external synchronization for concurrent access.

#![no_std]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod block;
pub mod heap;

pub use block::{HEADER_ALIGN, HEADER_OVERHEAD, MIN_REGION_SIZE};
pub use heap::{BlockInfo, Blocks, Heap, HeapStats, PlacementStrategy};
