//! Heap bookkeeping over a caller-supplied region.
//!
//! [`Heap`] owns the address-ordered block list described in the crate
//! documentation. It is an explicit context object: callers construct one,
//! hand it a backing region once via [`init`](Heap::init), and route every
//! allocation and deallocation through it. Nothing in this module touches
//! process-wide state, so multiple independent heaps coexist naturally and a
//! facade can wrap one instance in a lock.
//!
//! # Placement strategies
//!
//! Every allocation scans the full block list from the head, considering
//! only free blocks whose payload capacity satisfies the request:
//!
//! - [`FirstFit`](PlacementStrategy::FirstFit): first qualifying block in
//!   address order
//! - [`BestFit`](PlacementStrategy::BestFit): qualifying block with the
//!   smallest capacity, first encountered among equals
//! - [`WorstFit`](PlacementStrategy::WorstFit): qualifying block with the
//!   largest capacity, first encountered among equals
//!
//! The active strategy is read at the start of every allocation; changing it
//! never moves blocks that are already placed.

use core::{marker::PhantomData, ptr};

use derive_more::Display;

use crate::block::{BlockHeader, HEADER_ALIGN, HEADER_OVERHEAD, quantize};

/// Policy used to choose among qualifying free blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PlacementStrategy {
    /// First qualifying free block in address order.
    #[display("first-fit")]
    FirstFit,
    /// Qualifying free block with the smallest payload capacity.
    #[display("best-fit")]
    BestFit,
    /// Qualifying free block with the largest payload capacity.
    #[display("worst-fit")]
    WorstFit,
}

/// One block of the heap as seen by [`Heap::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Address of the block's header.
    pub addr: usize,
    /// Payload capacity in bytes, excluding the header.
    pub size: usize,
    /// Whether the block is currently free.
    pub is_free: bool,
}

/// Aggregate view of the block list, computed by one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Total number of blocks, free and used.
    pub blocks: usize,
    /// Number of free blocks.
    pub free_blocks: usize,
    /// Total free payload bytes.
    pub free_bytes: usize,
    /// Total used payload bytes.
    pub used_bytes: usize,
    /// Payload capacity of the largest free block.
    pub largest_free: usize,
}

/// A heap carved out of one caller-supplied contiguous region.
///
/// See the [module documentation](self) for the overall design and the
/// crate documentation for a usage example.
pub struct Heap {
    head: *mut BlockHeader,
    strategy: PlacementStrategy,
    region_size: usize,
}

unsafe impl Send for Heap {}

impl Default for Heap {
    fn default() -> Self {
        Self::empty()
    }
}

impl Heap {
    /// Creates a heap with no backing region.
    ///
    /// Every allocation fails until [`init`](Self::init) has been called.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            head: ptr::null_mut(),
            strategy: PlacementStrategy::FirstFit,
            region_size: 0,
        }
    }

    /// Adopts `region` as the backing memory and resets the block list to a
    /// single free block spanning the whole region minus one header.
    ///
    /// The region start is aligned up to the header alignment and the size
    /// rounded down to a whole number of alignment units; the result is the
    /// *effective* region size reported by [`region_size`](Self::region_size).
    /// Calling `init` again abandons any previous block list wholesale; it is
    /// a re-initialization primitive, not a reset-safe operation.
    ///
    /// # Panics
    ///
    /// Panics if the effective region cannot hold one header plus one payload
    /// alignment unit. [`MIN_REGION_SIZE`](crate::MIN_REGION_SIZE) bytes are
    /// always sufficient.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - the span `region..region + region_size` is valid, writable memory
    ///   owned by the caller and used by nothing else
    /// - the region outlives every pointer handed out by this heap
    /// - previously handed-out pointers are never passed back after a
    ///   re-initialization
    pub unsafe fn init(&mut self, region: *mut u8, region_size: usize) {
        assert!(!region.is_null(), "backing region must not be null");

        let align_offset = region.align_offset(HEADER_ALIGN);
        let start = region.map_addr(|addr| addr + align_offset);
        let effective = region_size.saturating_sub(align_offset) / HEADER_ALIGN * HEADER_ALIGN;
        assert!(
            effective >= HEADER_OVERHEAD + HEADER_ALIGN,
            "region cannot hold a single block"
        );

        #[expect(clippy::cast_ptr_alignment)]
        let head = start.cast::<BlockHeader>();
        unsafe {
            BlockHeader::write(head, effective - HEADER_OVERHEAD, true, ptr::null_mut());
        }
        self.head = head;
        self.region_size = effective;
    }

    /// Selects the placement strategy used by subsequent allocations.
    pub fn set_strategy(&mut self, strategy: PlacementStrategy) {
        self.strategy = strategy;
    }

    /// Currently selected placement strategy.
    #[must_use]
    pub fn strategy(&self) -> PlacementStrategy {
        self.strategy
    }

    /// Effective size of the backing region in bytes, or 0 before
    /// [`init`](Self::init).
    #[must_use]
    pub fn region_size(&self) -> usize {
        self.region_size
    }

    /// Allocates `size` bytes and returns the payload pointer.
    ///
    /// The request is rounded up to the header alignment, then placed
    /// according to the active strategy. When the chosen block's surplus
    /// exceeds one header of overhead, its tail is split off as a new free
    /// block; otherwise the whole block is consumed and the caller receives
    /// more capacity than requested.
    ///
    /// Returns `None` when no free block satisfies the request, when `size`
    /// is 0, or when the heap has no region. No state changes on failure.
    pub fn allocate(&mut self, size: usize) -> Option<*mut u8> {
        if size == 0 || self.head.is_null() {
            return None;
        }
        let size = quantize(size);
        let candidate = self.find_candidate(size);
        if candidate.is_null() {
            return None;
        }

        unsafe {
            let surplus = (*candidate).size - size;
            if surplus > HEADER_OVERHEAD {
                // Carve the tail off as a new free block.
                (*candidate).size = size;
                #[expect(clippy::cast_ptr_alignment)]
                let tail = BlockHeader::end(candidate).cast::<BlockHeader>();
                BlockHeader::write(tail, surplus - HEADER_OVERHEAD, true, (*candidate).next);
                (*candidate).next = tail;
            }
            (*candidate).is_free = false;
            Some(BlockHeader::payload(candidate))
        }
    }

    /// Returns a block to the heap and merges it with adjacent free blocks.
    ///
    /// Coalescing runs in two phases: forward along `next` links while the
    /// successor is free, then backward into the predecessor if that is free.
    /// After the call returns, no two consecutive blocks are both free.
    ///
    /// Freeing a null pointer is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if `payload` does not correspond to an allocated block of this
    /// heap: a pointer the heap never handed out, a mid-payload pointer, or a
    /// block that is already free.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - `payload` was returned by [`allocate`](Self::allocate) on this heap
    ///   since the last [`init`](Self::init), or is null
    /// - the memory is no longer in use
    pub unsafe fn free(&mut self, payload: *mut u8) {
        if payload.is_null() {
            return;
        }
        let block = unsafe { BlockHeader::from_payload(payload) };

        // One address-ordered scan finds the block (validating the pointer)
        // and its predecessor for the backward merge.
        let mut prev: *mut BlockHeader = ptr::null_mut();
        let mut current = self.head;
        unsafe {
            while !current.is_null() && !ptr::eq(current, block) {
                prev = current;
                current = (*current).next;
            }
            assert!(!current.is_null(), "pointer does not belong to this heap");
            assert!(!(*block).is_free, "double free");
            (*block).is_free = true;

            // Forward coalesce.
            while !(*block).next.is_null() && (*(*block).next).is_free {
                let next = (*block).next;
                (*block).size += HEADER_OVERHEAD + (*next).size;
                (*block).next = (*next).next;
            }

            // Backward coalesce; the predecessor becomes the merged block.
            if !prev.is_null() && (*prev).is_free {
                (*prev).size += HEADER_OVERHEAD + (*block).size;
                (*prev).next = (*block).next;
            }
        }
    }

    /// Payload capacity of the block backing `payload`.
    ///
    /// This is the granted size, which may exceed the requested size due to
    /// rounding or an unsplit surplus.
    ///
    /// # Safety
    ///
    /// `payload` must have been returned by [`allocate`](Self::allocate) on
    /// this heap and not yet freed.
    #[must_use]
    pub unsafe fn usable_size(&self, payload: *mut u8) -> usize {
        unsafe { (*BlockHeader::from_payload(payload)).size }
    }

    /// Iterates over every block in address order.
    #[must_use]
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            current: self.head,
            _heap: PhantomData,
        }
    }

    /// Aggregate statistics over the block list.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats::default();
        for block in self.blocks() {
            stats.blocks += 1;
            if block.is_free {
                stats.free_blocks += 1;
                stats.free_bytes += block.size;
                stats.largest_free = stats.largest_free.max(block.size);
            } else {
                stats.used_bytes += block.size;
            }
        }
        stats
    }

    fn find_candidate(&self, size: usize) -> *mut BlockHeader {
        match self.strategy {
            PlacementStrategy::FirstFit => self.find_first_fit(size),
            PlacementStrategy::BestFit => self.find_best_fit(size),
            PlacementStrategy::WorstFit => self.find_worst_fit(size),
        }
    }

    fn find_first_fit(&self, size: usize) -> *mut BlockHeader {
        let mut current = self.head;
        unsafe {
            while !current.is_null() {
                if (*current).is_free && (*current).size >= size {
                    return current;
                }
                current = (*current).next;
            }
        }
        ptr::null_mut()
    }

    fn find_best_fit(&self, size: usize) -> *mut BlockHeader {
        let mut chosen: *mut BlockHeader = ptr::null_mut();
        let mut current = self.head;
        unsafe {
            while !current.is_null() {
                if (*current).is_free
                    && (*current).size >= size
                    && (chosen.is_null() || (*current).size < (*chosen).size)
                {
                    chosen = current;
                }
                current = (*current).next;
            }
        }
        chosen
    }

    fn find_worst_fit(&self, size: usize) -> *mut BlockHeader {
        let mut chosen: *mut BlockHeader = ptr::null_mut();
        let mut current = self.head;
        unsafe {
            while !current.is_null() {
                if (*current).is_free
                    && (*current).size >= size
                    && (chosen.is_null() || (*current).size > (*chosen).size)
                {
                    chosen = current;
                }
                current = (*current).next;
            }
        }
        chosen
    }
}

/// Iterator over the block list in address order.
///
/// Produced by [`Heap::blocks`].
pub struct Blocks<'a> {
    current: *mut BlockHeader,
    _heap: PhantomData<&'a Heap>,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        if self.current.is_null() {
            return None;
        }
        unsafe {
            let info = BlockInfo {
                addr: self.current.addr(),
                size: (*self.current).size,
                is_free: (*self.current).is_free,
            };
            self.current = (*self.current).next;
            Some(info)
        }
    }
}
