//! Kernel-facing heap interface for the MemFlex project.
//!
//! This crate owns the single process-wide [`kalloc::Heap`] instance and
//! exposes the C-flavored `kmalloc` family on top of it. Every entry point
//! takes one spin mutex around the entire list traversal and mutation, which
//! is the mutual-exclusion scope the core's single-caller contract requires;
//! no finer-grained locking is possible because the address-ordering
//! invariant spans the whole block list on every call.
//!
//! # Usage Example
//!
//! ```rust
//! use kheap::PlacementStrategy;
//!
//! let mut region = vec![0u8; 4096];
//! unsafe {
//!     kheap::heap_init(region.as_mut_ptr(), region.len()).unwrap();
//! }
//! kheap::set_allocation_algorithm(PlacementStrategy::FirstFit);
//!
//! let ptr = kheap::kmalloc(128);
//! assert!(!ptr.is_null());
//! unsafe {
//!     kheap::kfree(ptr);
//! }
//! ```
//!
//! # Error Handling
//!
//! Allocation failure is reported by a null pointer, the only signaled
//! condition on the allocation path. Initialization preconditions are
//! upgraded to a checked [`HeapInitError`]; contract violations on the free
//! path trip assertions in the core rather than corrupting the list.

#![cfg_attr(not(test), no_std)]

pub mod history;

use core::ptr;

use kalloc::{Heap, MIN_REGION_SIZE};
use snafu::{Location, Snafu, ensure};
use spin::Mutex;

pub use kalloc::{BlockInfo, HeapStats, PlacementStrategy};

use crate::history::{HeapOp, History};

static HEAP: Mutex<Heap> = Mutex::new(Heap::empty());

/// Error returned by [`heap_init`] when the backing region is unusable.
#[derive(Debug, Snafu)]
pub enum HeapInitError {
    /// The caller passed a null region pointer.
    #[snafu(display("backing region pointer is null"))]
    NullRegion {
        #[snafu(implicit)]
        location: Location,
    },
    /// The region cannot hold even one block.
    #[snafu(display("region of {region_size} bytes cannot hold a block (minimum {min} bytes)"))]
    RegionTooSmall {
        region_size: usize,
        min: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Adopts `region` as the backing memory of the process-wide heap.
///
/// The previous block list, if any, is abandoned wholesale; pointers handed
/// out before a re-initialization must never be passed back in.
///
/// # Safety
///
/// The caller must ensure that:
///
/// - the span `region..region + region_size` is valid, writable memory used
///   by nothing else
/// - the region stays valid for as long as the heap hands out pointers into
///   it
pub unsafe fn heap_init(region: *mut u8, region_size: usize) -> Result<(), HeapInitError> {
    ensure!(!region.is_null(), NullRegionSnafu);
    ensure!(
        region_size >= MIN_REGION_SIZE,
        RegionTooSmallSnafu {
            region_size,
            min: MIN_REGION_SIZE,
        }
    );
    unsafe { HEAP.lock().init(region, region_size) };
    Ok(())
}

/// Selects the placement strategy used by subsequent allocations.
///
/// Pure state mutation: blocks that are already placed never move.
pub fn set_allocation_algorithm(strategy: PlacementStrategy) {
    HEAP.lock().set_strategy(strategy);
}

/// Allocates `size` bytes from the process-wide heap.
///
/// Returns null when no free block satisfies the request, when `size` is 0,
/// or before [`heap_init`]. The heap is untouched on failure.
#[must_use]
pub fn kmalloc(size: usize) -> *mut u8 {
    HEAP.lock().allocate(size).unwrap_or(ptr::null_mut())
}

/// Allocates zeroed memory for `count` elements of `size` bytes each.
///
/// Returns null when `count * size` overflows, when the product is 0, or on
/// exhaustion.
#[must_use]
pub fn kcalloc(count: usize, size: usize) -> *mut u8 {
    let Some(total) = count.checked_mul(size) else {
        return ptr::null_mut();
    };
    let ptr = kmalloc(total);
    if !ptr.is_null() {
        unsafe { ptr.write_bytes(0, total) };
    }
    ptr
}

/// Returns a block to the process-wide heap.
///
/// Adjacent free neighbors are coalesced before the call returns. Freeing a
/// null pointer is a no-op.
///
/// # Safety
///
/// `ptr` must have been returned by [`kmalloc`], [`kcalloc`] or [`krealloc`]
/// since the last [`heap_init`], must not have been freed already, and the
/// memory must no longer be in use.
pub unsafe fn kfree(ptr: *mut u8) {
    unsafe { HEAP.lock().free(ptr) }
}

/// Resizes an allocation, preserving the common prefix of the payload.
///
/// A null `old` behaves like [`kmalloc`]; `new_size` 0 frees `old` and
/// returns null. On exhaustion the old block is left untouched and null is
/// returned.
///
/// # Safety
///
/// `old` must be null or a live allocation of this heap, and must no longer
/// be accessed after a successful call.
pub unsafe fn krealloc(old: *mut u8, new_size: usize) -> *mut u8 {
    if old.is_null() {
        return kmalloc(new_size);
    }
    if new_size == 0 {
        unsafe { kfree(old) };
        return ptr::null_mut();
    }

    let old_size = unsafe { usable_size(old) };
    let new = kmalloc(new_size);
    if new.is_null() {
        return ptr::null_mut();
    }
    unsafe {
        ptr::copy_nonoverlapping(old, new, old_size.min(new_size));
        kfree(old);
    }
    new
}

/// Granted payload capacity of a live allocation.
///
/// May exceed the requested size due to rounding or an unsplit surplus.
///
/// # Safety
///
/// `ptr` must be a live allocation of the process-wide heap.
#[must_use]
pub unsafe fn usable_size(ptr: *mut u8) -> usize {
    unsafe { HEAP.lock().usable_size(ptr) }
}

/// Aggregate statistics of the process-wide heap.
#[must_use]
pub fn heap_stats() -> HeapStats {
    HEAP.lock().stats()
}

/// Captures the post-operation state of the process-wide heap into
/// `history`, pairing `op` with the active strategy and fresh statistics.
pub fn record_heap_step<const N: usize>(history: &mut History<N>, op: HeapOp) {
    let heap = HEAP.lock();
    history.record(op, heap.strategy(), heap.stats());
}

#[cfg(test)]
mod tests {
    use core::alloc::Layout;

    use kalloc::HEADER_OVERHEAD;

    use super::*;

    /// The heap is process-wide state; tests serialize on this lock and
    /// re-initialize the heap before touching it.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    fn with_heap<F>(region_size: usize, test_fn: F)
    where
        F: FnOnce(),
    {
        let _guard = TEST_LOCK.lock();
        unsafe {
            let layout = Layout::from_size_align(region_size, 16).unwrap();
            let region = std::alloc::alloc(layout);
            heap_init(region, region_size).unwrap();
            set_allocation_algorithm(PlacementStrategy::FirstFit);
            test_fn();
            std::alloc::dealloc(region, layout);
        }
    }

    #[test]
    fn full_region_reclamation_end_to_end() {
        with_heap(4096, || unsafe {
            let p1 = kmalloc(100);
            let p2 = kmalloc(100);
            let p3 = kmalloc(100);
            assert!(!p1.is_null() && !p2.is_null() && !p3.is_null());

            kfree(p1);
            kfree(p3);
            kfree(p2);

            let stats = heap_stats();
            assert_eq!(stats.blocks, 1);
            assert_eq!(stats.free_bytes, 4096 - HEADER_OVERHEAD);
            assert_eq!(stats.used_bytes, 0);
        });
    }

    #[test]
    fn init_rejects_unusable_regions() {
        let _guard = TEST_LOCK.lock();
        unsafe {
            assert!(matches!(
                heap_init(ptr::null_mut(), 4096),
                Err(HeapInitError::NullRegion { .. })
            ));

            let mut tiny = [0u8; 16];
            assert!(matches!(
                heap_init(tiny.as_mut_ptr(), tiny.len()),
                Err(HeapInitError::RegionTooSmall { .. })
            ));
        }
    }

    #[test]
    fn kmalloc_returns_null_on_exhaustion() {
        with_heap(256, || {
            assert!(kmalloc(512).is_null());
            let p = kmalloc(256 - HEADER_OVERHEAD);
            assert!(!p.is_null());
            assert!(kmalloc(8).is_null());
        });
    }

    #[test]
    fn kfree_null_is_a_no_op() {
        with_heap(256, || unsafe {
            kfree(ptr::null_mut());
            assert_eq!(heap_stats().blocks, 1);
        });
    }

    #[test]
    fn strategy_selection_routes_through_facade() {
        with_heap(4096, || unsafe {
            let _p1 = kmalloc(100);
            let p2 = kmalloc(500);
            let _p3 = kmalloc(100);
            let p4 = kmalloc(200);
            let _p5 = kmalloc(100);
            let _fill = kmalloc(2500);

            kfree(p2);
            kfree(p4);

            set_allocation_algorithm(PlacementStrategy::BestFit);
            let p6 = kmalloc(150);
            assert_eq!(p6, p4);

            kfree(p6);
            set_allocation_algorithm(PlacementStrategy::WorstFit);
            let p7 = kmalloc(150);
            assert_eq!(p7, p2);
        });
    }

    #[test]
    fn kcalloc_zeroes_recycled_memory() {
        with_heap(4096, || unsafe {
            let p = kmalloc(64);
            p.write_bytes(0xAA, 64);
            kfree(p);

            let q = kcalloc(8, 8);
            assert_eq!(q, p);
            for i in 0..64 {
                assert_eq!(q.add(i).read(), 0);
            }
            kfree(q);
        });
    }

    #[test]
    fn kcalloc_rejects_overflowing_requests() {
        with_heap(256, || {
            assert!(kcalloc(usize::MAX, 2).is_null());
            assert!(kcalloc(0, 8).is_null());
            assert_eq!(heap_stats().blocks, 1);
        });
    }

    #[test]
    fn krealloc_preserves_payload_prefix() {
        with_heap(4096, || unsafe {
            let p = kmalloc(32);
            for i in 0..32 {
                p.add(i).write(i as u8);
            }

            let grown = krealloc(p, 64);
            assert!(!grown.is_null());
            for i in 0..32 {
                assert_eq!(grown.add(i).read(), i as u8);
            }

            let shrunk = krealloc(grown, 16);
            assert!(!shrunk.is_null());
            for i in 0..16 {
                assert_eq!(shrunk.add(i).read(), i as u8);
            }
            kfree(shrunk);
        });
    }

    #[test]
    fn krealloc_edge_cases_match_kmalloc_and_kfree() {
        with_heap(4096, || unsafe {
            let p = krealloc(ptr::null_mut(), 32);
            assert!(!p.is_null());

            assert!(krealloc(p, 0).is_null());
            assert_eq!(heap_stats().used_bytes, 0);
        });
    }

    #[test]
    fn krealloc_failure_leaves_old_block_live() {
        with_heap(256, || unsafe {
            let p = kmalloc(64);
            p.write_bytes(0x5A, 64);

            assert!(krealloc(p, 4096).is_null());
            for i in 0..64 {
                assert_eq!(p.add(i).read(), 0x5A);
            }
            kfree(p);
        });
    }

    #[test]
    fn usable_size_reports_granted_capacity() {
        with_heap(4096, || unsafe {
            let p = kmalloc(100);
            assert_eq!(usable_size(p), 104);
            kfree(p);
        });
    }

    #[test]
    fn history_captures_steps_via_facade() {
        with_heap(4096, || unsafe {
            let mut history = History::<8>::new();

            let p = kmalloc(100);
            record_heap_step(
                &mut history,
                HeapOp::Alloc {
                    requested: 100,
                    addr: p.addr(),
                },
            );
            kfree(p);
            record_heap_step(&mut history, HeapOp::Free { addr: p.addr() });

            let steps = history.steps();
            assert_eq!(steps.len(), 2);
            assert_eq!(steps[0].seq, 0);
            assert_eq!(steps[0].strategy, PlacementStrategy::FirstFit);
            assert_eq!(steps[0].stats.used_bytes, 104);
            assert_eq!(steps[1].stats.blocks, 1);
            assert_eq!(steps[1].stats.used_bytes, 0);
        });
    }
}
