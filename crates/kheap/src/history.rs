//! Bounded record of allocator operations.
//!
//! A [`History`] captures one [`Step`] per heap operation: what was done,
//! the strategy in force, and the aggregate state of the block list right
//! after. The storage is a fixed-capacity [`ArrayVec`], so recording never
//! allocates — a recorder living inside the allocator's own clients cannot
//! call back into the allocator. When the capacity is exhausted the earliest
//! steps are retained and later ones only advance the sequence counter.
//!
//! # Examples
//!
//! ```
//! use kheap::history::{HeapOp, History};
//!
//! let mut history = History::<16>::new();
//! # let mut region = vec![0u8; 4096];
//! # unsafe { kheap::heap_init(region.as_mut_ptr(), region.len()).unwrap(); }
//!
//! let ptr = kheap::kmalloc(64);
//! kheap::record_heap_step(
//!     &mut history,
//!     HeapOp::Alloc {
//!         requested: 64,
//!         addr: ptr.addr(),
//!     },
//! );
//!
//! assert_eq!(history.steps().len(), 1);
//! ```

use arrayvec::ArrayVec;
use derive_more::Display;
use kalloc::{HeapStats, PlacementStrategy};

/// One operation performed against the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum HeapOp {
    /// The heap adopted a backing region.
    #[display("init({region_size} bytes)")]
    Init {
        /// Size of the backing region as passed to initialization.
        region_size: usize,
    },
    /// An allocation succeeded.
    #[display("alloc({requested}) -> {addr:#x}")]
    Alloc {
        /// Requested payload size in bytes, before rounding.
        requested: usize,
        /// Address of the payload handed out.
        addr: usize,
    },
    /// An allocation failed for lack of a qualifying free block.
    #[display("alloc({requested}) -> null")]
    AllocFailed {
        /// Requested payload size in bytes, before rounding.
        requested: usize,
    },
    /// A block was returned to the heap.
    #[display("free({addr:#x})")]
    Free {
        /// Address of the freed payload.
        addr: usize,
    },
    /// The placement strategy changed.
    #[display("strategy -> {strategy}")]
    SetStrategy {
        /// Strategy selected for subsequent allocations.
        strategy: PlacementStrategy,
    },
}

/// One recorded step: an operation plus the heap state right after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Zero-based position of this step in the overall operation sequence.
    pub seq: usize,
    /// Strategy active when the operation ran.
    pub strategy: PlacementStrategy,
    /// The operation itself.
    pub op: HeapOp,
    /// Block list statistics after the operation.
    pub stats: HeapStats,
}

/// Fixed-capacity log of heap steps.
#[derive(Debug, Default)]
pub struct History<const N: usize> {
    steps: ArrayVec<Step, N>,
    seq: usize,
}

impl<const N: usize> History<N> {
    /// Creates an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            steps: ArrayVec::new_const(),
            seq: 0,
        }
    }

    /// Appends a step carrying `op` with the given strategy and statistics.
    ///
    /// The sequence counter always advances; once the capacity is full the
    /// step itself is dropped.
    pub fn record(&mut self, op: HeapOp, strategy: PlacementStrategy, stats: HeapStats) {
        let step = Step {
            seq: self.seq,
            strategy,
            op,
            stats,
        };
        self.seq += 1;
        if self.steps.is_full() {
            return;
        }
        self.steps.push(step);
    }

    /// The retained steps, oldest first.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Total number of steps observed, including any dropped at capacity.
    #[must_use]
    pub fn observed(&self) -> usize {
        self.seq
    }

    /// Maximum number of retained steps.
    #[must_use]
    pub const fn capacity() -> usize {
        N
    }

    /// Discards all retained steps and resets the sequence counter.
    pub fn clear(&mut self) {
        self.steps.clear();
        self.seq = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_with_blocks(blocks: usize) -> HeapStats {
        HeapStats {
            blocks,
            ..HeapStats::default()
        }
    }

    #[test]
    fn record_assigns_consecutive_sequence_numbers() {
        let mut history = History::<4>::new();
        for i in 0..3 {
            history.record(
                HeapOp::AllocFailed { requested: i },
                PlacementStrategy::FirstFit,
                stats_with_blocks(1),
            );
        }

        let seqs: Vec<usize> = history.steps().iter().map(|step| step.seq).collect();
        assert_eq!(seqs, [0, 1, 2]);
        assert_eq!(history.observed(), 3);
    }

    #[test]
    fn capacity_saturation_keeps_oldest_steps() {
        let mut history = History::<2>::new();
        for i in 0..5 {
            history.record(
                HeapOp::Alloc {
                    requested: i,
                    addr: 0x1000 + i,
                },
                PlacementStrategy::BestFit,
                stats_with_blocks(i),
            );
        }

        assert_eq!(history.steps().len(), 2);
        assert_eq!(history.observed(), 5);
        assert!(matches!(
            history.steps()[0].op,
            HeapOp::Alloc { requested: 0, .. }
        ));
        assert_eq!(History::<2>::capacity(), 2);
    }

    #[test]
    fn clear_resets_sequence_and_storage() {
        let mut history = History::<4>::new();
        history.record(
            HeapOp::Init { region_size: 4096 },
            PlacementStrategy::FirstFit,
            stats_with_blocks(1),
        );
        history.clear();

        assert!(history.steps().is_empty());
        assert_eq!(history.observed(), 0);
    }

    #[test]
    fn ops_render_for_log_output() {
        assert_eq!(
            HeapOp::Alloc {
                requested: 64,
                addr: 0x1000,
            }
            .to_string(),
            "alloc(64) -> 0x1000"
        );
        assert_eq!(HeapOp::AllocFailed { requested: 64 }.to_string(), "alloc(64) -> null");
        assert_eq!(
            HeapOp::SetStrategy {
                strategy: PlacementStrategy::WorstFit,
            }
            .to_string(),
            "strategy -> worst-fit"
        );
    }
}
