//! Batch scheduling.
//!
//! Every registration starts out as a singleton batch covering its own range.
//! A sweep over a min-heap ordered by range start splits overlapping batches
//! at their intersection until no two batches overlap; each height then
//! belongs to at most one batch, whose handler set is exactly the handlers
//! registered for that height.

use crate::types::range::Range;

use super::heap::PriorityQueue;
use super::registry::DataHandlers;

#[derive(Debug, Clone)]
pub struct Batch {
    pub range: Range,
    pub handlers: DataHandlers,
}

impl Batch {
    pub fn new(range: Range, handlers: DataHandlers) -> Self {
        Self { range, handlers }
    }
}

/// Clip `registrations` to `run_range` and merge them into non-overlapping
/// batches sorted by ascending start height.
pub fn create_batches(registrations: Vec<Batch>, run_range: &Range) -> Vec<Batch> {
    let clipped = registrations.into_iter().filter_map(|batch| {
        batch
            .range
            .intersection(run_range)
            .map(|range| Batch::new(range, batch.handlers))
    });

    merge_batches(clipped)
}

/// Split and merge overlapping batches.
///
/// Ties on the start height are broken by the lowest registration sequence
/// number so the sweep is deterministic. Batches that are already pairwise
/// disjoint come back with their ranges unchanged.
pub fn merge_batches(batches: impl IntoIterator<Item = Batch>) -> Vec<Batch> {
    let mut heap = PriorityQueue::init(batches, |batch: &Batch| {
        (batch.range.from(), batch.handlers.first_order())
    });
    let mut merged = Vec::with_capacity(heap.len());

    while let Some(top) = heap.pop() {
        let overlap = heap
            .peek()
            .and_then(|next| top.range.intersection(&next.range));

        // Everything left in the heap starts at or after `next`, so a top
        // that misses `next` misses them all.
        let Some(shared) = overlap else {
            merged.push(top);
            continue;
        };
        let Some(next) = heap.pop() else {
            merged.push(top);
            continue;
        };

        for range in top.range.difference(&shared) {
            heap.push(Batch::new(range, top.handlers.clone()));
        }
        for range in next.range.difference(&shared) {
            heap.push(Batch::new(range, next.handlers.clone()));
        }
        heap.push(Batch::new(shared, top.handlers.merge(&next.handlers)));
    }

    merged
}

/// Number of heights up to and including `height` covered by `batches`,
/// which must be sorted by start height.
pub fn count_blocks(batches: &[Batch], height: u64) -> u64 {
    batches
        .iter()
        .take_while(|batch| height >= batch.range.from())
        .map(|batch| batch.range.len_until(height))
        .sum()
}
