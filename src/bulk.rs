//! # Bulk Reads
//!
//! A [`Bulk`] owns a dynamically sized arena holding up to N consecutive
//! values of one field's type, indexed relative to a single storage cluster.
//! Bulk I/O works with two bitmasks: the required mask passed per read call
//! and the availability mask tracking which slots currently hold valid
//! values. One bulk may serve several overlapping read operations on the
//! same range; each call materializes only what is still missing.
//!
//! ## Range reuse
//!
//! A requested range lying entirely within the materialized range reuses the
//! arena as-is; any other range triggers a full reset (arena reuse when
//! capacity suffices, reallocation otherwise) and invalidates every mask.

use crate::column::ClusterIndex;
use crate::value::ValueRef;
use tracing::trace;

/// Sentinel returned by bulk read implementations that filled every requested
/// slot unconditionally, letting the caller skip per-slot mask bookkeeping.
pub const ALL_SET: usize = usize::MAX;

/// One bulk read request, windowed onto the owning arena.
///
/// `values` is `count` consecutive slots; `heap` is the arena shared by all
/// slots of the bulk (variable-length payloads accumulate there between
/// resets). Implementations must set `mask_avail[i]` for every slot they
/// fill and return the number of newly available slots, or [`ALL_SET`].
pub struct BulkSpec<'a> {
    pub first: ClusterIndex,
    pub count: usize,
    pub mask_req: &'a [bool],
    pub mask_avail: &'a mut [bool],
    pub values: &'a mut [u8],
    pub heap: &'a mut Vec<u8>,
}

/// Arena of consecutive values bound to one field, with availability
/// tracking. Created by `Field::generate_bulk`; single-owner, not shareable.
#[derive(Debug)]
pub struct Bulk {
    value_size: usize,
    size: usize,
    first: ClusterIndex,
    values: Vec<u8>,
    heap: Vec<u8>,
    mask_avail: Vec<bool>,
    n_valid: usize,
}

impl Bulk {
    pub(crate) fn new(value_size: usize) -> Self {
        Self {
            value_size,
            size: 0,
            first: ClusterIndex::INVALID,
            values: Vec::new(),
            heap: Vec::new(),
            mask_avail: Vec::new(),
            n_valid: 0,
        }
    }

    pub fn value_size(&self) -> usize {
        self.value_size
    }

    /// Number of slots in the materialized range.
    pub fn size(&self) -> usize {
        self.size
    }

    /// First index of the materialized range.
    pub fn first(&self) -> ClusterIndex {
        self.first
    }

    pub fn n_valid(&self) -> usize {
        self.n_valid
    }

    /// Allocated slot capacity, in values. Stable across sub-range requests;
    /// grows only when a reset needs more room.
    pub fn capacity(&self) -> usize {
        self.values.len() / self.value_size.max(1)
    }

    pub fn is_valid(&self, i: usize) -> bool {
        self.mask_avail[i]
    }

    /// View of slot `i` of the materialized range.
    pub fn value(&self, i: usize) -> ValueRef<'_> {
        debug_assert!(i < self.size);
        let start = i * self.value_size;
        ValueRef {
            slot: &self.values[start..start + self.value_size],
            heap: &self.heap,
        }
    }

    pub(crate) fn contains_range(&self, first: ClusterIndex, size: usize) -> bool {
        if first.cluster != self.first.cluster {
            return false;
        }
        first.index >= self.first.index
            && first.index + size as u64 <= self.first.index + self.size as u64
    }

    /// Rebinds the arena to a new range, invalidating all masks. Reuses the
    /// slot allocation when capacity suffices.
    pub(crate) fn reset(&mut self, first: ClusterIndex, size: usize) {
        trace!(
            cluster = first.cluster,
            index = first.index,
            size,
            "bulk arena reset"
        );
        let bytes = size * self.value_size;
        if self.values.len() < bytes {
            self.values.resize(bytes, 0);
        }
        self.values[..bytes].fill(0);
        self.heap.clear();
        self.mask_avail.clear();
        self.mask_avail.resize(size, false);
        self.first = first;
        self.size = size;
        self.n_valid = 0;
    }

    /// Offset of `first` within the materialized range.
    pub(crate) fn offset_of(&self, first: ClusterIndex) -> usize {
        (first.index - self.first.index) as usize
    }

    /// Simultaneous access to the slot region, availability mask, and heap.
    pub(crate) fn parts(&mut self) -> (&mut [u8], &mut [bool], &mut Vec<u8>) {
        (&mut self.values, &mut self.mask_avail, &mut self.heap)
    }

    /// Folds a read result into the valid-slot count.
    pub(crate) fn note_read(&mut self, n_read: usize, offset: usize, count: usize) {
        if n_read == ALL_SET {
            if offset == 0 && count == self.size {
                self.n_valid = self.size;
            } else {
                self.n_valid = self.mask_avail.iter().filter(|&&m| m).count();
            }
        } else {
            self.n_valid += n_read;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_range_is_contained() {
        let mut bulk = Bulk::new(8);
        bulk.reset(ClusterIndex::new(0, 10), 10);
        assert!(bulk.contains_range(ClusterIndex::new(0, 12), 6));
        assert!(bulk.contains_range(ClusterIndex::new(0, 10), 10));
        assert!(!bulk.contains_range(ClusterIndex::new(0, 8), 4));
        assert!(!bulk.contains_range(ClusterIndex::new(0, 25), 5));
        assert!(!bulk.contains_range(ClusterIndex::new(1, 12), 2));
    }

    #[test]
    fn reset_reuses_capacity_for_smaller_ranges() {
        let mut bulk = Bulk::new(8);
        bulk.reset(ClusterIndex::new(0, 0), 16);
        let cap = bulk.capacity();
        bulk.reset(ClusterIndex::new(0, 100), 4);
        assert_eq!(bulk.capacity(), cap);
        assert_eq!(bulk.size(), 4);
        assert_eq!(bulk.n_valid(), 0);
    }

    #[test]
    fn note_read_counts_all_set_for_full_range() {
        let mut bulk = Bulk::new(4);
        bulk.reset(ClusterIndex::new(0, 0), 3);
        let (_, mask, _) = bulk.parts();
        mask.fill(true);
        bulk.note_read(ALL_SET, 0, 3);
        assert_eq!(bulk.n_valid(), 3);
    }

    #[test]
    fn note_read_recounts_all_set_for_sub_range() {
        let mut bulk = Bulk::new(4);
        bulk.reset(ClusterIndex::new(0, 0), 4);
        {
            let (_, mask, _) = bulk.parts();
            mask[1] = true;
            mask[2] = true;
        }
        bulk.note_read(ALL_SET, 1, 2);
        assert_eq!(bulk.n_valid(), 2);
    }
}
