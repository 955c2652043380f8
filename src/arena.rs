// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Bump allocation inside a single physical buffer.

An [Arena] hands out offsets by advancing a high-water mark. Nothing is ever freed
individually; [Allocator::reset] returns the whole arena to empty. When an allocation does not fit,
the arena still hands out the offset and reports the capacity the backing buffer must grow to,
which is always a power of two.

Growing the backing buffer can fail, so allocation is two steps: [Allocator::plan] works out the
offset and the capacity needed without touching the arena, and [Allocator::commit] reserves the
space once the buffer is big enough.  A failed grow leaves the arena as it was.

The context only talks to arenas through [Allocator], so a smarter allocator can be
dropped in later without touching region or transfer code.
*/

use crate::bittricks::{align_up, next_pow2};
use crate::error::{Error, Result};

/// Result of a successful allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Offset of the allocation inside the backing buffer.
    pub offset: u64,
    /// One past the last byte; the arena's mark once committed.
    pub end: u64,
    /// If the backing buffer is too small, the capacity it must be grown to
    /// before `offset` can be used.
    pub resized: Option<u64>,
}

/// Offset allocator for one physical buffer.
pub trait Allocator: std::fmt::Debug + Send {
    /// Works out where `size` bytes would go, without reserving them.
    fn plan(&self, size: u64) -> Result<Allocation>;

    /// Works out a new size for the allocation at `offset` that keeps it in place.
    ///
    /// Returns `None` when the allocation cannot be resized in place, in which case
    /// the caller must allocate anew.
    fn plan_resize_last(&self, offset: u64, old_size: u64, new_size: u64) -> Option<Allocation>;

    /// Reserves a planned allocation.  The backing buffer must already be `resized`.
    fn commit(&mut self, allocation: &Allocation);

    /// Plans and commits in one step.
    fn allocate(&mut self, size: u64) -> Result<Allocation> {
        let allocation = self.plan(size)?;
        self.commit(&allocation);
        Ok(allocation)
    }

    /// Plans and commits an in-place resize in one step.
    fn try_resize_last(&mut self, offset: u64, old_size: u64, new_size: u64) -> Option<Allocation> {
        let allocation = self.plan_resize_last(offset, old_size, new_size)?;
        self.commit(&allocation);
        Some(allocation)
    }

    /// Bytes consumed so far, including alignment padding.
    fn allocated(&self) -> u64;

    /// Size the backing buffer currently has.
    fn capacity(&self) -> u64;

    /// Offset alignment applied to every allocation; 0 when unaligned.
    fn alignment(&self) -> u64;

    /// Forgets every allocation.  Capacity is kept.
    fn reset(&mut self);
}

/// High-water-mark allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arena {
    capacity: u64,
    alignment: u64,
    mark: u64,
}

impl Arena {
    pub fn new(capacity: u64, alignment: u64) -> Self {
        debug_assert!(alignment == 0 || alignment.is_power_of_two());
        Arena {
            capacity,
            alignment,
            mark: 0,
        }
    }

    fn fit(&self, offset: u64, end: u64) -> Allocation {
        Allocation {
            offset,
            end,
            resized: (end > self.capacity).then(|| next_pow2(end)),
        }
    }
}

impl Allocator for Arena {
    fn plan(&self, size: u64) -> Result<Allocation> {
        if size == 0 {
            return Err(Error::ZeroSize);
        }
        let offset = align_up(self.mark, self.alignment);
        let end = offset.checked_add(size).ok_or(Error::OutOfBounds {
            offset,
            end: u64::MAX,
            size: self.capacity,
        })?;
        Ok(self.fit(offset, end))
    }

    fn plan_resize_last(&self, offset: u64, old_size: u64, new_size: u64) -> Option<Allocation> {
        if offset.checked_add(old_size) != Some(self.mark) || new_size == 0 {
            return None;
        }
        Some(self.fit(offset, offset.checked_add(new_size)?))
    }

    fn commit(&mut self, allocation: &Allocation) {
        logwise::trace_sync!(
            "arena reserved {offset}..{end}",
            offset = allocation.offset,
            end = allocation.end
        );
        self.mark = allocation.end;
        if let Some(capacity) = allocation.resized {
            self.capacity = capacity;
        }
    }

    fn allocated(&self) -> u64 {
        self.mark
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn alignment(&self) -> u64 {
        self.alignment
    }

    fn reset(&mut self) {
        self.mark = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_offsets() {
        let mut arena = Arena::new(1024, 0);
        let a = arena.allocate(10).unwrap();
        let b = arena.allocate(20).unwrap();
        assert_eq!(
            a,
            Allocation {
                offset: 0,
                end: 10,
                resized: None
            }
        );
        assert_eq!(
            b,
            Allocation {
                offset: 10,
                end: 30,
                resized: None
            }
        );
        assert_eq!(arena.allocated(), 30);
    }

    #[test]
    fn aligned_offsets() {
        let mut arena = Arena::new(4096, 256);
        let offsets: Vec<u64> = (0..4).map(|_| arena.allocate(10).unwrap().offset).collect();
        assert_eq!(offsets, vec![0, 256, 512, 768]);
    }

    #[test]
    fn zero_size_rejected() {
        let mut arena = Arena::new(16, 0);
        assert!(matches!(arena.allocate(0), Err(Error::ZeroSize)));
        assert_eq!(arena.allocated(), 0);
    }

    #[test]
    fn growth_reports_power_of_two() {
        let mut arena = Arena::new(100, 0);
        arena.allocate(60).unwrap();
        let grown = arena.allocate(60).unwrap();
        assert_eq!(grown.offset, 60);
        assert_eq!(grown.resized, Some(128));
        assert_eq!(arena.capacity(), 128);
        // fits now
        assert_eq!(arena.allocate(8).unwrap().resized, None);
    }

    #[test]
    fn resize_last_only() {
        let mut arena = Arena::new(64, 0);
        let first = arena.allocate(16).unwrap();
        let second = arena.allocate(16).unwrap();
        assert_eq!(arena.try_resize_last(first.offset, 16, 32), None);
        let resized = arena.try_resize_last(second.offset, 16, 100).unwrap();
        assert_eq!(resized.offset, 16);
        assert_eq!(resized.resized, Some(128));
        assert_eq!(arena.allocated(), 116);
    }

    #[test]
    fn planning_reserves_nothing() {
        let mut arena = Arena::new(64, 0);
        arena.allocate(16).unwrap();
        let planned = arena.plan(100).unwrap();
        assert_eq!(planned.offset, 16);
        assert_eq!(planned.resized, Some(128));
        // the grow never happened
        assert_eq!(arena.allocated(), 16);
        assert_eq!(arena.capacity(), 64);
        assert_eq!(arena.plan_resize_last(0, 16, 200).unwrap().resized, Some(256));
        assert_eq!(arena.allocated(), 16);

        arena.commit(&planned);
        assert_eq!(arena.allocated(), 116);
        assert_eq!(arena.capacity(), 128);
    }

    #[test]
    fn reset_keeps_capacity() {
        let mut arena = Arena::new(8, 0);
        arena.allocate(20).unwrap();
        arena.reset();
        assert_eq!(arena.allocated(), 0);
        assert_eq!(arena.capacity(), 32);
        assert_eq!(arena.allocate(4).unwrap().offset, 0);
    }
}
