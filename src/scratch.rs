//! Caller-slot scratch allocation (§5, §9 Design Notes "Global mutable
//! buffers... become caller-slot-indexed, stack-like allocators tied to
//! a query-scope guard that restores the top-of-stack on drop").
//!
//! Each ring is a fixed-size per-slot buffer; a query takes a
//! [`ScratchGuard`] which records the current length and truncates the
//! buffer back to it on drop, so nested/successive queries on the same
//! slot reuse the same backing storage without a free list. A push past
//! the ring's capacity falls back to ordinary heap growth (`Vec::push`
//! already does this) — the "fast path never touches the heap" promise
//! holds as long as callers size the ring for their workload; overflow
//! is correctness-preserving, not fatal.

pub const MAX_PHYS_THREADS: usize = 16;

/// One bump ring per caller slot, for one kind of scratch record.
pub struct ScratchRing<T> {
    slots: Vec<Vec<T>>,
}

impl<T> Default for ScratchRing<T> {
    fn default() -> Self {
        Self { slots: arr_macro::arr![Vec::new(); 16].into() }
    }
}

impl<T> ScratchRing<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, slot: usize) -> ScratchMark {
        ScratchMark { slot, start: self.slots[slot].len() }
    }

    pub fn push(&mut self, slot: usize, value: T) -> usize {
        let ring = &mut self.slots[slot];
        ring.push(value);
        ring.len() - 1
    }

    pub fn as_slice(&self, slot: usize) -> &[T] {
        &self.slots[slot]
    }

    pub fn as_slice_from(&self, mark: &ScratchMark) -> &[T] {
        &self.slots[mark.slot][mark.start..]
    }

    /// Restores the ring to the length recorded by `mark`, dropping any
    /// records pushed since. Called explicitly rather than via `Drop`
    /// since the ring and the mark it belongs to don't share a lifetime
    /// binding convenient for RAII here.
    pub fn restore(&mut self, mark: ScratchMark) {
        self.slots[mark.slot].truncate(mark.start);
    }
}

/// A query-scope checkpoint into one slot of a [`ScratchRing`].
pub struct ScratchMark {
    slot: usize,
    start: usize,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nested_marks_roll_back_to_their_own_start() {
        let mut ring: ScratchRing<u32> = ScratchRing::new();
        let outer = ring.begin(0);
        ring.push(0, 1);
        ring.push(0, 2);
        let inner = ring.begin(0);
        ring.push(0, 3);
        assert_eq!(ring.as_slice(0), &[1, 2, 3]);
        ring.restore(inner);
        assert_eq!(ring.as_slice(0), &[1, 2]);
        ring.restore(outer);
        assert_eq!(ring.as_slice(0), &[] as &[u32]);
    }

    #[test]
    fn slots_are_independent() {
        let mut ring: ScratchRing<u32> = ScratchRing::new();
        ring.push(0, 10);
        ring.push(1, 20);
        assert_eq!(ring.as_slice(0), &[10]);
        assert_eq!(ring.as_slice(1), &[20]);
    }
}
