//! Slot arena for fixed-shape objects
//!
//! `SlotCache` hands out `SlotId` handles into a contiguous region of slots.
//! Handles are indices, not addresses: growth reallocates the region but
//! never invalidates a handle, so callers may keep ids across any number of
//! allocations. Tree edges stored inside the arena are themselves `SlotId`s
//! for the same reason.
//!
//! Every slot is either free or holds a fully initialised object: `alloc`
//! resets the slot through the constructor supplied at creation before
//! returning it.

/// Handle to a slot in a [`SlotCache`]. Stable across arena growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u32);

impl SlotId {
    /// The slot's position in arena order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A growable arena of fixed-shape slots with tracked occupancy.
pub struct SlotCache<T> {
    slots: Vec<T>,
    used: Vec<bool>,
    /// High-water mark: slots at or beyond this index have never been handed out.
    assigned: usize,
    /// Previously deallocated slots, reused before the high-water mark advances.
    free: Vec<u32>,
    nr_used: usize,
    ctor: fn() -> T,
}

impl<T> SlotCache<T> {
    /// Creates a cache of `initial` slots, each initialised with `ctor`.
    pub fn new(initial: usize, ctor: fn() -> T) -> Self {
        let initial = initial.max(1);
        Self {
            slots: (0..initial).map(|_| ctor()).collect(),
            used: vec![false; initial],
            assigned: 0,
            free: Vec::new(),
            nr_used: 0,
            ctor,
        }
    }

    /// Total number of slots currently backing the arena.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live objects.
    pub fn nr_used(&self) -> usize {
        self.nr_used
    }

    /// High-water mark of slots ever handed out since the last
    /// [`clear_all`](Self::clear_all).
    pub fn assigned(&self) -> usize {
        self.assigned
    }

    /// Returns true when `id` addresses a slot inside the assigned region.
    pub fn in_bounds(&self, id: SlotId) -> bool {
        id.index() < self.assigned
    }

    /// Claims a free slot, doubling capacity when none remain.
    ///
    /// The returned slot is reset to its constructed state. Ids handed out
    /// earlier stay valid across the growth.
    pub fn alloc(&mut self) -> SlotId {
        let idx = if let Some(idx) = self.free.pop() {
            idx as usize
        } else {
            if self.assigned == self.slots.len() {
                self.grow();
            }
            let idx = self.assigned;
            self.assigned += 1;
            idx
        };

        self.slots[idx] = (self.ctor)();
        self.used[idx] = true;
        self.nr_used += 1;
        SlotId(idx as u32)
    }

    /// Releases a slot back to the free list.
    pub fn dealloc(&mut self, id: SlotId) {
        let idx = id.index();
        if !self.used[idx] {
            return;
        }
        self.slots[idx] = (self.ctor)();
        self.used[idx] = false;
        self.nr_used -= 1;
        self.free.push(idx as u32);
    }

    /// Marks every slot free and resets the high-water mark.
    pub fn clear_all(&mut self) {
        for flag in &mut self.used {
            *flag = false;
        }
        self.assigned = 0;
        self.free.clear();
        self.nr_used = 0;
    }

    /// Shared access to a live slot.
    ///
    /// # Panics
    ///
    /// Panics if `id` addresses a free slot.
    pub fn get(&self, id: SlotId) -> &T {
        assert!(self.used[id.index()], "access to free slot {:?}", id);
        &self.slots[id.index()]
    }

    /// Exclusive access to a live slot.
    ///
    /// # Panics
    ///
    /// Panics if `id` addresses a free slot.
    pub fn get_mut(&mut self, id: SlotId) -> &mut T {
        assert!(self.used[id.index()], "access to free slot {:?}", id);
        &mut self.slots[id.index()]
    }

    /// Iterates live slots in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots[..self.assigned]
            .iter()
            .enumerate()
            .filter(move |(i, _)| self.used[*i])
            .map(|(i, slot)| (SlotId(i as u32), slot))
    }

    fn grow(&mut self) {
        let grow_by = self.slots.len();
        self.slots.extend((0..grow_by).map(|_| (self.ctor)()));
        self.used.extend(std::iter::repeat(false).take(grow_by));
        tracing::debug!(capacity = self.slots.len(), "slot cache grown");
    }
}
