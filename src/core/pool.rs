//! Fixed-Capacity Object Pool
//!
//! Preallocated slot arena plus a free list of slot indices. Acquire and
//! release are O(1) and never allocate after construction.

/// Handle to a live pool slot.
///
/// Handles are plain indices; releasing a handle invalidates it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolHandle(u32);

impl PoolHandle {
    /// Slot index backing this handle.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Fixed-capacity pool of `T`.
#[derive(Debug, Clone)]
pub struct Pool<T> {
    slots: Vec<T>,
    in_use: Vec<bool>,
    free: Vec<u32>,
}

impl<T: Default> Pool<T> {
    /// Preallocate `capacity` default-initialized slots.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, T::default);

        // Reverse so slot 0 is handed out first.
        let free = (0..capacity as u32).rev().collect();

        Self {
            slots,
            in_use: vec![false; capacity],
            free,
        }
    }
}

impl<T> Pool<T> {
    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently handed out.
    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Number of slots available.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Take a free slot, or `None` when the pool is exhausted.
    pub fn acquire(&mut self) -> Option<PoolHandle> {
        let idx = self.free.pop()?;
        self.in_use[idx as usize] = true;
        Some(PoolHandle(idx))
    }

    /// Take a free slot and overwrite it with `value`.
    pub fn insert(&mut self, value: T) -> Option<PoolHandle> {
        let handle = self.acquire()?;
        self.slots[handle.index()] = value;
        Some(handle)
    }

    /// Return a slot to the free list.
    ///
    /// Returns `false` if the handle was not live (double release).
    pub fn release(&mut self, handle: PoolHandle) -> bool {
        match self.in_use.get_mut(handle.index()) {
            Some(live) if *live => {
                *live = false;
                self.free.push(handle.0);
                true
            }
            _ => false,
        }
    }

    /// Borrow a live slot.
    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        if self.is_live(handle) {
            self.slots.get(handle.index())
        } else {
            None
        }
    }

    /// Mutably borrow a live slot.
    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        if self.is_live(handle) {
            self.slots.get_mut(handle.index())
        } else {
            None
        }
    }

    /// True if `handle` refers to a slot currently handed out.
    pub fn is_live(&self, handle: PoolHandle) -> bool {
        self.in_use.get(handle.index()).copied().unwrap_or(false)
    }
}

// =============================================================================
// TESTS
// =============================================================================
