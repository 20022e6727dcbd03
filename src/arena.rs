//! Generational slot map used for every owned entity list.
//!
//! Items live densely in a `Vec` so iteration is cache friendly and removal is
//! an O(1) swap-remove. Handles go through a slot table holding the dense
//! position and a generation counter, so a handle to a removed item can never
//! reach the item that later reuses its slot.
use std::{fmt, hash, marker::PhantomData};

pub struct Handle<T> {
    slot: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    const fn new(slot: u32, generation: u32) -> Self {
        Self {
            slot,
            generation,
            _marker: PhantomData,
        }
    }

    /// Slot index, stable for the lifetime of the item
    #[must_use]
    pub const fn slot(self) -> u32 {
        self.slot
    }
}

// Manual impls so that `T` itself needs none of these traits
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> hash::Hash for Handle<T> {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.slot.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Handle({}v{})", self.slot, self.generation)
    }
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    dense: u32,
    generation: u32,
    occupied: bool,
}

pub struct Arena<T> {
    items: Vec<T>,
    owners: Vec<u32>, // Slot of each dense item
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            owners: Vec::new(),
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// # Panics
    /// Will panic if more than `u32::MAX` items are stored
    pub fn insert(&mut self, item: T) -> Handle<T> {
        let dense = u32::try_from(self.items.len())
            .unwrap_or_else(|_| unreachable!("arena capacity exceeded"));
        let slot = if let Some(slot) = self.free.pop() {
            let s = &mut self.slots[slot as usize];
            s.dense = dense;
            s.occupied = true;
            slot
        } else {
            let slot = u32::try_from(self.slots.len())
                .unwrap_or_else(|_| unreachable!("arena capacity exceeded"));
            self.slots.push(Slot {
                dense,
                generation: 0,
                occupied: true,
            });
            slot
        };
        self.items.push(item);
        self.owners.push(slot);
        Handle::new(slot, self.slots[slot as usize].generation)
    }

    /// Removes and returns the item, or `None` for a stale handle
    #[allow(clippy::cast_possible_truncation)] // `insert` bounds the length
    pub fn remove(&mut self, handle: Handle<T>) -> Option<T> {
        let dense = self.dense_index(handle)?;
        let last = self.items.len() - 1;
        if dense != last {
            // The last item moves into the hole so its slot must follow
            let moved_slot = self.owners[last];
            self.slots[moved_slot as usize].dense = dense as u32;
        }
        self.owners.swap_remove(dense);
        let slot = &mut self.slots[handle.slot as usize];
        slot.occupied = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.slot);
        Some(self.items.swap_remove(dense))
    }

    #[must_use]
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.dense_index(handle).map(|i| &self.items[i])
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.dense_index(handle).map(|i| &mut self.items[i])
    }

    #[must_use]
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.dense_index(handle).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.owners.iter().zip(&self.items).map(|(slot, item)| {
            (
                Handle::new(*slot, self.slots[*slot as usize].generation),
                item,
            )
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        let slots = &self.slots;
        self.owners.iter().zip(self.items.iter_mut()).map(|(slot, item)| {
            (Handle::new(*slot, slots[*slot as usize].generation), item)
        })
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }

    #[must_use]
    pub fn handles(&self) -> Vec<Handle<T>> {
        self.iter().map(|(h, _)| h).collect()
    }

    fn dense_index(&self, handle: Handle<T>) -> Option<usize> {
        let slot = self.slots.get(handle.slot as usize)?;
        (slot.occupied && slot.generation == handle.generation)
            .then_some(slot.dense as usize)
    }
}
