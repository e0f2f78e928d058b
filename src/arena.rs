use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Stable handle into an [`Arena`]. The generation field invalidates stale references.
pub struct Id<T> {
    pub index: u32,
    pub generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    pub fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }
}

// Manual impls: derives would demand the same bounds on `T`.
impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Slot storage with generational indices and a free list.
pub struct Arena<T> {
    pub slots: Vec<Option<T>>,
    pub generations: Vec<u32>,
    free_list: Vec<u32>,
    count: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            count: 0,
        }
    }

    pub fn insert(&mut self, value: T) -> Id<T> {
        self.count += 1;
        if let Some(index) = self.free_list.pop() {
            let idx = index as usize;
            self.slots[idx] = Some(value);
            Id::new(index, self.generations[idx])
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Some(value));
            self.generations.push(0);
            Id::new(index, 0)
        }
    }

    pub fn remove(&mut self, id: Id<T>) -> Option<T> {
        let idx = id.index as usize;
        if idx >= self.slots.len() || self.generations[idx] != id.generation {
            return None;
        }
        let value = self.slots[idx].take()?;
        self.generations[idx] += 1;
        self.free_list.push(id.index);
        self.count -= 1;
        Some(value)
    }

    pub fn get(&self, id: Id<T>) -> Option<&T> {
        let idx = id.index as usize;
        if idx < self.slots.len() && self.generations[idx] == id.generation {
            self.slots[idx].as_ref()
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, id: Id<T>) -> Option<&mut T> {
        let idx = id.index as usize;
        if idx < self.slots.len() && self.generations[idx] == id.generation {
            self.slots[idx].as_mut()
        } else {
            None
        }
    }

    pub fn contains(&self, id: Id<T>) -> bool {
        self.get(id).is_some()
    }

    /// Iterate over `(Id, &T)` for every occupied slot, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> {
        self.slots.iter().enumerate().filter_map(move |(i, slot)| {
            slot.as_ref()
                .map(|value| (Id::new(i as u32, self.generations[i]), value))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Id<T>, &mut T)> {
        let generations = &self.generations;
        self.slots.iter_mut().enumerate().filter_map(move |(i, slot)| {
            slot.as_mut()
                .map(|value| (Id::new(i as u32, generations[i]), value))
        })
    }

    pub fn ids(&self) -> Vec<Id<T>> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Rebuild an arena from raw slots, e.g. after loading a save.
    pub fn from_parts(slots: Vec<Option<T>>, generations: Vec<u32>) -> Option<Self> {
        if slots.len() != generations.len() {
            return None;
        }
        let free_list = slots
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, slot)| slot.is_none())
            .map(|(i, _)| i as u32)
            .collect();
        let count = slots.iter().filter(|s| s.is_some()).count();
        Some(Self {
            slots,
            generations,
            free_list,
            count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generational_handles_invalidate_after_remove() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        assert_eq!(arena.get(a), Some(&"a"));

        assert_eq!(arena.remove(a), Some("a"));
        assert!(arena.get(a).is_none());
        assert!(arena.remove(a).is_none());

        let b = arena.insert("b");
        assert_eq!(a.index, b.index);
        assert_ne!(a.generation, b.generation);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn iter_skips_vacant_slots() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        let b = arena.insert(2);
        let c = arena.insert(3);
        arena.remove(b);

        let ids: Vec<_> = arena.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a, c]);
    }

    #[test]
    fn from_parts_reuses_vacant_slots_first() {
        let arena: Arena<u8> = Arena::from_parts(vec![Some(1), None, Some(3)], vec![0, 4, 0]).unwrap();
        assert_eq!(arena.len(), 2);

        let mut arena = arena;
        let id = arena.insert(9);
        assert_eq!(id.index, 1);
        assert_eq!(id.generation, 4);
    }
}
