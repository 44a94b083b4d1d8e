//! Generation-checked slot arena.
//!
//! Backs every externally visible URS object ID. A slot's generation is
//! bumped when its value is removed, so an ID that outlived its object no
//! longer matches and lookups fail instead of returning the slot's next
//! occupant.

use std::marker::PhantomData;

use urs_types::{HandleId, NodeId, SuperId};

/// An ID made of an arena slot index and generation.
pub trait SlotId: Copy {
    fn from_parts(index: u32, generation: u32) -> Self;
    fn parts(&self) -> (u32, u32);
}

macro_rules! impl_slot_id {
    ($T:ty) => {
        impl SlotId for $T {
            fn from_parts(index: u32, generation: u32) -> Self {
                <$T>::new(index, generation)
            }

            fn parts(&self) -> (u32, u32) {
                (self.index(), self.generation())
            }
        }
    };
}

impl_slot_id!(SuperId);
impl_slot_id!(NodeId);
impl_slot_id!(HandleId);

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage keyed by generation-checked IDs.
///
/// Not synchronized; owners wrap it in a lock.
#[derive(Debug)]
pub struct Arena<I, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
    _id: PhantomData<fn() -> I>,
}

impl<I: SlotId, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: SlotId, T> Arena<I, T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
            _id: PhantomData,
        }
    }

    /// Store a value built from its own ID.
    pub fn insert_with(&mut self, make: impl FnOnce(I) -> T) -> (I, &mut T) {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        self.len += 1;
        let slot = &mut self.slots[index as usize];
        let id = I::from_parts(index, slot.generation);
        (id, slot.value.insert(make(id)))
    }

    pub fn insert(&mut self, value: T) -> I {
        self.insert_with(|_| value).0
    }

    pub fn get(&self, id: I) -> Option<&T> {
        let (index, generation) = id.parts();
        self.slots
            .get(index as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        let (index, generation) = id.parts();
        self.slots
            .get_mut(index as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Take the value out and retire the ID.
    pub fn remove(&mut self, id: I) -> Option<T> {
        let (index, generation) = id.parts();
        let slot = self.slots.get_mut(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;
        Some(value)
    }

    pub fn contains(&self, id: I) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live entries with their IDs.
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (I::from_parts(index as u32, slot.generation), value))
        })
    }
}
