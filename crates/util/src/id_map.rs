use std::{mem, num::NonZero, ops};

pub type Index = u32;
pub type Generation = u32;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Id {
    index: Index,
    generation: NonZero<Generation>,
}

impl Id {
    #[inline]
    pub fn index(&self) -> Index {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> NonZero<Generation> {
        self.generation
    }
}

#[derive(Debug, Clone)]
enum Slot<V> {
    Occupied {
        value: V,
        generation: NonZero<Generation>,
    },
    Vacant {
        next_free: Index,
        // The generation of the most recent occupant, so that a re-used slot hands out a fresh
        // `Id`.
        last_generation: Generation,
    },
}

/// A map with generational index keys.
///
/// Indexes of removed entries are re-used, but every handed out `Id` stays unique because the
/// generation stored alongside the index is bumped on re-use. Lookup is a `Vec::get` plus a
/// generation comparison.
#[derive(Debug, Clone)]
pub struct IdMap<V> {
    slots: Vec<Slot<V>>,
    next_free: Index,
    occupancy: usize,
}

impl<V> Default for IdMap<V> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            next_free: 0,
            occupancy: 0,
        }
    }
}

impl<V> IdMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: V) -> Id {
        let index = self.next_free;
        let id = match self.slots.get_mut(index as usize) {
            Some(slot) => {
                let &mut Slot::Vacant {
                    next_free,
                    last_generation,
                } = slot
                else {
                    panic!("occupied slot in `IdMap` free list");
                };

                let generation = last_generation
                    .checked_add(1)
                    .and_then(NonZero::new)
                    .expect("too many `IdMap` generations");

                *slot = Slot::Occupied { value, generation };
                self.next_free = next_free;
                Id { index, generation }
            }
            None => {
                assert_eq!(index as usize, self.slots.len());
                let generation = NonZero::<Generation>::MIN;
                self.slots.push(Slot::Occupied { value, generation });
                self.next_free = index.checked_add(1).expect("too many `IdMap` entries");
                Id { index, generation }
            }
        };

        self.occupancy += 1;
        id
    }

    pub fn remove(&mut self, id: Id) -> Option<V> {
        let slot = self.slots.get_mut(id.index as usize)?;
        match slot {
            Slot::Occupied { generation, .. } if *generation == id.generation => {}
            _ => return None,
        }

        let vacant = Slot::Vacant {
            next_free: self.next_free,
            last_generation: id.generation.get(),
        };
        let Slot::Occupied { value, .. } = mem::replace(slot, vacant) else {
            unreachable!()
        };

        self.next_free = id.index;
        self.occupancy -= 1;
        Some(value)
    }

    #[inline]
    pub fn contains(&self, id: Id) -> bool {
        self.get(id).is_some()
    }

    #[inline]
    pub fn get(&self, id: Id) -> Option<&V> {
        match self.slots.get(id.index as usize)? {
            Slot::Occupied { value, generation } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, id: Id) -> Option<&mut V> {
        match self.slots.get_mut(id.index as usize)? {
            Slot::Occupied { value, generation } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.occupancy
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.occupancy == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id, &V)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { value, generation } => Some((
                    Id {
                        index: index as Index,
                        generation: *generation,
                    },
                    value,
                )),
                Slot::Vacant { .. } => None,
            })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Id, &mut V)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { value, generation } => Some((
                    Id {
                        index: index as Index,
                        generation: *generation,
                    },
                    value,
                )),
                Slot::Vacant { .. } => None,
            })
    }

    pub fn ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.iter().map(|(id, _)| id)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    pub fn retain(&mut self, mut f: impl FnMut(Id, &mut V) -> bool) {
        let doomed = self
            .iter_mut()
            .filter_map(|(id, v)| if f(id, v) { None } else { Some(id) })
            .collect::<Vec<_>>();
        for id in doomed {
            self.remove(id);
        }
    }
}

impl<V> ops::Index<Id> for IdMap<V> {
    type Output = V;

    #[inline]
    fn index(&self, id: Id) -> &V {
        self.get(id).expect("no such id in `IdMap`")
    }
}

impl<V> ops::IndexMut<Id> for IdMap<V> {
    #[inline]
    fn index_mut(&mut self, id: Id) -> &mut V {
        self.get_mut(id).expect("no such id in `IdMap`")
    }
}

/// Side storage keyed by `Id`s handed out by some paired `IdMap`.
///
/// Values are replaced on insert regardless of the stored generation, so a `SecondaryMap` can
/// be reused across re-used indexes without clearing it.
#[derive(Debug, Clone)]
pub struct SecondaryMap<V> {
    slots: Vec<Option<(NonZero<Generation>, V)>>,
    occupancy: usize,
}

impl<V> Default for SecondaryMap<V> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            occupancy: 0,
        }
    }
}

impl<V> FromIterator<(Id, V)> for SecondaryMap<V> {
    fn from_iter<T: IntoIterator<Item = (Id, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (id, v) in iter {
            map.insert(id, v);
        }
        map
    }
}

impl<V: PartialEq> PartialEq for SecondaryMap<V> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(id, v)| other.get(id) == Some(v))
    }
}

impl<V: Eq> Eq for SecondaryMap<V> {}

impl<V> SecondaryMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_mut(&mut self, index: Index) -> &mut Option<(NonZero<Generation>, V)> {
        let index = index as usize;
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        &mut self.slots[index]
    }

    /// Insert a value, returning the previous entry stored at the same index (with its `Id`).
    pub fn insert(&mut self, key: Id, val: V) -> Option<(Id, V)> {
        let slot = self.slot_mut(key.index);
        let prev = slot.replace((key.generation, val));
        match prev {
            Some((generation, prev)) => Some((
                Id {
                    index: key.index,
                    generation,
                },
                prev,
            )),
            None => {
                self.occupancy += 1;
                None
            }
        }
    }

    pub fn remove(&mut self, key: Id) -> Option<V> {
        let slot = self.slots.get_mut(key.index as usize)?;
        match slot {
            Some((generation, _)) if *generation == key.generation => {
                self.occupancy -= 1;
                slot.take().map(|(_, v)| v)
            }
            _ => None,
        }
    }

    #[inline]
    pub fn contains(&self, key: Id) -> bool {
        self.get(key).is_some()
    }

    #[inline]
    pub fn get(&self, key: Id) -> Option<&V> {
        match self.slots.get(key.index as usize)? {
            Some((generation, value)) if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn get_mut(&mut self, key: Id) -> Option<&mut V> {
        match self.slots.get_mut(key.index as usize)? {
            Some((generation, value)) if *generation == key.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_or_insert_with(&mut self, key: Id, f: impl FnOnce() -> V) -> &mut V {
        let slot = self.slot_mut(key.index);
        let fresh = match slot {
            Some((generation, _)) => *generation != key.generation,
            None => true,
        };
        if fresh {
            if slot.is_none() {
                self.occupancy += 1;
            }
            // Re-borrow after the occupancy update.
            let slot = &mut self.slots[key.index as usize];
            *slot = Some((key.generation, f()));
        }
        match &mut self.slots[key.index as usize] {
            Some((_, value)) => value,
            None => unreachable!(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.occupancy
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.occupancy == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id, &V)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let (generation, value) = slot.as_ref()?;
            Some((
                Id {
                    index: index as Index,
                    generation: *generation,
                },
                value,
            ))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Id, &mut V)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let (generation, value) = slot.as_mut()?;
            Some((
                Id {
                    index: index as Index,
                    generation: *generation,
                },
                value,
            ))
        })
    }

    pub fn ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.iter().map(|(id, _)| id)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }
}

impl<V> ops::Index<Id> for SecondaryMap<V> {
    type Output = V;

    #[inline]
    fn index(&self, id: Id) -> &V {
        self.get(id).expect("no such id in `SecondaryMap`")
    }
}

impl<V> ops::IndexMut<Id> for SecondaryMap<V> {
    #[inline]
    fn index_mut(&mut self, id: Id) -> &mut V {
        self.get_mut(id).expect("no such id in `SecondaryMap`")
    }
}
