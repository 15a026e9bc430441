use std::ops;

/// A map of `usize` to `V` designed for low-value `usize` indexes and backed by a `Vec<Option<V>>`.
#[derive(Debug, Clone)]
pub struct IndexMap<V> {
    vec: Vec<Option<V>>,
}

impl<V> Default for IndexMap<V> {
    fn default() -> Self {
        Self { vec: Vec::new() }
    }
}

impl<V> IndexMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.vec.clear();
    }

    pub fn contains(&self, i: usize) -> bool {
        self.get(i).is_some()
    }

    pub fn get(&self, i: usize) -> Option<&V> {
        self.vec.get(i)?.as_ref()
    }

    pub fn get_mut(&mut self, i: usize) -> Option<&mut V> {
        self.vec.get_mut(i)?.as_mut()
    }

    pub fn get_or_insert_with(&mut self, i: usize, f: impl FnOnce() -> V) -> &mut V {
        self.slot(i).get_or_insert_with(f)
    }

    pub fn insert(&mut self, i: usize, v: V) -> Option<V> {
        self.slot(i).replace(v)
    }

    pub fn remove(&mut self, i: usize) -> Option<V> {
        self.vec.get_mut(i)?.take()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &V)> + '_ {
        self.vec
            .iter()
            .enumerate()
            .filter_map(|(i, v)| Some((i, v.as_ref()?)))
    }

    pub fn keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.iter().map(|(i, _)| i)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    fn slot(&mut self, i: usize) -> &mut Option<V> {
        if i >= self.vec.len() {
            self.vec.resize_with(i + 1, || None);
        }
        &mut self.vec[i]
    }
}

impl<V> FromIterator<(usize, V)> for IndexMap<V> {
    fn from_iter<T: IntoIterator<Item = (usize, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (i, v) in iter {
            map.insert(i, v);
        }
        map
    }
}

impl<V> ops::Index<usize> for IndexMap<V> {
    type Output = V;

    fn index(&self, index: usize) -> &V {
        self.get(index).expect("no such index in `IndexMap`")
    }
}

const WORD_BITS: usize = u64::BITS as usize;

/// A `usize` set designed for low-value `usize` indexes, stored as a packed bit vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSet {
    words: Vec<u64>,
    len: usize,
}

impl IndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.words.clear();
        self.len = 0;
    }

    pub fn contains(&self, i: usize) -> bool {
        match self.words.get(i / WORD_BITS) {
            Some(word) => word & (1u64 << (i % WORD_BITS)) != 0,
            None => false,
        }
    }

    /// Returns `true` if the index `i` is newly inserted, false otherwise.
    pub fn insert(&mut self, i: usize) -> bool {
        let word = i / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }

        let bit = 1u64 << (i % WORD_BITS);
        let word = &mut self.words[word];
        let added = *word & bit == 0;
        if added {
            *word |= bit;
            self.len += 1;
        }
        added
    }

    /// Removes the index `i` from the set, returns true if `i` was present in the set.
    pub fn remove(&mut self, i: usize) -> bool {
        let Some(word) = self.words.get_mut(i / WORD_BITS) else {
            return false;
        };

        let bit = 1u64 << (i % WORD_BITS);
        let present = *word & bit != 0;
        if present {
            *word &= !bit;
            self.len -= 1;
        }
        present
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            (0..WORD_BITS)
                .filter(move |b| word & (1u64 << b) != 0)
                .map(move |b| w * WORD_BITS + b)
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl FromIterator<usize> for IndexSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        let mut set = Self::new();
        for i in iter {
            set.insert(i);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_set_spans_words() {
        let mut set = IndexSet::new();
        assert!(set.insert(3));
        assert!(set.insert(64));
        assert!(set.insert(130));
        assert!(!set.insert(64));
        assert_eq!(set.len(), 3);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 64, 130]);

        assert!(set.remove(64));
        assert!(!set.remove(64));
        assert!(!set.remove(1000));
        assert!(!set.contains(64));
        assert!(set.contains(130));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn index_map_sparse_keys() {
        let mut map = IndexMap::new();
        map.insert(5, "five");
        *map.get_or_insert_with(2, || "two") = "deux";
        assert_eq!(map.keys().collect::<Vec<_>>(), vec![2, 5]);
        assert_eq!(map[2], "deux");
        assert_eq!(map.remove(5), Some("five"));
        assert!(!map.contains(5));
    }
}
