use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::mem;

use crate::iter::{Iter, Keys, Values};
use crate::tree::{LEFT, Node, RIGHT, RbTree, SENTINEL};

/// An ordered map backed by a slab-allocated red-black tree.
///
/// Entries are kept sorted by key. Lookups, insertions and removals run in
/// `O(log n)` time, and every node tracks the size of its subtree, so the
/// positional queries [OrdMap::select] and [OrdMap::rank] are `O(log n)`
/// as well.
pub struct OrdMap<K, V> {
    tree: RbTree<K, V>,
    len: usize,
}

impl<K, V> OrdMap<K, V> {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self {
            tree: RbTree::new(),
            len: 0,
        }
    }

    /// Creates an empty map with room for `capacity` entries before the
    /// backing slab reallocates.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tree: RbTree::with_capacity(capacity),
            len: 0,
        }
    }

    /// Returns the number of entries in the map, in constant time.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes all entries, keeping the allocated storage for reuse.
    pub fn clear(&mut self) {
        self.tree.clear();
        self.len = 0;
    }

    /// Gets an iterator over the entries, sorted by key.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(&self.tree, self.len)
    }

    /// Gets an iterator over the keys, in ascending order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Gets an iterator over the values, ordered by their keys.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns the entry with the smallest key, or `None` on an empty map.
    pub fn first_key_value(&self) -> Option<(&K, &V)> {
        let edge = self.tree.edge(self.tree.root()?, LEFT);
        let node = &self.tree[edge];
        Some((&node.key, &node.value))
    }

    /// Returns the entry with the largest key, or `None` on an empty map.
    pub fn last_key_value(&self) -> Option<(&K, &V)> {
        let edge = self.tree.edge(self.tree.root()?, RIGHT);
        let node = &self.tree[edge];
        Some((&node.key, &node.value))
    }

    /// Returns the entry with exactly `rank` keys before it in order, or
    /// `None` when `rank >= self.len()`.
    pub fn select(&self, rank: usize) -> Option<(&K, &V)> {
        let node = self.tree.select(rank)?;
        let node = &self.tree[node];
        Some((&node.key, &node.value))
    }
}

impl<K: Ord, V> OrdMap<K, V> {
    /// Inserts a key-value pair. When the key is already present its value
    /// is replaced and the previous one returned; the tree structure is left
    /// untouched in that case.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let mut parent = SENTINEL;
        let mut dir = LEFT;
        let mut curr = self.tree.root();
        while let Some(c) = curr {
            dir = match key.cmp(&self.tree[c].key) {
                Ordering::Less => LEFT,
                Ordering::Greater => RIGHT,
                Ordering::Equal => {
                    return Some(mem::replace(&mut self.tree[c].value, value));
                }
            };
            parent = curr;
            curr = self.tree[c].rb.children[dir];
        }
        self.tree.attach(parent, dir, Node::new(key, value));
        self.len += 1;
        None
    }

    /// Removes the entry for `key`, returning its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let z = self.tree.find(key)?;
        let (_, value) = self.tree.unlink(z);
        self.len -= 1;
        Some(value)
    }

    /// Returns a reference to the value for `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = self.tree.find(key)?;
        Some(&self.tree[node].value)
    }

    /// Returns a mutable reference to the value for `key`.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = self.tree.find(key)?;
        Some(&mut self.tree[node].value)
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.find(key).is_some()
    }

    /// Counts the keys strictly less than `key`: `Ok` when the key is
    /// present, `Err` with the rank it would occupy otherwise, following the
    /// [slice::binary_search] convention.
    pub fn rank<Q>(&self, key: &Q) -> Result<usize, usize>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.rank(key)
    }

    #[cfg(test)]
    fn is_valid(&self) {
        let count = self.tree.is_valid();
        assert_eq!(count, self.len);
    }
}

impl<K, V> Default for OrdMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for OrdMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Ord, V> FromIterator<(K, V)> for OrdMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = OrdMap::new();
        map.extend(iter);
        map
    }
}

impl<K: Ord, V> Extend<(K, V)> for OrdMap<K, V> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::collections::{BTreeMap, BTreeSet};
    use std::num::NonZero;

    #[test]
    fn test_basic_insert() {
        let mut map = OrdMap::new();
        assert_eq!(map.len(), 0);
        assert!(map.is_empty());
        assert_eq!(map.insert(1, "one"), None);
        assert_eq!(map.insert(2, "two"), None);
        assert_eq!(map.insert(3, "three"), None);
        assert_eq!(map.len(), 3);
        assert!(!map.is_empty());
        assert_eq!(map.get(&1), Some(&"one"));
        assert_eq!(map.get(&2), Some(&"two"));
        assert_eq!(map.get(&4), None);
        assert!(map.contains_key(&3));
        assert!(!map.contains_key(&4));
        map.is_valid();
    }

    #[test]
    fn test_overwrite() {
        let mut map = OrdMap::new();
        assert_eq!(map.insert(7, "a"), None);
        assert_eq!(map.insert(7, "b"), Some("a"));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&7), Some(&"b"));
        map.is_valid();
    }

    #[test]
    fn test_basic_rotation() {
        let mut map = OrdMap::new();
        for key in [5, 1, 8, 7, 9] {
            map.insert(key, key * 10);
        }
        map.is_valid();

        let rb = &map.tree;
        assert_eq!(rb.slab_len(), 5);
        assert_eq!(rb.root(), NonZero::new(1)); // 5 is the root
        assert_eq!(rb.slab(1).key, 5);
        assert_eq!(rb.slab(1).rb.parent, SENTINEL);
        assert_eq!(rb.slab(1).rb.children[0], NonZero::new(2)); // 5's left is 1
        assert_eq!(rb.slab(1).rb.children[1], NonZero::new(3)); // 5's right is 8
        assert_eq!(rb.slab(1).size, 5);
        assert_eq!(rb.slab(2).key, 1);
        assert_eq!(rb.slab(3).key, 8);
        assert_eq!(rb.slab(3).rb.children[0], NonZero::new(4)); // 8's left is 7
        assert_eq!(rb.slab(3).rb.children[1], NonZero::new(5)); // 8's right is 9
        assert_eq!(rb.slab(3).size, 3);
        assert_eq!(rb.slab(4).key, 7);
        assert_eq!(rb.slab(5).key, 9);

        map.tree.rotate(NonZero::new(1), 0); // left-rotate the root
        let rb = &map.tree;
        assert_eq!(rb.root(), NonZero::new(3)); // 8 is now the root
        assert_eq!(rb.slab(3).rb.parent, SENTINEL);
        assert_eq!(rb.slab(3).rb.children[0], NonZero::new(1)); // 8's left is 5
        assert_eq!(rb.slab(3).rb.children[1], NonZero::new(5)); // 8's right is 9
        assert_eq!(rb.slab(3).size, 5);
        assert_eq!(rb.slab(1).rb.parent, NonZero::new(3));
        assert_eq!(rb.slab(1).rb.children[0], NonZero::new(2)); // 5 keeps 1
        assert_eq!(rb.slab(1).rb.children[1], NonZero::new(4)); // 5 adopts 7
        assert_eq!(rb.slab(1).size, 3);
        assert_eq!(rb.slab(4).rb.parent, NonZero::new(1));
        assert_eq!(rb.slab(5).rb.parent, NonZero::new(3));

        map.tree.rotate(NonZero::new(3), 1); // right-rotate brings it back
        let rb = &map.tree;
        assert_eq!(rb.root(), NonZero::new(1));
        assert_eq!(rb.slab(1).rb.children[0], NonZero::new(2));
        assert_eq!(rb.slab(1).rb.children[1], NonZero::new(3));
        assert_eq!(rb.slab(1).size, 5);
        assert_eq!(rb.slab(3).rb.children[0], NonZero::new(4));
        assert_eq!(rb.slab(3).rb.children[1], NonZero::new(5));
        assert_eq!(rb.slab(3).size, 3);
        map.is_valid();
        assert_eq!(map.get(&7), Some(&70));
    }

    #[test]
    fn test_remove() {
        let mut map = OrdMap::new();
        for i in 0..10 {
            map.insert(i, i);
        }
        assert_eq!(map.remove(&3), Some(3));
        assert_eq!(map.remove(&3), None);
        assert_eq!(map.get(&3), None);
        assert_eq!(map.len(), 9);
        map.is_valid();
        // an interior node with two children swaps payloads with its successor
        assert_eq!(map.remove(&5), Some(5));
        assert!(map.keys().copied().eq([0, 1, 2, 4, 6, 7, 8, 9]));
        map.is_valid();
    }

    #[test]
    fn test_get_mut() {
        let mut map = OrdMap::new();
        map.insert(String::from("k"), 1);
        if let Some(v) = map.get_mut("k") {
            *v += 10;
        }
        assert_eq!(map.get("k"), Some(&11));
        assert_eq!(map.get_mut("missing"), None);
    }

    #[test]
    fn test_first_last() {
        let mut map: OrdMap<i32, &str> = OrdMap::new();
        assert_eq!(map.first_key_value(), None);
        assert_eq!(map.last_key_value(), None);
        map.insert(5, "five");
        map.insert(1, "one");
        map.insert(9, "nine");
        assert_eq!(map.first_key_value(), Some((&1, &"one")));
        assert_eq!(map.last_key_value(), Some((&9, &"nine")));
    }

    #[test]
    fn test_select_rank() {
        let mut map = OrdMap::new();
        assert_eq!(map.rank("a"), Err(0));
        assert_eq!(map.select(0), None);
        map.insert("d", 1);
        map.insert("b", 0);
        map.insert("f", 2);
        assert_eq!(map.select(0), Some((&"b", &0)));
        assert_eq!(map.select(1), Some((&"d", &1)));
        assert_eq!(map.select(2), Some((&"f", &2)));
        assert_eq!(map.select(3), None);
        assert_eq!(map.rank("a"), Err(0));
        assert_eq!(map.rank("b"), Ok(0));
        assert_eq!(map.rank("c"), Err(1));
        assert_eq!(map.rank("d"), Ok(1));
        assert_eq!(map.rank("f"), Ok(2));
        assert_eq!(map.rank("g"), Err(3));
    }

    #[test]
    fn test_iter() {
        let mut map = OrdMap::new();
        for i in [3, 1, 4, 1, 5, 9, 2, 6] {
            map.insert(i, i * i);
        }
        let mut iter = map.iter();
        assert_eq!(iter.len(), 7);
        assert_eq!(iter.next(), Some((&1, &1)));
        assert_eq!(iter.len(), 6);

        let keys: Vec<i32> = map.keys().copied().collect();
        assert_eq!(keys, [1, 2, 3, 4, 5, 6, 9]);
        let values: Vec<i32> = map.values().copied().collect();
        assert_eq!(values, [1, 4, 9, 16, 25, 36, 81]);

        let mut count = 0;
        for (k, v) in &map {
            assert_eq!(*v, k * k);
            count += 1;
        }
        assert_eq!(count, map.len());
        assert_eq!(
            format!("{map:?}"),
            "{1: 1, 2: 4, 3: 9, 4: 16, 5: 25, 6: 36, 9: 81}"
        );
    }

    #[test]
    fn test_clear() {
        let mut map: OrdMap<i32, i32> = (0..100).map(|i| (i, i)).collect();
        assert_eq!(map.len(), 100);
        map.is_valid();
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.get(&5), None);
        assert_eq!(map.iter().next(), None);
        map.insert(1, 1);
        assert_eq!(map.len(), 1);
        map.is_valid();
    }

    #[test]
    fn test_fill_then_drain() {
        let mut map = OrdMap::new();
        for i in 0..=1000 {
            assert_eq!(map.insert(i, i.to_string()), None);
        }
        assert_eq!(map.len(), 1001);
        map.is_valid();
        assert_eq!(map.get(&512).map(String::as_str), Some("512"));

        // empty the map from the top, keyed off the current length
        while !map.is_empty() {
            let last = (map.len() - 1) as i32;
            assert_eq!(map.remove(&last), Some(last.to_string()));
            map.is_valid();
        }
        assert_eq!(map.len(), 0);
        assert_eq!(map.get(&0), None);
        assert_eq!(map.remove(&0), None);
    }

    #[test]
    fn test_many_insert() {
        let mut map = OrdMap::new();
        let mut set = BTreeSet::new();
        let mut rand: u64 = 1123;
        for _ in 0..1000 {
            rand = rand.wrapping_mul(17).wrapping_add(255);
            map.insert(rand, ());
            set.insert(rand);
        }
        map.is_valid();
        assert_eq!(map.len(), set.len());
        assert!(map.keys().eq(set.iter()));
    }

    #[test]
    fn test_height_bound() {
        let mut map = OrdMap::new();
        for i in 0..1024 {
            map.insert(i, ());
        }
        map.is_valid();
        let h = map.tree.height();
        let n = map.len();
        assert!((h as f64) <= 2.0 * ((n + 1) as f64).log2());
    }

    #[test]
    fn test_random_insert_delete() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut map = OrdMap::new();
        let mut oracle = BTreeMap::new();
        for i in 0..10_000i32 {
            let key: u32 = rng.random_range(0..2000);
            if rng.random_bool(0.5) {
                assert_eq!(map.insert(key, i), oracle.insert(key, i));
            } else {
                assert_eq!(map.remove(&key), oracle.remove(&key));
            }
            assert_eq!(map.len(), oracle.len());
            assert_eq!(map.get(&key), oracle.get(&key));
            if i % 512 == 0 {
                map.is_valid();
                assert!(map.iter().eq(oracle.iter()));
            }
        }
        map.is_valid();
        assert!(map.iter().eq(oracle.iter()));
        for (rank, (key, _)) in oracle.iter().enumerate() {
            assert_eq!(map.rank(key), Ok(rank));
            assert_eq!(map.select(rank).map(|(k, _)| k), Some(key));
        }

        let keys: Vec<u32> = oracle.keys().copied().collect();
        for key in keys {
            assert_eq!(map.remove(&key), oracle.remove(&key));
        }
        assert!(map.is_empty());
        map.is_valid();
    }
}
