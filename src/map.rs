/// Hash map data structure.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// A hash map that remembers insertion order.
///
/// Iteration yields entries in the order their keys were first inserted.
/// Re-inserting an existing key replaces the value but keeps its position.
/// Removing a key and inserting it again moves it to the end.
pub struct OrderMap<K, V> {
    /// Index of the next entry to be inserted.
    index: usize,
    /// The underlying hash map.
    map: HashMap<K, Value<V>>,
}

/// A wrapper type for storing the insertion index.
#[derive(Debug, PartialEq, Eq)]
struct Value<V> {
    /// Index of the value.
    index: usize,
    /// The actual value.
    value: V,
}

impl<K, V> PartialEq for OrderMap<K, V>
where
    K: Eq + Hash,
    V: PartialEq,
{
    fn eq(&self, other: &OrderMap<K, V>) -> bool {
        self.index == other.index && self.map == other.map
    }
}

impl<K, V> Eq for OrderMap<K, V>
where
    K: Eq + Hash,
    V: Eq,
{
}

impl<K, V> fmt::Debug for OrderMap<K, V>
where
    K: Eq + Hash + fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V> Default for OrderMap<K, V>
where
    K: Eq + Hash,
{
    fn default() -> OrderMap<K, V> {
        OrderMap::new()
    }
}

impl<K, V> OrderMap<K, V>
where
    K: Eq + Hash,
{
    /// Creates a new `OrderMap`.
    pub fn new() -> OrderMap<K, V> {
        OrderMap {
            index: 0,
            map: HashMap::new(),
        }
    }

    /// Returns true if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Checks if the map contains a key.
    pub fn contains(&self, k: &K) -> bool {
        self.map.contains_key(k)
    }

    /// Inserts an entry into the map.
    pub fn insert(&mut self, k: K, value: V) {
        if let Some(slot) = self.map.get_mut(&k) {
            slot.value = value;
            return;
        }
        let index = self.index;
        self.index += 1;
        self.map.insert(k, Value { index, value });
    }

    /// Gets the value for a key, inserting one made by `make` if absent.
    pub fn get_or_insert_with<F>(&mut self, k: K, make: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        let index = &mut self.index;
        &mut self
            .map
            .entry(k)
            .or_insert_with(|| {
                let value = Value {
                    index: *index,
                    value: make(),
                };
                *index += 1;
                value
            })
            .value
    }

    /// Removes an entry from the map, returning its value.
    pub fn remove(&mut self, k: &K) -> Option<V> {
        self.map.remove(k).map(|v| v.value)
    }

    /// Returns an iterator over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        let mut entries: Vec<_> = self.map.iter().collect();
        entries.sort_by_key(|(_, v)| v.index);
        entries.into_iter().map(|(k, v)| (k, &v.value))
    }

    /// Returns an iterator over the keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    /// Consumes the map, returning its values in insertion order.
    pub fn into_values(self) -> Vec<V> {
        let mut entries: Vec<_> = self.map.into_values().collect();
        entries.sort_by_key(|v| v.index);
        entries.into_iter().map(|v| v.value).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_in_insertion_order() {
        let mut map = OrderMap::new();
        for (i, name) in ["zeta", "alpha", "mid", "beta"].iter().enumerate() {
            map.insert(*name, i);
        }
        let keys: Vec<_> = map.keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid", "beta"]);
    }

    #[test]
    fn reinsert_keeps_position() {
        let mut map: OrderMap<&str, u32> = OrderMap::new();
        map.insert("a", 1);
        map.insert("b", 2);
        map.insert("a", 3);
        let entries: Vec<_> = map.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(entries, vec![("a", 3), ("b", 2)]);
    }

    #[test]
    fn remove_then_insert_moves_to_end() {
        let mut map: OrderMap<&str, u32> = OrderMap::new();
        map.insert("a", 1);
        map.insert("b", 2);
        assert_eq!(map.remove(&"a"), Some(1));
        map.insert("a", 4);
        assert_eq!(map.into_values(), vec![2, 4]);
    }

    #[test]
    fn get_or_insert_with_appends_once() {
        let mut map: OrderMap<String, Vec<u32>> = OrderMap::new();
        map.get_or_insert_with("t".to_string(), Vec::new).push(1);
        map.get_or_insert_with("u".to_string(), Vec::new).push(2);
        map.get_or_insert_with("t".to_string(), Vec::new).push(3);
        assert!(map.contains(&"u".to_string()));
        assert_eq!(map.into_values(), vec![vec![1, 3], vec![2]]);
    }
}
