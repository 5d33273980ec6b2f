use std::{borrow::Borrow, collections::HashMap, hash::Hash};

/// A map from keys to ordered lists of values.
///
/// Values under one key keep insertion order. A key disappears as soon as
/// its last value is removed, so `key_count` only counts live keys.
#[derive(Debug, Clone)]
pub struct MultiMap<K, V> {
    inner: HashMap<K, Vec<V>>,
}

impl<K, V> Default for MultiMap<K, V> {
    fn default() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> MultiMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.inner.entry(key).or_default().push(value);
    }

    /// Values for `key` in insertion order; empty when the key is absent.
    pub fn get<Q>(&self, key: &Q) -> &[V]
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Removes every value under `key` matching `pred`, dropping the key
    /// when nothing is left. Returns how many values were removed.
    pub fn remove_where<Q, F>(&mut self, key: &Q, mut pred: F) -> usize
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        F: FnMut(&V) -> bool,
    {
        let Some(values) = self.inner.get_mut(key) else {
            return 0;
        };

        let before = values.len();
        values.retain(|v| !pred(v));
        let removed = before - values.len();

        if values.is_empty() {
            self.inner.remove(key);
        }
        removed
    }

    /// Removes matching values under every key.
    pub fn retire<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&V) -> bool,
    {
        let mut removed = 0;
        self.inner.retain(|_, values| {
            let before = values.len();
            values.retain(|v| !pred(v));
            removed += before - values.len();
            !values.is_empty()
        });
        removed
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.contains_key(key)
    }

    pub fn key_count(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
