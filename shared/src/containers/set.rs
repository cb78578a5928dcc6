use std::hash::Hash;

use super::FixedMap;

/// A fixed-capacity set, implemented as a thin wrapper over [`FixedMap`]
/// with a unit value — mirroring the original `StackSet<T, N>`, which was
/// itself defined as `StackMap<T, uint8_t, N>`.
pub struct FixedSet<T, const N: usize> {
    inner: FixedMap<T, (), N>,
}

impl<T, const N: usize> FixedSet<T, N>
where
    T: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            inner: FixedMap::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> bool {
        self.inner.put(value, ())
    }

    pub fn contains(&self, value: &T) -> bool {
        self.inner.contains_key(value)
    }

    pub fn remove(&mut self, value: &T) -> bool {
        self.inner.remove(value).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    pub fn clear(&mut self) {
        self.inner.clear()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inner.keys()
    }
}

impl<T, const N: usize> Default for FixedSet<T, N>
where
    T: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
