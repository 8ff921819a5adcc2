use std::fmt;
use std::marker::PhantomData;

use indexmap::IndexMap;
use thiserror::Error;

use crate::{IdMap, RegistryIdx};

/// An insertion ordered map from names to values where each entry is also
/// addressable by a dense index of type `I`.
#[derive(Clone)]
pub struct Registry<I, V> {
    items: IndexMap<String, V>,
    _marker: PhantomData<I>,
}

#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum RegistryError {
    #[error("duplicate registry entry \"{0}\"")]
    Duplicate(String),
    #[error("registry is full (at most {0} entries)")]
    Full(usize),
    #[error("missing required registry entry \"{0}\"")]
    Missing(String),
    #[error("unknown registry entry \"{0}\" referenced by \"{1}\"")]
    Unknown(String, String),
}

impl<I: RegistryIdx, V> Registry<I, V> {
    pub fn new() -> Self {
        Self {
            items: IndexMap::new(),
            _marker: PhantomData,
        }
    }

    /// Adds a new entry and returns its index.
    pub fn insert(&mut self, name: impl Into<String>, item: V) -> Result<I, RegistryError> {
        if self.items.len() >= I::MAX {
            return Err(RegistryError::Full(I::MAX));
        }

        let name = name.into();
        if self.items.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        let (idx, _) = self.items.insert_full(name, item);
        Ok(I::from_index(idx))
    }

    /// Moves the entry named `name` to index 0, shifting the others back.
    /// Returns `false` if no such entry exists.
    pub fn swap_to_front(&mut self, name: &str) -> bool {
        match self.items.get_index_of(name) {
            Some(idx) => {
                self.items.move_index(idx, 0);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, idx: I) -> Option<&V> {
        self.items.get_index(idx.to_index()).map(|(_, v)| v)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&V> {
        self.items.get(name)
    }

    pub fn index_of(&self, name: &str) -> Option<I> {
        self.items.get_index_of(name).map(I::from_index)
    }

    pub fn name(&self, idx: I) -> Option<&str> {
        self.items.get_index(idx.to_index()).map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = (I, &str, &V)> + DoubleEndedIterator + '_ {
        self.items
            .iter()
            .enumerate()
            .map(|(i, (k, v))| (I::from_index(i), k.as_str(), v))
    }
}

impl<I: RegistryIdx, V> IdMap<I> for Registry<I, V> {
    fn id_count(&self) -> usize {
        self.len()
    }

    fn name_of(&self, id: I) -> Option<&str> {
        self.name(id)
    }

    fn id_of(&self, name: &str) -> Option<I> {
        self.index_of(name)
    }
}

impl<I: RegistryIdx, V> Default for Registry<I, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, V: fmt::Debug> fmt::Debug for Registry<I, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.items.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
    struct SmallId(u8);

    impl RegistryIdx for SmallId {
        const MAX: usize = 2;

        fn to_index(self) -> usize {
            self.0 as usize
        }

        fn from_index(idx: usize) -> Self {
            Self(idx as u8)
        }
    }

    #[test]
    fn insert_and_lookup() {
        let mut reg = Registry::<SmallId, i32>::new();

        assert_eq!(reg.insert("a", 10), Ok(SmallId(0)));
        assert_eq!(reg.insert("b", 20), Ok(SmallId(1)));
        assert_eq!(
            reg.insert("a", 30),
            Err(RegistryError::Full(2)),
            "capacity is checked before duplicates"
        );

        assert_eq!(reg.get(SmallId(1)), Some(&20));
        assert_eq!(reg.index_of("a"), Some(SmallId(0)));
        assert_eq!(reg.name(SmallId(1)), Some("b"));
        assert_eq!(reg.get(SmallId(5)), None);
    }

    #[test]
    fn swap_to_front_reindexes() {
        let mut reg = Registry::<SmallId, ()>::new();
        reg.insert("x", ()).unwrap();
        reg.insert("y", ()).unwrap();

        assert!(reg.swap_to_front("y"));
        assert_eq!(reg.index_of("y"), Some(SmallId(0)));
        assert_eq!(reg.index_of("x"), Some(SmallId(1)));
        assert!(!reg.swap_to_front("z"));
    }
}
