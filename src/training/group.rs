//! Single-or-keyed collections
//!
//! Models, optimizers, schedulers and losses can each be given as one value or
//! as a map from names to values. The shape is fixed at construction and the
//! trainer dispatches over it uniformly afterwards.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// One value, or several values addressed by name
#[derive(Debug, Clone, PartialEq)]
pub enum Group<T> {
    /// A single unnamed value
    Single(T),
    /// Named values, iterated in key order
    Keyed(BTreeMap<String, T>),
}

impl<T> Group<T> {
    /// Wrap a single value
    pub fn single(value: T) -> Self {
        Self::Single(value)
    }

    /// Build a keyed group from `(name, value)` pairs
    pub fn keyed<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, T)>,
    {
        Self::Keyed(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Whether the group is keyed
    pub fn is_keyed(&self) -> bool {
        matches!(self, Self::Keyed(_))
    }

    /// Number of values
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Keyed(map) => map.len(),
        }
    }

    /// Whether a keyed group has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of a keyed group, empty for a single value
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::Single(_) => Vec::new(),
            Self::Keyed(map) => map.keys().map(String::as_str).collect(),
        }
    }

    /// The single value, if this group is not keyed
    pub fn as_single(&self) -> Option<&T> {
        match self {
            Self::Single(value) => Some(value),
            Self::Keyed(_) => None,
        }
    }

    /// Mutable access to the single value
    pub fn as_single_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Single(value) => Some(value),
            Self::Keyed(_) => None,
        }
    }

    /// Value stored under `key` in a keyed group
    pub fn get(&self, key: &str) -> Option<&T> {
        match self {
            Self::Single(_) => None,
            Self::Keyed(map) => map.get(key),
        }
    }

    /// Mutable value stored under `key` in a keyed group
    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        match self {
            Self::Single(_) => None,
            Self::Keyed(map) => map.get_mut(key),
        }
    }

    /// Iterate `(key, value)`; the key is `None` for a single value
    pub fn iter(&self) -> Box<dyn Iterator<Item = (Option<&str>, &T)> + '_> {
        match self {
            Self::Single(value) => Box::new(std::iter::once((None, value))),
            Self::Keyed(map) => Box::new(map.iter().map(|(k, v)| (Some(k.as_str()), v))),
        }
    }

    /// Iterate values mutably
    pub fn values_mut(&mut self) -> Box<dyn Iterator<Item = &mut T> + '_> {
        match self {
            Self::Single(value) => Box::new(std::iter::once(value)),
            Self::Keyed(map) => Box::new(map.values_mut()),
        }
    }

    /// Check that every key of `self` exists in `other`.
    ///
    /// `collection` names `other` in the error.
    pub fn ensure_keys_in<U>(&self, other: &Group<U>, collection: &'static str) -> Result<()> {
        if let (Self::Keyed(mine), Group::Keyed(theirs)) = (self, other) {
            if let Some(missing) = mine.keys().find(|k| !theirs.contains_key(*k)) {
                return Err(Error::missing_key(missing.clone(), collection));
            }
        }
        Ok(())
    }

    /// Fallible map preserving shape and keys
    pub fn try_map<U, F>(self, mut f: F) -> Result<Group<U>>
    where
        F: FnMut(Option<&str>, T) -> Result<U>,
    {
        match self {
            Self::Single(value) => Ok(Group::Single(f(None, value)?)),
            Self::Keyed(map) => map
                .into_iter()
                .map(|(k, v)| {
                    let mapped = f(Some(&k), v)?;
                    Ok((k, mapped))
                })
                .collect::<Result<BTreeMap<_, _>>>()
                .map(Group::Keyed),
        }
    }
}
