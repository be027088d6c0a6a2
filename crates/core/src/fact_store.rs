use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{PartitionError, Result};

#[derive(Clone)]
struct Entry {
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

/// Type-indexed store holding at most one value per fact type.
///
/// Values are shared behind `Arc`, so cloning a store or merging one into
/// another never deep-copies a payload.
#[derive(Clone, Default)]
pub struct FactStore {
    entries: HashMap<TypeId, Entry>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under its own type, replacing any previous value.
    ///
    /// Storing an `Option<_>` as the value is rejected: use [`set`] to record
    /// presence or absence instead.
    ///
    /// [`set`]: FactStore::set
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> Result<()> {
        self.insert_shared(Arc::new(value))
    }

    /// Like [`insert`](FactStore::insert) for a value that is already shared.
    pub fn insert_shared<T: Any + Send + Sync>(&mut self, value: Arc<T>) -> Result<()> {
        let name = type_name::<T>();
        if is_optional(name) {
            return Err(PartitionError::OptionalFact { fact_type: name });
        }
        self.entries.insert(
            TypeId::of::<T>(),
            Entry {
                type_name: name,
                value,
            },
        );
        Ok(())
    }

    /// Register `Some(value)`, or remove the fact on `None`.
    pub fn set<T: Any + Send + Sync>(&mut self, value: Option<T>) -> Result<()> {
        match value {
            Some(value) => self.insert(value),
            None => {
                self.remove::<T>();
                Ok(())
            }
        }
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| Arc::clone(&entry.value).downcast::<T>().ok())
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Remove the fact of type `T`. Returns whether one was present.
    pub fn remove<T: Any>(&mut self) -> bool {
        self.entries.remove(&TypeId::of::<T>()).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shallow merge: every fact in `other` overwrites the same type here.
    pub fn merge_from(&mut self, other: &FactStore) {
        for (key, entry) in &other.entries {
            self.entries.insert(*key, entry.clone());
        }
    }

    /// Names of the stored fact types, sorted.
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.values().map(|e| e.type_name).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FactStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.type_names()).finish()
    }
}

fn is_optional(name: &str) -> bool {
    name.starts_with("core::option::Option<") || name.starts_with("std::option::Option<")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
