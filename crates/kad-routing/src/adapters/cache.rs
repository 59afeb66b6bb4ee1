//! Key-value stores behind the [`PersistentCache`] port.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::ports::{CacheError, PersistentCache};

/// Store that accepts every write and never returns a value.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCacheStore;

impl PersistentCache for NoOpCacheStore {
    fn map_get(&self, _namespace: &str, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    fn map_set(&self, _namespace: &str, _key: &str, _value: Vec<u8>) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Process-local store, lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl PersistentCache for InMemoryCacheStore {
    fn map_get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self
            .entries
            .lock()
            .get(&(namespace.to_owned(), key.to_owned()))
            .cloned())
    }

    fn map_set(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<(), CacheError> {
        self.entries
            .lock()
            .insert((namespace.to_owned(), key.to_owned()), value);
        Ok(())
    }
}
