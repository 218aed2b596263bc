use std::collections::HashMap;
use std::sync::RwLock;

use crate::{RawStore, RawStoreError};

/// In-memory store backed by a hash map. Used by tests and as the spill
/// area for streams whose size is unknown up front.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RawStore for MemoryStore {
    fn store(&self, key: &str, content: &[u8]) -> Result<u64, RawStoreError> {
        let mut entries = self.entries.write().unwrap();
        entries.insert(key.to_string(), content.to_vec());
        Ok(content.len() as u64)
    }

    fn load(&self, key: &str) -> Result<Vec<u8>, RawStoreError> {
        let entries = self.entries.read().unwrap();
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| RawStoreError::NotFound(key.to_string()))
    }

    fn has(&self, key: &str) -> Result<bool, RawStoreError> {
        Ok(self.entries.read().unwrap().contains_key(key))
    }

    fn delete(&self, key: &str) -> Result<bool, RawStoreError> {
        Ok(self.entries.write().unwrap().remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, RawStoreError> {
        Ok(self.entries.read().unwrap().keys().cloned().collect())
    }

    fn size(&self, key: &str) -> Result<u64, RawStoreError> {
        let entries = self.entries.read().unwrap();
        entries
            .get(key)
            .map(|v| v.len() as u64)
            .ok_or_else(|| RawStoreError::NotFound(key.to_string()))
    }
}
