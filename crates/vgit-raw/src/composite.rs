use std::collections::HashSet;
use std::sync::Arc;

use crate::{RawStore, RawStoreError};

/// One writable primary store layered over read-only fallbacks.
///
/// Reads probe the primary first, then the fallbacks in registration
/// order. Writes and deletes touch only the primary. This is how the
/// pack layer joins the read path: each pack directory registers as a
/// fallback and the object store on top never learns where a value
/// actually lives.
pub struct CompositeStore {
    primary: Box<dyn RawStore>,
    fallbacks: Vec<Arc<dyn RawStore>>,
}

impl CompositeStore {
    pub fn new(primary: Box<dyn RawStore>) -> Self {
        Self {
            primary,
            fallbacks: Vec::new(),
        }
    }

    /// Register a read-only fallback. Later registrations are probed later.
    pub fn add_fallback(&mut self, fallback: Arc<dyn RawStore>) {
        self.fallbacks.push(fallback);
    }

    pub fn primary(&self) -> &dyn RawStore {
        self.primary.as_ref()
    }

    /// Run `f` against the first layer that has `key`.
    fn first_hit<T>(
        &self,
        key: &str,
        f: impl Fn(&dyn RawStore) -> Result<T, RawStoreError>,
    ) -> Result<T, RawStoreError> {
        if self.primary.has(key)? {
            return f(self.primary.as_ref());
        }
        for fallback in &self.fallbacks {
            if fallback.has(key)? {
                return f(fallback.as_ref());
            }
        }
        Err(RawStoreError::NotFound(key.to_string()))
    }
}

impl RawStore for CompositeStore {
    fn store(&self, key: &str, content: &[u8]) -> Result<u64, RawStoreError> {
        self.primary.store(key, content)
    }

    fn load(&self, key: &str) -> Result<Vec<u8>, RawStoreError> {
        self.first_hit(key, |store| store.load(key))
    }

    fn load_range(
        &self,
        key: &str,
        offset: u64,
        len: Option<u64>,
    ) -> Result<Vec<u8>, RawStoreError> {
        self.first_hit(key, |store| store.load_range(key, offset, len))
    }

    fn has(&self, key: &str) -> Result<bool, RawStoreError> {
        if self.primary.has(key)? {
            return Ok(true);
        }
        for fallback in &self.fallbacks {
            if fallback.has(key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn delete(&self, key: &str) -> Result<bool, RawStoreError> {
        self.primary.delete(key)
    }

    fn keys(&self) -> Result<Vec<String>, RawStoreError> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for key in self.primary.keys()? {
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
        for fallback in &self.fallbacks {
            for key in fallback.keys()? {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    fn size(&self, key: &str) -> Result<u64, RawStoreError> {
        self.first_hit(key, |store| store.size(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    fn composite_with_fallback() -> (CompositeStore, Arc<MemoryStore>) {
        let fallback = Arc::new(MemoryStore::new());
        fallback.store("shared", b"from fallback").unwrap();
        fallback.store("only-fallback", b"fb").unwrap();

        let mut composite = CompositeStore::new(Box::new(MemoryStore::new()));
        composite.add_fallback(fallback.clone());
        (composite, fallback)
    }

    #[test]
    fn reads_probe_primary_first() {
        let (composite, _fb) = composite_with_fallback();
        composite.store("shared", b"from primary").unwrap();
        assert_eq!(composite.load("shared").unwrap(), b"from primary");
    }

    #[test]
    fn reads_fall_through() {
        let (composite, _fb) = composite_with_fallback();
        assert_eq!(composite.load("only-fallback").unwrap(), b"fb");
        assert!(composite.has("only-fallback").unwrap());
        assert_eq!(composite.size("only-fallback").unwrap(), 2);
    }

    #[test]
    fn writes_go_to_primary_only() {
        let (composite, fallback) = composite_with_fallback();
        composite.store("new", b"x").unwrap();
        assert!(!fallback.has("new").unwrap());
    }

    #[test]
    fn delete_does_not_touch_fallbacks() {
        let (composite, fallback) = composite_with_fallback();
        assert!(!composite.delete("only-fallback").unwrap());
        assert!(fallback.has("only-fallback").unwrap());
        // The key is still readable through the composite.
        assert!(composite.has("only-fallback").unwrap());
    }

    #[test]
    fn keys_deduplicate_across_layers() {
        let (composite, _fb) = composite_with_fallback();
        composite.store("shared", b"primary copy").unwrap();

        let mut keys = composite.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["only-fallback", "shared"]);
    }
}
