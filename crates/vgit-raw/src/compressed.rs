use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::{RawStore, RawStoreError};

/// Wraps another store, deflating values on store and inflating on load.
///
/// Uses zlib framing (not raw deflate), matching git's loose object
/// format. `size()` must inflate the value and is O(n).
pub struct CompressedStore<S> {
    inner: S,
    level: Compression,
}

impl<S: RawStore> CompressedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            level: Compression::default(),
        }
    }

    /// Set the zlib compression level (0-9).
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level);
        self
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn inflate(&self, key: &str, compressed: &[u8]) -> Result<Vec<u8>, RawStoreError> {
        let mut decoder = ZlibDecoder::new(compressed);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| RawStoreError::Corrupt {
                key: key.to_string(),
                reason: format!("zlib inflate failed: {e}"),
            })?;
        Ok(out)
    }
}

impl<S: RawStore> RawStore for CompressedStore<S> {
    fn store(&self, key: &str, content: &[u8]) -> Result<u64, RawStoreError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), self.level);
        encoder.write_all(content)?;
        let compressed = encoder.finish()?;
        self.inner.store(key, &compressed)?;
        Ok(content.len() as u64)
    }

    fn load(&self, key: &str) -> Result<Vec<u8>, RawStoreError> {
        let compressed = self.inner.load(key)?;
        self.inflate(key, &compressed)
    }

    fn has(&self, key: &str) -> Result<bool, RawStoreError> {
        self.inner.has(key)
    }

    fn delete(&self, key: &str) -> Result<bool, RawStoreError> {
        self.inner.delete(key)
    }

    fn keys(&self) -> Result<Vec<String>, RawStoreError> {
        self.inner.keys()
    }

    fn size(&self, key: &str) -> Result<u64, RawStoreError> {
        Ok(self.load(key)?.len() as u64)
    }
}
