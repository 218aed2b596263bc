//! Keyed byte stores for the vgit version control engine.
//!
//! A [`RawStore`] is the capability everything above the filesystem is
//! built on: a keyed byte store with range reads. The object store sits
//! on one; the pack layer exposes itself as a read-only fallback through
//! [`CompositeStore`], which is how an object lookup stays oblivious to
//! whether the object lives loose or packed.

mod composite;
mod compressed;
mod file;
mod memory;

pub use composite::CompositeStore;
pub use compressed::CompressedStore;
pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors produced by raw store operations.
#[derive(Debug, thiserror::Error)]
pub enum RawStoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("corrupt entry {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A keyed byte store.
///
/// Keys are opaque non-empty strings; for object storage they are
/// 40-character lowercase hex OIDs. `store` replaces any prior value.
/// All implementations are safe to share across threads.
pub trait RawStore: Send + Sync {
    /// Store `content` under `key`, replacing any prior value.
    /// Returns the number of bytes accepted (the uncompressed length).
    fn store(&self, key: &str, content: &[u8]) -> Result<u64, RawStoreError>;

    /// Load the full value for `key`.
    fn load(&self, key: &str) -> Result<Vec<u8>, RawStoreError>;

    /// Load `len` bytes starting at `offset` (to the end when `len` is
    /// `None`). An offset past the end yields an empty vec.
    fn load_range(
        &self,
        key: &str,
        offset: u64,
        len: Option<u64>,
    ) -> Result<Vec<u8>, RawStoreError> {
        let data = self.load(key)?;
        let start = (offset as usize).min(data.len());
        let end = match len {
            Some(len) => (start + len as usize).min(data.len()),
            None => data.len(),
        };
        Ok(data[start..end].to_vec())
    }

    /// Whether `key` has a value.
    fn has(&self, key: &str) -> Result<bool, RawStoreError>;

    /// Remove the value for `key`. Returns whether anything was removed.
    fn delete(&self, key: &str) -> Result<bool, RawStoreError>;

    /// All keys, in unspecified order.
    fn keys(&self) -> Result<Vec<String>, RawStoreError>;

    /// The uncompressed byte length of the value for `key`.
    fn size(&self, key: &str) -> Result<u64, RawStoreError>;
}

impl<T: RawStore + ?Sized> RawStore for std::sync::Arc<T> {
    fn store(&self, key: &str, content: &[u8]) -> Result<u64, RawStoreError> {
        (**self).store(key, content)
    }
    fn load(&self, key: &str) -> Result<Vec<u8>, RawStoreError> {
        (**self).load(key)
    }
    fn load_range(
        &self,
        key: &str,
        offset: u64,
        len: Option<u64>,
    ) -> Result<Vec<u8>, RawStoreError> {
        (**self).load_range(key, offset, len)
    }
    fn has(&self, key: &str) -> Result<bool, RawStoreError> {
        (**self).has(key)
    }
    fn delete(&self, key: &str) -> Result<bool, RawStoreError> {
        (**self).delete(key)
    }
    fn keys(&self) -> Result<Vec<String>, RawStoreError> {
        (**self).keys()
    }
    fn size(&self, key: &str) -> Result<u64, RawStoreError> {
        (**self).size(key)
    }
}
