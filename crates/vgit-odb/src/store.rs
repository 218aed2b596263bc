use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use vgit_hash::{Hasher, ObjectId, EMPTY_TREE_OID};
use vgit_object::{header, ObjectType};
use vgit_raw::{CompositeStore, CompressedStore, FileStore, MemoryStore, RawStore};

use crate::pack_dir::PackDirectory;
use crate::typed::{Blobs, Commits, Tags, Trees};
use crate::OdbError;

/// Parsed header of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    pub obj_type: ObjectType,
    pub size: usize,
}

/// Number of parsed objects kept hot in memory.
const CACHE_ENTRIES: usize = 1024;

/// Content-addressed, typed object storage.
///
/// The empty tree is virtual: it always exists and never touches disk.
pub struct ObjectStore {
    raw: CompositeStore,
    packs: Option<Arc<PackDirectory>>,
    cache: Mutex<LruCache<ObjectId, Arc<(ObjectType, Vec<u8>)>>>,
}

impl ObjectStore {
    /// Open the store rooted at an `objects/` directory: zlib loose files
    /// as the writable layer, `objects/pack/*.pack` as read-only
    /// fallbacks.
    pub fn open(objects_dir: impl AsRef<Path>) -> Result<Self, OdbError> {
        let objects_dir = objects_dir.as_ref();
        let loose: Arc<CompressedStore<FileStore>> =
            Arc::new(CompressedStore::new(FileStore::new(objects_dir)));
        let packs = Arc::new(
            PackDirectory::open(objects_dir.join("pack"), Some(loose.clone() as Arc<dyn RawStore>))
                .map_err(OdbError::Raw)?,
        );

        let mut raw = CompositeStore::new(Box::new(loose));
        raw.add_fallback(packs.clone() as Arc<dyn RawStore>);

        Ok(Self {
            raw,
            packs: Some(packs),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_ENTRIES).expect("cache size is non-zero"),
            )),
        })
    }

    /// A store backed entirely by memory, for tests and scratch work.
    pub fn in_memory() -> Self {
        Self {
            raw: CompositeStore::new(Box::new(MemoryStore::new())),
            packs: None,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_ENTRIES).expect("cache size is non-zero"),
            )),
        }
    }

    /// Store `content` as an object of `obj_type`. Returns the OID.
    ///
    /// Idempotent: identical content hashes to the same key and the last
    /// write is byte-for-byte the same as the first.
    pub fn store_bytes(&self, obj_type: ObjectType, content: &[u8]) -> Result<ObjectId, OdbError> {
        let oid = Hasher::hash_object(obj_type.as_str(), content)?;
        if oid == EMPTY_TREE_OID {
            return Ok(oid);
        }

        let mut framed = header::write(obj_type, content.len());
        framed.extend_from_slice(content);
        self.raw
            .store(&oid.to_hex(), &framed)
            .map_err(|e| OdbError::from_raw(e, &oid))?;
        Ok(oid)
    }

    /// Load an object's type and content.
    pub fn load(&self, oid: &ObjectId) -> Result<(ObjectType, Vec<u8>), OdbError> {
        if *oid == EMPTY_TREE_OID {
            return Ok((ObjectType::Tree, Vec::new()));
        }

        if let Some(hit) = self.cache.lock().unwrap().get(oid) {
            return Ok((hit.0, hit.1.clone()));
        }

        let framed = self
            .raw
            .load(&oid.to_hex())
            .map_err(|e| OdbError::from_raw(e, oid))?;
        let (obj_type, size, header_len) = header::parse(&framed)
            .map_err(|source| OdbError::Corrupt { oid: *oid, source })?;
        let content = framed
            .get(header_len..header_len + size)
            .ok_or_else(|| OdbError::Corrupt {
                oid: *oid,
                source: vgit_object::ObjectError::Truncated {
                    expected: size,
                    actual: framed.len() - header_len,
                },
            })?
            .to_vec();

        self.cache
            .lock()
            .unwrap()
            .put(*oid, Arc::new((obj_type, content.clone())));
        Ok((obj_type, content))
    }

    /// Load with the framed header included.
    pub fn load_framed(&self, oid: &ObjectId) -> Result<Vec<u8>, OdbError> {
        let (obj_type, content) = self.load(oid)?;
        let mut framed = header::write(obj_type, content.len());
        framed.extend_from_slice(&content);
        Ok(framed)
    }

    /// Parse just the header: type and size.
    pub fn info(&self, oid: &ObjectId) -> Result<ObjectInfo, OdbError> {
        if *oid == EMPTY_TREE_OID {
            return Ok(ObjectInfo {
                obj_type: ObjectType::Tree,
                size: 0,
            });
        }
        if let Some(hit) = self.cache.lock().unwrap().get(oid) {
            return Ok(ObjectInfo {
                obj_type: hit.0,
                size: hit.1.len(),
            });
        }

        let head = self
            .raw
            .load_range(&oid.to_hex(), 0, Some(header::MAX_HEADER_LEN as u64))
            .map_err(|e| OdbError::from_raw(e, oid))?;
        let (obj_type, size, _) =
            header::parse(&head).map_err(|source| OdbError::Corrupt { oid: *oid, source })?;
        Ok(ObjectInfo { obj_type, size })
    }

    /// Whether the object exists (the empty tree always does).
    pub fn has(&self, oid: &ObjectId) -> Result<bool, OdbError> {
        if *oid == EMPTY_TREE_OID {
            return Ok(true);
        }
        self.raw.has(&oid.to_hex()).map_err(OdbError::Raw)
    }

    /// Delete the loose copy of an object. Packed copies are unaffected
    /// (pack layers are read-only; consolidation owns their lifecycle).
    pub fn delete(&self, oid: &ObjectId) -> Result<bool, OdbError> {
        self.cache.lock().unwrap().pop(oid);
        self.raw.delete(&oid.to_hex()).map_err(OdbError::Raw)
    }

    /// All stored OIDs, de-duplicated across loose and packed layers.
    pub fn list(&self) -> Result<Vec<ObjectId>, OdbError> {
        let keys = self.raw.keys().map_err(OdbError::Raw)?;
        Ok(keys
            .iter()
            .filter_map(|key| ObjectId::from_hex(key).ok())
            .collect())
    }

    /// OIDs stored loose (the writable layer only). This is the gc
    /// working set: packed copies are managed by consolidation.
    pub fn list_loose(&self) -> Result<Vec<ObjectId>, OdbError> {
        let keys = self.raw.primary().keys().map_err(OdbError::Raw)?;
        Ok(keys
            .iter()
            .filter_map(|key| ObjectId::from_hex(key).ok())
            .collect())
    }

    /// The pack directory, when this store is file-backed.
    pub fn pack_directory(&self) -> Option<&Arc<PackDirectory>> {
        self.packs.as_ref()
    }

    /// Re-scan pack files (after gc or consolidation).
    pub fn refresh_packs(&self) -> Result<(), OdbError> {
        if let Some(packs) = &self.packs {
            packs.refresh().map_err(OdbError::Raw)?;
        }
        Ok(())
    }

    /// Typed facades.
    pub fn blobs(&self) -> Blobs<'_> {
        Blobs::new(self)
    }

    pub fn trees(&self) -> Trees<'_> {
        Trees::new(self)
    }

    pub fn commits(&self) -> Commits<'_> {
        Commits::new(self)
    }

    pub fn tags(&self) -> Tags<'_> {
        Tags::new(self)
    }
}
