//! The pack directory as a read-only raw store.
//!
//! Serving framed object bytes out of packs behind the [`RawStore`]
//! interface is what lets the object store layer packs under loose
//! storage without knowing the difference.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use vgit_hash::ObjectId;
use vgit_object::{header, ObjectType};
use vgit_pack::pack::PackFile;
use vgit_raw::{RawStore, RawStoreError};

/// All packs under one `objects/pack` directory, exposed as a read-only
/// [`RawStore`] keyed by 40-hex OIDs.
pub struct PackDirectory {
    dir: PathBuf,
    packs: RwLock<Vec<PackFile>>,
    /// Framed-byte store consulted for REF_DELTA bases that are not in
    /// any pack (typically the loose store).
    base_store: Option<Arc<dyn RawStore>>,
}

impl PackDirectory {
    /// Scan `dir` for `pack-*.pack` files. Unreadable packs are skipped;
    /// direct loads that need them will fail, listings will not.
    pub fn open(
        dir: impl AsRef<Path>,
        base_store: Option<Arc<dyn RawStore>>,
    ) -> Result<Self, RawStoreError> {
        let dir = dir.as_ref().to_path_buf();
        let packs = Self::scan(&dir)?;
        Ok(Self {
            dir,
            packs: RwLock::new(packs),
            base_store,
        })
    }

    /// Re-scan the directory. Call after a consolidation or gc replaced
    /// pack files; existing readers keep the old packs until then.
    pub fn refresh(&self) -> Result<(), RawStoreError> {
        let packs = Self::scan(&self.dir)?;
        *self.packs.write().unwrap() = packs;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of pack files currently loaded.
    pub fn pack_count(&self) -> usize {
        self.packs.read().unwrap().len()
    }

    fn scan(dir: &Path) -> Result<Vec<PackFile>, RawStoreError> {
        let mut packs = Vec::new();
        if !dir.is_dir() {
            return Ok(packs);
        }
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "pack") {
                if let Ok(pack) = PackFile::open(&path) {
                    packs.push(pack);
                }
            }
        }
        Ok(packs)
    }

    /// Resolve a REF_DELTA base through the configured base store.
    fn resolve_base(&self, oid: &ObjectId) -> Option<(ObjectType, Vec<u8>)> {
        let base_store = self.base_store.as_ref()?;
        let framed = base_store.load(&oid.to_hex()).ok()?;
        let (obj_type, size, header_len) = header::parse(&framed).ok()?;
        let content = framed.get(header_len..header_len + size)?;
        Some((obj_type, content.to_vec()))
    }

    fn read_framed(&self, oid: &ObjectId) -> Result<Option<Vec<u8>>, RawStoreError> {
        let packs = self.packs.read().unwrap();
        for pack in packs.iter() {
            let resolver = |base: &ObjectId| self.resolve_base(base);
            match pack.read_with(oid, &resolver) {
                Ok(Some(obj)) => {
                    let mut framed = header::write(obj.obj_type, obj.data.len());
                    framed.extend_from_slice(&obj.data);
                    return Ok(Some(framed));
                }
                Ok(None) => continue,
                Err(e) => {
                    return Err(RawStoreError::Corrupt {
                        key: oid.to_hex(),
                        reason: e.to_string(),
                    })
                }
            }
        }
        Ok(None)
    }
}

impl RawStore for PackDirectory {
    fn store(&self, key: &str, _content: &[u8]) -> Result<u64, RawStoreError> {
        Err(RawStoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("pack directory is read-only (store of {key})"),
        )))
    }

    fn load(&self, key: &str) -> Result<Vec<u8>, RawStoreError> {
        let oid = parse_key(key)?;
        self.read_framed(&oid)?
            .ok_or_else(|| RawStoreError::NotFound(key.to_string()))
    }

    fn has(&self, key: &str) -> Result<bool, RawStoreError> {
        let oid = parse_key(key)?;
        let packs = self.packs.read().unwrap();
        Ok(packs.iter().any(|pack| pack.contains(&oid)))
    }

    fn delete(&self, _key: &str) -> Result<bool, RawStoreError> {
        Ok(false)
    }

    fn keys(&self) -> Result<Vec<String>, RawStoreError> {
        let packs = self.packs.read().unwrap();
        let mut keys = Vec::new();
        for pack in packs.iter() {
            for (oid, _) in pack.index().iter() {
                keys.push(oid.to_hex());
            }
        }
        Ok(keys)
    }

    fn size(&self, key: &str) -> Result<u64, RawStoreError> {
        Ok(self.load(key)?.len() as u64)
    }
}

fn parse_key(key: &str) -> Result<ObjectId, RawStoreError> {
    ObjectId::from_hex(key).map_err(|_| RawStoreError::NotFound(key.to_string()))
}
