use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::{RawStore, RawStoreError};

/// File-backed store with git's fan-out layout: the key `aabbcc…` lives
/// at `<root>/aa/bbcc…`. Writes go through a temp file and an atomic
/// rename, so a crash never leaves a partial value visible.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to its on-disk path.
    fn key_path(&self, key: &str) -> Result<PathBuf, RawStoreError> {
        if key.len() < 3 || key.contains(['/', '\\']) {
            return Err(RawStoreError::Corrupt {
                key: key.to_string(),
                reason: "keys must be at least 3 chars and contain no separators".into(),
            });
        }
        Ok(self.root.join(&key[..2]).join(&key[2..]))
    }
}

impl RawStore for FileStore {
    fn store(&self, key: &str, content: &[u8]) -> Result<u64, RawStoreError> {
        let path = self.key_path(key)?;
        let parent = path.parent().expect("fan-out path has a parent");
        fs::create_dir_all(parent)?;

        // Temp name in the same directory so the rename stays atomic.
        let tmp = parent.join(format!(".tmp-{}-{}", std::process::id(), key));
        fs::write(&tmp, content)?;
        match fs::rename(&tmp, &path) {
            Ok(()) => {}
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(e.into());
            }
        }
        Ok(content.len() as u64)
    }

    fn load(&self, key: &str) -> Result<Vec<u8>, RawStoreError> {
        let path = self.key_path(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RawStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn load_range(
        &self,
        key: &str,
        offset: u64,
        len: Option<u64>,
    ) -> Result<Vec<u8>, RawStoreError> {
        let path = self.key_path(key)?;
        let mut file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RawStoreError::NotFound(key.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::new();
        match len {
            Some(len) => {
                file.take(len).read_to_end(&mut buf)?;
            }
            None => {
                file.read_to_end(&mut buf)?;
            }
        }
        Ok(buf)
    }

    fn has(&self, key: &str) -> Result<bool, RawStoreError> {
        Ok(self.key_path(key)?.is_file())
    }

    fn delete(&self, key: &str) -> Result<bool, RawStoreError> {
        let path = self.key_path(key)?;
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        // Prune the fan-out directory if this was its last entry.
        if let Some(parent) = path.parent() {
            let empty = parent
                .read_dir()
                .map(|mut e| e.next().is_none())
                .unwrap_or(false);
            if empty {
                let _ = fs::remove_dir(parent);
            }
        }
        Ok(true)
    }

    fn keys(&self) -> Result<Vec<String>, RawStoreError> {
        let mut keys = Vec::new();
        if !self.root.is_dir() {
            return Ok(keys);
        }
        for fanout in fs::read_dir(&self.root)? {
            let fanout = fanout?;
            if !fanout.file_type()?.is_dir() {
                continue;
            }
            let prefix = match fanout.file_name().into_string() {
                Ok(p) if p.len() == 2 => p,
                _ => continue,
            };
            for entry in fs::read_dir(fanout.path())? {
                let entry = entry?;
                if let Ok(rest) = entry.file_name().into_string() {
                    if rest.starts_with(".tmp-") {
                        continue;
                    }
                    keys.push(format!("{prefix}{rest}"));
                }
            }
        }
        Ok(keys)
    }

    fn size(&self, key: &str) -> Result<u64, RawStoreError> {
        let path = self.key_path(key)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RawStoreError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
