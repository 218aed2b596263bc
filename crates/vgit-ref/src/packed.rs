//! The `packed-refs` file: many refs in one sorted file.
//!
//! ```text
//! # pack-refs with: peeled fully-peeled sorted
//! <hex-oid> <refname>
//! ^<hex-oid>        (peeled target of the annotated tag above)
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use vgit_hash::ObjectId;
use vgit_utils::LockFile;

use crate::name::RefName;
use crate::RefError;

const HEADER: &[u8] = b"# pack-refs with: peeled fully-peeled sorted \n";

/// One packed ref entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedRef {
    pub name: RefName,
    pub oid: ObjectId,
    /// For annotated tags: the object the tag ultimately points at.
    pub peeled: Option<ObjectId>,
}

/// The parsed `packed-refs` file.
#[derive(Debug, Clone, Default)]
pub struct PackedRefs {
    refs: Vec<PackedRef>,
}

pub(crate) fn packed_refs_path(git_dir: &Path) -> PathBuf {
    git_dir.join("packed-refs")
}

impl PackedRefs {
    /// Parse file contents. Peel lines attach to the preceding ref.
    pub fn parse(data: &[u8]) -> Result<Self, RefError> {
        let mut refs: Vec<PackedRef> = Vec::new();

        for line in data.lines() {
            if line.is_empty() || line.starts_with(b"#") {
                continue;
            }

            if let Some(peel_hex) = line.strip_prefix(b"^") {
                let hex = std::str::from_utf8(peel_hex.trim()).map_err(|_| RefError::Parse {
                    name: "packed-refs".into(),
                    reason: "non-UTF-8 peel line".into(),
                })?;
                let peeled = ObjectId::from_hex(hex).map_err(|e| RefError::Parse {
                    name: "packed-refs".into(),
                    reason: e.to_string(),
                })?;
                match refs.last_mut() {
                    Some(last) => last.peeled = Some(peeled),
                    None => {
                        return Err(RefError::Parse {
                            name: "packed-refs".into(),
                            reason: "peel line before any ref".into(),
                        })
                    }
                }
                continue;
            }

            let space = line.find_byte(b' ').ok_or_else(|| RefError::Parse {
                name: "packed-refs".into(),
                reason: "missing space".into(),
            })?;
            let hex = std::str::from_utf8(&line[..space]).map_err(|_| RefError::Parse {
                name: "packed-refs".into(),
                reason: "non-UTF-8 OID".into(),
            })?;
            let oid = ObjectId::from_hex(hex).map_err(|e| RefError::Parse {
                name: "packed-refs".into(),
                reason: e.to_string(),
            })?;
            let name_str =
                std::str::from_utf8(line[space + 1..].trim()).map_err(|_| RefError::Parse {
                    name: "packed-refs".into(),
                    reason: "non-UTF-8 ref name".into(),
                })?;

            refs.push(PackedRef {
                name: RefName::new(name_str)?,
                oid,
                peeled: None,
            });
        }

        refs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { refs })
    }

    /// Load from `<gitdir>/packed-refs`; absent file means no packed refs.
    pub fn load(git_dir: &Path) -> Result<Self, RefError> {
        let path = packed_refs_path(git_dir);
        match fs::read(&path) {
            Ok(data) => Self::parse(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Binary-search a ref by name.
    pub fn find(&self, name: &RefName) -> Option<&PackedRef> {
        self.refs
            .binary_search_by(|r| r.name.cmp(name))
            .ok()
            .map(|i| &self.refs[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackedRef> {
        self.refs.iter()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Insert or replace a ref.
    pub fn upsert(&mut self, name: RefName, oid: ObjectId, peeled: Option<ObjectId>) {
        match self.refs.binary_search_by(|r| r.name.cmp(&name)) {
            Ok(i) => {
                self.refs[i].oid = oid;
                self.refs[i].peeled = peeled;
            }
            Err(i) => self.refs.insert(i, PackedRef { name, oid, peeled }),
        }
    }

    /// Remove a ref. Returns whether it was present.
    pub fn remove(&mut self, name: &RefName) -> bool {
        match self.refs.binary_search_by(|r| r.name.cmp(name)) {
            Ok(i) => {
                self.refs.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    /// Write atomically through the packed-refs lockfile.
    pub fn write(&self, git_dir: &Path) -> Result<(), RefError> {
        let path = packed_refs_path(git_dir);
        let mut lock = LockFile::acquire(&path)?;

        lock.write_all(HEADER)?;
        for r in &self.refs {
            lock.write_all(format!("{} {}\n", r.oid.to_hex(), r.name).as_bytes())?;
            if let Some(peeled) = &r.peeled {
                lock.write_all(format!("^{}\n", peeled.to_hex()).as_bytes())?;
            }
        }
        lock.commit()?;
        Ok(())
    }
}
