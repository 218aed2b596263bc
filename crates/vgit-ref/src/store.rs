//! The files-backed ref store: loose refs over packed-refs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use vgit_hash::ObjectId;
use vgit_utils::LockFile;

use crate::loose;
use crate::name::RefName;
use crate::packed::PackedRefs;
use crate::{RefError, Reference, MAX_SYMBOLIC_DEPTH};

/// A symbolic chain fully followed to a direct ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    /// The direct ref at the end of the chain (equals the queried name
    /// when that ref was already direct).
    pub name: RefName,
    pub oid: ObjectId,
}

/// Loose + packed refs rooted at one `<gitdir>`.
pub struct FilesRefStore {
    git_dir: PathBuf,
}

impl FilesRefStore {
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        Self {
            git_dir: git_dir.as_ref().to_path_buf(),
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Read one ref without following symbolic targets.
    ///
    /// Loose wins over packed; a missing ref is `Ok(None)`, I/O failures
    /// propagate.
    pub fn get(&self, name: &RefName) -> Result<Option<Reference>, RefError> {
        if let Some(reference) = loose::read(&self.git_dir, name)? {
            return Ok(Some(reference));
        }
        let packed = PackedRefs::load(&self.git_dir)?;
        Ok(packed.find(name).map(|r| Reference::Direct {
            name: r.name.clone(),
            target: r.oid,
            peeled: r.peeled,
        }))
    }

    /// Follow symbolic refs (depth <= 5) to a direct ref.
    ///
    /// `Ok(None)` when the chain dead-ends on a missing ref (an unborn
    /// branch, e.g. `HEAD` right after init).
    pub fn resolve(&self, name: &RefName) -> Result<Option<ResolvedRef>, RefError> {
        let mut current = name.clone();
        for _ in 0..=MAX_SYMBOLIC_DEPTH {
            match self.get(&current)? {
                None => return Ok(None),
                Some(Reference::Direct { name, target, .. }) => {
                    return Ok(Some(ResolvedRef { name, oid: target }))
                }
                Some(Reference::Symbolic { target, .. }) => {
                    current = target;
                }
            }
        }
        Err(RefError::SymbolicChainTooDeep(name.to_string()))
    }

    /// Resolve to an OID, erroring when the ref does not exist.
    pub fn resolve_required(&self, name: &RefName) -> Result<ResolvedRef, RefError> {
        self.resolve(name)?
            .ok_or_else(|| RefError::NotFound(name.to_string()))
    }

    /// List refs under a prefix (e.g. `refs/heads`), merging loose and
    /// packed and de-duplicating by name (loose wins).
    pub fn list(&self, prefix: &str) -> Result<Vec<Reference>, RefError> {
        let mut merged: BTreeMap<RefName, Reference> = BTreeMap::new();

        let packed = PackedRefs::load(&self.git_dir)?;
        for r in packed.iter() {
            if r.name.as_str().starts_with(prefix) {
                merged.insert(
                    r.name.clone(),
                    Reference::Direct {
                        name: r.name.clone(),
                        target: r.oid,
                        peeled: r.peeled,
                    },
                );
            }
        }
        for name in loose::list(&self.git_dir, prefix)? {
            if let Some(reference) = loose::read(&self.git_dir, &name)? {
                merged.insert(name, reference);
            }
        }

        Ok(merged.into_values().collect())
    }

    /// Unconditional set (used for state refs where the previous value is
    /// irrelevant, e.g. `ORIG_HEAD`).
    pub fn set(&self, name: &RefName, oid: &ObjectId) -> Result<(), RefError> {
        loose::write(&self.git_dir, name, oid)
    }

    /// Point a symbolic ref at another ref (e.g. `HEAD` -> a branch).
    pub fn set_symbolic(&self, name: &RefName, target: &RefName) -> Result<(), RefError> {
        loose::write_symbolic(&self.git_dir, name, target)
    }

    /// Delete a ref from both loose and packed storage.
    pub fn delete(&self, name: &RefName) -> Result<bool, RefError> {
        let loose_removed = loose::delete(&self.git_dir, name)?;

        let mut packed = PackedRefs::load(&self.git_dir)?;
        let packed_removed = packed.remove(name);
        if packed_removed {
            packed.write(&self.git_dir)?;
        }

        Ok(loose_removed || packed_removed)
    }

    /// Compare-and-swap update.
    ///
    /// `expected` is the previous OID the caller observed (`None` for
    /// "the ref must not exist"); `new` is the value to install (`None`
    /// deletes). The ref's lockfile is held across the verify and the
    /// write, so exactly one of two racing updates wins; the loser sees
    /// [`RefError::CasMismatch`] (or [`RefError::Locked`] if it collides
    /// with the winner mid-flight).
    pub fn compare_and_swap(
        &self,
        name: &RefName,
        expected: Option<ObjectId>,
        new: Option<ObjectId>,
    ) -> Result<(), RefError> {
        let path = loose::ref_path(&self.git_dir, name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut lock = LockFile::acquire(&path)?;

        let actual = match self.get(name)? {
            Some(Reference::Direct { target, .. }) => Some(target),
            Some(Reference::Symbolic { .. }) => {
                // CAS operates on the ref itself, not through symlinks.
                return Err(RefError::Parse {
                    name: name.to_string(),
                    reason: "cannot compare-and-swap a symbolic ref".into(),
                });
            }
            None => None,
        };

        if actual != expected {
            return Err(RefError::CasMismatch {
                name: name.to_string(),
                expected,
                actual,
            });
        }

        match new {
            Some(oid) => {
                use std::io::Write;
                lock.write_all(format!("{}\n", oid.to_hex()).as_bytes())?;
                lock.commit()?;
            }
            None => {
                lock.rollback()?;
                self.delete(name)?;
            }
        }
        Ok(())
    }

    /// Create a ref that must not already exist.
    pub fn create(&self, name: &RefName, oid: &ObjectId) -> Result<(), RefError> {
        match self.compare_and_swap(name, None, Some(*oid)) {
            Err(RefError::CasMismatch { .. }) => {
                Err(RefError::AlreadyExists(name.to_string()))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> ObjectId {
        ObjectId([n; 20])
    }

    fn store() -> (tempfile::TempDir, FilesRefStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesRefStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn set_get_resolve() {
        let (_dir, store) = store();
        let main = RefName::branch("main").unwrap();
        store.set(&main, &oid(1)).unwrap();
        store.set_symbolic(&RefName::head(), &main).unwrap();

        let head = store.get(&RefName::head()).unwrap().unwrap();
        assert!(head.is_symbolic());

        let resolved = store.resolve(&RefName::head()).unwrap().unwrap();
        assert_eq!(resolved.name, main);
        assert_eq!(resolved.oid, oid(1));
    }

    #[test]
    fn unborn_head_resolves_to_none() {
        let (_dir, store) = store();
        store
            .set_symbolic(&RefName::head(), &RefName::branch("main").unwrap())
            .unwrap();
        assert!(store.resolve(&RefName::head()).unwrap().is_none());
        assert!(matches!(
            store.resolve_required(&RefName::head()),
            Err(RefError::NotFound(_))
        ));
    }

    #[test]
    fn symbolic_cycle_detected() {
        let (_dir, store) = store();
        let a = RefName::new("refs/heads/a").unwrap();
        let b = RefName::new("refs/heads/b").unwrap();
        store.set_symbolic(&a, &b).unwrap();
        store.set_symbolic(&b, &a).unwrap();
        assert!(matches!(
            store.resolve(&a),
            Err(RefError::SymbolicChainTooDeep(_))
        ));
    }

    #[test]
    fn loose_shadows_packed() {
        let (dir, store) = store();
        let main = RefName::branch("main").unwrap();

        let mut packed = PackedRefs::default();
        packed.upsert(main.clone(), oid(1), None);
        packed.write(dir.path()).unwrap();
        assert_eq!(
            store.get(&main).unwrap().unwrap().target_oid(),
            Some(oid(1))
        );

        store.set(&main, &oid(2)).unwrap();
        assert_eq!(
            store.get(&main).unwrap().unwrap().target_oid(),
            Some(oid(2))
        );
    }

    #[test]
    fn list_merges_and_dedupes() {
        let (dir, store) = store();
        let mut packed = PackedRefs::default();
        packed.upsert(RefName::branch("packed-only").unwrap(), oid(1), None);
        packed.upsert(RefName::branch("both").unwrap(), oid(2), None);
        packed.write(dir.path()).unwrap();

        store.set(&RefName::branch("both").unwrap(), &oid(3)).unwrap();
        store.set(&RefName::branch("loose-only").unwrap(), &oid(4)).unwrap();

        let refs = store.list("refs/heads").unwrap();
        let summary: Vec<(String, u8)> = refs
            .iter()
            .map(|r| (r.name().to_string(), r.target_oid().unwrap().0[0]))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("refs/heads/both".to_string(), 3),
                ("refs/heads/loose-only".to_string(), 4),
                ("refs/heads/packed-only".to_string(), 1),
            ]
        );
    }

    #[test]
    fn cas_happy_path_and_mismatch() {
        let (_dir, store) = store();
        let main = RefName::branch("main").unwrap();

        store.compare_and_swap(&main, None, Some(oid(1))).unwrap();
        store
            .compare_and_swap(&main, Some(oid(1)), Some(oid(2)))
            .unwrap();

        let err = store
            .compare_and_swap(&main, Some(oid(1)), Some(oid(3)))
            .unwrap_err();
        assert!(matches!(err, RefError::CasMismatch { actual: Some(a), .. } if a == oid(2)));

        // Delete via CAS.
        store.compare_and_swap(&main, Some(oid(2)), None).unwrap();
        assert!(store.get(&main).unwrap().is_none());
    }

    #[test]
    fn cas_loser_sees_lock_contention() {
        let (dir, store) = store();
        let main = RefName::branch("main").unwrap();
        store.set(&main, &oid(1)).unwrap();

        // Simulate a concurrent updater holding the lock.
        let _held = LockFile::acquire(dir.path().join("refs/heads/main")).unwrap();
        assert!(matches!(
            store.compare_and_swap(&main, Some(oid(1)), Some(oid(2))),
            Err(RefError::Locked(_))
        ));
    }

    #[test]
    fn create_refuses_existing() {
        let (_dir, store) = store();
        let main = RefName::branch("main").unwrap();
        store.create(&main, &oid(1)).unwrap();
        assert!(matches!(
            store.create(&main, &oid(2)),
            Err(RefError::AlreadyExists(_))
        ));
    }

    #[test]
    fn delete_covers_both_layers() {
        let (dir, store) = store();
        let name = RefName::branch("mixed").unwrap();
        let mut packed = PackedRefs::default();
        packed.upsert(name.clone(), oid(1), None);
        packed.write(dir.path()).unwrap();
        store.set(&name, &oid(2)).unwrap();

        assert!(store.delete(&name).unwrap());
        assert!(store.get(&name).unwrap().is_none());
    }
}
