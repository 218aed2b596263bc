//! The staging index: what the next commit will contain.
//!
//! On disk this is git's index format v2: a sorted entry table with
//! cached stat data, merge stage bits, and a trailing SHA-1. In memory
//! it is an ordered map keyed by `(path, stage)`. All mutation funnels
//! through [`IndexEditor`] or the bulk [`IndexBuilder`], and persisting
//! is a single lockfile-protected write.

mod editor;
mod entry;
mod read;
mod tree_io;
mod write;

pub use editor::{IndexBuilder, IndexEditor};
pub use entry::{EntryFlags, IndexEntry, StatData};
pub use tree_io::ReadTreeOptions;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bstr::BString;
use vgit_hash::ObjectId;

/// Errors from staging index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("invalid index header: {0}")]
    InvalidHeader(String),

    #[error("unsupported index version: {0}")]
    UnsupportedVersion(u32),

    #[error("invalid index entry at offset {offset}: {reason}")]
    InvalidEntry { offset: usize, reason: String },

    #[error("index checksum mismatch")]
    ChecksumMismatch,

    #[error("index has conflicts: {0:?}")]
    HasConflicts(Vec<BString>),

    #[error("index changed on disk since this editor opened")]
    Stale,

    #[error(transparent)]
    Odb(#[from] vgit_odb::OdbError),

    #[error(transparent)]
    Object(#[from] vgit_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] vgit_hash::HashError),

    #[error(transparent)]
    Util(#[from] vgit_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Merge stage of an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Stage {
    /// Staged / resolved.
    #[default]
    Normal = 0,
    /// Common ancestor during a conflict.
    Base = 1,
    /// Our side during a conflict.
    Ours = 2,
    /// Their side during a conflict.
    Theirs = 3,
}

impl Stage {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Normal),
            1 => Some(Self::Base),
            2 => Some(Self::Ours),
            3 => Some(Self::Theirs),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// The staging index.
#[derive(Debug, Clone, Default)]
pub struct Index {
    /// Entries keyed by `(path, stage)` — the on-disk order.
    entries: BTreeMap<(BString, Stage), IndexEntry>,
    /// Where `read`/`write` persist (absent for purely in-memory use).
    path: Option<PathBuf>,
    /// Trailer checksum of the file this was loaded from.
    pub(crate) on_disk_checksum: Option<ObjectId>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `<gitdir>/index`; a missing file is an empty index.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref().to_path_buf();
        let mut index = match std::fs::read(&path) {
            Ok(data) => read::parse(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::new(),
            Err(e) => return Err(e.into()),
        };
        index.path = Some(path);
        Ok(index)
    }

    /// Persist to the path this index was loaded from.
    pub fn write(&mut self) -> Result<(), IndexError> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| IndexError::InvalidHeader("index has no backing path".into()))?;
        let checksum = write::write_to(self, &path)?;
        self.on_disk_checksum = Some(checksum);
        Ok(())
    }

    /// Bind an in-memory index to a path for later writes.
    pub fn set_path(&mut self, path: impl AsRef<Path>) {
        self.path = Some(path.as_ref().to_path_buf());
    }

    pub fn backing_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Entry lookup at a specific stage.
    pub fn get(&self, path: &BString, stage: Stage) -> Option<&IndexEntry> {
        self.entries.get(&(path.clone(), stage))
    }

    /// Whether any stage holds `path`.
    pub fn has(&self, path: &BString) -> bool {
        self.entries
            .range((path.clone(), Stage::Normal)..=(path.clone(), Stage::Theirs))
            .next()
            .is_some()
    }

    /// Insert or replace an entry at its `(path, stage)` slot.
    pub fn set(&mut self, entry: IndexEntry) {
        self.entries
            .insert((entry.path.clone(), entry.stage), entry);
    }

    /// Remove entries for `path`: one stage, or all when `stage` is None.
    pub fn remove(&mut self, path: &BString, stage: Option<Stage>) -> bool {
        match stage {
            Some(stage) => self.entries.remove(&(path.clone(), stage)).is_some(),
            None => {
                let before = self.entries.len();
                self.entries.retain(|(p, _), _| p != path);
                self.entries.len() < before
            }
        }
    }

    /// All entries in `(path, stage)` order, optionally filtered.
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    /// Entries under a path prefix.
    pub fn entries_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = &'a IndexEntry> {
        self.entries
            .values()
            .filter(move |e| e.path.starts_with(prefix.as_bytes()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any conflict stages are present.
    pub fn has_conflicts(&self) -> bool {
        self.entries.keys().any(|(_, stage)| *stage != Stage::Normal)
    }

    /// Distinct paths with open conflicts, in order.
    pub fn conflicted_paths(&self) -> Vec<BString> {
        let mut paths: Vec<BString> = Vec::new();
        for (path, stage) in self.entries.keys() {
            if *stage != Stage::Normal && paths.last() != Some(path) {
                paths.push(path.clone());
            }
        }
        paths
    }

    /// Resolve a conflicted path: drop stages 1-3 and stage the chosen
    /// entry at stage 0.
    pub fn resolve(&mut self, path: &BString, resolution: IndexEntry) {
        self.remove(path, None);
        let mut entry = resolution;
        entry.path = path.clone();
        entry.stage = Stage::Normal;
        self.set(entry);
    }

    /// Stage a three-way conflict for `path`. Any stage-0 entry is
    /// dropped; absent sides are skipped.
    pub fn set_conflict(
        &mut self,
        path: &BString,
        base: Option<(vgit_object::FileMode, ObjectId)>,
        ours: Option<(vgit_object::FileMode, ObjectId)>,
        theirs: Option<(vgit_object::FileMode, ObjectId)>,
    ) {
        self.remove(path, None);
        for (stage, side) in [
            (Stage::Base, base),
            (Stage::Ours, ours),
            (Stage::Theirs, theirs),
        ] {
            if let Some((mode, oid)) = side {
                self.set(IndexEntry::from_oid(path.clone(), mode, oid, stage));
            }
        }
    }

    /// Build trees from stage-0 entries (fails while conflicts are open).
    pub fn write_tree(&self, store: &vgit_odb::ObjectStore) -> Result<ObjectId, IndexError> {
        tree_io::write_tree(self, store)
    }

    /// Populate entries from a stored tree.
    pub fn read_tree(
        &mut self,
        store: &vgit_odb::ObjectStore,
        tree: &ObjectId,
        options: ReadTreeOptions,
    ) -> Result<(), IndexError> {
        tree_io::read_tree(self, store, tree, options)
    }

    /// Start a bulk builder (replaces this index's contents on finish).
    pub fn builder(&mut self) -> IndexBuilder<'_> {
        IndexBuilder::new(self)
    }

    /// Start an editor whose `finish` persists atomically.
    pub fn editor(&self) -> Result<IndexEditor, IndexError> {
        IndexEditor::open(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgit_object::FileMode;

    fn oid(n: u8) -> ObjectId {
        ObjectId([n; 20])
    }

    fn entry(path: &str, stage: Stage) -> IndexEntry {
        IndexEntry::from_oid(BString::from(path), FileMode::Regular, oid(1), stage)
    }

    #[test]
    fn set_get_remove() {
        let mut index = Index::new();
        index.set(entry("a.txt", Stage::Normal));
        assert!(index.has(&BString::from("a.txt")));
        assert!(index.get(&BString::from("a.txt"), Stage::Normal).is_some());
        assert!(index.get(&BString::from("a.txt"), Stage::Ours).is_none());

        assert!(index.remove(&BString::from("a.txt"), None));
        assert!(index.is_empty());
    }

    #[test]
    fn iteration_order_is_path_then_stage() {
        let mut index = Index::new();
        index.set(entry("b", Stage::Normal));
        index.set(entry("a", Stage::Theirs));
        index.set(entry("a", Stage::Base));
        index.set(entry("a", Stage::Ours));

        let order: Vec<(String, u8)> = index
            .entries()
            .map(|e| (e.path.to_string(), e.stage.bits()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a".to_string(), 1),
                ("a".to_string(), 2),
                ("a".to_string(), 3),
                ("b".to_string(), 0),
            ]
        );
    }

    #[test]
    fn conflict_lifecycle() {
        let mut index = Index::new();
        let path = BString::from("clash.txt");
        index.set(entry("clash.txt", Stage::Normal));

        index.set_conflict(
            &path,
            Some((FileMode::Regular, oid(1))),
            Some((FileMode::Regular, oid(2))),
            Some((FileMode::Regular, oid(3))),
        );
        // Staging the conflict removed the stage-0 row.
        assert!(index.get(&path, Stage::Normal).is_none());
        assert!(index.has_conflicts());
        assert_eq!(index.conflicted_paths(), vec![path.clone()]);

        let resolution = IndexEntry::from_oid(path.clone(), FileMode::Regular, oid(2), Stage::Normal);
        index.resolve(&path, resolution);
        assert!(!index.has_conflicts());
        assert_eq!(index.get(&path, Stage::Normal).unwrap().oid, oid(2));
    }

    #[test]
    fn conflict_without_base_side() {
        let mut index = Index::new();
        let path = BString::from("added-both");
        index.set_conflict(
            &path,
            None,
            Some((FileMode::Regular, oid(2))),
            Some((FileMode::Regular, oid(3))),
        );
        assert!(index.get(&path, Stage::Base).is_none());
        assert_eq!(index.conflicted_paths().len(), 1);
    }

    #[test]
    fn prefix_filtering() {
        let mut index = Index::new();
        index.set(entry("src/a.rs", Stage::Normal));
        index.set(entry("src/b.rs", Stage::Normal));
        index.set(entry("docs/c.md", Stage::Normal));

        assert_eq!(index.entries_with_prefix("src/").count(), 2);
        assert_eq!(index.entries_with_prefix("docs/").count(), 1);
        assert_eq!(index.entries_with_prefix("nope/").count(), 0);
    }
}
