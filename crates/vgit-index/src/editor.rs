//! Bulk and transactional index mutation.

use bstr::BString;
use vgit_hash::ObjectId;
use vgit_object::FileMode;
use vgit_odb::ObjectStore;

use crate::entry::IndexEntry;
use crate::{write, Index, IndexError, Stage};

/// Bulk loader: stage many entries, then swap them in at once.
pub struct IndexBuilder<'a> {
    index: &'a mut Index,
    staged: Vec<IndexEntry>,
}

impl<'a> IndexBuilder<'a> {
    pub(crate) fn new(index: &'a mut Index) -> Self {
        Self {
            index,
            staged: Vec::new(),
        }
    }

    pub fn add(&mut self, entry: IndexEntry) -> &mut Self {
        self.staged.push(entry);
        self
    }

    /// Recursively append every file of a stored tree under `prefix`.
    pub fn add_tree(
        &mut self,
        store: &ObjectStore,
        tree: &ObjectId,
        prefix: &str,
    ) -> Result<&mut Self, IndexError> {
        let mut entries = Vec::new();
        collect_tree(store, tree, prefix, &mut entries)?;
        self.staged.extend(entries);
        Ok(self)
    }

    /// Replace the index contents with the staged entries.
    pub fn finish(self) {
        let path = self.index.backing_path().map(|p| p.to_path_buf());
        *self.index = Index::new();
        if let Some(path) = path {
            self.index.set_path(path);
        }
        for entry in self.staged {
            self.index.set(entry);
        }
    }
}

fn collect_tree(
    store: &ObjectStore,
    tree: &ObjectId,
    prefix: &str,
    out: &mut Vec<IndexEntry>,
) -> Result<(), IndexError> {
    let tree = store.trees().load(tree)?;
    for entry in tree.iter() {
        let path = if prefix.is_empty() {
            entry.name.to_string()
        } else {
            format!("{prefix}/{}", entry.name)
        };
        if entry.mode.is_dir() {
            collect_tree(store, &entry.oid, &path, out)?;
        } else {
            out.push(IndexEntry::from_oid(
                BString::from(path),
                entry.mode,
                entry.oid,
                Stage::Normal,
            ));
        }
    }
    Ok(())
}

/// A transactional editor over a snapshot of the index.
///
/// Edits accumulate in memory; [`finish`](IndexEditor::finish) re-checks
/// that the on-disk file still matches the snapshot this editor was
/// opened against and fails with [`IndexError::Stale`] if a concurrent
/// writer got there first.
pub struct IndexEditor {
    working: Index,
    snapshot_checksum: Option<ObjectId>,
}

impl IndexEditor {
    pub(crate) fn open(index: &Index) -> Result<Self, IndexError> {
        Ok(Self {
            working: index.clone(),
            snapshot_checksum: index.on_disk_checksum,
        })
    }

    /// Stage or replace an entry.
    pub fn upsert(&mut self, path: BString, mode: FileMode, oid: ObjectId) -> &mut Self {
        // Staging a resolved entry also closes any open conflict rows.
        self.working.remove(&path, None);
        self.working
            .set(IndexEntry::from_oid(path, mode, oid, Stage::Normal));
        self
    }

    /// Stage an entry with explicit stat data (from the worktree).
    pub fn upsert_entry(&mut self, entry: IndexEntry) -> &mut Self {
        self.working.set(entry);
        self
    }

    /// Remove all stages of a path.
    pub fn remove(&mut self, path: &BString) -> &mut Self {
        self.working.remove(path, None);
        self
    }

    /// Current view of the pending state.
    pub fn pending(&self) -> &Index {
        &self.working
    }

    /// Persist atomically. The write happens under the index lockfile;
    /// a concurrent committed write since `editor()` fails with `Stale`.
    pub fn finish(mut self) -> Result<Index, IndexError> {
        let path = self
            .working
            .backing_path()
            .ok_or_else(|| IndexError::InvalidHeader("index has no backing path".into()))?
            .to_path_buf();

        let current = write::on_disk_checksum(&path)?;
        if current != self.snapshot_checksum {
            return Err(IndexError::Stale);
        }

        let checksum = write::write_to(&self.working, &path)?;
        self.working.on_disk_checksum = Some(checksum);
        Ok(self.working)
    }
}
