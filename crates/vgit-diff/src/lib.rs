//! Tree diffing and rename detection.
//!
//! [`diff_trees`] flattens two trees into a list of path-level changes;
//! [`rename::detect_renames`] then rewrites matching delete/add pairs
//! into renames using content similarity.

pub mod rename;
pub mod similarity;
mod tree;

pub use tree::diff_trees;

use bstr::BString;
use vgit_hash::ObjectId;
use vgit_object::FileMode;

/// Errors from diff operations.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    #[error(transparent)]
    Odb(#[from] vgit_odb::OdbError),
}

/// Classification of one changed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeKind {
    Added,
    Deleted,
    Modified,
    Renamed,
}

/// One path-level difference between two trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub kind: ChangeKind,
    /// Path on the old side (absent for additions).
    pub old_path: Option<BString>,
    /// Path on the new side (absent for deletions).
    pub new_path: Option<BString>,
    pub old_oid: Option<ObjectId>,
    pub new_oid: Option<ObjectId>,
    pub old_mode: Option<FileMode>,
    pub new_mode: Option<FileMode>,
    /// Similarity percentage for renames (100 = exact content match).
    pub similarity: Option<u8>,
}

impl FileChange {
    pub fn added(path: BString, oid: ObjectId, mode: FileMode) -> Self {
        Self {
            kind: ChangeKind::Added,
            old_path: None,
            new_path: Some(path),
            old_oid: None,
            new_oid: Some(oid),
            old_mode: None,
            new_mode: Some(mode),
            similarity: None,
        }
    }

    pub fn deleted(path: BString, oid: ObjectId, mode: FileMode) -> Self {
        Self {
            kind: ChangeKind::Deleted,
            old_path: Some(path),
            new_path: None,
            old_oid: Some(oid),
            new_oid: None,
            old_mode: Some(mode),
            new_mode: None,
            similarity: None,
        }
    }

    /// The path this change is best known by.
    pub fn path(&self) -> &BString {
        self.new_path
            .as_ref()
            .or(self.old_path.as_ref())
            .expect("a change names at least one side")
    }
}

/// A flattened tree-to-tree diff.
#[derive(Debug, Clone, Default)]
pub struct TreeDiff {
    pub changes: Vec<FileChange>,
}

impl TreeDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}
