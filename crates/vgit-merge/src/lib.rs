//! Three-way merge machinery.
//!
//! [`merge_trees`] produces a merged tree plus a conflict report;
//! conflicted text files carry standard conflict markers in the merged
//! tree, and the caller decides whether to commit, stage stages 1-3, or
//! bail. [`rebase`] replays commits one at a time on a new base using
//! the same tree merge.

pub mod content;
mod rebase;
mod tree;

pub use content::{merge_content, ContentMergeResult, MergeLabels};
pub use rebase::{
    rebase, rebase_abort, rebase_continue, rebase_skip, RebaseResult, RebaseStatus,
};
pub use tree::{merge_trees, TreeMergeOutcome};

use bstr::BString;
use vgit_hash::ObjectId;
use vgit_object::FileMode;
use vgit_revwalk::CommitGraph;

/// Errors from merge operations. Conflicts are not errors: they ride in
/// the merge outcome.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("nothing to merge: histories share no commits and unrelated merges are disabled")]
    UnrelatedHistories,

    #[error(transparent)]
    Odb(#[from] vgit_odb::OdbError),

    #[error(transparent)]
    Diff(#[from] vgit_diff::DiffError),

    #[error(transparent)]
    Walk(#[from] vgit_revwalk::WalkError),

    #[error(transparent)]
    Repo(#[from] vgit_repository::RepoError),

    #[error(transparent)]
    Index(#[from] vgit_index::IndexError),

    #[error(transparent)]
    Ref(#[from] vgit_ref::RefError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Whole-tree merge strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Classic three-way merge.
    #[default]
    Recursive,
    /// Result tree is ours, wholesale (parents still record the merge).
    Ours,
    /// Result tree is theirs, wholesale.
    Theirs,
}

/// Per-file content strategy, overriding the line merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileStrategy {
    /// Line-level three-way merge with conflict markers.
    #[default]
    Merge,
    /// Take our side of conflicting files.
    Ours,
    /// Take their side of conflicting files.
    Theirs,
    /// Concatenate ours then theirs, no de-duplication.
    Union,
}

/// Options threading through tree and content merges.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub strategy: MergeStrategy,
    pub file_strategy: FileStrategy,
    /// Similarity threshold (percent) for rename detection.
    pub rename_threshold: u8,
    /// Conflict marker labels.
    pub label_ours: String,
    pub label_theirs: String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            strategy: MergeStrategy::default(),
            file_strategy: FileStrategy::default(),
            rename_threshold: vgit_diff::rename::DEFAULT_RENAME_THRESHOLD,
            label_ours: "ours".to_string(),
            label_theirs: "theirs".to_string(),
        }
    }
}

/// How a path conflicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Both sides changed the content incompatibly.
    Content,
    /// One side modified, the other deleted.
    ModifyDelete,
    /// Both sides added different content.
    AddAdd,
    /// Binary content changed on both sides.
    Binary,
}

/// One conflicted path in a merge outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub path: BString,
    pub kind: ConflictKind,
    pub base: Option<(FileMode, ObjectId)>,
    pub ours: Option<(FileMode, ObjectId)>,
    pub theirs: Option<(FileMode, ObjectId)>,
}

/// A rename carried into the merge report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameInfo {
    pub from: BString,
    pub to: BString,
    pub similarity: u8,
}

/// Relationship between two branch tips before a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAnalysis {
    /// Theirs is already contained in ours.
    UpToDate,
    /// Ours is an ancestor of theirs: a pure ref advance suffices.
    FastForward,
    /// Histories diverged; a real merge is needed.
    Diverged { base: ObjectId },
    /// No common ancestor at all.
    Unrelated,
}

/// Classify `ours` vs `theirs` for the fast-forward rule.
pub fn analyze(
    graph: &CommitGraph<'_>,
    ours: &ObjectId,
    theirs: &ObjectId,
) -> Result<MergeAnalysis, MergeError> {
    if ours == theirs || graph.is_ancestor(theirs, ours)? {
        return Ok(MergeAnalysis::UpToDate);
    }
    match graph.merge_base(ours, theirs)? {
        Some(base) if base == *ours => Ok(MergeAnalysis::FastForward),
        Some(base) => Ok(MergeAnalysis::Diverged { base }),
        None => Ok(MergeAnalysis::Unrelated),
    }
}
