//! Typed porcelain commands.
//!
//! Every command is a plain function over [`Repository`] returning a
//! typed result; nothing prints, and conflicts are reported in results
//! rather than thrown. Callers (CLIs, servers, sync layers) own all
//! presentation.

mod add;
mod branch;
mod checkout;
mod clone;
mod commit;
mod diff;
mod gc;
mod log;
mod merge;
mod rebase;
mod reset;
mod status;
mod tag;

pub use add::{add, rm, AddResult, RmResult};
pub use branch::{
    branch_create, branch_delete, branch_list, branch_rename, BranchInfo,
};
pub use checkout::{checkout, CheckoutResult};
pub use clone::{clone_from_pack, CloneResult};
pub use commit::{commit, CommitOptions, CommitResult};
pub use diff::{diff, DiffTarget};
pub use gc::{gc, GcOptions, GcResult};
pub use log::{log, LogEntry, LogOptions};
pub use merge::{merge, MergeCommandOptions, MergeCommandResult, MergeStatus};
pub use rebase::{
    rebase, rebase_abort, rebase_continue, rebase_skip, RebaseCommandResult,
};
pub use reset::{reset, ResetMode, ResetResult};
pub use status::{status, FileState, StatusReport};
pub use tag::{tag_create, tag_delete, tag_list, TagInfo};

use vgit_repository::{OperationState, Repository};

/// Errors from porcelain commands. Merge/rebase conflicts are not here:
/// they ride in the typed results.
#[derive(Debug, thiserror::Error)]
pub enum PorcelainError {
    #[error("another operation is in progress: {0:?}")]
    OperationInProgress(OperationState),

    #[error("nothing to commit")]
    NothingToCommit,

    #[error("pathspec matched no files: {0}")]
    PathspecUnmatched(String),

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("cannot delete the current branch: {0}")]
    BranchInUse(String),

    #[error("tag not found: {0}")]
    TagNotFound(String),

    #[error(transparent)]
    Repo(#[from] vgit_repository::RepoError),

    #[error(transparent)]
    Merge(#[from] vgit_merge::MergeError),

    #[error(transparent)]
    Odb(#[from] vgit_odb::OdbError),

    #[error(transparent)]
    Pack(#[from] vgit_pack::PackError),

    #[error(transparent)]
    Ref(#[from] vgit_ref::RefError),

    #[error(transparent)]
    Index(#[from] vgit_index::IndexError),

    #[error(transparent)]
    Diff(#[from] vgit_diff::DiffError),

    #[error(transparent)]
    Walk(#[from] vgit_revwalk::WalkError),

    #[error(transparent)]
    Hash(#[from] vgit_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Fail unless no multi-step operation is open.
pub(crate) fn require_clean_state(repo: &Repository) -> Result<(), PorcelainError> {
    let state = repo.operation_state();
    if state.is_clean() {
        Ok(())
    } else {
        Err(PorcelainError::OperationInProgress(state))
    }
}

/// Re-export: repository creation is the first porcelain verb.
pub use vgit_repository::init;
