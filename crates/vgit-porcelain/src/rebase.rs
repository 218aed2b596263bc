//! The `rebase` command family: thin typed wrappers over the sequencer.

use vgit_merge::{RebaseResult, RebaseStatus};
use vgit_repository::{resolve_revision, OperationState, Repository};

use crate::PorcelainError;

/// The typed `rebase` result. Hard errors (missing objects, I/O) map to
/// `Failed` so callers always get a status.
#[derive(Debug, Clone)]
pub struct RebaseCommandResult {
    pub inner: RebaseResult,
}

impl RebaseCommandResult {
    pub fn status(&self) -> RebaseStatus {
        self.inner.status
    }
}

fn failed() -> RebaseCommandResult {
    RebaseCommandResult {
        inner: RebaseResult {
            status: RebaseStatus::Failed,
            new_head: None,
            stopped_at: None,
            conflicts: Vec::new(),
        },
    }
}

fn wrap(result: Result<RebaseResult, vgit_merge::MergeError>) -> RebaseCommandResult {
    match result {
        Ok(inner) => RebaseCommandResult { inner },
        Err(_) => failed(),
    }
}

/// Rebase the current branch: replay `upstream..HEAD` onto `onto`
/// (defaults to `upstream`).
pub fn rebase(
    repo: &Repository,
    upstream: &str,
    onto: Option<&str>,
) -> Result<RebaseCommandResult, PorcelainError> {
    let state = repo.operation_state();
    if !state.is_clean() {
        return Err(PorcelainError::OperationInProgress(state));
    }

    let upstream_oid = resolve_revision(repo, upstream)?;
    let onto_oid = match onto {
        Some(rev) => resolve_revision(repo, rev)?,
        None => upstream_oid,
    };

    Ok(wrap(vgit_merge::rebase(repo, &upstream_oid, &onto_oid)))
}

/// Resume a stopped rebase after resolving conflicts.
pub fn rebase_continue(repo: &Repository) -> Result<RebaseCommandResult, PorcelainError> {
    expect_rebasing(repo)?;
    Ok(wrap(vgit_merge::rebase_continue(repo)))
}

/// Skip the stopped commit and resume.
pub fn rebase_skip(repo: &Repository) -> Result<RebaseCommandResult, PorcelainError> {
    expect_rebasing(repo)?;
    Ok(wrap(vgit_merge::rebase_skip(repo)))
}

/// Abort and restore the original head.
pub fn rebase_abort(repo: &Repository) -> Result<RebaseCommandResult, PorcelainError> {
    expect_rebasing(repo)?;
    Ok(wrap(vgit_merge::rebase_abort(repo)))
}

fn expect_rebasing(repo: &Repository) -> Result<(), PorcelainError> {
    match repo.operation_state() {
        OperationState::Rebasing => Ok(()),
        state => Err(PorcelainError::OperationInProgress(state)),
    }
}
