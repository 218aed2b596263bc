//! Switching branches and detaching onto commits.

use vgit_hash::ObjectId;
use vgit_index::ReadTreeOptions;
use vgit_ref::RefName;
use vgit_repository::{
    peel_to_commit, resolve_revision, CheckoutOptions, CheckoutSummary, Repository,
};

use crate::{require_clean_state, PorcelainError};

/// The typed `checkout` result.
#[derive(Debug, Clone)]
pub struct CheckoutResult {
    pub new_head: ObjectId,
    /// The branch now checked out, or `None` when detached.
    pub branch: Option<String>,
    pub summary: CheckoutSummary,
}

/// Check out a branch or revision.
///
/// Branch names attach `HEAD` symbolically; anything else detaches. The
/// worktree projection refuses to clobber local changes unless `force`;
/// a summary with conflicts means HEAD did not move.
pub fn checkout(
    repo: &Repository,
    target: &str,
    force: bool,
) -> Result<CheckoutResult, PorcelainError> {
    require_clean_state(repo)?;

    let branch_ref = RefName::branch(target).ok();
    let (commit, branch) = match &branch_ref {
        Some(name) if repo.refs().get(name)?.is_some() => {
            let resolved = repo.refs().resolve_required(name)?;
            (peel_to_commit(repo, resolved.oid)?, Some(target.to_string()))
        }
        _ => (
            peel_to_commit(repo, resolve_revision(repo, target)?)?,
            None,
        ),
    };

    let tree = repo.store().commits().load(&commit)?.tree;
    let summary = repo.worktree().checkout_tree(
        &tree,
        &CheckoutOptions {
            force,
            ..Default::default()
        },
    )?;
    if !summary.conflicts.is_empty() {
        return Ok(CheckoutResult {
            new_head: repo.head_oid()?.unwrap_or(commit),
            branch: None,
            summary,
        });
    }

    // Move HEAD only after the projection succeeded.
    match &branch {
        Some(name) => repo
            .refs()
            .set_symbolic(&RefName::head(), &RefName::branch(name)?)?,
        None => repo.refs().set(&RefName::head(), &commit)?,
    }

    // The index now mirrors the checked-out tree.
    let mut index = repo.index()?;
    index.set_path(repo.git_dir().join("index"));
    index.read_tree(repo.store(), &tree, ReadTreeOptions::default())?;
    index.write()?;

    Ok(CheckoutResult {
        new_head: commit,
        branch,
        summary,
    })
}
