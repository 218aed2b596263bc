//! The `reset` command: soft, mixed, hard.

use vgit_hash::ObjectId;
use vgit_index::ReadTreeOptions;
use vgit_ref::RefName;
use vgit_repository::{resolve_revision, CheckoutOptions, Repository};

use crate::PorcelainError;

/// How far the reset reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetMode {
    /// Move the branch only.
    Soft,
    /// Branch + index.
    #[default]
    Mixed,
    /// Branch + index + worktree.
    Hard,
}

/// The typed `reset` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetResult {
    pub new_head: ObjectId,
    pub mode: ResetMode,
}

/// Reset the current branch to a revision.
pub fn reset(
    repo: &Repository,
    rev: &str,
    mode: ResetMode,
) -> Result<ResetResult, PorcelainError> {
    let target = resolve_revision(repo, rev)?;
    let old_head = repo.head_oid()?;

    if let Some(old) = old_head {
        repo.set_state_ref("ORIG_HEAD", &old)?;
    }

    match repo.head_branch()? {
        Some(branch) => repo
            .refs()
            .compare_and_swap(&branch, old_head, Some(target))?,
        None => repo.refs().set(&RefName::head(), &target)?,
    }

    if matches!(mode, ResetMode::Mixed | ResetMode::Hard) {
        let tree = repo.store().commits().load(&target)?.tree;
        let mut index = repo.index()?;
        index.set_path(repo.git_dir().join("index"));
        index.read_tree(repo.store(), &tree, ReadTreeOptions::default())?;
        index.write()?;

        if mode == ResetMode::Hard {
            repo.worktree().checkout_tree(
                &tree,
                &CheckoutOptions {
                    force: true,
                    ..Default::default()
                },
            )?;
        }
    }

    // Any half-finished merge/cherry-pick/revert markers die with a reset.
    for marker in ["MERGE_HEAD", "CHERRY_PICK_HEAD", "REVERT_HEAD"] {
        repo.clear_state_ref(marker)?;
    }

    Ok(ResetResult {
        new_head: target,
        mode,
    })
}
