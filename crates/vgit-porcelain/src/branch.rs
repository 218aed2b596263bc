//! Branch management.

use vgit_hash::ObjectId;
use vgit_ref::{RefName, Reference};
use vgit_repository::{resolve_revision, Repository};

use crate::PorcelainError;

/// One branch in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    /// Short name (`main`, not `refs/heads/main`).
    pub name: String,
    pub target: ObjectId,
    pub is_head: bool,
}

/// List branches, sorted by name.
pub fn branch_list(repo: &Repository) -> Result<Vec<BranchInfo>, PorcelainError> {
    let head_branch = repo.head_branch()?;
    let mut out = Vec::new();
    for reference in repo.refs().list("refs/heads")? {
        if let Reference::Direct { name, target, .. } = reference {
            out.push(BranchInfo {
                is_head: Some(&name) == head_branch.as_ref(),
                name: name.short().to_string(),
                target,
            });
        }
    }
    Ok(out)
}

/// Create a branch at a revision (default `HEAD`). Fails if it exists.
pub fn branch_create(
    repo: &Repository,
    name: &str,
    at: Option<&str>,
) -> Result<BranchInfo, PorcelainError> {
    let target = match at {
        Some(rev) => resolve_revision(repo, rev)?,
        None => repo
            .head_oid()?
            .ok_or(vgit_repository::RepoError::UnbornHead)?,
    };
    let ref_name = RefName::branch(name)?;
    repo.refs().create(&ref_name, &target)?;
    Ok(BranchInfo {
        name: name.to_string(),
        target,
        is_head: false,
    })
}

/// Delete a branch. The checked-out branch cannot be deleted.
pub fn branch_delete(repo: &Repository, name: &str) -> Result<(), PorcelainError> {
    let ref_name = RefName::branch(name)?;
    if repo.head_branch()?.as_ref() == Some(&ref_name) {
        return Err(PorcelainError::BranchInUse(name.to_string()));
    }
    if !repo.refs().delete(&ref_name)? {
        return Err(PorcelainError::BranchNotFound(name.to_string()));
    }
    Ok(())
}

/// Rename a branch, retargeting `HEAD` if it pointed at the old name.
pub fn branch_rename(repo: &Repository, old: &str, new: &str) -> Result<(), PorcelainError> {
    let old_ref = RefName::branch(old)?;
    let new_ref = RefName::branch(new)?;

    let resolved = repo
        .refs()
        .resolve(&old_ref)?
        .ok_or_else(|| PorcelainError::BranchNotFound(old.to_string()))?;

    repo.refs().create(&new_ref, &resolved.oid)?;
    if repo.head_branch()?.as_ref() == Some(&old_ref) {
        repo.refs().set_symbolic(&RefName::head(), &new_ref)?;
    }
    repo.refs().delete(&old_ref)?;
    Ok(())
}
