//! Repository creation.

use std::fs;
use std::path::Path;

use vgit_ref::RefName;

use crate::{RepoError, Repository};

/// The branch a fresh repository's `HEAD` points at.
pub const DEFAULT_BRANCH: &str = "main";

/// Create a repository at `work_dir` and open it.
///
/// Lays out `.git/` with the object store, ref hierarchy, and a
/// symbolic `HEAD` on an unborn default branch.
pub fn init(work_dir: impl AsRef<Path>) -> Result<Repository, RepoError> {
    let work_dir = work_dir.as_ref().to_path_buf();
    let git_dir = work_dir.join(".git");
    if git_dir.exists() {
        return Err(RepoError::AlreadyExists(git_dir));
    }

    fs::create_dir_all(git_dir.join("objects/pack"))?;
    fs::create_dir_all(git_dir.join("refs/heads"))?;
    fs::create_dir_all(git_dir.join("refs/tags"))?;

    let repo = Repository::open(&work_dir)?;
    repo.refs()
        .set_symbolic(&RefName::head(), &RefName::branch(DEFAULT_BRANCH)?)?;
    Ok(repo)
}
