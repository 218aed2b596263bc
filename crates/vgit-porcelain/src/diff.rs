//! Tree comparison between arbitrary points.

use vgit_diff::rename::{detect_renames, DEFAULT_RENAME_THRESHOLD};
use vgit_diff::{diff_trees, TreeDiff};
use vgit_hash::ObjectId;
use vgit_index::Index;
use vgit_repository::{resolve_revision, Repository};

use crate::PorcelainError;

/// What to compare.
#[derive(Debug, Clone, Default)]
pub enum DiffTarget {
    /// HEAD tree vs the staged index (what `commit` would record).
    #[default]
    HeadToIndex,
    /// Two revisions.
    Revisions { from: String, to: String },
}

/// Diff two trees (with rename detection) as a typed change list.
pub fn diff(repo: &Repository, target: &DiffTarget) -> Result<TreeDiff, PorcelainError> {
    let (from_tree, to_tree) = match target {
        DiffTarget::HeadToIndex => {
            let index: Index = repo.index()?;
            (repo.head_tree()?, index.write_tree(repo.store())?)
        }
        DiffTarget::Revisions { from, to } => {
            (tree_of_rev(repo, from)?, tree_of_rev(repo, to)?)
        }
    };

    let mut result = diff_trees(repo.store(), &from_tree, &to_tree)?;
    detect_renames(repo.store(), &mut result, DEFAULT_RENAME_THRESHOLD)?;
    Ok(result)
}

fn tree_of_rev(repo: &Repository, rev: &str) -> Result<ObjectId, PorcelainError> {
    let commit = resolve_revision(repo, rev)?;
    Ok(repo.store().commits().load(&commit)?.tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{add, commit, CommitOptions};
    use bstr::BString;
    use vgit_diff::ChangeKind;
    use vgit_object::FileMode;
    use vgit_repository::init;

    #[test]
    fn diff_between_commits() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();

        repo.worktree()
            .write_content(&BString::from("f.txt"), b"one\n", FileMode::Regular)
            .unwrap();
        add(&repo, &["f.txt"]).unwrap();
        commit(&repo, CommitOptions::with_default_author("c1")).unwrap();

        repo.worktree()
            .write_content(&BString::from("f.txt"), b"two\n", FileMode::Regular)
            .unwrap();
        add(&repo, &["f.txt"]).unwrap();
        commit(&repo, CommitOptions::with_default_author("c2")).unwrap();

        let result = diff(
            &repo,
            &DiffTarget::Revisions {
                from: "HEAD~1".to_string(),
                to: "HEAD".to_string(),
            },
        )
        .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.changes[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn head_to_index_shows_staged_work() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();
        repo.worktree()
            .write_content(&BString::from("new.txt"), b"x\n", FileMode::Regular)
            .unwrap();
        add(&repo, &["new.txt"]).unwrap();

        let result = diff(&repo, &DiffTarget::HeadToIndex).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.changes[0].kind, ChangeKind::Added);
    }
}
