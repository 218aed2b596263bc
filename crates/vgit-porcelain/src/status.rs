//! Working copy status.

use std::collections::BTreeMap;

use bstr::BString;
use vgit_index::Stage;
use vgit_repository::{worktree::flatten_tree, Repository, WalkOptions};

use crate::PorcelainError;

/// How a path differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FileState {
    Added,
    Modified,
    Deleted,
}

/// The typed `status` report.
#[derive(Debug, Clone, Default)]
pub struct StatusReport {
    /// Index vs HEAD tree: what the next commit changes.
    pub staged: Vec<(BString, FileState)>,
    /// Worktree vs index: unstaged edits.
    pub unstaged: Vec<(BString, FileState)>,
    /// Files on disk the index does not know.
    pub untracked: Vec<BString>,
    /// Paths with open merge conflicts.
    pub conflicted: Vec<BString>,
}

impl StatusReport {
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty()
            && self.unstaged.is_empty()
            && self.untracked.is_empty()
            && self.conflicted.is_empty()
    }
}

/// Compute the three-way status: HEAD tree vs index vs worktree.
pub fn status(repo: &Repository) -> Result<StatusReport, PorcelainError> {
    let index = repo.index()?;
    let head_files = flatten_tree(repo.store(), &repo.head_tree()?)?;

    let mut report = StatusReport {
        conflicted: index.conflicted_paths(),
        ..Default::default()
    };

    // Staged: index stage-0 against the HEAD tree.
    let mut index_files: BTreeMap<BString, vgit_hash::ObjectId> = BTreeMap::new();
    for entry in index.entries() {
        if entry.stage == Stage::Normal {
            index_files.insert(entry.path.clone(), entry.oid);
        }
    }
    for (path, oid) in &index_files {
        match head_files.get(path) {
            None => report.staged.push((path.clone(), FileState::Added)),
            Some((_, head_oid)) if head_oid != oid => {
                report.staged.push((path.clone(), FileState::Modified))
            }
            Some(_) => {}
        }
    }
    for path in head_files.keys() {
        if !index_files.contains_key(path) && !report.conflicted.contains(path) {
            report.staged.push((path.clone(), FileState::Deleted));
        }
    }

    // Unstaged + untracked: worktree against the index.
    let mut seen_on_disk: BTreeMap<BString, ()> = BTreeMap::new();
    for entry in repo.worktree().walk(&WalkOptions::default())? {
        seen_on_disk.insert(entry.path.clone(), ());
        let Some(index_entry) = index.get(&entry.path, Stage::Normal) else {
            if !report.conflicted.contains(&entry.path) {
                report.untracked.push(entry.path);
            }
            continue;
        };
        // Stat cache first; rehash only when it disagrees.
        let meta = std::fs::metadata(repo.work_dir().join(entry.path.to_string()))?;
        if index_entry.flags.assume_valid || index_entry.stat.matches(&meta) {
            continue;
        }
        let on_disk = repo.worktree().compute_hash(&entry.path)?;
        if on_disk != index_entry.oid {
            report.unstaged.push((entry.path, FileState::Modified));
        }
    }
    for path in index_files.keys() {
        if !seen_on_disk.contains_key(path) {
            report.unstaged.push((path.clone(), FileState::Deleted));
        }
    }

    report.staged.sort();
    report.unstaged.sort();
    report.untracked.sort();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{add, commit, rm, CommitOptions};
    use vgit_object::FileMode;
    use vgit_repository::init;

    fn write(repo: &Repository, path: &str, content: &[u8]) {
        repo.worktree()
            .write_content(&BString::from(path), content, FileMode::Regular)
            .unwrap();
    }

    #[test]
    fn fresh_repo_with_file_is_untracked() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();
        write(&repo, "new.txt", b"x");

        let report = status(&repo).unwrap();
        assert_eq!(report.untracked, vec![BString::from("new.txt")]);
        assert!(report.staged.is_empty());
        assert!(!report.is_clean());
    }

    #[test]
    fn add_moves_to_staged_and_commit_cleans() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();
        write(&repo, "f.txt", b"one\n");
        add(&repo, &["f.txt"]).unwrap();

        let report = status(&repo).unwrap();
        assert_eq!(
            report.staged,
            vec![(BString::from("f.txt"), FileState::Added)]
        );
        assert!(report.untracked.is_empty());

        commit(&repo, CommitOptions::with_default_author("c1")).unwrap();
        assert!(status(&repo).unwrap().is_clean());
    }

    #[test]
    fn edit_after_commit_is_unstaged() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();
        write(&repo, "f.txt", b"one\n");
        add(&repo, &["f.txt"]).unwrap();
        commit(&repo, CommitOptions::with_default_author("c1")).unwrap();

        write(&repo, "f.txt", b"two\n");
        let report = status(&repo).unwrap();
        assert_eq!(
            report.unstaged,
            vec![(BString::from("f.txt"), FileState::Modified)]
        );
        assert!(report.staged.is_empty());
    }

    #[test]
    fn staged_deletion_reported() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();
        write(&repo, "f.txt", b"one\n");
        add(&repo, &["f.txt"]).unwrap();
        commit(&repo, CommitOptions::with_default_author("c1")).unwrap();

        rm(&repo, &["f.txt"]).unwrap();
        let report = status(&repo).unwrap();
        assert_eq!(
            report.staged,
            vec![(BString::from("f.txt"), FileState::Deleted)]
        );
    }

    #[test]
    fn deleted_on_disk_but_staged_is_unstaged_delete() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();
        write(&repo, "f.txt", b"one\n");
        add(&repo, &["f.txt"]).unwrap();
        commit(&repo, CommitOptions::with_default_author("c1")).unwrap();

        std::fs::remove_file(dir.path().join("f.txt")).unwrap();
        let report = status(&repo).unwrap();
        assert_eq!(
            report.unstaged,
            vec![(BString::from("f.txt"), FileState::Deleted)]
        );
    }
}
