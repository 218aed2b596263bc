//! Staging: `add` and `rm`.

use bstr::BString;
use vgit_index::{IndexEntry, Stage, StatData};
use vgit_repository::{Repository, WalkOptions};

use crate::PorcelainError;

/// What `add` staged.
#[derive(Debug, Clone, Default)]
pub struct AddResult {
    pub staged: Vec<BString>,
}

/// What `rm` removed.
#[derive(Debug, Clone, Default)]
pub struct RmResult {
    pub removed: Vec<BString>,
}

/// Stage worktree paths. A path naming a directory stages everything
/// under it; `.` stages the whole worktree.
pub fn add(repo: &Repository, paths: &[&str]) -> Result<AddResult, PorcelainError> {
    let worktree = repo.worktree();
    let mut to_stage: Vec<BString> = Vec::new();

    for &path in paths {
        if path == "." {
            for entry in worktree.walk(&WalkOptions::default())? {
                to_stage.push(entry.path);
            }
            continue;
        }
        let abs = repo.work_dir().join(path);
        if abs.is_dir() {
            let entries = worktree.walk(&WalkOptions {
                prefix: Some(path.to_string()),
                ..Default::default()
            })?;
            if entries.is_empty() {
                return Err(PorcelainError::PathspecUnmatched(path.to_string()));
            }
            to_stage.extend(entries.into_iter().map(|e| e.path));
        } else if abs.is_file() || abs.is_symlink() {
            to_stage.push(BString::from(path));
        } else {
            return Err(PorcelainError::PathspecUnmatched(path.to_string()));
        }
    }

    let index = repo.index()?;
    let mut editor = index.editor()?;
    let mut staged = Vec::new();
    for path in to_stage {
        let content = worktree.read_content(&path)?;
        let oid = repo.store().blobs().store(&content)?;

        let abs = repo.work_dir().join(path.to_string());
        let meta = std::fs::metadata(&abs)?;
        let mode = file_mode(&meta);

        let mut entry = IndexEntry::from_oid(path.clone(), mode, oid, Stage::Normal);
        entry.stat = StatData::from_metadata(&meta);
        // Staging a path resolves any open conflict on it.
        editor.remove(&path);
        editor.upsert_entry(entry);
        staged.push(path);
    }
    editor.finish()?;

    Ok(AddResult { staged })
}

/// Remove paths from the index and the worktree.
pub fn rm(repo: &Repository, paths: &[&str]) -> Result<RmResult, PorcelainError> {
    let index = repo.index()?;
    let mut editor = index.editor()?;
    let mut removed = Vec::new();

    for &path in paths {
        let path = BString::from(path);
        if !editor.pending().has(&path) {
            return Err(PorcelainError::PathspecUnmatched(path.to_string()));
        }
        editor.remove(&path);
        repo.worktree().remove(&path, false)?;
        removed.push(path);
    }
    editor.finish()?;

    Ok(RmResult { removed })
}

fn file_mode(meta: &std::fs::Metadata) -> vgit_object::FileMode {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 != 0 {
            return vgit_object::FileMode::Executable;
        }
    }
    let _ = meta;
    vgit_object::FileMode::Regular
}
