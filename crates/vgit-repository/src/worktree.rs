//! The working tree: walking, hashing, and checkout projection.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use bstr::{BString, ByteVec};
use vgit_hash::{Hasher, ObjectId};
use vgit_object::{FileMode, Tree};

use crate::{RepoError, Repository};

/// One filesystem entry seen by [`Worktree::walk`].
#[derive(Debug, Clone)]
pub struct WorktreeEntry {
    /// Repo-relative path, `/`-separated.
    pub path: BString,
    pub name: BString,
    /// File mode as git would record it (None for directories).
    pub mode: Option<FileMode>,
    pub size: u64,
    pub mtime_secs: i64,
    pub is_dir: bool,
    pub is_ignored: bool,
}

/// Options for [`Worktree::walk`].
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    pub include_ignored: bool,
    pub include_dirs: bool,
    /// Restrict the walk to this repo-relative subpath.
    pub prefix: Option<String>,
    /// Ignore patterns (`*.tmp`, `target/`, `docs/*.bak`).
    pub ignore_patterns: Vec<String>,
    pub max_depth: Option<usize>,
}

/// Options for [`Worktree::checkout_tree`].
#[derive(Debug, Clone, Default)]
pub struct CheckoutOptions {
    /// Overwrite local modifications instead of reporting conflicts.
    pub force: bool,
    /// Restrict the checkout to these repo-relative paths.
    pub paths: Option<Vec<BString>>,
    /// Compute the summary without touching the filesystem.
    pub dry_run: bool,
}

/// What a checkout did (or would do, under `dry_run`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckoutSummary {
    pub updated: Vec<BString>,
    pub removed: Vec<BString>,
    /// Paths whose local content blocked the checkout.
    pub conflicts: Vec<BString>,
    /// Paths where the filesystem write failed.
    pub failed: Vec<BString>,
}

impl CheckoutSummary {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.failed.is_empty()
    }
}

/// Filesystem operations scoped to a repository's working tree.
pub struct Worktree<'a> {
    repo: &'a Repository,
}

impl<'a> Worktree<'a> {
    pub(crate) fn new(repo: &'a Repository) -> Self {
        Self { repo }
    }

    fn abs(&self, path: &BString) -> PathBuf {
        self.repo.work_dir().join(path.to_string())
    }

    /// Walk the working tree, depth-first, in name order. `.git` is
    /// always skipped.
    pub fn walk(&self, options: &WalkOptions) -> Result<Vec<WorktreeEntry>, RepoError> {
        let root = match &options.prefix {
            Some(prefix) => self.repo.work_dir().join(prefix),
            None => self.repo.work_dir().to_path_buf(),
        };
        let mut out = Vec::new();
        if root.exists() {
            self.walk_dir(&root, options, 0, &mut out)?;
        }
        Ok(out)
    }

    fn walk_dir(
        &self,
        dir: &Path,
        options: &WalkOptions,
        depth: usize,
        out: &mut Vec<WorktreeEntry>,
    ) -> Result<(), RepoError> {
        if options.max_depth.is_some_and(|max| depth >= max) {
            return Ok(());
        }

        let mut entries: Vec<fs::DirEntry> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let name = BString::from(entry.file_name().to_string_lossy().as_bytes());
            if name == ".git" {
                continue;
            }
            let abs = entry.path();
            let rel = abs
                .strip_prefix(self.repo.work_dir())
                .expect("walk stays under the work dir");
            let path = BString::from(rel.to_string_lossy().replace('\\', "/"));

            let meta = entry.metadata()?;
            let is_dir = meta.is_dir();
            let ignored = is_ignored(&path, is_dir, &options.ignore_patterns);

            if is_dir {
                if ignored && !options.include_ignored {
                    continue;
                }
                if options.include_dirs {
                    out.push(WorktreeEntry {
                        path: path.clone(),
                        name,
                        mode: None,
                        size: 0,
                        mtime_secs: mtime_of(&meta),
                        is_dir: true,
                        is_ignored: ignored,
                    });
                }
                self.walk_dir(&abs, options, depth + 1, out)?;
            } else {
                if ignored && !options.include_ignored {
                    continue;
                }
                out.push(WorktreeEntry {
                    path,
                    name,
                    mode: Some(mode_of(&meta)),
                    size: meta.len(),
                    mtime_secs: mtime_of(&meta),
                    is_dir: false,
                    is_ignored: ignored,
                });
            }
        }
        Ok(())
    }

    /// Read a file's content.
    pub fn read_content(&self, path: &BString) -> Result<Vec<u8>, RepoError> {
        Ok(fs::read(self.abs(path))?)
    }

    /// The blob OID a file would get, without storing anything.
    pub fn compute_hash(&self, path: &BString) -> Result<ObjectId, RepoError> {
        let content = self.read_content(path)?;
        Ok(Hasher::hash_object("blob", &content)?)
    }

    /// Write a file, creating parents as needed.
    pub fn write_content(
        &self,
        path: &BString,
        content: &[u8],
        mode: FileMode,
    ) -> Result<(), RepoError> {
        let abs = self.abs(path);
        if let Some(parent) = abs.parent() {
            fs::create_dir_all(parent)?;
        }

        #[cfg(unix)]
        if mode.is_symlink() {
            let target = String::from_utf8_lossy(content).to_string();
            if abs.exists() || fs::symlink_metadata(&abs).is_ok() {
                fs::remove_file(&abs)?;
            }
            std::os::unix::fs::symlink(target, &abs)?;
            return Ok(());
        }

        fs::write(&abs, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perm = if mode == FileMode::Executable { 0o755 } else { 0o644 };
            fs::set_permissions(&abs, fs::Permissions::from_mode(perm))?;
        }
        #[cfg(not(unix))]
        let _ = mode;

        Ok(())
    }

    /// Remove a file (or a directory when `recursive`).
    pub fn remove(&self, path: &BString, recursive: bool) -> Result<bool, RepoError> {
        let abs = self.abs(path);
        if abs.is_dir() {
            if recursive {
                fs::remove_dir_all(&abs)?;
            } else {
                fs::remove_dir(&abs)?;
            }
            Ok(true)
        } else if abs.is_file() || fs::symlink_metadata(&abs).is_ok() {
            fs::remove_file(&abs)?;
            self.prune_empty_parents(&abs);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn mkdir(&self, path: &BString) -> Result<(), RepoError> {
        fs::create_dir_all(self.abs(path))?;
        Ok(())
    }

    pub fn rename(&self, from: &BString, to: &BString) -> Result<(), RepoError> {
        let to_abs = self.abs(to);
        if let Some(parent) = to_abs.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(self.abs(from), to_abs)?;
        Ok(())
    }

    fn prune_empty_parents(&self, removed: &Path) {
        let mut dir = removed.parent().map(|p| p.to_path_buf());
        while let Some(d) = dir {
            if d == self.repo.work_dir() {
                break;
            }
            let empty = d
                .read_dir()
                .map(|mut e| e.next().is_none())
                .unwrap_or(false);
            if !empty || fs::remove_dir(&d).is_err() {
                break;
            }
            dir = d.parent().map(|p| p.to_path_buf());
        }
    }

    /// Project `tree` onto the filesystem.
    ///
    /// Safety: a file whose content matches neither the target tree nor
    /// the currently checked-out tree is reported as a conflict and left
    /// alone, unless `force`.
    pub fn checkout_tree(
        &self,
        tree: &ObjectId,
        options: &CheckoutOptions,
    ) -> Result<CheckoutSummary, RepoError> {
        let store = self.repo.store();
        let target = flatten_tree(store, tree)?;
        let baseline = flatten_tree(store, &self.repo.head_tree()?)?;

        let in_scope = |path: &BString| match &options.paths {
            Some(paths) => paths.iter().any(|p| p == path),
            None => true,
        };

        let mut summary = CheckoutSummary::default();

        for (path, (mode, oid)) in &target {
            if !in_scope(path) {
                continue;
            }
            let abs = self.abs(path);
            let on_disk = self.current_blob_oid(&abs)?;

            match on_disk {
                Some(current) if current == *oid => continue,
                Some(current) => {
                    let safe = baseline
                        .get(path)
                        .is_some_and(|(_, base_oid)| *base_oid == current);
                    if !safe && !options.force {
                        summary.conflicts.push(path.clone());
                        continue;
                    }
                }
                None => {}
            }

            if !options.dry_run {
                let content = store.blobs().load(oid)?;
                if self.write_content(path, &content, *mode).is_err() {
                    summary.failed.push(path.clone());
                    continue;
                }
            }
            summary.updated.push(path.clone());
        }

        for (path, (_, base_oid)) in &baseline {
            if !in_scope(path) || target.contains_key(path) {
                continue;
            }
            let abs = self.abs(path);
            let on_disk = self.current_blob_oid(&abs)?;
            match on_disk {
                None => continue,
                Some(current) if current != *base_oid && !options.force => {
                    summary.conflicts.push(path.clone());
                }
                Some(_) => {
                    if !options.dry_run && self.remove(path, false).is_err() {
                        summary.failed.push(path.clone());
                        continue;
                    }
                    summary.removed.push(path.clone());
                }
            }
        }

        Ok(summary)
    }

    fn current_blob_oid(&self, abs: &Path) -> Result<Option<ObjectId>, RepoError> {
        match fs::read(abs) {
            Ok(content) => Ok(Some(Hasher::hash_object("blob", &content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Flatten a stored tree into `path -> (mode, oid)`.
pub fn flatten_tree(
    store: &vgit_odb::ObjectStore,
    tree: &ObjectId,
) -> Result<BTreeMap<BString, (FileMode, ObjectId)>, RepoError> {
    let mut out = BTreeMap::new();
    flatten_into(store, tree, &BString::from(""), &mut out)?;
    Ok(out)
}

fn flatten_into(
    store: &vgit_odb::ObjectStore,
    tree: &ObjectId,
    prefix: &BString,
    out: &mut BTreeMap<BString, (FileMode, ObjectId)>,
) -> Result<(), RepoError> {
    let tree: Tree = store.trees().load(tree)?;
    for entry in tree.iter() {
        let mut path = prefix.clone();
        if !path.is_empty() {
            path.push_byte(b'/');
        }
        path.push_str(&entry.name);
        if entry.mode.is_dir() {
            flatten_into(store, &entry.oid, &path, out)?;
        } else {
            out.insert(path, (entry.mode, entry.oid));
        }
    }
    Ok(())
}

fn mode_of(meta: &fs::Metadata) -> FileMode {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if meta.file_type().is_symlink() {
            return FileMode::Symlink;
        }
        if meta.mode() & 0o111 != 0 {
            return FileMode::Executable;
        }
    }
    let _ = meta;
    FileMode::Regular
}

fn mtime_of(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Ignore-pattern test. Patterns ending in `/` match directories (and
/// everything under them); patterns containing `/` match the full path;
/// bare patterns match any path component. `*` and `?` wildcard within
/// a component.
fn is_ignored(path: &BString, is_dir: bool, patterns: &[String]) -> bool {
    let path_str = path.to_string();
    for pattern in patterns {
        if let Some(dir_pattern) = pattern.strip_suffix('/') {
            let matches_dir = wildmatch(dir_pattern, &path_str)
                || path_str
                    .split('/')
                    .any(|component| wildmatch(dir_pattern, component));
            if matches_dir && is_dir {
                return true;
            }
            // Files under an ignored directory are ignored too.
            if path_str
                .split('/')
                .take(path_str.split('/').count().saturating_sub(1))
                .any(|component| wildmatch(dir_pattern, component))
            {
                return true;
            }
        } else if pattern.contains('/') {
            if wildmatch(pattern, &path_str) {
                return true;
            }
        } else {
            let name = path_str.rsplit('/').next().unwrap_or(&path_str);
            if wildmatch(pattern, name) {
                return true;
            }
        }
    }
    false
}

/// Glob match with `*` (any run, not crossing `/`) and `?` (any single
/// byte except `/`).
fn wildmatch(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    wildmatch_at(&p, 0, &t, 0)
}

fn wildmatch_at(p: &[char], mut pi: usize, t: &[char], mut ti: usize) -> bool {
    while pi < p.len() {
        match p[pi] {
            '*' => {
                // Collapse runs of '*', then try every split point.
                while pi + 1 < p.len() && p[pi + 1] == '*' {
                    pi += 1;
                }
                if pi + 1 == p.len() {
                    return t[ti..].iter().all(|&c| c != '/');
                }
                let mut k = ti;
                loop {
                    if wildmatch_at(p, pi + 1, t, k) {
                        return true;
                    }
                    if k >= t.len() || t[k] == '/' {
                        return false;
                    }
                    k += 1;
                }
            }
            '?' => {
                if ti >= t.len() || t[ti] == '/' {
                    return false;
                }
                pi += 1;
                ti += 1;
            }
            c => {
                if ti >= t.len() || t[ti] != c {
                    return false;
                }
                pi += 1;
                ti += 1;
            }
        }
    }
    ti == t.len()
}
