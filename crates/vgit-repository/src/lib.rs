//! The repository handle: gitdir layout, object store, refs, staging
//! index, and the working tree.

mod init;
mod revision;
mod state;
pub mod worktree;

pub use init::{init, DEFAULT_BRANCH};
pub use revision::{peel_to_commit, resolve_revision};
pub use state::OperationState;
pub use worktree::{CheckoutOptions, CheckoutSummary, WalkOptions, Worktree, WorktreeEntry};

use std::path::{Path, PathBuf};

use vgit_hash::ObjectId;
use vgit_index::Index;
use vgit_object::ObjectType;
use vgit_odb::ObjectStore;
use vgit_ref::{FilesRefStore, RefName};

/// Errors from repository-level operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not a repository (no .git directory found above {0})")]
    NotARepository(PathBuf),

    #[error("repository already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("HEAD is unborn (no commits yet)")]
    UnbornHead,

    #[error("invalid revision: {0}")]
    InvalidRevision(String),

    #[error("checkout would overwrite local changes: {0:?}")]
    WouldClobber(Vec<bstr::BString>),

    #[error(transparent)]
    Odb(#[from] vgit_odb::OdbError),

    #[error(transparent)]
    Ref(#[from] vgit_ref::RefError),

    #[error(transparent)]
    Index(#[from] vgit_index::IndexError),

    #[error(transparent)]
    Walk(#[from] vgit_revwalk::WalkError),

    #[error(transparent)]
    Hash(#[from] vgit_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// An opened repository.
pub struct Repository {
    work_dir: PathBuf,
    git_dir: PathBuf,
    store: ObjectStore,
    refs: FilesRefStore,
}

impl Repository {
    /// Open the repository containing `path`, walking upward to find the
    /// `.git` directory.
    pub fn discover(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let start = path.as_ref().canonicalize()?;
        let mut current = Some(start.as_path());
        while let Some(dir) = current {
            let git_dir = dir.join(".git");
            if git_dir.is_dir() {
                return Self::open_at(dir.to_path_buf(), git_dir);
            }
            current = dir.parent();
        }
        Err(RepoError::NotARepository(start))
    }

    /// Open a repository whose worktree root is `work_dir`.
    pub fn open(work_dir: impl AsRef<Path>) -> Result<Self, RepoError> {
        let work_dir = work_dir.as_ref().to_path_buf();
        let git_dir = work_dir.join(".git");
        if !git_dir.is_dir() {
            return Err(RepoError::NotARepository(work_dir));
        }
        Self::open_at(work_dir, git_dir)
    }

    fn open_at(work_dir: PathBuf, git_dir: PathBuf) -> Result<Self, RepoError> {
        let store = ObjectStore::open(git_dir.join("objects"))?;
        let refs = FilesRefStore::new(&git_dir);
        Ok(Self {
            work_dir,
            git_dir,
            store,
            refs,
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn refs(&self) -> &FilesRefStore {
        &self.refs
    }

    /// The working tree layer.
    pub fn worktree(&self) -> Worktree<'_> {
        Worktree::new(self)
    }

    /// Read any object by OID: its type and content bytes.
    pub fn read_object(&self, oid: &ObjectId) -> Result<(ObjectType, Vec<u8>), RepoError> {
        Ok(self.store.load(oid)?)
    }

    /// Load the staging index (empty when the file is absent).
    pub fn index(&self) -> Result<Index, RepoError> {
        Ok(Index::load(self.git_dir.join("index"))?)
    }

    /// The commit `HEAD` resolves to, or `None` on an unborn branch.
    pub fn head_oid(&self) -> Result<Option<ObjectId>, RepoError> {
        Ok(self.refs.resolve(&RefName::head())?.map(|r| r.oid))
    }

    /// The branch `HEAD` points at, or `None` when detached.
    pub fn head_branch(&self) -> Result<Option<RefName>, RepoError> {
        match self.refs.get(&RefName::head())? {
            Some(vgit_ref::Reference::Symbolic { target, .. }) => Ok(Some(target)),
            _ => Ok(None),
        }
    }

    /// The tree of the current `HEAD` commit (empty tree when unborn).
    pub fn head_tree(&self) -> Result<ObjectId, RepoError> {
        match self.head_oid()? {
            Some(commit) => Ok(self.store.commits().load(&commit)?.tree),
            None => Ok(vgit_hash::EMPTY_TREE_OID),
        }
    }

    /// Which multi-step operation (if any) is in progress.
    pub fn operation_state(&self) -> OperationState {
        state::read(&self.git_dir)
    }

    /// Read a state ref like `MERGE_HEAD` from `<gitdir>`.
    pub fn state_ref(&self, name: &str) -> Result<Option<ObjectId>, RepoError> {
        let path = self.git_dir.join(name);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(
                ObjectId::from_hex(contents.trim())
                    .map_err(|_| RepoError::InvalidRevision(name.to_string()))?,
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write a state ref like `ORIG_HEAD`.
    pub fn set_state_ref(&self, name: &str, oid: &ObjectId) -> Result<(), RepoError> {
        std::fs::write(self.git_dir.join(name), format!("{}\n", oid.to_hex()))?;
        Ok(())
    }

    /// Remove a state ref; absent is fine.
    pub fn clear_state_ref(&self, name: &str) -> Result<(), RepoError> {
        match std::fs::remove_file(self.git_dir.join(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_requires_git_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Repository::open(dir.path()),
            Err(RepoError::NotARepository(_))
        ));
    }

    #[test]
    fn discover_walks_upward() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path()).unwrap();
        let nested = dir.path().join("src/deeply/nested");
        std::fs::create_dir_all(&nested).unwrap();

        let repo = Repository::discover(&nested).unwrap();
        assert_eq!(
            repo.git_dir().canonicalize().unwrap(),
            dir.path().join(".git").canonicalize().unwrap()
        );
    }

    #[test]
    fn read_object_returns_type_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();
        let oid = repo.store().blobs().store(b"hello\n").unwrap();

        let (obj_type, content) = repo.read_object(&oid).unwrap();
        assert_eq!(obj_type, ObjectType::Blob);
        assert_eq!(content, b"hello\n");

        let missing = ObjectId([0x42u8; 20]);
        assert!(matches!(
            repo.read_object(&missing),
            Err(RepoError::Odb(vgit_odb::OdbError::NotFound(_)))
        ));
    }

    #[test]
    fn state_refs_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();
        let oid = ObjectId([5u8; 20]);

        assert_eq!(repo.state_ref("MERGE_HEAD").unwrap(), None);
        repo.set_state_ref("MERGE_HEAD", &oid).unwrap();
        assert_eq!(repo.state_ref("MERGE_HEAD").unwrap(), Some(oid));
        repo.clear_state_ref("MERGE_HEAD").unwrap();
        assert_eq!(repo.state_ref("MERGE_HEAD").unwrap(), None);
        repo.clear_state_ref("MERGE_HEAD").unwrap();
    }
}
