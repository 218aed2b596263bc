use std::path::PathBuf;

/// Errors from lock acquisition and commit.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock already held: {path}")]
    AlreadyLocked { path: PathBuf },

    #[error("failed to create lock file {path}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to commit lock file {path}")]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors produced by the utility layer.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("invalid date: {0}")]
    DateParse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
