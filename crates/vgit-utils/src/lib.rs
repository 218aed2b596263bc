//! Foundation utilities for the vgit version control engine.
//!
//! Provides the lockfile protocol used for every atomic file update
//! (refs, packed-refs, the staging index) and the date/signature types
//! shared by commits and tags.

pub mod date;
mod error;
pub mod lockfile;

pub use date::{GitDate, Signature};
pub use error::{LockError, UtilError};
pub use lockfile::LockFile;

/// Crate-local result alias.
pub type Result<T> = std::result::Result<T, UtilError>;
