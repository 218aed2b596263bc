//! References: named pointers into the object store.
//!
//! Refs live loose (one file per ref under `<gitdir>`) or packed (the
//! sorted `packed-refs` file); loose wins on conflict. Symbolic refs
//! (`ref: <target>`) chain up to depth 5. All mutation goes through the
//! ref's lockfile, and updates are compare-and-swap.

mod loose;
mod name;
mod packed;
mod store;

pub use name::RefName;
pub use packed::{PackedRef, PackedRefs};
pub use store::{FilesRefStore, ResolvedRef};

use vgit_hash::ObjectId;

/// Maximum symbolic-ref chain length before resolution fails.
pub const MAX_SYMBOLIC_DEPTH: usize = 5;

/// Errors from ref operations.
#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("ref not found: {0}")]
    NotFound(String),

    #[error("invalid ref name: {name} ({reason})")]
    InvalidName { name: String, reason: &'static str },

    #[error("malformed ref {name}: {reason}")]
    Parse { name: String, reason: String },

    #[error("symbolic ref chain exceeds depth {MAX_SYMBOLIC_DEPTH} at {0}")]
    SymbolicChainTooDeep(String),

    #[error("ref {name} changed: expected {expected:?}, found {actual:?}")]
    CasMismatch {
        name: String,
        expected: Option<ObjectId>,
        actual: Option<ObjectId>,
    },

    #[error("ref {0} is locked by another updater")]
    Locked(String),

    #[error("ref already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Hash(#[from] vgit_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<vgit_utils::UtilError> for RefError {
    fn from(err: vgit_utils::UtilError) -> Self {
        match err {
            vgit_utils::UtilError::Lock(vgit_utils::LockError::AlreadyLocked { path }) => {
                Self::Locked(path.display().to_string())
            }
            vgit_utils::UtilError::Io(e) => Self::Io(e),
            other => Self::Io(std::io::Error::other(other.to_string())),
        }
    }
}

/// A ref: direct (to an object) or symbolic (to another ref).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Direct {
        name: RefName,
        target: ObjectId,
        /// For packed tag refs: the commit the tag peels to.
        peeled: Option<ObjectId>,
    },
    Symbolic {
        name: RefName,
        target: RefName,
    },
}

impl Reference {
    pub fn name(&self) -> &RefName {
        match self {
            Reference::Direct { name, .. } => name,
            Reference::Symbolic { name, .. } => name,
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Reference::Symbolic { .. })
    }

    /// The target OID for direct refs.
    pub fn target_oid(&self) -> Option<ObjectId> {
        match self {
            Reference::Direct { target, .. } => Some(*target),
            Reference::Symbolic { .. } => None,
        }
    }

    /// The target name for symbolic refs.
    pub fn symbolic_target(&self) -> Option<&RefName> {
        match self {
            Reference::Symbolic { target, .. } => Some(target),
            Reference::Direct { .. } => None,
        }
    }
}
