//! The typed object store.
//!
//! [`ObjectStore`] frames content as `"<type> <size>\0<content>"`, hashes
//! it into an OID, and persists it through a [`vgit_raw::RawStore`]
//! stack: zlib-compressed loose files as the writable primary, with every
//! pack directory layered underneath as a read-only fallback. Readers
//! never learn whether an object was loose or packed.

mod pack_dir;
mod store;
mod typed;

pub use pack_dir::PackDirectory;
pub use store::{ObjectInfo, ObjectStore};
pub use typed::{Blobs, Commits, Tags, Trees};

use vgit_hash::ObjectId;
use vgit_object::ObjectType;

/// Errors from the typed object store.
#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    #[error("mismatched type for {oid}: expected {expected}, found {actual}")]
    MismatchedType {
        oid: ObjectId,
        expected: ObjectType,
        actual: ObjectType,
    },

    #[error("corrupt object {oid}: {source}")]
    Corrupt {
        oid: ObjectId,
        #[source]
        source: vgit_object::ObjectError,
    },

    #[error(transparent)]
    Object(#[from] vgit_object::ObjectError),

    #[error(transparent)]
    Raw(vgit_raw::RawStoreError),

    #[error(transparent)]
    Pack(#[from] vgit_pack::PackError),

    #[error(transparent)]
    Hash(#[from] vgit_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OdbError {
    /// Raw-store errors carry string keys; translate key-not-found into
    /// the typed NotFound where the OID is known.
    fn from_raw(err: vgit_raw::RawStoreError, oid: &ObjectId) -> Self {
        match err {
            vgit_raw::RawStoreError::NotFound(_) => Self::NotFound(*oid),
            other => Self::Raw(other),
        }
    }
}
