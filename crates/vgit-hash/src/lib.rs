//! Object identity and hash computation for the vgit version control engine.
//!
//! Provides the [`ObjectId`] type (a 20-byte SHA-1 digest), hex
//! encoding/decoding, and the streaming [`Hasher`] used to compute object
//! identities from `"<type> <size>\0<content>"` framing.

mod error;
pub mod hasher;
pub mod hex;
mod oid;

pub use error::HashError;
pub use hasher::Hasher;
pub use oid::ObjectId;

/// The well-known OID of the empty tree. Present in every store without
/// ever being written (see the object store's virtual-object handling).
pub const EMPTY_TREE_OID: ObjectId = ObjectId([
    0x4b, 0x82, 0x5d, 0xc6, 0x42, 0xcb, 0x6e, 0xb9, 0xa0, 0x60, 0xe5, 0x4b, 0xf8, 0xd6, 0x92,
    0x88, 0xfb, 0xee, 0x49, 0x04,
]);

/// The all-zero OID, denoting "no object" in ref updates.
pub const ZERO_OID: ObjectId = ObjectId([0u8; 20]);
