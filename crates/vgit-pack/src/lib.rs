//! Packfile reading, writing, consolidation, and the delta engine.
//!
//! A pack stores many objects in one file, optionally as deltas against
//! other objects in the same pack (OFS_DELTA) or anywhere in the store
//! (REF_DELTA). A sidecar v2 index maps OIDs to pack offsets. This crate
//! owns the binary formats, the delta instruction codec, and the policy
//! machinery that decides which objects become deltas.

pub mod consolidate;
pub mod delta;
pub mod entry;
pub mod index;
pub mod pack;
pub mod write;

use vgit_hash::ObjectId;
use vgit_object::ObjectType;

/// Errors that can occur during pack operations.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("bad pack magic")]
    BadMagic,

    #[error("bad pack version: {0}")]
    BadVersion(u32),

    #[error("bad pack trailer: expected {expected}, got {actual}")]
    BadTrailer { expected: ObjectId, actual: ObjectId },

    #[error("bad index magic")]
    BadIndexMagic,

    #[error("bad index version: {0}")]
    BadIndexVersion(u32),

    #[error("invalid pack index: {0}")]
    InvalidIndex(String),

    #[error("truncated entry at offset {0}")]
    TruncatedEntry(u64),

    #[error("delta base missing: {0}")]
    DeltaBaseMissing(ObjectId),

    #[error("delta chain too deep (>{max_depth}) at offset {offset}")]
    ChainTooDeep { offset: u64, max_depth: usize },

    #[error("delta chain cycle through offset {0}")]
    DeltaCycle(u64),

    #[error("crc mismatch for {oid}: expected {expected:08x}, got {actual:08x}")]
    CrcMismatch {
        oid: ObjectId,
        expected: u32,
        actual: u32,
    },

    #[error("invalid delta at offset {offset}: {reason}")]
    InvalidDelta { offset: u64, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Object(#[from] vgit_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] vgit_hash::HashError),
}

/// The kind of a single pack entry before delta resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackEntryKind {
    Commit,
    Tree,
    Blob,
    Tag,
    /// Delta whose base lives earlier in the same pack.
    OfsDelta { base_offset: u64 },
    /// Delta whose base is named by OID (possibly outside this pack).
    RefDelta { base_oid: ObjectId },
}

impl PackEntryKind {
    /// The object type, for non-delta entries.
    pub fn object_type(self) -> Option<ObjectType> {
        match self {
            Self::Commit => Some(ObjectType::Commit),
            Self::Tree => Some(ObjectType::Tree),
            Self::Blob => Some(ObjectType::Blob),
            Self::Tag => Some(ObjectType::Tag),
            Self::OfsDelta { .. } | Self::RefDelta { .. } => None,
        }
    }

    /// The on-disk type code (1-4, 6, 7).
    pub fn code(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
            Self::OfsDelta { .. } => 6,
            Self::RefDelta { .. } => 7,
        }
    }
}

/// A fully resolved object read out of a pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedObject {
    pub obj_type: ObjectType,
    pub data: Vec<u8>,
}

/// Pack format constants.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;
pub const PACK_HEADER_SIZE: usize = 12;

/// Pack index v2 constants.
pub const IDX_SIGNATURE: [u8; 4] = [0xff, 0x74, 0x4f, 0x63]; // "\xfftOc"
pub const IDX_VERSION: u32 = 2;

/// Default bound on delta chain length.
pub const MAX_DELTA_CHAIN_DEPTH: usize = 50;
