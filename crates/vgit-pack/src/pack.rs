//! Pack file reader.
//!
//! A pack is a 12-byte header, a sequence of compressed entries, and a
//! trailing SHA-1 over everything before it. Delta entries are resolved
//! iteratively against bases in the same pack (OFS) or named by OID
//! (REF, possibly satisfied by an external resolver).

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::bufread::ZlibDecoder;
use memmap2::Mmap;
use vgit_hash::{Hasher, ObjectId};
use vgit_object::ObjectType;

use crate::entry::parse_header;
use crate::index::PackIndex;
use crate::{
    PackEntryKind, PackError, PackedObject, MAX_DELTA_CHAIN_DEPTH, PACK_HEADER_SIZE,
    PACK_SIGNATURE, PACK_VERSION,
};

/// External lookup for REF_DELTA bases that live outside this pack.
pub type BaseResolver<'a> = &'a dyn Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>;

fn no_resolver(_: &ObjectId) -> Option<(ObjectType, Vec<u8>)> {
    None
}

/// A memory-mapped pack file plus its sidecar index.
pub struct PackFile {
    data: Mmap,
    index: PackIndex,
    pack_path: PathBuf,
    num_objects: u32,
    max_chain_depth: usize,
}

impl PackFile {
    /// Open `<name>.pack` together with its `<name>.idx`.
    pub fn open(pack_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let pack_path = pack_path.as_ref().to_path_buf();
        let idx_path = pack_path.with_extension("idx");

        let file = std::fs::File::open(&pack_path)?;
        let data = unsafe { Mmap::map(&file)? };

        if data.len() < PACK_HEADER_SIZE + ObjectId::RAW_LEN {
            return Err(PackError::BadMagic);
        }
        if &data[0..4] != PACK_SIGNATURE {
            return Err(PackError::BadMagic);
        }
        let version = u32::from_be_bytes(data[4..8].try_into().unwrap());
        if version != PACK_VERSION {
            return Err(PackError::BadVersion(version));
        }
        let num_objects = u32::from_be_bytes(data[8..12].try_into().unwrap());

        let index = PackIndex::open(&idx_path)?;
        if index.num_objects() != num_objects {
            return Err(PackError::InvalidIndex(format!(
                "pack has {} objects but index has {}",
                num_objects,
                index.num_objects()
            )));
        }

        Ok(Self {
            data,
            index,
            pack_path,
            num_objects,
            max_chain_depth: MAX_DELTA_CHAIN_DEPTH,
        })
    }

    /// Override the delta chain depth bound.
    pub fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth;
        self
    }

    /// Verify the trailing checksum over the whole pack.
    pub fn verify_trailer(&self) -> Result<(), PackError> {
        let body_end = self.data.len() - ObjectId::RAW_LEN;
        let expected = ObjectId::from_bytes(&self.data[body_end..])?;
        let mut hasher = Hasher::new();
        hasher.update(&self.data[..body_end]);
        let actual = hasher.finalize()?;
        if actual != expected {
            return Err(PackError::BadTrailer { expected, actual });
        }
        Ok(())
    }

    /// Read an object by OID. `None` when the OID is not in this pack.
    pub fn read(&self, oid: &ObjectId) -> Result<Option<PackedObject>, PackError> {
        self.read_with(oid, &no_resolver)
    }

    /// Read by OID with an external resolver for cross-pack REF_DELTA bases.
    pub fn read_with(
        &self,
        oid: &ObjectId,
        resolver: BaseResolver<'_>,
    ) -> Result<Option<PackedObject>, PackError> {
        match self.index.lookup(oid) {
            Some(offset) => self.read_at_offset(offset, resolver).map(Some),
            None => Ok(None),
        }
    }

    /// Resolve the entry at `offset`, materializing its delta chain.
    pub fn read_at_offset(
        &self,
        offset: u64,
        resolver: BaseResolver<'_>,
    ) -> Result<PackedObject, PackError> {
        // Deltas collected walking toward the base, applied in reverse.
        let mut deltas: Vec<Vec<u8>> = Vec::new();
        let mut visited: HashSet<u64> = HashSet::new();
        let mut current = offset;

        loop {
            if !visited.insert(current) {
                return Err(PackError::DeltaCycle(current));
            }
            if deltas.len() > self.max_chain_depth {
                return Err(PackError::ChainTooDeep {
                    offset,
                    max_depth: self.max_chain_depth,
                });
            }

            let header = self.entry_header(current)?;
            let body = self.inflate_body(&header, current)?;

            match header.kind {
                PackEntryKind::Commit
                | PackEntryKind::Tree
                | PackEntryKind::Blob
                | PackEntryKind::Tag => {
                    let obj_type = header.kind.object_type().expect("non-delta kind");
                    let mut data = body;
                    for delta in deltas.iter().rev() {
                        data = crate::delta::apply_delta(&data, delta)?;
                    }
                    return Ok(PackedObject { obj_type, data });
                }
                PackEntryKind::OfsDelta { base_offset } => {
                    deltas.push(body);
                    current = base_offset;
                }
                PackEntryKind::RefDelta { base_oid } => {
                    deltas.push(body);
                    if let Some(base_offset) = self.index.lookup(&base_oid) {
                        current = base_offset;
                    } else if let Some((obj_type, base_data)) = resolver(&base_oid) {
                        let mut data = base_data;
                        for delta in deltas.iter().rev() {
                            data = crate::delta::apply_delta(&data, delta)?;
                        }
                        return Ok(PackedObject { obj_type, data });
                    } else {
                        return Err(PackError::DeltaBaseMissing(base_oid));
                    }
                }
            }
        }
    }

    /// Check the recorded CRC32 of the entry storing `oid`.
    pub fn verify_crc(&self, oid: &ObjectId) -> Result<(), PackError> {
        let Some(position) = self.index.position_of(oid) else {
            return Err(PackError::DeltaBaseMissing(*oid));
        };
        let offset = self.index.offset_at(position);
        let end = self.entry_end(offset);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&self.data[offset as usize..end as usize]);
        let actual = hasher.finalize();
        let expected = self.index.crc32_at(position);
        if actual != expected {
            return Err(PackError::CrcMismatch {
                oid: *oid,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Whether this pack contains `oid`.
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.index.lookup(oid).is_some()
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    pub fn path(&self) -> &Path {
        &self.pack_path
    }

    /// On-disk size of the pack file.
    pub fn file_size(&self) -> u64 {
        self.data.len() as u64
    }

    fn entry_header(&self, offset: u64) -> Result<crate::entry::EntryHeader, PackError> {
        let body_end = self.data.len() - ObjectId::RAW_LEN;
        if offset as usize >= body_end {
            return Err(PackError::TruncatedEntry(offset));
        }
        parse_header(&self.data[offset as usize..body_end], offset)
    }

    fn inflate_body(
        &self,
        header: &crate::entry::EntryHeader,
        entry_offset: u64,
    ) -> Result<Vec<u8>, PackError> {
        let body_end = self.data.len() - ObjectId::RAW_LEN;
        let start = header.body_offset as usize;
        if start > body_end {
            return Err(PackError::TruncatedEntry(entry_offset));
        }
        let mut decoder = ZlibDecoder::new(&self.data[start..body_end]);
        let mut out = Vec::with_capacity(header.inflated_size);
        decoder
            .read_to_end(&mut out)
            .map_err(|_| PackError::TruncatedEntry(entry_offset))?;
        if out.len() != header.inflated_size {
            return Err(PackError::TruncatedEntry(entry_offset));
        }
        Ok(out)
    }

    /// The end offset of the entry starting at `offset`: the next entry's
    /// start, or the trailer for the last entry.
    fn entry_end(&self, offset: u64) -> u64 {
        let trailer_start = (self.data.len() - ObjectId::RAW_LEN) as u64;
        self.index
            .iter()
            .map(|(_, off)| off)
            .filter(|&off| off > offset)
            .min()
            .unwrap_or(trailer_start)
    }
}
