//! Pack generation: emit `.pack` and `.idx` files.
//!
//! Entries arrive in dependency order (bases before their dependents).
//! The writer works in a temp file and renames both outputs into place
//! only when complete, so an interrupted write never leaves a partial
//! pack visible.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use vgit_hash::{Hasher, ObjectId};
use vgit_object::ObjectType;

use crate::entry::{encode_header, encode_ofs_offset};
use crate::index::build_index;
use crate::{PackError, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION};

/// A completed pack+index pair.
#[derive(Debug, Clone)]
pub struct PackHandle {
    pub pack_path: PathBuf,
    pub idx_path: PathBuf,
    pub checksum: ObjectId,
    pub num_objects: u32,
}

/// Streaming pack builder.
pub struct PackWriter {
    pack_dir: PathBuf,
    tmp_path: PathBuf,
    file: std::fs::File,
    position: u64,
    /// (oid, entry offset, crc32) per written entry, for the index.
    entries: Vec<(ObjectId, u64, u32)>,
    /// Offsets of objects already in this pack, for OFS_DELTA emission.
    offsets: HashMap<ObjectId, u64>,
    level: Compression,
}

impl PackWriter {
    /// Start a new pack in `pack_dir` (created if needed).
    pub fn create(pack_dir: impl AsRef<Path>) -> Result<Self, PackError> {
        let pack_dir = pack_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&pack_dir)?;
        let tmp_path = pack_dir.join(format!("tmp_pack_{}", std::process::id()));
        let mut file = std::fs::File::create(&tmp_path)?;

        // Placeholder header; the object count is patched in finish().
        let mut header = [0u8; PACK_HEADER_SIZE];
        header[0..4].copy_from_slice(PACK_SIGNATURE);
        header[4..8].copy_from_slice(&PACK_VERSION.to_be_bytes());
        file.write_all(&header)?;

        Ok(Self {
            pack_dir,
            tmp_path,
            file,
            position: PACK_HEADER_SIZE as u64,
            entries: Vec::new(),
            offsets: HashMap::new(),
            level: Compression::default(),
        })
    }

    /// Append a full (non-delta) object. Returns its OID.
    pub fn add_object(&mut self, obj_type: ObjectType, data: &[u8]) -> Result<ObjectId, PackError> {
        let oid = Hasher::hash_object(obj_type.as_str(), data)?;
        let offset = self.position;

        let header = encode_header(obj_type.pack_code(), data.len() as u64);
        let compressed = self.deflate(data)?;

        let mut crc = crc32fast::Hasher::new();
        crc.update(&header);
        crc.update(&compressed);

        self.write_bytes(&header)?;
        self.write_bytes(&compressed)?;

        self.entries.push((oid, offset, crc.finalize()));
        self.offsets.insert(oid, offset);
        Ok(oid)
    }

    /// Append a delta entry for `target_oid` against `base_oid`.
    ///
    /// Emits OFS_DELTA when the base was already written to this pack,
    /// REF_DELTA otherwise (thin reference satisfied elsewhere).
    pub fn add_delta(
        &mut self,
        base_oid: &ObjectId,
        target_oid: ObjectId,
        delta: &[u8],
    ) -> Result<(), PackError> {
        let offset = self.position;
        let compressed = self.deflate(delta)?;

        let mut crc = crc32fast::Hasher::new();
        match self.offsets.get(base_oid).copied() {
            Some(base_offset) => {
                let header = encode_header(6, delta.len() as u64);
                let negative = encode_ofs_offset(offset - base_offset);
                crc.update(&header);
                crc.update(&negative);
                crc.update(&compressed);
                self.write_bytes(&header)?;
                self.write_bytes(&negative)?;
            }
            None => {
                let header = encode_header(7, delta.len() as u64);
                crc.update(&header);
                crc.update(base_oid.as_bytes());
                crc.update(&compressed);
                self.write_bytes(&header)?;
                self.write_bytes(base_oid.as_bytes())?;
            }
        }
        self.write_bytes(&compressed)?;

        self.entries.push((target_oid, offset, crc.finalize()));
        self.offsets.insert(target_oid, offset);
        Ok(())
    }

    /// Whether `oid` has been written to this pack (usable as an OFS base).
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.offsets.contains_key(oid)
    }

    pub fn num_objects(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Patch the header, append the trailer, and move the pack and its
    /// index to their `pack-<checksum>` names.
    pub fn finish(mut self) -> Result<PackHandle, PackError> {
        let num_objects = self.entries.len() as u32;

        self.file.seek(SeekFrom::Start(8))?;
        self.file.write_all(&num_objects.to_be_bytes())?;
        self.file.flush()?;
        self.file.sync_all()?;

        // Hash the whole body (with the patched header) for the trailer.
        let mut hasher = Hasher::new();
        {
            let mut reader = std::fs::File::open(&self.tmp_path)?;
            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
            }
        }
        let checksum = hasher.finalize()?;

        {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&self.tmp_path)?;
            file.write_all(checksum.as_bytes())?;
            file.sync_all()?;
        }

        let stem = format!("pack-{}", checksum.to_hex());
        let pack_path = self.pack_dir.join(format!("{stem}.pack"));
        let idx_path = self.pack_dir.join(format!("{stem}.idx"));

        // Index first (to a temp name), then rename both: a visible
        // .pack always has its .idx beside it once the rename pair ends.
        let idx_bytes = build_index(&mut self.entries, &checksum)?;
        let idx_tmp = self.pack_dir.join(format!("tmp_idx_{}", std::process::id()));
        std::fs::write(&idx_tmp, &idx_bytes)?;

        std::fs::rename(&idx_tmp, &idx_path)?;
        std::fs::rename(&self.tmp_path, &pack_path)?;

        Ok(PackHandle {
            pack_path,
            idx_path,
            checksum,
            num_objects,
        })
    }

    fn deflate(&self, data: &[u8]) -> Result<Vec<u8>, PackError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), self.level);
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), PackError> {
        self.file.write_all(data)?;
        self.position += data.len() as u64;
        Ok(())
    }
}
