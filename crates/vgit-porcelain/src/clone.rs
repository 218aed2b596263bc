//! Bootstrapping a repository from a pack byte stream.
//!
//! The stream is a complete pack file (header, entries, trailer), as a
//! fetch would deliver it. Objects are ingested into the store, refs are
//! installed, and the head branch is checked out.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use vgit_hash::{Hasher, ObjectId};
use vgit_object::ObjectType;
use vgit_pack::delta::apply_delta;
use vgit_pack::entry::parse_header;
use vgit_pack::{PackEntryKind, PackError, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION};
use vgit_ref::RefName;
use vgit_repository::{init, CheckoutOptions, Repository};

use crate::PorcelainError;

/// The typed `clone-from-pack-stream` result.
#[derive(Debug, Clone)]
pub struct CloneResult {
    pub head: Option<ObjectId>,
    pub objects_ingested: usize,
}

/// Create a repository at `work_dir` from a pack stream plus the ref
/// advertisement that came with it.
pub fn clone_from_pack(
    work_dir: impl AsRef<Path>,
    pack: &[u8],
    refs: &[(String, ObjectId)],
    head_branch: &str,
) -> Result<(Repository, CloneResult), PorcelainError> {
    let repo = init(work_dir)?;

    let objects = unpack_stream(pack)?;
    let objects_ingested = objects.len();
    for (obj_type, content) in &objects {
        repo.store().store_bytes(*obj_type, content)?;
    }

    for (name, oid) in refs {
        repo.refs().set(&RefName::new(name.clone())?, oid)?;
    }
    let head_ref = RefName::branch(head_branch)?;
    repo.refs().set_symbolic(&RefName::head(), &head_ref)?;

    let head = repo.head_oid()?;
    if let Some(commit) = head {
        let tree = repo.store().commits().load(&commit)?.tree;
        repo.worktree().checkout_tree(
            &tree,
            &CheckoutOptions {
                force: true,
                ..Default::default()
            },
        )?;
        let mut index = repo.index()?;
        index.set_path(repo.git_dir().join("index"));
        index.read_tree(
            repo.store(),
            &tree,
            vgit_index::ReadTreeOptions::default(),
        )?;
        index.write()?;
    }

    Ok((
        repo,
        CloneResult {
            head,
            objects_ingested,
        },
    ))
}

/// Decode every object of a pack stream, resolving deltas against
/// earlier entries.
fn unpack_stream(pack: &[u8]) -> Result<Vec<(ObjectType, Vec<u8>)>, PorcelainError> {
    if pack.len() < PACK_HEADER_SIZE + ObjectId::RAW_LEN || &pack[0..4] != PACK_SIGNATURE {
        return Err(PorcelainError::Pack(PackError::BadMagic));
    }
    let version = u32::from_be_bytes(pack[4..8].try_into().unwrap());
    if version != PACK_VERSION {
        return Err(PorcelainError::Pack(PackError::BadVersion(version)));
    }
    let count = u32::from_be_bytes(pack[8..12].try_into().unwrap()) as usize;

    // Trailer check before trusting anything else.
    let body_end = pack.len() - ObjectId::RAW_LEN;
    let expected = ObjectId::from_bytes(&pack[body_end..]).expect("20 trailer bytes");
    let actual = Hasher::digest(&pack[..body_end])?;
    if actual != expected {
        return Err(PorcelainError::Pack(PackError::BadTrailer {
            expected,
            actual,
        }));
    }

    let mut by_offset: HashMap<u64, (ObjectType, Vec<u8>)> = HashMap::new();
    let mut by_oid: HashMap<ObjectId, (ObjectType, Vec<u8>)> = HashMap::new();
    let mut out = Vec::with_capacity(count);

    let mut offset = PACK_HEADER_SIZE as u64;
    for _ in 0..count {
        let header = parse_header(&pack[offset as usize..body_end], offset)?;
        let (body, consumed) = inflate_counted(
            &pack[header.body_offset as usize..body_end],
            header.inflated_size,
            offset,
        )?;

        let (obj_type, content) = match header.kind {
            PackEntryKind::Commit
            | PackEntryKind::Tree
            | PackEntryKind::Blob
            | PackEntryKind::Tag => {
                let obj_type = header.kind.object_type().expect("non-delta kind");
                (obj_type, body)
            }
            PackEntryKind::OfsDelta { base_offset } => {
                let (base_type, base) = by_offset
                    .get(&base_offset)
                    .ok_or(PackError::TruncatedEntry(offset))?;
                (*base_type, apply_delta(base, &body)?)
            }
            PackEntryKind::RefDelta { base_oid } => {
                let (base_type, base) = by_oid
                    .get(&base_oid)
                    .ok_or(PackError::DeltaBaseMissing(base_oid))?;
                (*base_type, apply_delta(base, &body)?)
            }
        };

        let oid = Hasher::hash_object(obj_type.as_str(), &content)?;
        by_offset.insert(offset, (obj_type, content.clone()));
        by_oid.insert(oid, (obj_type, content.clone()));
        out.push((obj_type, content));

        offset = header.body_offset + consumed;
    }

    Ok(out)
}

/// Inflate one zlib stream, returning the data and compressed bytes
/// consumed (entries are back to back; only the decoder knows where one
/// ends).
fn inflate_counted(
    data: &[u8],
    expected: usize,
    entry_offset: u64,
) -> Result<(Vec<u8>, u64), PorcelainError> {
    let mut decoder = flate2::bufread::ZlibDecoder::new(data);
    let mut body = Vec::with_capacity(expected);
    decoder
        .read_to_end(&mut body)
        .map_err(|_| PackError::TruncatedEntry(entry_offset))?;
    if body.len() != expected {
        return Err(PorcelainError::Pack(PackError::TruncatedEntry(entry_offset)));
    }
    Ok((body, decoder.total_in()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BString;
    use vgit_index::Index;
    use vgit_object::{Commit, FileMode};
    use vgit_odb::ObjectStore;
    use vgit_pack::delta::compute_delta;
    use vgit_pack::write::PackWriter;
    use vgit_utils::{GitDate, Signature};

    /// Build a pack stream holding one commit with one file, the file
    /// stored as a delta.
    fn sample_pack() -> (Vec<u8>, ObjectId, ObjectId) {
        let staging = ObjectStore::in_memory();
        let base_blob = b"shared prefix shared prefix shared prefix!!\n".to_vec();
        let mut file_blob = base_blob.clone();
        file_blob.extend_from_slice(b"and a suffix\n");

        let blob_oid = staging.blobs().store(&file_blob).unwrap();
        let mut index = Index::new();
        index.set(vgit_index::IndexEntry::from_oid(
            BString::from("file.txt"),
            FileMode::Regular,
            blob_oid,
            vgit_index::Stage::Normal,
        ));
        let tree_oid = index.write_tree(&staging).unwrap();
        let sig = Signature {
            name: BString::from("C"),
            email: BString::from("c@x"),
            date: GitDate::new(1_700_000_000, 0),
        };
        let commit_oid = staging
            .commits()
            .store(&Commit {
                tree: tree_oid,
                parents: vec![],
                author: sig.clone(),
                committer: sig,
                encoding: None,
                gpgsig: None,
                message: BString::from("packed commit\n"),
            })
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut writer = PackWriter::create(dir.path()).unwrap();
        let (_, commit_content) = staging.load(&commit_oid).unwrap();
        writer.add_object(ObjectType::Commit, &commit_content).unwrap();
        let (_, tree_content) = staging.load(&tree_oid).unwrap();
        writer.add_object(ObjectType::Tree, &tree_content).unwrap();
        let base_oid = writer.add_object(ObjectType::Blob, &base_blob).unwrap();
        writer
            .add_delta(&base_oid, blob_oid, &compute_delta(&base_blob, &file_blob))
            .unwrap();
        let handle = writer.finish().unwrap();

        (std::fs::read(handle.pack_path).unwrap(), commit_oid, blob_oid)
    }

    #[test]
    fn clone_materializes_worktree_and_refs() {
        let (pack, commit_oid, blob_oid) = sample_pack();
        let dir = tempfile::tempdir().unwrap();

        let (repo, result) = clone_from_pack(
            dir.path().join("cloned"),
            &pack,
            &[("refs/heads/main".to_string(), commit_oid)],
            "main",
        )
        .unwrap();

        assert_eq!(result.head, Some(commit_oid));
        assert_eq!(result.objects_ingested, 4);
        assert!(repo.store().has(&blob_oid).unwrap());

        let on_disk =
            std::fs::read(dir.path().join("cloned/file.txt")).unwrap();
        assert!(on_disk.ends_with(b"and a suffix\n"));
        assert_eq!(repo.head_oid().unwrap(), Some(commit_oid));
    }

    #[test]
    fn corrupt_stream_rejected() {
        let (mut pack, commit_oid, _) = sample_pack();
        let dir = tempfile::tempdir().unwrap();
        let last = pack.len() - 1;
        pack[last] ^= 0xff;

        let result = clone_from_pack(
            dir.path().join("cloned"),
            &pack,
            &[("refs/heads/main".to_string(), commit_oid)],
            "main",
        );
        assert!(matches!(
            result,
            Err(PorcelainError::Pack(PackError::BadTrailer { .. }))
        ));
    }

    #[test]
    fn bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = clone_from_pack(dir.path().join("x"), b"NOPE", &[], "main");
        assert!(matches!(
            result,
            Err(PorcelainError::Pack(PackError::BadMagic))
        ));
    }
}
