//! Typed facades over [`ObjectStore`]: blobs, trees, commits, tags.

use bstr::BStr;
use vgit_hash::{ObjectId, EMPTY_TREE_OID};
use vgit_object::{Commit, ObjectType, Tag, Tree, TreeEntry};

use crate::{ObjectStore, OdbError};

fn expect_type(
    oid: &ObjectId,
    expected: ObjectType,
    actual: ObjectType,
) -> Result<(), OdbError> {
    if expected == actual {
        Ok(())
    } else {
        Err(OdbError::MismatchedType {
            oid: *oid,
            expected,
            actual,
        })
    }
}

/// Blob storage.
pub struct Blobs<'a> {
    store: &'a ObjectStore,
}

impl<'a> Blobs<'a> {
    pub(crate) fn new(store: &'a ObjectStore) -> Self {
        Self { store }
    }

    pub fn store(&self, content: &[u8]) -> Result<ObjectId, OdbError> {
        self.store.store_bytes(ObjectType::Blob, content)
    }

    pub fn load(&self, oid: &ObjectId) -> Result<Vec<u8>, OdbError> {
        let (obj_type, content) = self.store.load(oid)?;
        expect_type(oid, ObjectType::Blob, obj_type)?;
        Ok(content)
    }

    /// Content size without materializing the blob.
    pub fn size(&self, oid: &ObjectId) -> Result<usize, OdbError> {
        let info = self.store.info(oid)?;
        expect_type(oid, ObjectType::Blob, info.obj_type)?;
        Ok(info.size)
    }
}

/// Tree storage.
pub struct Trees<'a> {
    store: &'a ObjectStore,
}

impl<'a> Trees<'a> {
    pub(crate) fn new(store: &'a ObjectStore) -> Self {
        Self { store }
    }

    /// Canonicalize and store a tree. Duplicate names are rejected; the
    /// empty tree resolves to its well-known OID without storage.
    pub fn store(&self, tree: &Tree) -> Result<ObjectId, OdbError> {
        tree.check_unique_names()?;
        if tree.is_empty() {
            return Ok(EMPTY_TREE_OID);
        }
        self.store
            .store_bytes(ObjectType::Tree, &tree.serialize_content())
    }

    pub fn load(&self, oid: &ObjectId) -> Result<Tree, OdbError> {
        if *oid == EMPTY_TREE_OID {
            return Ok(Tree::new());
        }
        let (obj_type, content) = self.store.load(oid)?;
        expect_type(oid, ObjectType::Tree, obj_type)?;
        Tree::parse(&content).map_err(|source| OdbError::Corrupt { oid: *oid, source })
    }

    /// Fetch one entry of a tree by name.
    pub fn entry(&self, tree_oid: &ObjectId, name: &BStr) -> Result<Option<TreeEntry>, OdbError> {
        let tree = self.load(tree_oid)?;
        Ok(tree.find(name).cloned())
    }
}

/// Commit storage.
pub struct Commits<'a> {
    store: &'a ObjectStore,
}

impl<'a> Commits<'a> {
    pub(crate) fn new(store: &'a ObjectStore) -> Self {
        Self { store }
    }

    pub fn store(&self, commit: &Commit) -> Result<ObjectId, OdbError> {
        self.store
            .store_bytes(ObjectType::Commit, &commit.serialize_content())
    }

    pub fn load(&self, oid: &ObjectId) -> Result<Commit, OdbError> {
        let (obj_type, content) = self.store.load(oid)?;
        expect_type(oid, ObjectType::Commit, obj_type)?;
        Commit::parse(&content).map_err(|source| OdbError::Corrupt { oid: *oid, source })
    }
}

/// Annotated tag storage.
pub struct Tags<'a> {
    store: &'a ObjectStore,
}

impl<'a> Tags<'a> {
    pub(crate) fn new(store: &'a ObjectStore) -> Self {
        Self { store }
    }

    pub fn store(&self, tag: &Tag) -> Result<ObjectId, OdbError> {
        self.store
            .store_bytes(ObjectType::Tag, &tag.serialize_content())
    }

    pub fn load(&self, oid: &ObjectId) -> Result<Tag, OdbError> {
        let (obj_type, content) = self.store.load(oid)?;
        expect_type(oid, ObjectType::Tag, obj_type)?;
        Tag::parse(&content).map_err(|source| OdbError::Corrupt { oid: *oid, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BString;
    use vgit_object::FileMode;
    use vgit_utils::{GitDate, Signature};

    fn sig() -> Signature {
        Signature {
            name: BString::from("Ann"),
            email: BString::from("ann@x"),
            date: GitDate::new(1_700_000_000, 0),
        }
    }

    #[test]
    fn blob_facade_type_checked() {
        let store = ObjectStore::in_memory();
        let blob_oid = store.blobs().store(b"data").unwrap();
        assert_eq!(store.blobs().load(&blob_oid).unwrap(), b"data");
        assert_eq!(store.blobs().size(&blob_oid).unwrap(), 4);

        let commit = Commit {
            tree: EMPTY_TREE_OID,
            parents: vec![],
            author: sig(),
            committer: sig(),
            encoding: None,
            gpgsig: None,
            message: BString::from("msg\n"),
        };
        let commit_oid = store.commits().store(&commit).unwrap();
        assert!(matches!(
            store.blobs().load(&commit_oid),
            Err(OdbError::MismatchedType {
                expected: ObjectType::Blob,
                actual: ObjectType::Commit,
                ..
            })
        ));
    }

    #[test]
    fn tree_store_load_entry() {
        let store = ObjectStore::in_memory();
        let blob = store.blobs().store(b"hello\n").unwrap();
        let tree = Tree {
            entries: vec![TreeEntry {
                mode: FileMode::Regular,
                name: BString::from("hi.txt"),
                oid: blob,
            }],
        };
        let tree_oid = store.trees().store(&tree).unwrap();

        let loaded = store.trees().load(&tree_oid).unwrap();
        assert_eq!(loaded.len(), 1);
        let entry = store
            .trees()
            .entry(&tree_oid, BStr::new("hi.txt"))
            .unwrap()
            .unwrap();
        assert_eq!(entry.oid, blob);
    }

    #[test]
    fn empty_tree_virtual_everywhere() {
        let store = ObjectStore::in_memory();
        assert_eq!(store.trees().store(&Tree::new()).unwrap(), EMPTY_TREE_OID);
        assert!(store.trees().load(&EMPTY_TREE_OID).unwrap().is_empty());
    }

    #[test]
    fn duplicate_tree_names_rejected() {
        let store = ObjectStore::in_memory();
        let tree = Tree {
            entries: vec![
                TreeEntry {
                    mode: FileMode::Regular,
                    name: BString::from("dup"),
                    oid: EMPTY_TREE_OID,
                },
                TreeEntry {
                    mode: FileMode::Regular,
                    name: BString::from("dup"),
                    oid: EMPTY_TREE_OID,
                },
            ],
        };
        assert!(store.trees().store(&tree).is_err());
    }

    #[test]
    fn commit_roundtrip_preserves_identity() {
        let store = ObjectStore::in_memory();
        let commit = Commit {
            tree: EMPTY_TREE_OID,
            parents: vec![],
            author: sig(),
            committer: sig(),
            encoding: None,
            gpgsig: None,
            message: BString::from("init\n"),
        };
        let oid = store.commits().store(&commit).unwrap();
        let loaded = store.commits().load(&oid).unwrap();
        assert_eq!(loaded, commit);
        // Identity is stable across a second store.
        assert_eq!(store.commits().store(&loaded).unwrap(), oid);
    }

    #[test]
    fn tag_roundtrip() {
        let store = ObjectStore::in_memory();
        let tag = Tag {
            object: EMPTY_TREE_OID,
            target_type: ObjectType::Tree,
            name: BString::from("v0"),
            tagger: Some(sig()),
            message: BString::from("tagged\n"),
        };
        let oid = store.tags().store(&tag).unwrap();
        assert_eq!(store.tags().load(&oid).unwrap(), tag);
    }
}
