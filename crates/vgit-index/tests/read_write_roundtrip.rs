//! On-disk round-trip properties for the index format.

use bstr::BString;
use proptest::prelude::*;
use vgit_hash::ObjectId;
use vgit_index::{Index, IndexEntry, Stage};
use vgit_object::FileMode;

fn arb_path() -> impl Strategy<Value = String> {
    // Repo-relative paths: a couple of short alnum components.
    proptest::collection::vec("[a-z][a-z0-9]{0,8}", 1..4).prop_map(|parts| parts.join("/"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn disk_roundtrip(paths in proptest::collection::btree_set(arb_path(), 0..24)) {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("index");

        let mut index = Index::new();
        index.set_path(&file);
        for (i, path) in paths.iter().enumerate() {
            let mut bytes = [0u8; 20];
            bytes[0] = (i % 251) as u8;
            bytes[19] = (i / 251) as u8;
            index.set(IndexEntry::from_oid(
                BString::from(path.as_str()),
                if i % 3 == 0 { FileMode::Executable } else { FileMode::Regular },
                ObjectId(bytes),
                Stage::Normal,
            ));
        }
        index.write().unwrap();

        let loaded = Index::load(&file).unwrap();
        prop_assert_eq!(loaded.len(), index.len());
        let original: Vec<IndexEntry> = index.entries().cloned().collect();
        let reloaded: Vec<IndexEntry> = loaded.entries().cloned().collect();
        prop_assert_eq!(original, reloaded);
    }
}

#[test]
fn write_tree_read_tree_identity_on_conflict_free_index() {
    let store = vgit_odb::ObjectStore::in_memory();
    let mut index = Index::new();
    for (i, path) in ["a", "dir/b", "dir/sub/c", "z"].iter().enumerate() {
        let oid = store
            .blobs()
            .store(format!("content {i}\n").as_bytes())
            .unwrap();
        index.set(IndexEntry::from_oid(
            BString::from(*path),
            FileMode::Regular,
            oid,
            Stage::Normal,
        ));
    }

    let tree = index.write_tree(&store).unwrap();

    let mut restored = Index::new();
    restored
        .read_tree(&store, &tree, vgit_index::ReadTreeOptions::default())
        .unwrap();

    // writeTree . readTree = identity.
    assert_eq!(restored.write_tree(&store).unwrap(), tree);
    let paths: Vec<String> = restored.entries().map(|e| e.path.to_string()).collect();
    assert_eq!(paths, vec!["a", "dir/b", "dir/sub/c", "z"]);
}
