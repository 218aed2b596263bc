//! Tree round-trips: index -> tree objects and back.

use std::collections::BTreeMap;

use bstr::{BString, ByteSlice};
use vgit_hash::ObjectId;
use vgit_object::{Tree, TreeEntry};
use vgit_odb::ObjectStore;

use crate::entry::IndexEntry;
use crate::{Index, IndexError, Stage};

/// Options for [`Index::read_tree`].
#[derive(Debug, Clone, Default)]
pub struct ReadTreeOptions {
    /// Place entries under this path prefix.
    pub prefix: Option<BString>,
    /// Stage to load entries at (conflict reconstruction uses 1-3).
    pub stage: Stage,
    /// Keep entries already in the index instead of clearing first.
    pub keep_existing: bool,
}

/// Build tree objects bottom-up from the stage-0 entries.
pub(crate) fn write_tree(index: &Index, store: &ObjectStore) -> Result<ObjectId, IndexError> {
    if index.has_conflicts() {
        return Err(IndexError::HasConflicts(index.conflicted_paths()));
    }

    // Group files by directory, then fold leaf-most directories first.
    let mut dirs: BTreeMap<BString, Vec<(BString, vgit_object::FileMode, ObjectId)>> =
        BTreeMap::new();
    for entry in index.entries() {
        let (dir, name) = split_path(&entry.path);
        dirs.entry(dir)
            .or_default()
            .push((name, entry.mode, entry.oid));
    }

    // Intermediate directories with no direct files still need nodes.
    let leaf_dirs: Vec<BString> = dirs.keys().cloned().collect();
    for key in leaf_dirs {
        let mut current = key;
        while let Some(pos) = current.rfind_byte(b'/') {
            current = BString::from(&current[..pos]);
            dirs.entry(current.clone()).or_default();
        }
        if !current.is_empty() {
            dirs.entry(BString::from("")).or_default();
        }
    }

    Ok(build_dir(store, &BString::from(""), &dirs)?)
}

fn split_path(path: &BString) -> (BString, BString) {
    match path.rfind_byte(b'/') {
        Some(pos) => (
            BString::from(&path[..pos]),
            BString::from(&path[pos + 1..]),
        ),
        None => (BString::from(""), path.clone()),
    }
}

fn build_dir(
    store: &ObjectStore,
    dir: &BString,
    dirs: &BTreeMap<BString, Vec<(BString, vgit_object::FileMode, ObjectId)>>,
) -> Result<ObjectId, IndexError> {
    let mut tree = Tree::new();

    // Files directly in this directory.
    if let Some(files) = dirs.get(dir) {
        for (name, mode, oid) in files {
            tree.entries.push(TreeEntry {
                mode: *mode,
                name: name.clone(),
                oid: *oid,
            });
        }
    }

    // Immediate child directories: any dir key of which `dir` is the
    // parent contributes one subtree entry.
    let mut children: Vec<BString> = Vec::new();
    for key in dirs.keys() {
        if key.is_empty() || key == dir {
            continue;
        }
        let parent_and_name = match dir.is_empty() {
            true => (!key.contains(&b'/')).then(|| key.clone()),
            false => key
                .strip_prefix(format!("{dir}/").as_bytes())
                .filter(|rest| !rest.contains(&b'/'))
                .map(BString::from),
        };
        if let Some(name) = parent_and_name {
            if !children.contains(&name) {
                children.push(name);
            }
        }
    }
    for name in children {
        let child_dir = if dir.is_empty() {
            name.clone()
        } else {
            BString::from(format!("{dir}/{name}"))
        };
        let child_oid = build_dir(store, &child_dir, dirs)?;
        tree.entries.push(TreeEntry {
            mode: vgit_object::FileMode::Dir,
            name,
            oid: child_oid,
        });
    }

    Ok(store.trees().store(&tree)?)
}

/// Populate the index from a stored tree.
pub(crate) fn read_tree(
    index: &mut Index,
    store: &ObjectStore,
    tree: &ObjectId,
    options: ReadTreeOptions,
) -> Result<(), IndexError> {
    if !options.keep_existing {
        let paths: Vec<BString> = index.entries().map(|e| e.path.clone()).collect();
        for path in paths {
            index.remove(&path, None);
        }
    }

    let prefix = options
        .prefix
        .map(|p| p.to_string())
        .unwrap_or_default();
    let mut collected = Vec::new();
    collect(store, tree, &prefix, options.stage, &mut collected)?;
    for entry in collected {
        index.set(entry);
    }
    Ok(())
}

fn collect(
    store: &ObjectStore,
    tree: &ObjectId,
    prefix: &str,
    stage: Stage,
    out: &mut Vec<IndexEntry>,
) -> Result<(), IndexError> {
    let tree = store.trees().load(tree)?;
    for entry in tree.iter() {
        let path = if prefix.is_empty() {
            entry.name.to_string()
        } else {
            format!("{prefix}/{}", entry.name)
        };
        if entry.mode.is_dir() {
            collect(store, &entry.oid, &path, stage, out)?;
        } else {
            out.push(IndexEntry::from_oid(
                BString::from(path),
                entry.mode,
                entry.oid,
                stage,
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgit_hash::EMPTY_TREE_OID;
    use vgit_object::FileMode;

    fn staged(path: &str, oid: ObjectId) -> IndexEntry {
        IndexEntry::from_oid(BString::from(path), FileMode::Regular, oid, Stage::Normal)
    }

    #[test]
    fn write_tree_builds_nested_structure() {
        let store = ObjectStore::in_memory();
        let a = store.blobs().store(b"a").unwrap();
        let b = store.blobs().store(b"b").unwrap();
        let c = store.blobs().store(b"c").unwrap();

        let mut index = Index::new();
        index.set(staged("README", a));
        index.set(staged("src/lib.rs", b));
        index.set(staged("src/nested/deep.rs", c));

        let root_oid = index.write_tree(&store).unwrap();
        let root = store.trees().load(&root_oid).unwrap();
        assert_eq!(root.len(), 2); // README + src/

        let src = root.find(bstr::BStr::new("src")).unwrap();
        assert!(src.mode.is_dir());
        let src_tree = store.trees().load(&src.oid).unwrap();
        assert_eq!(src_tree.len(), 2); // lib.rs + nested/
    }

    #[test]
    fn empty_index_writes_empty_tree() {
        let store = ObjectStore::in_memory();
        let index = Index::new();
        assert_eq!(index.write_tree(&store).unwrap(), EMPTY_TREE_OID);
    }

    #[test]
    fn write_tree_refuses_conflicts() {
        let store = ObjectStore::in_memory();
        let mut index = Index::new();
        index.set_conflict(
            &BString::from("clash"),
            Some((FileMode::Regular, ObjectId([1; 20]))),
            Some((FileMode::Regular, ObjectId([2; 20]))),
            Some((FileMode::Regular, ObjectId([3; 20]))),
        );
        assert!(matches!(
            index.write_tree(&store),
            Err(IndexError::HasConflicts(paths)) if paths == vec![BString::from("clash")]
        ));
    }

    #[test]
    fn read_tree_then_write_tree_is_identity() {
        let store = ObjectStore::in_memory();
        let a = store.blobs().store(b"alpha").unwrap();
        let b = store.blobs().store(b"beta").unwrap();

        let mut source = Index::new();
        source.set(staged("one.txt", a));
        source.set(staged("dir/two.txt", b));
        let tree = source.write_tree(&store).unwrap();

        let mut restored = Index::new();
        restored
            .read_tree(&store, &tree, ReadTreeOptions::default())
            .unwrap();
        assert_eq!(restored.write_tree(&store).unwrap(), tree);
        assert_eq!(restored.len(), 2);
    }

    #[test]
    fn read_tree_with_prefix_and_keep() {
        let store = ObjectStore::in_memory();
        let a = store.blobs().store(b"a").unwrap();
        let mut source = Index::new();
        source.set(staged("file", a));
        let tree = source.write_tree(&store).unwrap();

        let mut index = Index::new();
        index.set(staged("existing", a));
        index
            .read_tree(
                &store,
                &tree,
                ReadTreeOptions {
                    prefix: Some(BString::from("vendor/lib")),
                    stage: Stage::Normal,
                    keep_existing: true,
                },
            )
            .unwrap();

        assert!(index.has(&BString::from("existing")));
        assert!(index.has(&BString::from("vendor/lib/file")));
    }

    #[test]
    fn read_tree_at_conflict_stage() {
        let store = ObjectStore::in_memory();
        let a = store.blobs().store(b"base side").unwrap();
        let mut source = Index::new();
        source.set(staged("f", a));
        let tree = source.write_tree(&store).unwrap();

        let mut index = Index::new();
        index
            .read_tree(
                &store,
                &tree,
                ReadTreeOptions {
                    prefix: None,
                    stage: Stage::Base,
                    keep_existing: false,
                },
            )
            .unwrap();
        assert!(index.has_conflicts());
        assert!(index.get(&BString::from("f"), Stage::Base).is_some());
    }
}
