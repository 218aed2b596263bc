//! Recursive tree-to-tree comparison.

use bstr::{BString, ByteVec};
use vgit_hash::ObjectId;
use vgit_object::Tree;
use vgit_odb::ObjectStore;

use crate::{ChangeKind, DiffError, FileChange, TreeDiff};

/// Diff two trees into a flat list of path changes.
///
/// Subtrees with identical OIDs are skipped wholesale. A path that
/// switches between directory and file shows up as delete-plus-add.
pub fn diff_trees(
    store: &ObjectStore,
    old_tree: &ObjectId,
    new_tree: &ObjectId,
) -> Result<TreeDiff, DiffError> {
    let mut diff = TreeDiff::default();
    if old_tree != new_tree {
        walk(store, old_tree, new_tree, &BString::from(""), &mut diff)?;
    }
    Ok(diff)
}

fn join(prefix: &BString, name: &[u8]) -> BString {
    let mut path = prefix.clone();
    if !path.is_empty() {
        path.push_byte(b'/');
    }
    path.push_str(name);
    path
}

fn walk(
    store: &ObjectStore,
    old_oid: &ObjectId,
    new_oid: &ObjectId,
    prefix: &BString,
    diff: &mut TreeDiff,
) -> Result<(), DiffError> {
    let old = store.trees().load(old_oid)?;
    let new = store.trees().load(new_oid)?;

    // Both sides are canonically sorted; merge-walk them by name.
    let mut oi = 0;
    let mut ni = 0;
    while oi < old.entries.len() || ni < new.entries.len() {
        let old_entry = old.entries.get(oi);
        let new_entry = new.entries.get(ni);

        match (old_entry, new_entry) {
            (Some(o), Some(n)) if o.name == n.name => {
                oi += 1;
                ni += 1;
                if o.oid == n.oid && o.mode == n.mode {
                    continue;
                }
                let path = join(prefix, &o.name);
                match (o.mode.is_dir(), n.mode.is_dir()) {
                    (true, true) => walk(store, &o.oid, &n.oid, &path, diff)?,
                    (false, false) => diff.changes.push(FileChange {
                        kind: ChangeKind::Modified,
                        old_path: Some(path.clone()),
                        new_path: Some(path),
                        old_oid: Some(o.oid),
                        new_oid: Some(n.oid),
                        old_mode: Some(o.mode),
                        new_mode: Some(n.mode),
                        similarity: None,
                    }),
                    (true, false) => {
                        emit_all(store, &o.oid, &path, diff, Side::Deleted)?;
                        diff.changes.push(FileChange::added(path, n.oid, n.mode));
                    }
                    (false, true) => {
                        diff.changes
                            .push(FileChange::deleted(path.clone(), o.oid, o.mode));
                        emit_all(store, &n.oid, &path, diff, Side::Added)?;
                    }
                }
            }
            (Some(o), maybe_new) => {
                let old_first = maybe_new.map_or(true, |n| o.name < n.name);
                if old_first {
                    oi += 1;
                    let path = join(prefix, &o.name);
                    if o.mode.is_dir() {
                        emit_all(store, &o.oid, &path, diff, Side::Deleted)?;
                    } else {
                        diff.changes.push(FileChange::deleted(path, o.oid, o.mode));
                    }
                } else {
                    let n = maybe_new.expect("new side exists in this branch");
                    ni += 1;
                    let path = join(prefix, &n.name);
                    if n.mode.is_dir() {
                        emit_all(store, &n.oid, &path, diff, Side::Added)?;
                    } else {
                        diff.changes.push(FileChange::added(path, n.oid, n.mode));
                    }
                }
            }
            (None, Some(n)) => {
                ni += 1;
                let path = join(prefix, &n.name);
                if n.mode.is_dir() {
                    emit_all(store, &n.oid, &path, diff, Side::Added)?;
                } else {
                    diff.changes.push(FileChange::added(path, n.oid, n.mode));
                }
            }
            (None, None) => unreachable!("loop condition"),
        }
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Side {
    Added,
    Deleted,
}

/// Emit every file under a tree as added or deleted.
fn emit_all(
    store: &ObjectStore,
    tree_oid: &ObjectId,
    prefix: &BString,
    diff: &mut TreeDiff,
    side: Side,
) -> Result<(), DiffError> {
    let tree: Tree = store.trees().load(tree_oid)?;
    for entry in tree.iter() {
        let path = join(prefix, &entry.name);
        if entry.mode.is_dir() {
            emit_all(store, &entry.oid, &path, diff, side)?;
        } else {
            diff.changes.push(match side {
                Side::Added => FileChange::added(path, entry.oid, entry.mode),
                Side::Deleted => FileChange::deleted(path, entry.oid, entry.mode),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BString;
    use vgit_object::{FileMode, TreeEntry};

    fn file(name: &str, oid: ObjectId) -> TreeEntry {
        TreeEntry {
            mode: FileMode::Regular,
            name: BString::from(name),
            oid,
        }
    }

    fn store_tree(store: &ObjectStore, entries: Vec<TreeEntry>) -> ObjectId {
        store.trees().store(&Tree { entries }).unwrap()
    }

    #[test]
    fn identical_trees_diff_empty() {
        let store = ObjectStore::in_memory();
        let blob = store.blobs().store(b"same").unwrap();
        let tree = store_tree(&store, vec![file("a", blob)]);
        assert!(diff_trees(&store, &tree, &tree).unwrap().is_empty());
    }

    #[test]
    fn add_delete_modify() {
        let store = ObjectStore::in_memory();
        let v1 = store.blobs().store(b"one").unwrap();
        let v2 = store.blobs().store(b"two").unwrap();
        let keep = store.blobs().store(b"keep").unwrap();

        let old = store_tree(
            &store,
            vec![file("changed", v1), file("gone", v1), file("keep", keep)],
        );
        let new = store_tree(
            &store,
            vec![file("changed", v2), file("fresh", v2), file("keep", keep)],
        );

        let diff = diff_trees(&store, &old, &new).unwrap();
        let mut kinds: Vec<(String, ChangeKind)> = diff
            .changes
            .iter()
            .map(|c| (c.path().to_string(), c.kind))
            .collect();
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                ("changed".to_string(), ChangeKind::Modified),
                ("fresh".to_string(), ChangeKind::Added),
                ("gone".to_string(), ChangeKind::Deleted),
            ]
        );
    }

    #[test]
    fn nested_subtree_changes_flatten() {
        let store = ObjectStore::in_memory();
        let v1 = store.blobs().store(b"v1").unwrap();
        let v2 = store.blobs().store(b"v2").unwrap();

        let old_sub = store_tree(&store, vec![file("inner.txt", v1)]);
        let new_sub = store_tree(&store, vec![file("inner.txt", v2)]);
        let old = store_tree(
            &store,
            vec![TreeEntry {
                mode: FileMode::Dir,
                name: BString::from("src"),
                oid: old_sub,
            }],
        );
        let new = store_tree(
            &store,
            vec![TreeEntry {
                mode: FileMode::Dir,
                name: BString::from("src"),
                oid: new_sub,
            }],
        );

        let diff = diff_trees(&store, &old, &new).unwrap();
        assert_eq!(diff.len(), 1);
        assert_eq!(diff.changes[0].path(), "src/inner.txt");
        assert_eq!(diff.changes[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn dir_replaced_by_file() {
        let store = ObjectStore::in_memory();
        let blob = store.blobs().store(b"x").unwrap();
        let sub = store_tree(&store, vec![file("inner", blob)]);
        let old = store_tree(
            &store,
            vec![TreeEntry {
                mode: FileMode::Dir,
                name: BString::from("thing"),
                oid: sub,
            }],
        );
        let new = store_tree(&store, vec![file("thing", blob)]);

        let diff = diff_trees(&store, &old, &new).unwrap();
        let mut kinds: Vec<(String, ChangeKind)> = diff
            .changes
            .iter()
            .map(|c| (c.path().to_string(), c.kind))
            .collect();
        kinds.sort();
        assert_eq!(
            kinds,
            vec![
                ("thing".to_string(), ChangeKind::Added),
                ("thing/inner".to_string(), ChangeKind::Deleted),
            ]
        );
    }

    #[test]
    fn whole_subtree_added() {
        let store = ObjectStore::in_memory();
        let blob = store.blobs().store(b"leaf").unwrap();
        let sub = store_tree(&store, vec![file("a", blob), file("b", blob)]);
        let old = vgit_hash::EMPTY_TREE_OID;
        let new = store_tree(
            &store,
            vec![TreeEntry {
                mode: FileMode::Dir,
                name: BString::from("dir"),
                oid: sub,
            }],
        );

        let diff = diff_trees(&store, &old, &new).unwrap();
        let paths: Vec<String> = diff.changes.iter().map(|c| c.path().to_string()).collect();
        assert_eq!(paths, vec!["dir/a", "dir/b"]);
        assert!(diff.changes.iter().all(|c| c.kind == ChangeKind::Added));
    }
}
