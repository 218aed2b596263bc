//! Three-way tree merge.
//!
//! Walks the unified path set of base/ours/theirs, classifies each path,
//! content-merges double-edits, and records conflicts. Renames detected
//! on either side are honored: a modification to the old path lands on
//! the renamed path.

use std::collections::BTreeMap;

use bstr::{BString, ByteSlice};
use vgit_diff::rename::detect_renames;
use vgit_diff::similarity::is_binary;
use vgit_diff::{diff_trees, ChangeKind};
use vgit_hash::ObjectId;
use vgit_object::{FileMode, Tree, TreeEntry};
use vgit_odb::ObjectStore;
use vgit_repository::worktree::flatten_tree;

use crate::content::{merge_content, MergeLabels};
use crate::{Conflict, ConflictKind, MergeError, MergeOptions, MergeStrategy, RenameInfo};

type PathMap = BTreeMap<BString, (FileMode, ObjectId)>;

/// The product of a tree merge: a tree (conflicted text files carry
/// markers) plus the conflict report.
#[derive(Debug, Clone)]
pub struct TreeMergeOutcome {
    pub tree: ObjectId,
    pub conflicts: Vec<Conflict>,
    /// Renames that informed the merge, from either side.
    pub renames: Vec<RenameInfo>,
}

impl TreeMergeOutcome {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Merge `ours` and `theirs` against their common ancestor `base`.
pub fn merge_trees(
    store: &ObjectStore,
    base: &ObjectId,
    ours: &ObjectId,
    theirs: &ObjectId,
    options: &MergeOptions,
) -> Result<TreeMergeOutcome, MergeError> {
    // Whole-tree strategies skip the walk entirely.
    match options.strategy {
        MergeStrategy::Ours => {
            return Ok(TreeMergeOutcome {
                tree: *ours,
                conflicts: Vec::new(),
                renames: Vec::new(),
            })
        }
        MergeStrategy::Theirs => {
            return Ok(TreeMergeOutcome {
                tree: *theirs,
                conflicts: Vec::new(),
                renames: Vec::new(),
            })
        }
        MergeStrategy::Recursive => {}
    }

    let base_map = flatten_tree(store, base)?;
    let mut ours_map = flatten_tree(store, ours)?;
    let mut theirs_map = flatten_tree(store, theirs)?;

    // Rename detection per side; a rename rewrites the side's map so the
    // old path reads as "kept, under a new name".
    let mut renames = Vec::new();
    let ours_renames = side_renames(store, base, ours, options.rename_threshold)?;
    let theirs_renames = side_renames(store, base, theirs, options.rename_threshold)?;

    // Redirect the *other* side's content to the renamed path, so the
    // classification below sees both sides at the new location.
    for rename in &ours_renames {
        if let Some(entry) = theirs_map.remove(&rename.from) {
            theirs_map.entry(rename.to.clone()).or_insert(entry);
        }
        renames.push(rename.clone());
    }
    for rename in &theirs_renames {
        if let Some(entry) = ours_map.remove(&rename.from) {
            ours_map.entry(rename.to.clone()).or_insert(entry);
        }
        renames.push(rename.clone());
    }
    // The base follows every rename: content comparison happens at the
    // new path.
    let mut base_map = base_map;
    for rename in &renames {
        if let Some(entry) = base_map.remove(&rename.from) {
            base_map.entry(rename.to.clone()).or_insert(entry);
        }
    }

    let paths: std::collections::BTreeSet<BString> = base_map
        .keys()
        .chain(ours_map.keys())
        .chain(theirs_map.keys())
        .cloned()
        .collect();

    let labels = MergeLabels {
        ours: options.label_ours.clone(),
        theirs: options.label_theirs.clone(),
    };

    let mut merged: PathMap = PathMap::new();
    let mut conflicts = Vec::new();

    for path in paths {
        let base_e = base_map.get(&path).copied();
        let ours_e = ours_map.get(&path).copied();
        let theirs_e = theirs_map.get(&path).copied();

        match classify(base_e, ours_e, theirs_e) {
            Resolution::Take(entry) => {
                if let Some(entry) = entry {
                    merged.insert(path, entry);
                }
            }
            Resolution::DoubleEdit => {
                let (ours_mode, ours_oid) = ours_e.expect("double edit has ours");
                let (theirs_mode, theirs_oid) = theirs_e.expect("double edit has theirs");

                let base_content = match base_e {
                    Some((_, oid)) => store.blobs().load(&oid)?,
                    None => Vec::new(),
                };
                let ours_content = store.blobs().load(&ours_oid)?;
                let theirs_content = store.blobs().load(&theirs_oid)?;

                let mode = if Some(ours_mode) == base_e.map(|(m, _)| m) {
                    theirs_mode
                } else {
                    ours_mode
                };

                if is_binary(&ours_content) || is_binary(&theirs_content) {
                    // No line merge for binaries: keep ours, flag it.
                    merged.insert(path.clone(), (mode, ours_oid));
                    conflicts.push(Conflict {
                        path,
                        kind: ConflictKind::Binary,
                        base: base_e,
                        ours: ours_e,
                        theirs: theirs_e,
                    });
                    continue;
                }

                let result = merge_content(
                    &base_content,
                    &ours_content,
                    &theirs_content,
                    options.file_strategy,
                    &labels,
                );
                let merged_oid = store.blobs().store(&result.content)?;
                merged.insert(path.clone(), (mode, merged_oid));

                if !result.is_clean() {
                    conflicts.push(Conflict {
                        path,
                        kind: if base_e.is_none() {
                            ConflictKind::AddAdd
                        } else {
                            ConflictKind::Content
                        },
                        base: base_e,
                        ours: ours_e,
                        theirs: theirs_e,
                    });
                }
            }
            Resolution::ModifyDelete => {
                // Keep the modified side, flag the loss.
                let survivor = ours_e.or(theirs_e).expect("one side modified");
                merged.insert(path.clone(), survivor);
                conflicts.push(Conflict {
                    path,
                    kind: ConflictKind::ModifyDelete,
                    base: base_e,
                    ours: ours_e,
                    theirs: theirs_e,
                });
            }
        }
    }

    let tree = write_path_map(store, &merged)?;
    Ok(TreeMergeOutcome {
        tree,
        conflicts,
        renames,
    })
}

enum Resolution {
    /// Uncontested: take this entry (None = absent from the result).
    Take(Option<(FileMode, ObjectId)>),
    /// Both sides changed content; run the content merge.
    DoubleEdit,
    /// One side modified what the other deleted.
    ModifyDelete,
}

fn classify(
    base: Option<(FileMode, ObjectId)>,
    ours: Option<(FileMode, ObjectId)>,
    theirs: Option<(FileMode, ObjectId)>,
) -> Resolution {
    if ours == theirs {
        return Resolution::Take(ours);
    }
    if ours == base {
        return Resolution::Take(theirs);
    }
    if theirs == base {
        return Resolution::Take(ours);
    }
    // All three differ.
    match (ours, theirs) {
        (Some(_), Some(_)) => Resolution::DoubleEdit,
        _ => Resolution::ModifyDelete,
    }
}

/// A side's renames against the base tree.
fn side_renames(
    store: &ObjectStore,
    base: &ObjectId,
    side: &ObjectId,
    threshold: u8,
) -> Result<Vec<RenameInfo>, MergeError> {
    let mut diff = diff_trees(store, base, side)?;
    detect_renames(store, &mut diff, threshold)?;
    Ok(diff
        .changes
        .iter()
        .filter(|c| c.kind == ChangeKind::Renamed)
        .map(|c| RenameInfo {
            from: c.old_path.clone().expect("renames carry the old path"),
            to: c.new_path.clone().expect("renames carry the new path"),
            similarity: c.similarity.unwrap_or(100),
        })
        .collect())
}

/// Materialize a `path -> entry` map as nested tree objects.
pub(crate) fn write_path_map(store: &ObjectStore, map: &PathMap) -> Result<ObjectId, MergeError> {
    // Group into (subtree name -> nested map) plus direct files.
    let mut files: Vec<(BString, (FileMode, ObjectId))> = Vec::new();
    let mut subdirs: BTreeMap<BString, PathMap> = BTreeMap::new();

    for (path, entry) in map {
        match path.find_byte(b'/') {
            Some(pos) => {
                let dir = BString::from(&path[..pos]);
                let rest = BString::from(&path[pos + 1..]);
                subdirs.entry(dir).or_default().insert(rest, *entry);
            }
            None => files.push((path.clone(), *entry)),
        }
    }

    let mut tree = Tree::new();
    for (name, (mode, oid)) in files {
        tree.entries.push(TreeEntry { mode, name, oid });
    }
    for (name, nested) in subdirs {
        let oid = write_path_map(store, &nested)?;
        tree.entries.push(TreeEntry {
            mode: FileMode::Dir,
            name,
            oid,
        });
    }
    Ok(store.trees().store(&tree)?)
}
