//! Tag management: lightweight and annotated.

use bstr::BString;
use vgit_hash::ObjectId;
use vgit_object::{ObjectType, Tag};
use vgit_ref::{RefName, Reference};
use vgit_repository::{resolve_revision, Repository};
use vgit_utils::Signature;

use crate::PorcelainError;

/// One tag in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    /// Short name (`v1.0.0`).
    pub name: String,
    /// What the ref points at (the tag object for annotated tags).
    pub target: ObjectId,
    /// The commit an annotated tag peels to.
    pub peeled: Option<ObjectId>,
    pub annotated: bool,
}

/// Create a tag at a revision (default `HEAD`). A tagger makes it an
/// annotated tag object; otherwise it is a lightweight ref.
pub fn tag_create(
    repo: &Repository,
    name: &str,
    at: Option<&str>,
    annotation: Option<(Signature, BString)>,
) -> Result<TagInfo, PorcelainError> {
    let commit = match at {
        Some(rev) => resolve_revision(repo, rev)?,
        None => repo
            .head_oid()?
            .ok_or(vgit_repository::RepoError::UnbornHead)?,
    };
    let ref_name = RefName::tag(name)?;

    let (target, peeled, annotated) = match annotation {
        Some((tagger, message)) => {
            let tag = Tag {
                object: commit,
                target_type: ObjectType::Commit,
                name: BString::from(name),
                tagger: Some(tagger),
                message,
            };
            let tag_oid = repo.store().tags().store(&tag)?;
            (tag_oid, Some(commit), true)
        }
        None => (commit, None, false),
    };

    repo.refs().create(&ref_name, &target)?;
    Ok(TagInfo {
        name: name.to_string(),
        target,
        peeled,
        annotated,
    })
}

/// List tags, sorted by name, peeling annotated tags.
pub fn tag_list(repo: &Repository) -> Result<Vec<TagInfo>, PorcelainError> {
    let mut out = Vec::new();
    for reference in repo.refs().list("refs/tags")? {
        let Reference::Direct { name, target, peeled } = reference else {
            continue;
        };
        let info = match repo.store().info(&target)?.obj_type {
            ObjectType::Tag => {
                let tag = repo.store().tags().load(&target)?;
                TagInfo {
                    name: name.short().to_string(),
                    target,
                    peeled: peeled.or(Some(tag.object)),
                    annotated: true,
                }
            }
            _ => TagInfo {
                name: name.short().to_string(),
                target,
                peeled: None,
                annotated: false,
            },
        };
        out.push(info);
    }
    Ok(out)
}

/// Delete a tag ref (the tag object, if any, stays until gc).
pub fn tag_delete(repo: &Repository, name: &str) -> Result<(), PorcelainError> {
    let ref_name = RefName::tag(name)?;
    if !repo.refs().delete(&ref_name)? {
        return Err(PorcelainError::TagNotFound(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{add, commit, CommitOptions};
    use vgit_object::FileMode;
    use vgit_repository::init;
    use vgit_utils::GitDate;

    fn seeded() -> (tempfile::TempDir, Repository, ObjectId) {
        let dir = tempfile::tempdir().unwrap();
        let repo = init(dir.path()).unwrap();
        repo.worktree()
            .write_content(&BString::from("f"), b"x", FileMode::Regular)
            .unwrap();
        add(&repo, &["f"]).unwrap();
        let head = commit(&repo, CommitOptions::with_default_author("c"))
            .unwrap()
            .oid;
        (dir, repo, head)
    }

    fn tagger() -> Signature {
        Signature {
            name: BString::from("Tagger"),
            email: BString::from("t@x"),
            date: GitDate::new(1_700_000_000, 0),
        }
    }

    #[test]
    fn lightweight_tag_points_at_commit() {
        let (_dir, repo, head) = seeded();
        let info = tag_create(&repo, "v0.1", None, None).unwrap();
        assert!(!info.annotated);
        assert_eq!(info.target, head);

        let listed = tag_list(&repo).unwrap();
        assert_eq!(listed, vec![info]);
    }

    #[test]
    fn annotated_tag_stores_tag_object() {
        let (_dir, repo, head) = seeded();
        let info = tag_create(
            &repo,
            "v1.0",
            None,
            Some((tagger(), BString::from("release 1.0\n"))),
        )
        .unwrap();
        assert!(info.annotated);
        assert_ne!(info.target, head);
        assert_eq!(info.peeled, Some(head));

        let tag = repo.store().tags().load(&info.target).unwrap();
        assert_eq!(tag.object, head);
        assert_eq!(tag.name, "v1.0");
        assert_eq!(tag.message, "release 1.0\n");
    }

    #[test]
    fn list_peels_annotated_tags() {
        let (_dir, repo, head) = seeded();
        tag_create(&repo, "light", None, None).unwrap();
        tag_create(
            &repo,
            "heavy",
            None,
            Some((tagger(), BString::from("msg\n"))),
        )
        .unwrap();

        let listed = tag_list(&repo).unwrap();
        assert_eq!(listed.len(), 2);
        // Sorted: heavy, light.
        assert_eq!(listed[0].name, "heavy");
        assert_eq!(listed[0].peeled, Some(head));
        assert_eq!(listed[1].name, "light");
        assert_eq!(listed[1].peeled, None);
    }

    #[test]
    fn delete_and_missing() {
        let (_dir, repo, _head) = seeded();
        tag_create(&repo, "gone", None, None).unwrap();
        tag_delete(&repo, "gone").unwrap();
        assert!(tag_list(&repo).unwrap().is_empty());
        assert!(matches!(
            tag_delete(&repo, "gone"),
            Err(PorcelainError::TagNotFound(_))
        ));
    }

    #[test]
    fn duplicate_tag_rejected() {
        let (_dir, repo, _head) = seeded();
        tag_create(&repo, "dup", None, None).unwrap();
        assert!(matches!(
            tag_create(&repo, "dup", None, None),
            Err(PorcelainError::Ref(vgit_ref::RefError::AlreadyExists(_)))
        ));
    }
}
