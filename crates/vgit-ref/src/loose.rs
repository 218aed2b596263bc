//! Loose refs: one file per ref under `<gitdir>`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use vgit_hash::ObjectId;
use vgit_utils::LockFile;

use crate::name::RefName;
use crate::{RefError, Reference};

pub(crate) fn ref_path(git_dir: &Path, name: &RefName) -> PathBuf {
    git_dir.join(name.as_str())
}

/// Read a loose ref file: 40-hex (direct) or `ref: <target>` (symbolic).
/// `Ok(None)` when the file does not exist.
pub(crate) fn read(git_dir: &Path, name: &RefName) -> Result<Option<Reference>, RefError> {
    let path = ref_path(git_dir, name);
    let contents = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let trimmed = contents.trim();
    if let Some(target_bytes) = trimmed.strip_prefix(b"ref: ") {
        let target_str =
            std::str::from_utf8(target_bytes.trim()).map_err(|_| RefError::Parse {
                name: name.to_string(),
                reason: "non-UTF-8 symbolic target".into(),
            })?;
        Ok(Some(Reference::Symbolic {
            name: name.clone(),
            target: RefName::new(target_str)?,
        }))
    } else {
        let hex = std::str::from_utf8(trimmed).map_err(|_| RefError::Parse {
            name: name.to_string(),
            reason: "non-UTF-8 ref contents".into(),
        })?;
        let target = ObjectId::from_hex(hex).map_err(|e| RefError::Parse {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(Reference::Direct {
            name: name.clone(),
            target,
            peeled: None,
        }))
    }
}

/// Write a direct ref through its lockfile.
pub(crate) fn write(git_dir: &Path, name: &RefName, oid: &ObjectId) -> Result<(), RefError> {
    write_contents(git_dir, name, format!("{}\n", oid.to_hex()).as_bytes())
}

/// Write a symbolic ref through its lockfile.
pub(crate) fn write_symbolic(
    git_dir: &Path,
    name: &RefName,
    target: &RefName,
) -> Result<(), RefError> {
    write_contents(git_dir, name, format!("ref: {target}\n").as_bytes())
}

fn write_contents(git_dir: &Path, name: &RefName, contents: &[u8]) -> Result<(), RefError> {
    let path = ref_path(git_dir, name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut lock = LockFile::acquire(&path)?;
    lock.write_all(contents)?;
    lock.commit()?;
    Ok(())
}

/// Remove a loose ref file, pruning now-empty ref directories.
pub(crate) fn delete(git_dir: &Path, name: &RefName) -> Result<bool, RefError> {
    let path = ref_path(git_dir, name);
    if !path.is_file() {
        return Ok(false);
    }
    fs::remove_file(&path)?;

    let refs_dir = git_dir.join("refs");
    let mut dir = path.parent().map(|p| p.to_path_buf());
    while let Some(d) = dir {
        if d == refs_dir || d == *git_dir {
            break;
        }
        let empty = d
            .read_dir()
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !empty {
            break;
        }
        let _ = fs::remove_dir(&d);
        dir = d.parent().map(|p| p.to_path_buf());
    }
    Ok(true)
}

/// Enumerate loose refs under `<gitdir>/<prefix>` (e.g. `refs/heads`).
pub(crate) fn list(git_dir: &Path, prefix: &str) -> Result<Vec<RefName>, RefError> {
    let root = git_dir.join(prefix);
    let mut names = Vec::new();
    if !root.is_dir() {
        return Ok(names);
    }

    let mut stack = vec![root];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                stack.push(path);
            } else if let Ok(relative) = path.strip_prefix(git_dir) {
                let Some(s) = relative.to_str() else { continue };
                if s.ends_with(".lock") {
                    continue;
                }
                if let Ok(name) = RefName::new(s.replace('\\', "/")) {
                    names.push(name);
                }
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let name = RefName::branch("main").unwrap();
        let oid = ObjectId::from_hex("ce013625030ba8dba906f756967f9e9ca394464a").unwrap();

        write(dir.path(), &name, &oid).unwrap();
        let read_back = read(dir.path(), &name).unwrap().unwrap();
        assert_eq!(read_back.target_oid(), Some(oid));

        let on_disk = fs::read(dir.path().join("refs/heads/main")).unwrap();
        assert_eq!(on_disk, b"ce013625030ba8dba906f756967f9e9ca394464a\n");
    }

    #[test]
    fn symbolic_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let head = RefName::head();
        let main = RefName::branch("main").unwrap();

        write_symbolic(dir.path(), &head, &main).unwrap();
        let read_back = read(dir.path(), &head).unwrap().unwrap();
        assert_eq!(read_back.symbolic_target(), Some(&main));

        let on_disk = fs::read(dir.path().join("HEAD")).unwrap();
        assert_eq!(on_disk, b"ref: refs/heads/main\n");
    }

    #[test]
    fn missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(dir.path(), &RefName::branch("gone").unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn delete_prunes_empty_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let name = RefName::new("refs/heads/feature/deep").unwrap();
        let oid = ObjectId([7u8; 20]);
        write(dir.path(), &name, &oid).unwrap();

        assert!(delete(dir.path(), &name).unwrap());
        assert!(!dir.path().join("refs/heads/feature").exists());
        assert!(!delete(dir.path(), &name).unwrap());
    }

    #[test]
    fn list_recurses_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let oid = ObjectId([1u8; 20]);
        for name in ["refs/heads/zeta", "refs/heads/alpha", "refs/heads/grp/one"] {
            write(dir.path(), &RefName::new(name).unwrap(), &oid).unwrap();
        }

        let names = list(dir.path(), "refs/heads").unwrap();
        let strs: Vec<&str> = names.iter().map(|n| n.as_str()).collect();
        assert_eq!(
            strs,
            vec!["refs/heads/alpha", "refs/heads/grp/one", "refs/heads/zeta"]
        );
    }

    #[test]
    fn corrupt_contents_error() {
        let dir = tempfile::tempdir().unwrap();
        let name = RefName::branch("bad").unwrap();
        fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        fs::write(dir.path().join("refs/heads/bad"), b"not an oid\n").unwrap();
        assert!(matches!(
            read(dir.path(), &name),
            Err(RefError::Parse { .. })
        ));
    }
}
