use bstr::{BStr, BString, ByteSlice};
use vgit_hash::ObjectId;
use vgit_utils::Signature;

use crate::ObjectError;

/// A commit object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// OID of the root tree.
    pub tree: ObjectId,
    /// Parent commits, ordered; `parents[0]` is the first parent.
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    /// Optional `encoding` header (e.g. "ISO-8859-1").
    pub encoding: Option<BString>,
    /// Optional GPG signature, parsed but never verified.
    pub gpgsig: Option<BString>,
    /// Message: everything after the blank separator line.
    pub message: BString,
}

impl Commit {
    /// Parse commit content (no object header).
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut tree: Option<ObjectId> = None;
        let mut parents = Vec::new();
        let mut author: Option<Signature> = None;
        let mut committer: Option<Signature> = None;
        let mut encoding: Option<BString> = None;
        let mut gpgsig: Option<BString> = None;

        let mut pos = 0;
        while pos < content.len() {
            if content[pos] == b'\n' {
                // Blank line: headers end, message begins.
                pos += 1;
                break;
            }

            let line_end = content[pos..]
                .find_byte(b'\n')
                .map(|p| p + pos)
                .unwrap_or(content.len());
            let line = &content[pos..line_end];

            let space_pos = line.find_byte(b' ').unwrap_or(line.len());
            let key = &line[..space_pos];
            let value = line.get(space_pos + 1..).unwrap_or(b"");

            match key {
                b"tree" => tree = Some(parse_oid(value)?),
                b"parent" => parents.push(parse_oid(value)?),
                b"author" => author = Some(parse_signature(value)?),
                b"committer" => committer = Some(parse_signature(value)?),
                b"encoding" => encoding = Some(BString::from(value)),
                b"gpgsig" => {
                    // Continuation lines are indented with one space.
                    let (sig, next) = read_continuation(content, value, line_end);
                    gpgsig = Some(sig);
                    pos = next;
                    continue;
                }
                _ => {
                    // Unknown headers (mergetag etc.) are skipped, along
                    // with their continuation lines.
                    let (_, next) = read_continuation(content, value, line_end);
                    pos = next;
                    continue;
                }
            }

            pos = line_end + 1;
        }

        Ok(Self {
            tree: tree.ok_or(ObjectError::MissingCommitField { field: "tree" })?,
            parents,
            author: author.ok_or(ObjectError::MissingCommitField { field: "author" })?,
            committer: committer.ok_or(ObjectError::MissingCommitField { field: "committer" })?,
            encoding,
            gpgsig,
            message: BString::from(&content[pos.min(content.len())..]),
        })
    }

    /// Serialize commit content (no object header).
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(b"tree ");
        out.extend_from_slice(self.tree.to_hex().as_bytes());
        out.push(b'\n');

        for parent in &self.parents {
            out.extend_from_slice(b"parent ");
            out.extend_from_slice(parent.to_hex().as_bytes());
            out.push(b'\n');
        }

        out.extend_from_slice(b"author ");
        out.extend_from_slice(&self.author.to_bytes());
        out.push(b'\n');

        out.extend_from_slice(b"committer ");
        out.extend_from_slice(&self.committer.to_bytes());
        out.push(b'\n');

        if let Some(ref enc) = self.encoding {
            out.extend_from_slice(b"encoding ");
            out.extend_from_slice(enc);
            out.push(b'\n');
        }

        if let Some(ref sig) = self.gpgsig {
            out.extend_from_slice(b"gpgsig ");
            write_continuation(&mut out, sig);
            out.push(b'\n');
        }

        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }

    /// The first parent, if any.
    pub fn first_parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// The first line of the message.
    pub fn summary(&self) -> &BStr {
        let msg: &[u8] = self.message.as_ref();
        match msg.find_byte(b'\n') {
            Some(pos) => BStr::new(&msg[..pos]),
            None => BStr::new(msg),
        }
    }
}

/// Read a multi-line header value whose continuation lines begin with a
/// space. Returns the joined value and the position after the last line.
fn read_continuation(content: &[u8], first: &[u8], line_end: usize) -> (BString, usize) {
    let mut value = Vec::from(first);
    let mut next = line_end + 1;
    while next < content.len() && content[next] == b' ' {
        value.push(b'\n');
        let cont_end = content[next..]
            .find_byte(b'\n')
            .map(|p| p + next)
            .unwrap_or(content.len());
        value.extend_from_slice(&content[next + 1..cont_end]);
        next = cont_end + 1;
    }
    (BString::from(value), next)
}

fn write_continuation(out: &mut Vec<u8>, value: &[u8]) {
    for (i, line) in value.split(|&b| b == b'\n').enumerate() {
        if i > 0 {
            out.push(b'\n');
            out.push(b' ');
        }
        out.extend_from_slice(line);
    }
}

fn parse_oid(value: &[u8]) -> Result<ObjectId, ObjectError> {
    let hex = std::str::from_utf8(value)
        .map_err(|_| ObjectError::InvalidSignature("non-UTF-8 OID header".into()))?;
    Ok(ObjectId::from_hex(hex)?)
}

fn parse_signature(value: &[u8]) -> Result<Signature, ObjectError> {
    Signature::parse(BStr::new(value)).map_err(|e| ObjectError::InvalidSignature(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
        out.extend_from_slice(b"parent 0000000000000000000000000000000000000001\n");
        out.extend_from_slice(b"author Ann <ann@x> 1700000000 +0000\n");
        out.extend_from_slice(b"committer Ann <ann@x> 1700000000 +0000\n");
        out.extend_from_slice(b"\ninit\n");
        out
    }

    #[test]
    fn parse_fields() {
        let commit = Commit::parse(&sample()).unwrap();
        assert_eq!(commit.tree, vgit_hash::EMPTY_TREE_OID);
        assert_eq!(commit.parents.len(), 1);
        assert_eq!(commit.author.name, "Ann");
        assert_eq!(commit.author.date.timestamp, 1_700_000_000);
        assert_eq!(commit.message, "init\n");
        assert_eq!(commit.summary(), "init");
        assert!(!commit.is_merge());
        assert!(!commit.is_root());
    }

    #[test]
    fn serialize_roundtrip_bit_exact() {
        let bytes = sample();
        let commit = Commit::parse(&bytes).unwrap();
        assert_eq!(commit.serialize_content(), bytes);
    }

    #[test]
    fn merge_commit_parent_order() {
        let mut data = Vec::new();
        data.extend_from_slice(b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
        data.extend_from_slice(b"parent 0000000000000000000000000000000000000001\n");
        data.extend_from_slice(b"parent 0000000000000000000000000000000000000002\n");
        data.extend_from_slice(b"author A <a@b> 1 +0000\n");
        data.extend_from_slice(b"committer A <a@b> 1 +0000\n");
        data.extend_from_slice(b"\nmerge\n");

        let commit = Commit::parse(&data).unwrap();
        assert!(commit.is_merge());
        assert_eq!(
            commit.first_parent().unwrap().to_hex(),
            "0000000000000000000000000000000000000001"
        );
        assert_eq!(commit.serialize_content(), data);
    }

    #[test]
    fn encoding_and_tz_preserved() {
        let mut data = Vec::new();
        data.extend_from_slice(b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
        data.extend_from_slice(b"author A <a@b> 1234567890 -0530\n");
        data.extend_from_slice(b"committer A <a@b> 1234567890 +0145\n");
        data.extend_from_slice(b"encoding ISO-8859-1\n");
        data.extend_from_slice(b"\nmsg\n");

        let commit = Commit::parse(&data).unwrap();
        assert!(commit.is_root());
        assert_eq!(
            commit.encoding.as_ref().map(|v| v.as_slice()),
            Some(b"ISO-8859-1".as_ref())
        );
        assert_eq!(commit.serialize_content(), data);
    }

    #[test]
    fn gpgsig_continuation_roundtrip() {
        let mut data = Vec::new();
        data.extend_from_slice(b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
        data.extend_from_slice(b"author A <a@b> 1 +0000\n");
        data.extend_from_slice(b"committer A <a@b> 1 +0000\n");
        data.extend_from_slice(b"gpgsig -----BEGIN PGP SIGNATURE-----\n");
        data.extend_from_slice(b" line2\n");
        data.extend_from_slice(b" -----END PGP SIGNATURE-----\n");
        data.extend_from_slice(b"\nsigned\n");

        let commit = Commit::parse(&data).unwrap();
        let sig = commit.gpgsig.as_ref().unwrap();
        assert!(sig.starts_with(b"-----BEGIN PGP SIGNATURE-----"));
        assert!(sig.ends_with(b"-----END PGP SIGNATURE-----"));
        assert_eq!(commit.serialize_content(), data);
    }

    #[test]
    fn missing_tree_rejected() {
        let data = b"author A <a@b> 1 +0000\ncommitter A <a@b> 1 +0000\n\nmsg\n";
        assert!(matches!(
            Commit::parse(data),
            Err(ObjectError::MissingCommitField { field: "tree" })
        ));
    }
}
