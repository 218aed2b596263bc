use bstr::{BStr, BString, ByteSlice};
use vgit_hash::ObjectId;
use vgit_utils::Signature;

use crate::{ObjectError, ObjectType};

/// An annotated tag object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// The tagged object.
    pub object: ObjectId,
    /// Type of the tagged object (usually a commit).
    pub target_type: ObjectType,
    /// Tag name (e.g. "v1.0.0").
    pub name: BString,
    /// Tagger identity. Optional: very old tags omit it.
    pub tagger: Option<Signature>,
    /// Tag message, including any trailing PGP signature block. The
    /// signature is carried verbatim and never verified.
    pub message: BString,
}

impl Tag {
    /// Parse tag content (no object header).
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut object: Option<ObjectId> = None;
        let mut target_type: Option<ObjectType> = None;
        let mut name: Option<BString> = None;
        let mut tagger: Option<Signature> = None;

        let mut pos = 0;
        while pos < content.len() {
            if content[pos] == b'\n' {
                pos += 1;
                break;
            }

            let line_end = content[pos..]
                .find_byte(b'\n')
                .map(|p| p + pos)
                .unwrap_or(content.len());
            let line = &content[pos..line_end];

            if let Some(space_pos) = line.find_byte(b' ') {
                let key = &line[..space_pos];
                let value = &line[space_pos + 1..];
                match key {
                    b"object" => {
                        let hex = std::str::from_utf8(value).map_err(|_| {
                            ObjectError::InvalidSignature("non-UTF-8 object OID".into())
                        })?;
                        object = Some(ObjectId::from_hex(hex)?);
                    }
                    b"type" => target_type = Some(ObjectType::from_bytes(value)?),
                    b"tag" => name = Some(BString::from(value)),
                    b"tagger" => {
                        tagger = Some(Signature::parse(BStr::new(value)).map_err(|e| {
                            ObjectError::InvalidSignature(e.to_string())
                        })?);
                    }
                    _ => {}
                }
            }
            pos = line_end + 1;
        }

        Ok(Self {
            object: object.ok_or(ObjectError::MissingTagField { field: "object" })?,
            target_type: target_type.ok_or(ObjectError::MissingTagField { field: "type" })?,
            name: name.ok_or(ObjectError::MissingTagField { field: "tag" })?,
            tagger,
            message: BString::from(&content[pos.min(content.len())..]),
        })
    }

    /// Serialize tag content (no object header).
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(b"object ");
        out.extend_from_slice(self.object.to_hex().as_bytes());
        out.push(b'\n');

        out.extend_from_slice(b"type ");
        out.extend_from_slice(self.target_type.as_str().as_bytes());
        out.push(b'\n');

        out.extend_from_slice(b"tag ");
        out.extend_from_slice(&self.name);
        out.push(b'\n');

        if let Some(ref tagger) = self.tagger {
            out.extend_from_slice(b"tagger ");
            out.extend_from_slice(&tagger.to_bytes());
            out.push(b'\n');
        }

        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }
}
