//! Object header framing: `"<type> <size>\0"`.

use crate::{ObjectError, ObjectType};

/// The header must terminate within this many bytes; anything longer is
/// corrupt ("tag 18446744073709551615" is 25 bytes, so 32 is generous).
pub const MAX_HEADER_LEN: usize = 32;

/// Parse a header from the front of `data`.
///
/// Returns `(type, content_size, header_len)` where `header_len` includes
/// the terminating NUL.
pub fn parse(data: &[u8]) -> Result<(ObjectType, usize, usize), ObjectError> {
    let window = &data[..data.len().min(MAX_HEADER_LEN)];
    let nul_pos = window
        .iter()
        .position(|&b| b == 0)
        .ok_or(ObjectError::MissingHeaderNul)?;

    let header = &window[..nul_pos];
    let space_pos = header
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| ObjectError::UnknownType(header.into()))?;

    let obj_type = ObjectType::from_bytes(&header[..space_pos])?;
    let size = parse_decimal(&header[space_pos + 1..])?;

    Ok((obj_type, size, nul_pos + 1))
}

/// Serialize a header for the given type and content size.
pub fn write(obj_type: ObjectType, size: usize) -> Vec<u8> {
    format!("{} {}\0", obj_type.as_str(), size).into_bytes()
}

fn parse_decimal(s: &[u8]) -> Result<usize, ObjectError> {
    if s.is_empty() {
        return Err(ObjectError::BadSize(s.into()));
    }
    let mut val: usize = 0;
    for &b in s {
        if !b.is_ascii_digit() {
            return Err(ObjectError::BadSize(s.into()));
        }
        val = val
            .checked_mul(10)
            .and_then(|v| v.checked_add((b - b'0') as usize))
            .ok_or_else(|| ObjectError::BadSize(s.into()))?;
    }
    Ok(val)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_blob_header() {
        let (t, size, len) = parse(b"blob 1234\0rest").unwrap();
        assert_eq!(t, ObjectType::Blob);
        assert_eq!(size, 1234);
        assert_eq!(len, 10);
    }

    #[test]
    fn roundtrip() {
        for t in [
            ObjectType::Blob,
            ObjectType::Tree,
            ObjectType::Commit,
            ObjectType::Tag,
        ] {
            let hdr = write(t, 42);
            let (parsed, size, len) = parse(&hdr).unwrap();
            assert_eq!(parsed, t);
            assert_eq!(size, 42);
            assert_eq!(len, hdr.len());
        }
    }

    #[test]
    fn missing_nul() {
        let err = parse(&[b'a'; 64]).unwrap_err();
        assert!(matches!(err, ObjectError::MissingHeaderNul));
        assert_eq!(err.to_string(), "no null in first 32 bytes");
    }

    #[test]
    fn unknown_type() {
        let err = parse(b"sausage 5\0").unwrap_err();
        assert!(matches!(err, ObjectError::UnknownType(_)));
    }

    #[test]
    fn bad_size() {
        assert!(matches!(
            parse(b"blob x5\0"),
            Err(ObjectError::BadSize(_))
        ));
        assert!(matches!(parse(b"blob \0"), Err(ObjectError::BadSize(_))));
    }
}
