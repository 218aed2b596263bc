/// Errors from OID parsing and hashing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HashError {
    #[error("invalid hash length: expected {expected} bytes, got {actual}")]
    InvalidHashLength { expected: usize, actual: usize },

    #[error("invalid hex length: expected {expected} chars, got {actual}")]
    InvalidHexLength { expected: usize, actual: usize },

    #[error("invalid hex character {char:?} at position {position}")]
    InvalidHex { char: char, position: usize },

    #[error("SHA-1 collision attack detected")]
    Collision,
}
