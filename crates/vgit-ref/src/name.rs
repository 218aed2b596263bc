use std::fmt;

use crate::RefError;

/// A validated ref name: `HEAD`, `refs/heads/main`, `MERGE_HEAD`, …
///
/// Names are slash-separated UTF-8. The validation mirrors git's
/// check-ref-format rules for the subset this engine produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefName(String);

impl RefName {
    pub fn new(name: impl Into<String>) -> Result<Self, RefError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// A branch name under `refs/heads/`.
    pub fn branch(short: &str) -> Result<Self, RefError> {
        Self::new(format!("refs/heads/{short}"))
    }

    /// A tag name under `refs/tags/`.
    pub fn tag(short: &str) -> Result<Self, RefError> {
        Self::new(format!("refs/tags/{short}"))
    }

    /// The well-known `HEAD` ref.
    pub fn head() -> Self {
        Self("HEAD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The short form: `refs/heads/main` -> `main`; other names unchanged.
    pub fn short(&self) -> &str {
        self.0
            .strip_prefix("refs/heads/")
            .or_else(|| self.0.strip_prefix("refs/tags/"))
            .or_else(|| self.0.strip_prefix("refs/remotes/"))
            .unwrap_or(&self.0)
    }

    /// Whether this is a branch ref (`refs/heads/...`).
    pub fn is_branch(&self) -> bool {
        self.0.starts_with("refs/heads/")
    }

    /// Whether this is a tag ref (`refs/tags/...`).
    pub fn is_tag(&self) -> bool {
        self.0.starts_with("refs/tags/")
    }

    fn validate(name: &str) -> Result<(), RefError> {
        let fail = |reason: &'static str| {
            Err(RefError::InvalidName {
                name: name.to_string(),
                reason,
            })
        };

        if name.is_empty() {
            return fail("empty");
        }
        if name.starts_with('/') || name.ends_with('/') {
            return fail("leading or trailing slash");
        }
        if name.contains("//") {
            return fail("empty path component");
        }
        if name.contains("..") {
            return fail("contains '..'");
        }
        if name.contains("@{") {
            return fail("contains '@{'");
        }
        if name.ends_with(".lock") || name.contains(".lock/") {
            return fail("component ends with '.lock'");
        }
        for component in name.split('/') {
            if component.starts_with('.') || component.ends_with('.') {
                return fail("component starts or ends with '.'");
            }
        }
        for byte in name.bytes() {
            if byte < 0x20 || byte == 0x7f {
                return fail("control character");
            }
            if matches!(byte, b' ' | b'~' | b'^' | b':' | b'?' | b'*' | b'[' | b'\\') {
                return fail("forbidden character");
            }
        }
        Ok(())
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for RefName {
    type Err = RefError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
