//! Small newtypes shared across the crate.
//!
//! Keeping these distinct (rather than passing `String`/`Vec<u8>` around)
//! stops a path from being handed to a function expecting a version, and
//! vice versa.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Identifies a realm: a named storage location holding one metadata graph.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RealmId(pub String);

impl fmt::Display for RealmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RealmId {
    fn from(s: &str) -> Self {
        RealmId(s.to_string())
    }
}

impl From<String> for RealmId {
    fn from(s: String) -> Self {
        RealmId(s)
    }
}

/// A dataset or collection version, as assigned by the versioning system
/// that wraps a realm (a VCS commit, a snapshot tag, and so on).
///
/// Opaque to this crate: versions are compared for equality and ordered
/// lexically, never interpreted.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Version(pub String);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Version(s.to_string())
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Version(s)
    }
}

/// A slash-separated path relative to a dataset or collection root.
///
/// Always normalized to use `/` separators and to carry no leading or
/// trailing slash, so that two paths built from different platform
/// `PathBuf`s still compare equal.
///
/// ```
/// use metalad_core::Path;
///
/// assert_eq!(Path::from("a/b/"), Path::from("a/b"));
/// assert_eq!(Path::from("/a/b"), Path::from("a/b"));
/// assert_eq!(Path::from("a/b").join(&Path::from("c")), Path::from("a/b/c"));
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Path(String);

impl Path {
    /// The path denoting the dataset or collection root itself.
    pub fn root() -> Self {
        Path(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Joins `other` onto `self`, treating `self` as a directory prefix.
    pub fn join(&self, other: &Path) -> Path {
        if self.is_root() {
            return other.clone();
        }
        if other.is_root() {
            return self.clone();
        }
        Path(format!("{}/{}", self.0, other.0))
    }

    /// True if `self` names exactly `prefix`, or a path nested under it.
    ///
    /// ```
    /// use metalad_core::Path;
    ///
    /// assert!(Path::from("a/b/c").starts_with(&Path::from("a/b")));
    /// assert!(Path::from("a/b").starts_with(&Path::from("a/b")));
    /// assert!(!Path::from("a/bc").starts_with(&Path::from("a/b")));
    /// ```
    pub fn starts_with(&self, prefix: &Path) -> bool {
        if prefix.is_root() {
            return true;
        }
        self.0 == prefix.0 || self.0.starts_with(&format!("{}/", prefix.0))
    }

    /// Rewrites the `old_prefix` component of `self` to `new_prefix`.
    ///
    /// Returns `None` if `self` does not start with `old_prefix`.
    pub fn rebase(&self, old_prefix: &Path, new_prefix: &Path) -> Option<Path> {
        if !self.starts_with(old_prefix) {
            return None;
        }
        let suffix = if old_prefix.is_root() {
            self.0.as_str()
        } else if self.0.len() == old_prefix.0.len() {
            ""
        } else {
            &self.0[old_prefix.0.len() + 1..]
        };
        if suffix.is_empty() {
            Some(new_prefix.clone())
        } else {
            Some(new_prefix.join(&Path::from(suffix)))
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path(s.trim_matches('/').to_string())
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Path::from(s.as_str())
    }
}

impl From<PathBuf> for Path {
    fn from(p: PathBuf) -> Self {
        Path::from(p.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"))
    }
}

/// A point in time, recorded as whole seconds since the Unix epoch.
///
/// Extraction results carry the wall-clock time they were produced, not
/// the time the underlying data was authored.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The name of an extraction result format, e.g. `"bibtex"` or
/// `"metalad_core"`. Distinguishes multiple extractor runs recorded
/// against the same path.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Format(pub String);

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Format {
    fn from(s: &str) -> Self {
        Format(s.to_string())
    }
}

impl From<String> for Format {
    fn from(s: String) -> Self {
        Format(s)
    }
}

/// The content-addressed identity of a blob stored in a [`crate::backend::Backend`].
///
/// Two calls to [`BlobId::of`] with the same bytes always produce the same
/// id, including across realms backed by the same storage, so callers may
/// use id equality as a cheap proxy for content equality.
///
/// ```
/// use metalad_core::BlobId;
///
/// assert_eq!(BlobId::of(b"hello"), BlobId::of(b"hello"));
/// assert_ne!(BlobId::of(b"hello"), BlobId::of(b"world"));
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BlobId(String);

impl BlobId {
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        BlobId(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BlobId {
    fn from(s: &str) -> Self {
        BlobId(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_join_and_root() {
        assert_eq!(Path::root().join(&Path::from("a")), Path::from("a"));
        assert_eq!(Path::from("a").join(&Path::root()), Path::from("a"));
        assert!(Path::root().is_root());
    }

    #[test]
    fn path_rebase() {
        let p = Path::from("sub/a/b");
        let rebased = p
            .rebase(&Path::from("sub"), &Path::from("parent/sub"))
            .unwrap();
        assert_eq!(rebased, Path::from("parent/sub/a/b"));

        let exact = Path::from("sub");
        assert_eq!(
            exact.rebase(&Path::from("sub"), &Path::from("parent/sub")).unwrap(),
            Path::from("parent/sub")
        );

        assert!(Path::from("other/a").rebase(&Path::from("sub"), &Path::from("x")).is_none());
    }

    #[test]
    fn blob_id_is_deterministic() {
        assert_eq!(BlobId::of(b"content"), BlobId::of(b"content"));
    }
}
