//! Path types for addressing nodes in the store.
//!
//! Paths are sequences of non-empty segments joined by `/`. The [`Path`] /
//! [`PathBuf`] pair follows the same borrowed/owned pattern as
//! `std::path::Path`/`PathBuf`: `Path` is unsized and always used behind a
//! reference, `PathBuf` is the owned form.
//!
//! Construction normalizes its input (leading, trailing, and repeated
//! separators are stripped), so every `PathBuf` holds a canonical string and
//! path equality is string equality.
//!
//! # Example
//!
//! ```
//! use canopy::path::PathBuf;
//! use std::str::FromStr;
//!
//! let path = PathBuf::from_str("docs/1/title")?;
//! assert_eq!(path.parent().unwrap().as_str(), "docs/1");
//! assert_eq!(path.name(), Some("title"));
//! # Ok::<(), std::convert::Infallible>(())
//! ```

use std::{borrow::Borrow, fmt, ops::Deref, str::FromStr};

/// The path segment separator.
pub const SEPARATOR: char = '/';

/// Normalizes a path string by dropping empty segments.
///
/// - `""` → `""` (the root)
/// - `"/docs"` → `"docs"`
/// - `"docs//1"` → `"docs/1"`
/// - `"///"` → `""`
pub fn normalize(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }

    input
        .split(SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// An owned, normalized path addressing a node in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathBuf {
    inner: String,
}

/// A borrowed, normalized path.
///
/// This type is unsized and must always be used behind a reference.
#[derive(Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    inner: str,
}

impl PathBuf {
    /// Creates the empty (root) path.
    pub fn root() -> Self {
        Self {
            inner: String::new(),
        }
    }

    /// Creates a `PathBuf` by normalizing the input string.
    ///
    /// Always succeeds; empty and repeated separators are dropped.
    pub fn normalize(path: &str) -> Self {
        Self {
            inner: normalize(path),
        }
    }

    /// Wraps a string without normalizing it.
    ///
    /// Only for internal ordering tricks (range endpoints that are not valid
    /// paths themselves); never expose values built this way.
    pub(crate) fn from_raw(inner: String) -> Self {
        Self { inner }
    }

    /// Appends a path fragment, normalizing it first.
    ///
    /// Appending an empty fragment is a no-op, so `push` can take whole
    /// multi-segment suffixes as well as single segments.
    pub fn push(mut self, path: impl AsRef<str>) -> Self {
        let normalized = normalize(path.as_ref());
        if normalized.is_empty() {
            return self;
        }

        if self.inner.is_empty() {
            self.inner = normalized;
        } else {
            self.inner.push(SEPARATOR);
            self.inner.push_str(&normalized);
        }
        self
    }

    /// Joins this path with another path.
    pub fn join(self, other: impl AsRef<Path>) -> Self {
        self.push(other.as_ref().as_str())
    }

    /// Returns the parent path, or `None` if this is the root.
    pub fn parent(&self) -> Option<PathBuf> {
        if self.inner.is_empty() {
            return None;
        }
        Some(match self.inner.rfind(SEPARATOR) {
            Some(last) => PathBuf {
                inner: self.inner[..last].to_string(),
            },
            None => PathBuf::root(),
        })
    }
}

impl Path {
    /// Creates a `Path` from a string without normalizing it.
    ///
    /// # Safety
    /// The caller must ensure the string is already normalized: no leading or
    /// trailing separators and no empty segments.
    pub unsafe fn from_str_unchecked(s: &str) -> &Path {
        // SAFETY: Path has the same memory layout as str
        unsafe { &*(s as *const str as *const Path) }
    }

    /// Returns an iterator over the path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.inner.split(SEPARATOR).filter(|s| !s.is_empty())
    }

    /// Returns the number of segments in the path.
    pub fn len(&self) -> usize {
        if self.inner.is_empty() {
            0
        } else {
            self.inner.split(SEPARATOR).count()
        }
    }

    /// Returns `true` if this is the root path.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the last segment, or `None` for the root.
    pub fn name(&self) -> Option<&str> {
        if self.inner.is_empty() {
            None
        } else {
            self.inner.split(SEPARATOR).next_back()
        }
    }

    /// Returns `true` if `self` is an ancestor of `other` (or equal to it).
    ///
    /// P is an ancestor of Q iff Q's segments start with P's segments.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        if self.inner.is_empty() {
            return true;
        }
        match other.inner.strip_prefix(&self.inner) {
            Some(rest) => rest.is_empty() || rest.starts_with(SEPARATOR),
            None => false,
        }
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Converts this `Path` to an owned `PathBuf`.
    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf {
            inner: self.inner.to_string(),
        }
    }
}

impl Default for PathBuf {
    fn default() -> Self {
        Self::root()
    }
}

impl Deref for PathBuf {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        // Safe because PathBuf always holds a normalized string
        unsafe { Path::from_str_unchecked(self.inner.as_str()) }
    }
}

impl AsRef<Path> for PathBuf {
    fn as_ref(&self) -> &Path {
        self.deref()
    }
}

impl AsRef<Path> for Path {
    fn as_ref(&self) -> &Path {
        self
    }
}

impl AsRef<str> for Path {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

impl AsRef<str> for PathBuf {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

impl Borrow<Path> for PathBuf {
    fn borrow(&self) -> &Path {
        self.deref()
    }
}

impl FromStr for PathBuf {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::normalize(s))
    }
}

impl From<&str> for PathBuf {
    fn from(s: &str) -> Self {
        Self::normalize(s)
    }
}

impl From<&Path> for PathBuf {
    fn from(path: &Path) -> Self {
        path.to_path_buf()
    }
}

impl fmt::Display for PathBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Path::fmt(self, f)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inner.is_empty() {
            write!(f, "(root)")
        } else {
            write!(f, "{}", &self.inner)
        }
    }
}
