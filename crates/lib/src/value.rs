//! The value model: JSON payloads, version stamps, and the directory/leaf
//! classification rule.
//!
//! Stored values are plain JSON ([`serde_json::Value`]). A node holds either a
//! concrete leaf value or the distinguished *directory marker* (an empty JSON
//! object) indicating that the node's state lives in its children. The
//! [`classify`] predicate implements exactly that rule; non-empty objects are
//! still classified as leaves here because the write path decomposes them into
//! children instead of storing them verbatim.

use serde::{Deserialize, Serialize};

pub use serde_json::Value;

/// Logical write time in milliseconds since the Unix epoch.
///
/// Timestamps are the sole conflict arbiter: for any path, the value with the
/// strictly greatest `updated_at` wins regardless of arrival order.
pub type Timestamp = u64;

/// A value paired with its logical write time and optional expiry.
///
/// `updated_at` drives last-write-wins conflict resolution. `expires_at` is
/// advisory only; the engine never enforces it, but adapters may use it for
/// eviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned {
    pub value: Value,
    pub updated_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
}

impl Versioned {
    /// Creates a versioned value with no expiry.
    pub fn new(value: impl Into<Value>, updated_at: Timestamp) -> Self {
        Self {
            value: value.into(),
            updated_at,
            expires_at: None,
        }
    }

    /// Returns `true` if this value is the directory marker.
    pub fn is_directory(&self) -> bool {
        classify(&self.value) == Kind::Directory
    }
}

/// Classification of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A concrete JSON value: scalar, `null`, array, or non-empty object.
    Leaf,
    /// The directory marker: the node's state lives in its children.
    Directory,
}

/// Returns the directory marker value.
pub fn directory() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Classifies a value as directory or leaf.
///
/// Directory iff the value is a non-null, non-array object with zero keys.
/// Everything else, including `null`, empty arrays, and non-empty objects, is
/// a leaf as far as this predicate is concerned.
pub fn classify(value: &Value) -> Kind {
    match value {
        Value::Object(map) if map.is_empty() => Kind::Directory,
        _ => Kind::Leaf,
    }
}

/// Returns `true` if the value is a non-empty plain object, i.e. a write the
/// engine decomposes into per-key child writes rather than storing verbatim.
pub fn is_decomposable(value: &Value) -> bool {
    matches!(value, Value::Object(map) if !map.is_empty())
}
