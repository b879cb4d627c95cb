//! Canopy is a local-first, path-addressable data store.
//!
//! Values live at slash-separated paths ("users/ada/name") and are plain
//! JSON. Writing a non-empty object *decomposes* it: each entry becomes its
//! own child path, and the object's node becomes a directory of those
//! children, so fine-grained subscriptions and partial updates fall out of
//! the data model instead of requiring diffing.
//!
//! Storage and sync are pluggable behind the [`Adapter`] trait. A [`Tree`]
//! fans writes out to all of its adapters and merges their notifications by
//! logical timestamp (last-write-wins), so adding a persistence layer or a
//! sync relay never changes application code.
//!
//! # Example
//!
//! ```
//! use canopy::Tree;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> canopy::Result<()> {
//! let tree = Tree::default();
//! tree.node("users/ada").put(json!({"name": "ada", "age": 36})).await?;
//!
//! // The object decomposed; each field is individually addressable.
//! let name = tree.node("users/ada/name").once().await.unwrap();
//! assert_eq!(name.value, json!("ada"));
//! # Ok(())
//! # }
//! ```
//!
//! Subscriptions come in four shapes on [`Node`]: [`on`](Node::on) for one
//! path's value, [`once`](Node::once) for a single resolution, [`map`](Node::map)
//! for per-child updates, and [`open`](Node::open) for an aggregated subtree
//! view. All of them share the same staleness rule: only strictly newer
//! versions are delivered.

pub mod adapter;
mod bind;
pub mod clock;
pub mod node;
pub mod path;
pub mod value;

pub use adapter::{Adapter, AdapterError, Guard, Memory, NotifyFn, Unsubscribe, Update};
pub use clock::{Clock, FixedClock, SystemClock};
pub use node::{Node, NodeError, SubscribeOptions, Tree};
pub use path::{Path, PathBuf};
pub use value::{Kind, Timestamp, Value, Versioned, classify, directory, is_decomposable};

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
///
/// Module-specific errors are wrapped transparently; use the `is_*` helpers
/// to classify without matching on the full structure.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O failure while loading or saving adapter state.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Storage or sync backend failure.
    #[error(transparent)]
    Adapter(AdapterError),

    /// Node engine failure.
    #[error(transparent)]
    Node(NodeError),
}

impl Error {
    /// Returns `true` if this error originated in a storage backend.
    pub fn is_adapter_error(&self) -> bool {
        matches!(self, Error::Adapter(_))
    }

    /// Returns `true` if this error originated in the node engine.
    pub fn is_node_error(&self) -> bool {
        matches!(self, Error::Node(_))
    }

    /// Returns `true` for I/O or serialization failures.
    pub fn is_io_error(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Serialize(_))
    }
}
