//! Command implementations.
//!
//! Every command opens the store file through a [`Memory`] adapter, runs
//! against a [`Tree`] over it, and (for writes) saves the file back on the
//! way out. Because the Memory adapter notifies synchronously, read commands
//! can subscribe, harvest the inline notifications, and unsubscribe without
//! waiting.

use std::path::Path;
use std::sync::Arc;

use canopy::{Memory, Tree};

mod get;
mod ls;
mod put;
mod watch;

pub use get::get;
pub use ls::ls;
pub use put::put;
pub use watch::watch;

/// Opens the store file, creating an empty store if it does not exist.
fn open(file: &Path) -> canopy::Result<(Tree, Arc<Memory>)> {
    let memory = Arc::new(Memory::load_from_file(file)?);
    tracing::debug!(file = %file.display(), paths = memory.len(), "store opened");
    let tree = Tree::new(vec![memory.clone()]);
    Ok((tree, memory))
}
