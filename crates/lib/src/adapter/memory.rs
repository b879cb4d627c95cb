//! In-memory adapter backed by an ordered path-keyed map.
//!
//! This is the reference [`Adapter`] implementation, suitable for testing,
//! development, or scenarios where persistence is handled externally by
//! saving/loading the entire state to/from a file. It keeps values in a
//! `BTreeMap` keyed by path string, which makes child enumeration a range
//! scan over the `"<path>/"` prefix.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::ops::Bound;
use std::sync::{
    Arc, Mutex, RwLock,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::adapter::{Adapter, AdapterError, NotifyFn, Unsubscribe, Update};
use crate::path::{Path, PathBuf};
use crate::value::{Kind, Versioned, classify};
use crate::{Error, Result};

type SubId = u64;
type Observers = HashMap<PathBuf, HashMap<SubId, NotifyFn>>;

#[derive(Default)]
struct SubscriberTables {
    /// Value observers keyed by the exact path they watch.
    value: Observers,
    /// Child observers keyed by the parent path they watch.
    children: Observers,
}

/// A simple in-memory adapter.
///
/// `set` keeps only the newest version per path (older versions are silent
/// no-ops) and, when the accepted value is a leaf, purges stale descendants
/// so previously decomposed children do not outlive the leaf that replaced
/// them. Every accepted write notifies the path's value observers and the
/// parent's child observers.
#[derive(Default)]
pub struct Memory {
    values: RwLock<BTreeMap<PathBuf, Versioned>>,
    subscribers: Arc<Mutex<SubscriberTables>>,
    next_sub_id: AtomicU64,
}

/// Serializable snapshot of the stored values for file persistence.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    values: BTreeMap<String, Versioned>,
}

impl Memory {
    /// Creates a new, empty `Memory` adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves all stored values to a file as JSON.
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let snapshot = Snapshot {
            values: self
                .values
                .read()
                .unwrap()
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), v.clone()))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;
        fs::write(path, json).map_err(Error::Io)
    }

    /// Loads adapter state from a JSON file.
    ///
    /// If the file does not exist, a new, empty adapter is returned.
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        if !path.as_ref().exists() {
            return Ok(Self::new());
        }

        let json = fs::read_to_string(&path).map_err(Error::Io)?;
        let snapshot: Snapshot =
            serde_json::from_str(&json).map_err(|e| AdapterError::CorruptData {
                adapter: "memory".to_string(),
                reason: format!("failed to decode {}: {e}", path.as_ref().display()),
            })?;

        let adapter = Self::new();
        *adapter.values.write().unwrap() = snapshot
            .values
            .into_iter()
            .map(|(k, v)| (PathBuf::normalize(&k), v))
            .collect();
        Ok(adapter)
    }

    /// Returns the number of stored paths.
    pub fn len(&self) -> usize {
        self.values.read().unwrap().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.values.read().unwrap().is_empty()
    }

    /// Returns the stored version for a path, if any.
    pub fn stored(&self, path: &Path) -> Option<Versioned> {
        self.values.read().unwrap().get(path).cloned()
    }

    /// Direct children of `path` currently stored, with their versions.
    pub fn children_of(&self, path: &Path) -> Vec<(PathBuf, Versioned)> {
        self.values
            .read()
            .unwrap()
            .range(descendants_range(path))
            .filter(|(k, _)| k.parent().as_deref() == Some(path))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn register_value_observer(&self, path: &Path, on_change: NotifyFn) -> Unsubscribe {
        let id = self.next_sub_id.fetch_add(1, Ordering::Relaxed);
        let mut tables = self.subscribers.lock().unwrap();
        tables
            .value
            .entry(path.to_path_buf())
            .or_default()
            .insert(id, on_change);
        remove_on_call(self.subscribers.clone(), Table::Value, path.to_path_buf(), id)
    }

    fn register_child_observer(&self, path: &Path, on_change: NotifyFn) -> Unsubscribe {
        let id = self.next_sub_id.fetch_add(1, Ordering::Relaxed);
        let mut tables = self.subscribers.lock().unwrap();
        tables
            .children
            .entry(path.to_path_buf())
            .or_default()
            .insert(id, on_change);
        remove_on_call(
            self.subscribers.clone(),
            Table::Children,
            path.to_path_buf(),
            id,
        )
    }

    /// Value observers of `path`, each paired with its own unsubscribe.
    fn value_observers(&self, path: &Path) -> Vec<(NotifyFn, Unsubscribe)> {
        let tables = self.subscribers.lock().unwrap();
        let Some(subs) = tables.value.get(path) else {
            return Vec::new();
        };
        subs.iter()
            .map(|(id, f)| {
                let unsub = remove_on_call(
                    self.subscribers.clone(),
                    Table::Value,
                    path.to_path_buf(),
                    *id,
                );
                (f.clone(), unsub)
            })
            .collect()
    }

    /// Child observers watching `path`'s parent, each with its own unsubscribe.
    fn child_observers(&self, path: &Path) -> Vec<(NotifyFn, Unsubscribe)> {
        let Some(parent) = path.to_path_buf().parent() else {
            return Vec::new();
        };
        let tables = self.subscribers.lock().unwrap();
        let Some(subs) = tables.children.get(&parent) else {
            return Vec::new();
        };
        subs.iter()
            .map(|(id, f)| {
                let unsub =
                    remove_on_call(self.subscribers.clone(), Table::Children, parent.clone(), *id);
                (f.clone(), unsub)
            })
            .collect()
    }

    fn notify(&self, path: &Path, value: Option<&Versioned>) {
        for (observer, unsubscribe) in self
            .value_observers(path)
            .into_iter()
            .chain(self.child_observers(path))
        {
            observer(Update {
                value: value.map(|v| v.value.clone()),
                path: path.to_path_buf(),
                updated_at: value.map(|v| v.updated_at),
                unsubscribe,
            });
        }
    }
}

#[derive(Clone, Copy)]
enum Table {
    Value,
    Children,
}

fn remove_on_call(
    subscribers: Arc<Mutex<SubscriberTables>>,
    table: Table,
    path: PathBuf,
    id: SubId,
) -> Unsubscribe {
    Unsubscribe::new(move || {
        let mut tables = subscribers.lock().unwrap();
        let observers = match table {
            Table::Value => &mut tables.value,
            Table::Children => &mut tables.children,
        };
        if let Some(subs) = observers.get_mut(&path) {
            subs.remove(&id);
            if subs.is_empty() {
                observers.remove(&path);
            }
        }
    })
}

/// Range bounds selecting all strict descendants of `path`.
fn descendants_range(path: &Path) -> (Bound<PathBuf>, Bound<PathBuf>) {
    if path.is_empty() {
        return (Bound::Unbounded, Bound::Unbounded);
    }
    // '0' is the first character after '/', so ["a/", "a0") brackets exactly
    // the keys with prefix "a/".
    let low = PathBuf::from_raw(format!("{}/", path.as_str()));
    let high = PathBuf::from_raw(format!("{}0", path.as_str()));
    (Bound::Included(low), Bound::Excluded(high))
}

#[async_trait]
impl Adapter for Memory {
    async fn set(&self, path: &Path, value: Versioned) -> Result<()> {
        let purged = {
            let mut values = self.values.write().unwrap();
            if let Some(existing) = values.get(path)
                && existing.updated_at >= value.updated_at
            {
                trace!(%path, updated_at = value.updated_at, "memory: stale set ignored");
                return Ok(());
            }

            let mut purged = Vec::new();
            if classify(&value.value) == Kind::Leaf {
                // The path is a leaf again; descendants left over from an
                // earlier decomposition are stale.
                purged = values
                    .range(descendants_range(path))
                    .filter(|(_, v)| v.updated_at < value.updated_at)
                    .map(|(k, _)| k.clone())
                    .collect();
                for stale in &purged {
                    values.remove(stale);
                }
            }
            values.insert(path.to_path_buf(), value.clone());
            purged
        };

        trace!(%path, updated_at = value.updated_at, purged = purged.len(), "memory: set");

        // Locks are released before callbacks; observers may re-enter.
        self.notify(path, Some(&value));
        for stale in &purged {
            self.notify(stale, None);
        }
        Ok(())
    }

    fn get(&self, path: &Path, on_change: NotifyFn) -> Unsubscribe {
        let unsubscribe = self.register_value_observer(path, on_change.clone());

        let current = self.stored(path);
        on_change(Update {
            updated_at: current.as_ref().map(|v| v.updated_at),
            value: current.map(|v| v.value),
            path: path.to_path_buf(),
            unsubscribe: unsubscribe.clone(),
        });
        unsubscribe
    }

    fn list(&self, path: &Path, on_child_change: NotifyFn) -> Unsubscribe {
        let unsubscribe = self.register_child_observer(path, on_child_change.clone());

        for (child_path, versioned) in self.children_of(path) {
            on_child_change(Update {
                value: Some(versioned.value),
                path: child_path,
                updated_at: Some(versioned.updated_at),
                unsubscribe: unsubscribe.clone(),
            });
        }
        unsubscribe
    }
}
