//! The adapter contract: the capability interface the engine requires from
//! any storage or sync backend.
//!
//! The [`Adapter`] trait defines the three operations the node engine needs:
//! `set` to persist a versioned value, `get` to observe a single path, and
//! `list` to observe the direct children of a path. This keeps the engine
//! independent of the concrete storage mechanism: an in-memory map, a durable
//! local file, a cross-process broadcast channel, or a network relay all look
//! the same from the engine's side.
//!
//! A [`Tree`](crate::Tree) fans every write out to *all* of its adapters and
//! merges their notifications by `updated_at`; it never assumes a single
//! source of truth, so adapters are free to deliver versions late, out of
//! order, or from remote peers.

use std::fmt;
use std::sync::{Arc, Mutex, atomic::AtomicBool, atomic::Ordering};

use async_trait::async_trait;

use crate::Result;
use crate::path::{Path, PathBuf};
use crate::value::{Timestamp, Value, Versioned};

mod errors;
pub mod memory;

pub use errors::AdapterError;
pub use memory::Memory;

/// A single notification delivered to a subscriber.
///
/// `value` is `None` when the backend has no value for the path (absence is
/// explicit and distinct from a stored JSON `null`). `updated_at` is `None`
/// only for absence notifications. `unsubscribe` cancels the subscription the
/// notification came from and may be called from inside the callback.
#[derive(Clone)]
pub struct Update {
    pub value: Option<Value>,
    pub path: PathBuf,
    pub updated_at: Option<Timestamp>,
    pub unsubscribe: Unsubscribe,
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Update")
            .field("value", &self.value)
            .field("path", &self.path)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

/// Callback invoked for every notification on a subscription.
pub type NotifyFn = Arc<dyn Fn(Update) + Send + Sync>;

/// Caller-supplied shape guard applied to present values before delivery.
///
/// The guard may pass a value through, coerce it, or reject it by returning
/// `None`, in which case the notification is dropped. The engine itself never
/// validates payload shape beyond the directory/leaf classification.
pub type Guard = Arc<dyn Fn(Value) -> Option<Value> + Send + Sync>;

/// Handle that cancels a subscription.
///
/// Idempotent: the teardown action runs at most once, and further calls are
/// no-ops. Cloneable and callable from within the subscriber's own callback.
#[derive(Clone)]
pub struct Unsubscribe {
    inner: Arc<UnsubscribeInner>,
}

struct UnsubscribeInner {
    called: AtomicBool,
    action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Unsubscribe {
    /// Wraps a teardown action.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(UnsubscribeInner {
                called: AtomicBool::new(false),
                action: Mutex::new(Some(Box::new(action))),
            }),
        }
    }

    /// An unsubscribe with nothing to tear down.
    pub fn noop() -> Self {
        Self {
            inner: Arc::new(UnsubscribeInner {
                called: AtomicBool::new(true),
                action: Mutex::new(None),
            }),
        }
    }

    /// Runs the teardown action if it has not run yet.
    pub fn call(&self) {
        if self.inner.called.swap(true, Ordering::AcqRel) {
            return;
        }
        // Taken out of the lock before invocation so the action itself may
        // re-enter call() without deadlocking.
        let action = self.inner.action.lock().unwrap().take();
        if let Some(action) = action {
            action();
        }
    }

    /// Returns `true` if the subscription has already been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.called.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A pluggable storage/sync backend.
///
/// Implementations must tolerate `get`/`list` before any `set`, and for a
/// given path the call with the highest `updated_at` must eventually be the
/// one observed by `get`/`list`.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Records `value` at `path` with the backend's own durability semantics.
    ///
    /// Safe to call concurrently for disjoint paths. A version older than the
    /// one already stored is a silent no-op.
    async fn set(&self, path: &Path, value: Versioned) -> Result<()>;

    /// Observes the value at exactly `path`.
    ///
    /// The callback fires once for the current value, if any, and again
    /// whenever the backend observes a new version for the path, whether it
    /// originated in this process or a remote peer.
    fn get(&self, path: &Path, on_change: NotifyFn) -> Unsubscribe;

    /// Observes the direct children of `path`.
    ///
    /// The callback fires once per currently known child and again whenever a
    /// child's version changes, with the child's own path in the update.
    fn list(&self, path: &Path, on_child_change: NotifyFn) -> Unsubscribe;
}
