//! The node engine: path resolution, the put/merge write path, and the four
//! subscription primitives.
//!
//! A [`Tree`] is the root handle of a store. It owns the shared adapter list,
//! the clock used to stamp writes, and a path-keyed arena of node state, so
//! every [`Node`] handle for the same path observes the same subscription
//! tables. `Node` itself is a cheap, cloneable handle: a path plus a
//! reference to that shared state. Parent linkage is computed from the path,
//! never held as an owning reference.
//!
//! # Write path
//!
//! [`Node::put`] classifies the value. A non-empty plain object is
//! *decomposed*: each entry is written to the corresponding child node in
//! parallel, after which the node itself persists the directory marker. A
//! true leaf value clears the node's child cache, notifies in-process value
//! subscribers synchronously, fans the versioned value out to every adapter,
//! and then propagates a directory marker up the ancestor chain so subtree
//! subscribers anywhere above observe the change.
//!
//! # Merge rule
//!
//! Notifications from all adapters funnel through per-subscription staleness
//! state: only a strictly newer `updated_at` is delivered; everything else is
//! dropped. Conflicts are resolved purely by this comparison, never by
//! arrival order (last-write-wins, not last-call-wins).

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use crate::Result;
use crate::adapter::{Adapter, Guard, Memory, NotifyFn, Unsubscribe, Update};
use crate::clock::{Clock, SystemClock};
use crate::path::{Path, PathBuf};
use crate::value::{self, Kind, Timestamp, Value, Versioned, classify};

mod errors;

pub use errors::NodeError;

type SubId = u64;

/// Options accepted by the `_with` forms of the subscription primitives.
#[derive(Clone)]
pub struct SubscribeOptions {
    /// Deliver one explicit "no value" notification when the store has
    /// nothing for the path yet. Off by default.
    pub deliver_absent: bool,
    /// How many levels of nested directories to auto-expand into aggregated
    /// views before a directory is delivered as an opaque marker.
    pub recursion: u32,
    /// Optional shape guard applied to present values before delivery.
    pub guard: Option<Guard>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            deliver_absent: false,
            recursion: 1,
            guard: None,
        }
    }
}

impl SubscribeOptions {
    /// Options with a specific recursion budget.
    pub fn recursive(recursion: u32) -> Self {
        Self {
            recursion,
            ..Self::default()
        }
    }
}

struct ValueSub {
    callback: NotifyFn,
    deliver_absent: bool,
    recursion: u32,
    guard: Option<Guard>,
    /// Newest accepted version; anything at or below is stale.
    latest: Option<Timestamp>,
    absent_delivered: bool,
    /// Aggregated subtree view opened when a directory arrives with budget
    /// left. `nested_started` guards against opening it twice.
    nested: Option<Unsubscribe>,
    nested_started: bool,
    adapter_subs: Vec<Unsubscribe>,
    unsubscribe: Unsubscribe,
}

struct ChildSub {
    callback: NotifyFn,
    recursion: u32,
    guard: Option<Guard>,
    /// Newest accepted version per child segment.
    latest: HashMap<String, Timestamp>,
    /// Aggregated views per child segment, memoized so repeated directory
    /// notifications for the same child do not stack subscriptions.
    nested: HashMap<String, Unsubscribe>,
    nested_started: HashSet<String>,
    adapter_subs: Vec<Unsubscribe>,
    unsubscribe: Unsubscribe,
}

#[derive(Default)]
struct SubTables {
    value: HashMap<SubId, ValueSub>,
    children: HashMap<SubId, ChildSub>,
}

/// Per-path state shared by every handle addressing that path.
#[derive(Default)]
struct NodeState {
    next_sub_id: AtomicU64,
    subs: Mutex<SubTables>,
    /// Cached immediate child segments. Cleared when the node becomes a leaf.
    children: Mutex<BTreeSet<String>>,
}

struct TreeShared {
    adapters: Vec<Arc<dyn Adapter>>,
    clock: Arc<dyn Clock>,
    nodes: Mutex<HashMap<PathBuf, Arc<NodeState>>>,
}

impl TreeShared {
    fn state(&self, path: &Path) -> Arc<NodeState> {
        let mut nodes = self.nodes.lock().unwrap();
        if let Some(state) = nodes.get(path) {
            return state.clone();
        }
        nodes.entry(path.to_path_buf()).or_default().clone()
    }
}

/// The root handle of a store.
///
/// Holds the ordered adapter list shared (read-only) by all nodes, the clock
/// that stamps writes, and the node arena. Dropping the `Tree` and all `Node`
/// handles drops every subscription table with it.
#[derive(Clone)]
pub struct Tree {
    shared: Arc<TreeShared>,
}

impl Tree {
    /// Creates a tree fanning out to the given adapters, stamped by the
    /// system clock.
    pub fn new(adapters: Vec<Arc<dyn Adapter>>) -> Self {
        Self::with_clock(adapters, Arc::new(SystemClock))
    }

    /// Creates a tree with an explicit clock for default write timestamps.
    pub fn with_clock(adapters: Vec<Arc<dyn Adapter>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(TreeShared {
                adapters,
                clock,
                nodes: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the root node.
    pub fn root(&self) -> Node {
        Node {
            path: PathBuf::root(),
            shared: self.shared.clone(),
        }
    }

    /// Resolves a node handle for `path`, lazily creating intermediate nodes.
    pub fn node(&self, path: impl AsRef<str>) -> Node {
        self.root().get(path)
    }
}

impl Default for Tree {
    /// A tree backed by a single in-memory adapter.
    fn default() -> Self {
        Self::new(vec![Arc::new(Memory::new())])
    }
}

/// A path-addressable handle into a [`Tree`].
#[derive(Clone)]
pub struct Node {
    path: PathBuf,
    shared: Arc<TreeShared>,
}

impl Node {
    /// The path this node addresses.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves a descendant handle, creating intermediate node state and
    /// registering each segment in its parent's child cache.
    ///
    /// `path` may span several segments ("a/b/c").
    pub fn get(&self, path: impl AsRef<str>) -> Node {
        let mut current = self.path.clone();
        for segment in PathBuf::normalize(path.as_ref()).segments() {
            self.shared
                .state(&current)
                .children
                .lock()
                .unwrap()
                .insert(segment.to_string());
            current = current.push(segment);
            self.shared.state(&current);
        }
        Node {
            path: current,
            shared: self.shared.clone(),
        }
    }

    /// The parent handle, or `None` for the root.
    pub fn parent(&self) -> Option<Node> {
        self.path.parent().map(|path| Node {
            path,
            shared: self.shared.clone(),
        })
    }

    /// Currently cached immediate child segments.
    pub fn children(&self) -> Vec<String> {
        self.state().children.lock().unwrap().iter().cloned().collect()
    }

    fn state(&self) -> Arc<NodeState> {
        self.shared.state(&self.path)
    }

    /// Writes a value at this path, stamped with the tree clock's current
    /// time.
    pub async fn put(&self, value: impl Into<Value>) -> Result<()> {
        let updated_at = self.shared.clock.now_millis();
        self.put_at(value.into(), updated_at, None).await
    }

    /// Writes a value with an explicit logical timestamp and optional expiry.
    ///
    /// A non-empty plain object is decomposed into one child write per key,
    /// all carrying the same `updated_at`; the node itself then becomes a
    /// directory of those children. Any other value is stored verbatim as a
    /// leaf. After the local write settles, a directory marker with the same
    /// timestamp is propagated to every ancestor.
    ///
    /// If any adapter rejects the write the first failure is returned after
    /// all adapters have settled; partial writes are not rolled back.
    pub async fn put_at(
        &self,
        value: Value,
        updated_at: Timestamp,
        expires_at: Option<Timestamp>,
    ) -> Result<()> {
        self.write(value, updated_at, expires_at, Propagation::Ancestors)
            .await
    }

    fn write(
        &self,
        value: Value,
        updated_at: Timestamp,
        expires_at: Option<Timestamp>,
        propagation: Propagation,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            if value::is_decomposable(&value) {
                let Value::Object(fields) = value else {
                    unreachable!("is_decomposable only accepts objects")
                };
                debug!(path = %self.path, keys = fields.len(), "decomposing object write");

                let mut writes = JoinSet::new();
                for (key, child_value) in fields {
                    let child = self.get(&key);
                    writes.spawn(async move {
                        // Decomposition children notify this node's child
                        // subscribers individually but leave the single
                        // directory write and ancestor propagation to the
                        // decomposed node itself.
                        child
                            .write(
                                child_value,
                                updated_at,
                                expires_at,
                                Propagation::NotifyParent,
                            )
                            .await
                    });
                }
                join_writes(&self.path, writes).await?;

                // All children written; this node is now a directory of them.
                return self
                    .write(value::directory(), updated_at, expires_at, propagation)
                    .await;
            }

            if classify(&value) == Kind::Leaf {
                // Leaf mode: whatever children existed are gone.
                self.state().children.lock().unwrap().clear();
            }

            // In-process fast path: local subscribers hear about the write
            // before any adapter round trip completes.
            self.deliver_value(Some(value.clone()), Some(updated_at));

            let versioned = Versioned {
                value: value.clone(),
                updated_at,
                expires_at,
            };
            let mut sets = JoinSet::new();
            for adapter in &self.shared.adapters {
                let adapter = adapter.clone();
                let path = self.path.clone();
                let versioned = versioned.clone();
                sets.spawn(async move { adapter.set(&path, versioned).await });
            }
            join_writes(&self.path, sets).await?;

            if let Some(parent) = self.parent() {
                if let Some(name) = self.path.name() {
                    parent
                        .state()
                        .children
                        .lock()
                        .unwrap()
                        .insert(name.to_string());
                }
                if propagation == Propagation::Ancestors {
                    parent
                        .write(value::directory(), updated_at, None, Propagation::Ancestors)
                        .await?;
                }
                parent.deliver_child(&self.path, Some(value), Some(updated_at));
            }
            Ok(())
        })
    }

    /// Subscribes to this node's own value with default options.
    pub fn on(&self, callback: NotifyFn) -> Unsubscribe {
        self.on_with(SubscribeOptions::default(), callback)
    }

    /// Subscribes to this node's own value.
    ///
    /// Stale notifications (`updated_at` not newer than the last accepted
    /// one) are dropped. When an accepted value is a directory and the
    /// recursion budget allows, an aggregated subtree view is opened instead
    /// of delivering the bare marker; at budget zero the marker is delivered
    /// verbatim. The returned unsubscribe is idempotent and also tears down
    /// adapter and nested subscriptions.
    pub fn on_with(&self, options: SubscribeOptions, callback: NotifyFn) -> Unsubscribe {
        let state = self.state();
        let id = state.next_sub_id.fetch_add(1, Ordering::Relaxed);
        let unsubscribe = {
            let shared = self.shared.clone();
            let path = self.path.clone();
            Unsubscribe::new(move || remove_value_sub(&shared, &path, id))
        };

        state.subs.lock().unwrap().value.insert(
            id,
            ValueSub {
                callback,
                deliver_absent: options.deliver_absent,
                recursion: options.recursion,
                guard: options.guard,
                latest: None,
                absent_delivered: false,
                nested: None,
                nested_started: false,
                adapter_subs: Vec::new(),
                unsubscribe: unsubscribe.clone(),
            },
        );
        debug!(path = %self.path, id, "value subscription registered");

        // Register with every adapter. Initial notifications arrive inline
        // during these calls, so no table lock may be held here.
        let mut adapter_subs = Vec::with_capacity(self.shared.adapters.len());
        for adapter in &self.shared.adapters {
            let node = self.clone();
            let node_state = state.clone();
            let merge: NotifyFn = Arc::new(move |update: Update| {
                process_value_event(&node, &node_state, id, update.value, update.updated_at);
            });
            adapter_subs.push(adapter.get(&self.path, merge));
        }

        // The subscriber may have unsubscribed during an initial inline
        // notification; if so the adapter subscriptions are already orphaned.
        let mut subs = state.subs.lock().unwrap();
        match subs.value.get_mut(&id) {
            Some(sub) => sub.adapter_subs = adapter_subs,
            None => {
                drop(subs);
                for sub in adapter_subs {
                    sub.call();
                }
            }
        }
        unsubscribe
    }

    /// Resolves this node's current value: the first accepted notification.
    ///
    /// Delivers explicit absence, so an empty store resolves to `None`
    /// immediately instead of waiting for a write.
    pub async fn once(&self) -> Option<Versioned> {
        self.once_with(SubscribeOptions {
            deliver_absent: true,
            ..SubscribeOptions::default()
        })
        .await
    }

    /// `once` with explicit options.
    ///
    /// With `deliver_absent` unset this waits until a value is accepted;
    /// callers wanting a bound should wrap it in a timeout. Never resolves
    /// more than once even when multiple adapters race to notify.
    pub async fn once_with(&self, options: SubscribeOptions) -> Option<Versioned> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));

        let callback: NotifyFn = Arc::new(move |update: Update| {
            let Update {
                value,
                updated_at,
                unsubscribe,
                ..
            } = update;
            // First accepted delivery wins, even if adapters race.
            if let Some(tx) = slot.lock().unwrap().take() {
                let result = match (value, updated_at) {
                    (Some(value), Some(updated_at)) => Some(Versioned {
                        value,
                        updated_at,
                        expires_at: None,
                    }),
                    _ => None,
                };
                let _ = tx.send(result);
                unsubscribe.call();
            }
        });

        let unsubscribe = self.on_with(options, callback);
        let result = rx.await.unwrap_or(None);
        unsubscribe.call();
        result
    }

    /// Subscribes to this node's direct children with default options.
    pub fn map(&self, callback: NotifyFn) -> Unsubscribe {
        self.map_with(SubscribeOptions::default(), callback)
    }

    /// Subscribes to this node's direct children.
    ///
    /// The callback fires once per known child and again on every accepted
    /// child change, with the child's own path in the update. Staleness is
    /// tracked independently per child. A directory child with budget left
    /// is expanded into an aggregated view (memoized per child); otherwise
    /// the child's value is delivered directly. A previously seen child that
    /// disappears is delivered as explicit absence.
    pub fn map_with(&self, options: SubscribeOptions, callback: NotifyFn) -> Unsubscribe {
        let state = self.state();
        let id = state.next_sub_id.fetch_add(1, Ordering::Relaxed);
        let unsubscribe = {
            let shared = self.shared.clone();
            let path = self.path.clone();
            Unsubscribe::new(move || remove_child_sub(&shared, &path, id))
        };

        state.subs.lock().unwrap().children.insert(
            id,
            ChildSub {
                callback,
                recursion: options.recursion,
                guard: options.guard,
                latest: HashMap::new(),
                nested: HashMap::new(),
                nested_started: HashSet::new(),
                adapter_subs: Vec::new(),
                unsubscribe: unsubscribe.clone(),
            },
        );
        debug!(path = %self.path, id, "child subscription registered");

        let mut adapter_subs = Vec::with_capacity(self.shared.adapters.len());
        for adapter in &self.shared.adapters {
            let node = self.clone();
            let node_state = state.clone();
            let merge: NotifyFn = Arc::new(move |update: Update| {
                process_child_event(
                    &node,
                    &node_state,
                    id,
                    update.path,
                    update.value,
                    update.updated_at,
                );
            });
            adapter_subs.push(adapter.list(&self.path, merge));
        }

        let mut subs = state.subs.lock().unwrap();
        match subs.children.get_mut(&id) {
            Some(sub) => sub.adapter_subs = adapter_subs,
            None => {
                drop(subs);
                for sub in adapter_subs {
                    sub.call();
                }
            }
        }
        unsubscribe
    }

    /// Subscribes to this subtree as one aggregated value, with default
    /// options.
    pub fn open(&self, callback: NotifyFn) -> Unsubscribe {
        self.open_with(SubscribeOptions::default(), callback)
    }

    /// Subscribes to this subtree as one aggregated value.
    ///
    /// Built on [`map_with`](Node::map_with): maintains one object keyed by
    /// child segment, tracks the maximum `updated_at` across children, and
    /// re-delivers the *entire* aggregate on every accepted child update. A
    /// child that disappears is removed from the aggregate.
    pub fn open_with(&self, options: SubscribeOptions, callback: NotifyFn) -> Unsubscribe {
        struct Aggregate {
            entries: serde_json::Map<String, Value>,
            updated_at: Option<Timestamp>,
        }

        let aggregate = Arc::new(Mutex::new(Aggregate {
            entries: serde_json::Map::new(),
            updated_at: None,
        }));
        let path = self.path.clone();
        let guard = options.guard.clone();

        let merge: NotifyFn = Arc::new(move |update: Update| {
            let Some(segment) = update.path.name() else {
                return;
            };
            let (snapshot, updated_at) = {
                let mut aggregate = aggregate.lock().unwrap();
                match (&update.value, update.updated_at) {
                    (Some(value), stamped) => {
                        aggregate.entries.insert(segment.to_string(), value.clone());
                        if let Some(t) = stamped {
                            aggregate.updated_at = Some(aggregate.updated_at.map_or(t, |m| m.max(t)));
                        }
                    }
                    (None, _) => {
                        if aggregate.entries.remove(segment).is_none() {
                            return;
                        }
                    }
                }
                (Value::Object(aggregate.entries.clone()), aggregate.updated_at)
            };
            dispatch(
                &callback,
                guard.as_ref(),
                Update {
                    value: Some(snapshot),
                    path: path.clone(),
                    updated_at,
                    unsubscribe: update.unsubscribe,
                },
            );
        });

        self.map_with(
            SubscribeOptions {
                deliver_absent: false,
                recursion: options.recursion,
                guard: None,
            },
            merge,
        )
    }

    /// Synchronously notifies this node's value subscribers.
    fn deliver_value(&self, value: Option<Value>, updated_at: Option<Timestamp>) {
        let state = self.state();
        let ids: Vec<SubId> = state.subs.lock().unwrap().value.keys().copied().collect();
        for id in ids {
            process_value_event(self, &state, id, value.clone(), updated_at);
        }
    }

    /// Synchronously notifies this node's child subscribers about `child_path`.
    fn deliver_child(
        &self,
        child_path: &Path,
        value: Option<Value>,
        updated_at: Option<Timestamp>,
    ) {
        let state = self.state();
        let ids: Vec<SubId> = state.subs.lock().unwrap().children.keys().copied().collect();
        for id in ids {
            process_child_event(
                self,
                &state,
                id,
                child_path.to_path_buf(),
                value.clone(),
                updated_at,
            );
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Propagation {
    /// Full ancestor propagation: put the directory marker on the parent and
    /// notify its child subscribers.
    Ancestors,
    /// Decomposition children only notify the parent's child subscribers;
    /// the decomposed node writes its own marker exactly once.
    NotifyParent,
}

async fn join_writes(path: &Path, mut writes: JoinSet<Result<()>>) -> Result<()> {
    let mut first_err = None;
    while let Some(joined) = writes.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                first_err.get_or_insert(e);
            }
            Err(e) => {
                first_err.get_or_insert(
                    NodeError::WriteTaskFailed {
                        path: path.as_str().to_string(),
                        reason: e.to_string(),
                    }
                    .into(),
                );
            }
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// What to do with a notification, decided under the subscription table lock
/// but executed after it is released.
enum Action {
    Drop,
    Deliver {
        callback: NotifyFn,
        guard: Option<Guard>,
        unsubscribe: Unsubscribe,
        /// A nested aggregate superseded by this delivery.
        cancel_nested: Option<Unsubscribe>,
    },
    Expand {
        callback: NotifyFn,
        budget: u32,
        guard: Option<Guard>,
        unsubscribe: Unsubscribe,
    },
}

fn process_value_event(
    node: &Node,
    state: &Arc<NodeState>,
    id: SubId,
    value: Option<Value>,
    updated_at: Option<Timestamp>,
) {
    let action = {
        let mut subs = state.subs.lock().unwrap();
        let Some(sub) = subs.value.get_mut(&id) else {
            return;
        };
        match (&value, updated_at) {
            (None, _) => {
                if sub.deliver_absent && sub.latest.is_none() && !sub.absent_delivered {
                    sub.absent_delivered = true;
                    Action::Deliver {
                        callback: sub.callback.clone(),
                        guard: sub.guard.clone(),
                        unsubscribe: sub.unsubscribe.clone(),
                        cancel_nested: None,
                    }
                } else {
                    Action::Drop
                }
            }
            (Some(incoming), Some(t)) => {
                if sub.latest.is_some_and(|latest| t <= latest) {
                    trace!(path = %node.path, id, updated_at = t, "stale value notification dropped");
                    Action::Drop
                } else {
                    sub.latest = Some(t);
                    if classify(incoming) == Kind::Directory && sub.recursion > 0 {
                        if sub.nested_started {
                            Action::Drop
                        } else {
                            sub.nested_started = true;
                            Action::Expand {
                                callback: sub.callback.clone(),
                                budget: sub.recursion - 1,
                                guard: sub.guard.clone(),
                                unsubscribe: sub.unsubscribe.clone(),
                            }
                        }
                    } else {
                        // A leaf supersedes any aggregated view.
                        let cancel_nested = sub.nested.take();
                        sub.nested_started = false;
                        Action::Deliver {
                            callback: sub.callback.clone(),
                            guard: sub.guard.clone(),
                            unsubscribe: sub.unsubscribe.clone(),
                            cancel_nested,
                        }
                    }
                }
            }
            // A present value without a version cannot participate in the
            // last-write-wins comparison.
            (Some(_), None) => Action::Drop,
        }
    };

    match action {
        Action::Drop => {}
        Action::Deliver {
            callback,
            guard,
            unsubscribe,
            cancel_nested,
        } => {
            if let Some(nested) = cancel_nested {
                nested.call();
            }
            dispatch(
                &callback,
                guard.as_ref(),
                Update {
                    value,
                    path: node.path.clone(),
                    updated_at,
                    unsubscribe,
                },
            );
        }
        Action::Expand {
            callback,
            budget,
            guard,
            unsubscribe,
        } => {
            // Aggregate the children instead of delivering the bare marker.
            let forward_unsub = unsubscribe.clone();
            let forward: NotifyFn = Arc::new(move |mut update: Update| {
                update.unsubscribe = forward_unsub.clone();
                dispatch(&callback, guard.as_ref(), update);
            });
            let nested = node.open_with(SubscribeOptions::recursive(budget), forward);

            let mut subs = state.subs.lock().unwrap();
            match subs.value.get_mut(&id) {
                Some(sub) => sub.nested = Some(nested),
                None => {
                    // Unsubscribed while the aggregate was being opened.
                    drop(subs);
                    nested.call();
                }
            }
        }
    }
}

fn process_child_event(
    node: &Node,
    state: &Arc<NodeState>,
    id: SubId,
    child_path: PathBuf,
    value: Option<Value>,
    updated_at: Option<Timestamp>,
) {
    let Some(segment) = child_path.name().map(str::to_string) else {
        return;
    };

    // Keep the child cache in sync with what adapters report.
    {
        let mut children = state.children.lock().unwrap();
        if value.is_some() {
            children.insert(segment.clone());
        } else {
            children.remove(&segment);
        }
    }

    let action = {
        let mut subs = state.subs.lock().unwrap();
        let Some(sub) = subs.children.get_mut(&id) else {
            return;
        };
        match (&value, updated_at) {
            (None, _) => {
                if sub.latest.remove(&segment).is_some() {
                    // A previously visible child disappeared.
                    sub.nested_started.remove(&segment);
                    let cancel_nested = sub.nested.remove(&segment);
                    Action::Deliver {
                        callback: sub.callback.clone(),
                        guard: sub.guard.clone(),
                        unsubscribe: sub.unsubscribe.clone(),
                        cancel_nested,
                    }
                } else {
                    Action::Drop
                }
            }
            (Some(incoming), Some(t)) => {
                if sub.latest.get(&segment).is_some_and(|latest| t <= *latest) {
                    trace!(
                        path = %node.path, id, child = %segment, updated_at = t,
                        "stale child notification dropped"
                    );
                    Action::Drop
                } else {
                    sub.latest.insert(segment.clone(), t);
                    if classify(incoming) == Kind::Directory && sub.recursion > 0 {
                        if sub.nested_started.contains(&segment) {
                            Action::Drop
                        } else {
                            sub.nested_started.insert(segment.clone());
                            Action::Expand {
                                callback: sub.callback.clone(),
                                budget: sub.recursion - 1,
                                guard: sub.guard.clone(),
                                unsubscribe: sub.unsubscribe.clone(),
                            }
                        }
                    } else {
                        let cancel_nested = sub.nested.remove(&segment);
                        sub.nested_started.remove(&segment);
                        Action::Deliver {
                            callback: sub.callback.clone(),
                            guard: sub.guard.clone(),
                            unsubscribe: sub.unsubscribe.clone(),
                            cancel_nested,
                        }
                    }
                }
            }
            (Some(_), None) => Action::Drop,
        }
    };

    match action {
        Action::Drop => {}
        Action::Deliver {
            callback,
            guard,
            unsubscribe,
            cancel_nested,
        } => {
            if let Some(nested) = cancel_nested {
                nested.call();
            }
            dispatch(
                &callback,
                guard.as_ref(),
                Update {
                    value,
                    path: child_path,
                    updated_at,
                    unsubscribe,
                },
            );
        }
        Action::Expand {
            callback,
            budget,
            guard,
            unsubscribe,
        } => {
            let child = Node {
                path: child_path.clone(),
                shared: node.shared.clone(),
            };
            let forward_unsub = unsubscribe.clone();
            let forward: NotifyFn = Arc::new(move |mut update: Update| {
                update.unsubscribe = forward_unsub.clone();
                dispatch(&callback, guard.as_ref(), update);
            });
            let nested = child.open_with(SubscribeOptions::recursive(budget), forward);

            let mut subs = state.subs.lock().unwrap();
            match subs.children.get_mut(&id) {
                Some(sub) if sub.nested_started.contains(&segment) => {
                    sub.nested.insert(segment, nested);
                }
                _ => {
                    drop(subs);
                    nested.call();
                }
            }
        }
    }
}

/// Applies the guard and invokes the callback, isolating panics so one
/// failing subscriber cannot prevent others from being notified.
fn dispatch(callback: &NotifyFn, guard: Option<&Guard>, mut update: Update) {
    if let Some(guard) = guard
        && let Some(value) = update.value.take()
    {
        match guard(value) {
            Some(value) => update.value = Some(value),
            None => {
                trace!(path = %update.path, "guard rejected value");
                return;
            }
        }
    }
    let path = update.path.clone();
    if catch_unwind(AssertUnwindSafe(|| callback(update))).is_err() {
        warn!(%path, "subscriber callback panicked; panic isolated");
    }
}

fn remove_value_sub(shared: &Arc<TreeShared>, path: &Path, id: SubId) {
    let state = shared.state(path);
    let removed = state.subs.lock().unwrap().value.remove(&id);
    if let Some(sub) = removed {
        for adapter_sub in sub.adapter_subs {
            adapter_sub.call();
        }
        if let Some(nested) = sub.nested {
            nested.call();
        }
        debug!(%path, id, "value subscription removed");
    }
}

fn remove_child_sub(shared: &Arc<TreeShared>, path: &Path, id: SubId) {
    let state = shared.state(path);
    let removed = state.subs.lock().unwrap().children.remove(&id);
    if let Some(sub) = removed {
        for adapter_sub in sub.adapter_subs {
            adapter_sub.call();
        }
        for (_, nested) in sub.nested {
            nested.call();
        }
        debug!(%path, id, "child subscription removed");
    }
}
