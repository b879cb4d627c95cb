//! Typed bindings over the raw JSON surface.
//!
//! Two conveniences for callers working with concrete Rust types instead of
//! raw [`Value`]s: [`Node::put_json`] serializes any `Serialize` type before
//! writing, and [`Node::watch`] turns a value subscription into a
//! [`tokio::sync::watch`] channel of deserialized values, which plays well
//! with `select!` loops and UI state.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

use crate::Result;
use crate::adapter::{NotifyFn, Unsubscribe, Update};
use crate::node::{Node, SubscribeOptions};

impl Node {
    /// Serializes `value` and writes it at this path.
    ///
    /// A struct serializing to a non-empty object decomposes into children
    /// exactly like a raw object write would.
    pub async fn put_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.put(value).await
    }

    /// Subscribes with default options and mirrors every accepted value into
    /// a [`watch`] channel as `Some(T)`, or `None` for absence.
    pub fn watch<T>(&self) -> (watch::Receiver<Option<T>>, Unsubscribe)
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.watch_with(SubscribeOptions::default())
    }

    /// Like [`watch`](Node::watch) but with a caller-supplied initial value,
    /// so the channel always holds a usable `T`.
    ///
    /// The channel keeps `initial` until a value deserializes successfully;
    /// absence and undeserializable values leave it untouched.
    pub fn watch_or<T>(
        &self,
        initial: T,
        options: SubscribeOptions,
    ) -> (watch::Receiver<T>, Unsubscribe)
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let (tx, rx) = watch::channel(initial);
        let callback: NotifyFn = Arc::new(move |update: Update| {
            let Update { value, path, .. } = update;
            if let Some(value) = value {
                match serde_json::from_value::<T>(value) {
                    Ok(typed) => {
                        tx.send_replace(typed);
                    }
                    Err(e) => {
                        warn!(%path, error = %e, "watched value failed to deserialize; skipped");
                    }
                }
            }
        });
        let unsubscribe = self.on_with(options, callback);
        (rx, unsubscribe)
    }

    /// [`watch`](Node::watch) with explicit subscription options.
    ///
    /// Values that fail to deserialize as `T` are skipped with a warning;
    /// the channel keeps its previous state. Dropping the receiver does not
    /// tear down the subscription, call the returned unsubscribe for that.
    pub fn watch_with<T>(&self, options: SubscribeOptions) -> (watch::Receiver<Option<T>>, Unsubscribe)
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let callback: NotifyFn = Arc::new(move |update: Update| {
            let Update { value, path, .. } = update;
            match value {
                Some(value) => match serde_json::from_value::<T>(value) {
                    Ok(typed) => {
                        tx.send_replace(Some(typed));
                    }
                    Err(e) => {
                        warn!(%path, error = %e, "watched value failed to deserialize; skipped");
                    }
                },
                None => {
                    tx.send_replace(None);
                }
            }
        });
        let unsubscribe = self.on_with(options, callback);
        (rx, unsubscribe)
    }
}
