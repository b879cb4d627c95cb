//! Engine tests: the put algorithm, decomposition, last-write-wins merging,
//! and the four subscription primitives.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use canopy::{SubscribeOptions, Value};
use serde_json::json;

use crate::helpers::*;

#[tokio::test]
async fn put_then_once_round_trips_a_leaf() {
    let (tree, _) = fixed_tree();
    tree.node("users/ada/name").put(json!("ada")).await.unwrap();

    let stored = tree.node("users/ada/name").once().await.unwrap();
    assert_eq!(stored.value, json!("ada"));
    assert_eq!(stored.updated_at, 1000);
}

#[tokio::test]
async fn once_resolves_absent_immediately() {
    let (tree, _) = fixed_tree();
    assert!(tree.node("nothing/here").once().await.is_none());
}

#[tokio::test]
async fn older_and_equal_versions_are_ignored() {
    let (tree, _) = fixed_tree();
    let node = tree.node("a");

    let (callback, log) = recorder();
    node.on(callback);

    node.put_at(json!(5), 100, None).await.unwrap();
    assert_eq!(delivered_count(&log), 1);

    // Replaying the same version is a no-op, not a duplicate delivery.
    node.put_at(json!(5), 100, None).await.unwrap();
    assert_eq!(delivered_count(&log), 1);

    // An older version loses even though it arrives later.
    node.put_at(json!(6), 50, None).await.unwrap();
    assert_eq!(delivered_count(&log), 1);
    assert_eq!(node.once().await.unwrap().value, json!(5));

    node.put_at(json!(7), 200, None).await.unwrap();
    assert_eq!(delivered_count(&log), 2);
    assert_eq!(last(&log).value, Some(json!(7)));
}

#[tokio::test]
async fn object_put_decomposes_into_children() {
    let (tree, _) = fixed_tree();
    tree.node("docs/1").put(json!({"a": 1, "b": 2})).await.unwrap();

    // Each field is individually addressable with the write's timestamp.
    let a = tree.node("docs/1/a").once().await.unwrap();
    assert_eq!(a.value, json!(1));
    assert_eq!(a.updated_at, 1000);
    assert_eq!(tree.node("docs/1/b").once().await.unwrap().value, json!(2));

    assert_eq!(
        tree.node("docs/1").children(),
        vec!["a".to_string(), "b".to_string()]
    );

    // The aggregate view reassembles the original object.
    let (callback, log) = recorder();
    tree.node("docs/1").open(callback);
    assert_eq!(last(&log).value, Some(json!({"a": 1, "b": 2})));
}

#[tokio::test]
async fn nested_objects_decompose_recursively() {
    let (tree, _) = fixed_tree();
    tree.node("cfg")
        .put(json!({"net": {"host": "localhost", "port": 8080}, "debug": true}))
        .await
        .unwrap();

    assert_eq!(
        tree.node("cfg/net/port").once().await.unwrap().value,
        json!(8080)
    );
    assert_eq!(tree.node("cfg/debug").once().await.unwrap().value, json!(true));

    // recursion=2 reassembles the nested level too
    let (callback, log) = recorder();
    tree.node("cfg")
        .open_with(SubscribeOptions::recursive(2), callback);
    assert_eq!(
        last(&log).value,
        Some(json!({"net": {"host": "localhost", "port": 8080}, "debug": true}))
    );
}

#[tokio::test]
async fn leaf_overwrite_supersedes_children() {
    let (tree, _) = fixed_tree();
    let node = tree.node("docs/1");

    node.put(json!({"a": 1, "b": 2})).await.unwrap();
    assert_eq!(node.children().len(), 2);

    node.put(json!("flattened")).await.unwrap();
    assert!(node.children().is_empty());
    assert_eq!(node.once().await.unwrap().value, json!("flattened"));

    // The stale children are gone, not orphaned.
    assert!(tree.node("docs/1/a").once().await.is_none());
    assert!(tree.node("docs/1/b").once().await.is_none());
}

#[tokio::test]
async fn partial_update_merges_into_existing_object() {
    let (tree, _) = fixed_tree();
    tree.node("docs/1")
        .put_at(json!({"x": 0, "y": 0, "data": "hello"}), 100, None)
        .await
        .unwrap();
    tree.node("docs/1/x").put_at(json!(5), 200, None).await.unwrap();

    // Only x changed; the siblings written at t=100 survive.
    let (callback, log) = recorder();
    tree.node("docs/1").open(callback);
    let update = last(&log);
    assert_eq!(update.value, Some(json!({"x": 5, "y": 0, "data": "hello"})));
    assert_eq!(update.updated_at, Some(200));
}

#[tokio::test]
async fn subtree_subscriber_sees_deep_writes() {
    let (tree, _) = fixed_tree();

    let (callback, log) = recorder();
    tree.node("a")
        .on_with(SubscribeOptions::recursive(2), callback);
    assert_eq!(delivered_count(&log), 0);

    tree.node("a/b/c").put(json!(5)).await.unwrap();

    let update = last(&log);
    assert_eq!(update.path.as_str(), "a");
    assert_eq!(update.value, Some(json!({"b": {"c": 5}})));
}

#[tokio::test]
async fn directory_marker_is_delivered_verbatim_at_recursion_zero() {
    let (tree, _) = fixed_tree();
    tree.node("docs/1").put(json!({"a": 1})).await.unwrap();

    let (callback, log) = recorder();
    tree.node("docs/1")
        .on_with(SubscribeOptions::recursive(0), callback);
    assert_eq!(last(&log).value, Some(json!({})));
}

#[tokio::test]
async fn unsubscribe_is_idempotent_and_silences_delivery() {
    let (tree, _) = fixed_tree();
    let node = tree.node("a");

    let (callback, log) = recorder();
    let unsub = node.on(callback);

    node.put(json!(1)).await.unwrap();
    assert_eq!(delivered_count(&log), 1);

    unsub.call();
    unsub.call();
    unsub.clone().call();

    node.put(json!(2)).await.unwrap();
    assert_eq!(delivered_count(&log), 1);
}

#[tokio::test]
async fn unsubscribe_from_inside_the_callback() {
    let (tree, _) = fixed_tree();
    let node = tree.node("a");

    let count = Arc::new(AtomicU32::new(0));
    let counted = count.clone();
    node.on(Arc::new(move |update| {
        counted.fetch_add(1, Ordering::SeqCst);
        update.unsubscribe.call();
    }));

    node.put(json!(1)).await.unwrap();
    node.put(json!(2)).await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn once_never_resolves_twice() {
    let (tree, _) = fixed_tree();
    let node = tree.node("a");
    node.put(json!("first")).await.unwrap();

    let resolved = node.once().await.unwrap();
    assert_eq!(resolved.value, json!("first"));

    // Later writes are irrelevant to an already-resolved once.
    node.put(json!("second")).await.unwrap();
    assert_eq!(resolved.value, json!("first"));
}

#[tokio::test]
async fn map_delivers_each_child_with_its_own_path() {
    let (tree, _) = fixed_tree();

    let (callback, log) = recorder();
    tree.node("users").map(callback);
    assert_eq!(delivered_count(&log), 0);

    tree.node("users/ada").put(json!("a")).await.unwrap();
    tree.node("users/bob").put(json!("b")).await.unwrap();

    let entries = log.lock().unwrap().clone();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].path.as_str(), "users/ada");
    assert_eq!(entries[0].value, Some(json!("a")));
    assert_eq!(entries[1].path.as_str(), "users/bob");

    // A newer version of an existing child is delivered again.
    tree.node("users/ada").put(json!("a2")).await.unwrap();
    assert_eq!(delivered_count(&log), 3);
    assert_eq!(last(&log).value, Some(json!("a2")));
}

#[tokio::test]
async fn map_enumerates_existing_children_on_subscribe() {
    let (tree, _) = fixed_tree();
    tree.node("users").put(json!({"ada": 1, "bob": 2})).await.unwrap();

    let (callback, log) = recorder();
    tree.node("users").map(callback);
    assert_eq!(delivered_count(&log), 2);
}

#[tokio::test]
async fn map_reports_absence_when_children_are_purged() {
    let (tree, _) = fixed_tree();
    tree.node("users").put(json!({"ada": 1, "bob": 2})).await.unwrap();

    let (callback, log) = recorder();
    tree.node("users").map(callback);
    assert_eq!(delivered_count(&log), 2);

    // Writing a leaf over the directory purges both children.
    tree.node("users").put(json!("wiped")).await.unwrap();
    let entries = log.lock().unwrap().clone();
    assert_eq!(entries.len(), 4);
    assert!(entries[2].value.is_none());
    assert!(entries[3].value.is_none());
}

#[tokio::test]
async fn open_removes_vanished_children_from_the_aggregate() {
    let (tree, _) = fixed_tree();
    tree.node("users").put(json!({"ada": 1, "bob": 2})).await.unwrap();

    let (callback, log) = recorder();
    tree.node("users").open(callback);
    assert_eq!(last(&log).value, Some(json!({"ada": 1, "bob": 2})));

    tree.node("users").put(json!("wiped")).await.unwrap();
    assert_eq!(last(&log).value, Some(json!({})));
}

#[tokio::test]
async fn guard_coerces_and_rejects_values() {
    let (tree, _) = fixed_tree();
    let node = tree.node("a");

    // Accept numbers only, doubling them on the way through.
    let guard: canopy::Guard = Arc::new(|value: Value| {
        value.as_u64().map(|n| json!(n * 2))
    });
    let (callback, log) = recorder();
    node.on_with(
        SubscribeOptions {
            guard: Some(guard),
            ..SubscribeOptions::default()
        },
        callback,
    );

    node.put_at(json!(5), 100, None).await.unwrap();
    assert_eq!(last(&log).value, Some(json!(10)));

    // The rejected write is dropped but still counts as observed, so an
    // older version cannot sneak in behind it.
    node.put_at(json!("rejected"), 200, None).await.unwrap();
    assert_eq!(delivered_count(&log), 1);
    node.put_at(json!(9), 150, None).await.unwrap();
    assert_eq!(delivered_count(&log), 1);

    node.put_at(json!(9), 300, None).await.unwrap();
    assert_eq!(last(&log).value, Some(json!(18)));
}

#[tokio::test]
async fn sibling_paths_do_not_interfere() {
    let (tree, _) = fixed_tree();

    // "docs2" is not under "docs"; a leaf overwrite of one must not purge
    // the other.
    tree.node("docs/a").put(json!(1)).await.unwrap();
    tree.node("docs2/b").put(json!(2)).await.unwrap();
    tree.node("docs").put(json!("leaf")).await.unwrap();

    assert!(tree.node("docs/a").once().await.is_none());
    assert_eq!(tree.node("docs2/b").once().await.unwrap().value, json!(2));
}

#[tokio::test]
async fn root_subscription_observes_top_level_children() {
    let (tree, _) = fixed_tree();

    let (callback, log) = recorder();
    tree.root().map(callback);

    tree.node("alpha").put(json!(1)).await.unwrap();
    assert_eq!(last(&log).path.as_str(), "alpha");
}
