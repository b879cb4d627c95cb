//! Typed binding tests: serializing structs through put_json and mirroring
//! subscriptions into watch channels.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::helpers::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
    age: u32,
}

#[tokio::test]
async fn struct_round_trips_through_decomposition() {
    let (tree, _) = fixed_tree();
    let ada = Profile {
        name: "ada".to_string(),
        age: 36,
    };
    tree.node("users/ada").put_json(&ada).await.unwrap();

    // The struct decomposed into per-field paths; the watch reassembles it.
    // Partial aggregates seen while children enumerate fail to deserialize
    // and are skipped, so the channel lands on the complete struct.
    let (rx, unsub) = tree.node("users/ada").watch::<Profile>();
    assert_eq!(*rx.borrow(), Some(ada));
    unsub.call();
}

#[tokio::test]
async fn watch_follows_field_level_updates() {
    let (tree, _) = fixed_tree();
    tree.node("users/ada")
        .put_json(&Profile {
            name: "ada".to_string(),
            age: 36,
        })
        .await
        .unwrap();

    let (rx, unsub) = tree.node("users/ada").watch::<Profile>();

    tree.node("users/ada/age").put(json!(37)).await.unwrap();
    assert_eq!(rx.borrow().as_ref().unwrap().age, 37);
    assert_eq!(rx.borrow().as_ref().unwrap().name, "ada");

    unsub.call();
}

#[tokio::test]
async fn typed_field_watch_sees_sibling_independent_updates() {
    let (tree, _) = fixed_tree();
    tree.node("config").put(json!({"limit": 10, "label": "x"})).await.unwrap();

    let (rx, unsub) = tree.node("config/limit").watch::<u32>();
    assert_eq!(*rx.borrow(), Some(10));

    // A sibling write leaves this leaf's channel untouched.
    tree.node("config/label").put(json!("y")).await.unwrap();
    assert_eq!(*rx.borrow(), Some(10));

    tree.node("config/limit").put(json!(20)).await.unwrap();
    assert_eq!(*rx.borrow(), Some(20));

    unsub.call();
}
