//! Behavior every document store must share, run against each backend

use std::sync::Arc;

use futures::StreamExt;
use serde_json::{json, Value};
use syncnote_protocol::{Document, DocumentPath};
use syncnote_store::{DocumentStore, JsonFileStore, MemoryStore};
use tempfile::TempDir;

fn fields(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

async fn backends() -> (TempDir, Vec<(&'static str, Arc<dyn DocumentStore>)>) {
    let dir = tempfile::tempdir().unwrap();
    let file = JsonFileStore::open(dir.path().join("documents.json")).await.unwrap();
    let backends: Vec<(&'static str, Arc<dyn DocumentStore>)> = vec![
        ("memory", Arc::new(MemoryStore::new())),
        ("json-file", Arc::new(file)),
    ];
    (dir, backends)
}

#[tokio::test]
async fn subscribers_see_writes_in_order() {
    let (_dir, backends) = backends().await;
    for (name, store) in backends {
        let path = DocumentPath::new("texts/u1-notes");
        let mut sub = store.subscribe(&path);

        for text in ["one", "two", "three"] {
            store.set_merge(&path, fields(json!({ "content": text }))).await.unwrap();
        }

        let seen: Vec<Value> = sub
            .by_ref()
            .take(4)
            .map(|event| {
                event
                    .unwrap()
                    .document
                    .map_or(Value::Null, |doc| doc["content"].clone())
            })
            .collect()
            .await;
        assert_eq!(seen, [Value::Null, json!("one"), json!("two"), json!("three")], "{name}");
    }
}

#[tokio::test]
async fn merge_keeps_unrelated_fields() {
    let (_dir, backends) = backends().await;
    for (name, store) in backends {
        let path = DocumentPath::new("users/u1");
        store
            .set_merge(&path, fields(json!({ "name": "Ada", "prefs": { "theme": "dark", "font": 12 } })))
            .await
            .unwrap();
        store
            .set_merge(&path, fields(json!({ "prefs": { "font": 14 }, "tags": ["a"] })))
            .await
            .unwrap();
        store
            .set_merge(&path, fields(json!({ "tags": [] })))
            .await
            .unwrap();

        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(
            Value::Object(doc),
            json!({ "name": "Ada", "prefs": { "theme": "dark", "font": 14 }, "tags": [] }),
            "{name}"
        );
    }
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let (_dir, backends) = backends().await;
    for (name, store) in backends {
        let path = DocumentPath::new("media/u1-media");
        let mut sub = store.subscribe(&path);
        let unsubscriber = sub.unsubscriber();
        assert!(sub.next().await.is_some(), "{name}");

        unsubscriber.unsubscribe();
        store.set_merge(&path, fields(json!({ "items": ["x"] }))).await.unwrap();
        assert!(sub.next().await.is_none(), "{name}");
    }
}

#[tokio::test]
async fn documents_are_independent() {
    let (_dir, backends) = backends().await;
    for (name, store) in backends {
        let notes = DocumentPath::new("texts/u1-notes");
        let other = DocumentPath::new("texts/u2-notes");
        let mut sub = store.subscribe(&other);
        let _initial = sub.next().await;

        store.set_merge(&notes, fields(json!({ "content": "mine" }))).await.unwrap();
        store.set_merge(&other, fields(json!({ "content": "theirs" }))).await.unwrap();

        let event = sub.next().await.unwrap().unwrap();
        assert_eq!(event.document.unwrap()["content"], json!("theirs"), "{name}");
        assert!(store.exists(&notes).await.unwrap());
    }
}
