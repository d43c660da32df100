use super::*;

use tempfile::TempDir;

async fn open_in(dir: &TempDir) -> BackfillStateStore {
    BackfillStateStore::open(dir.path().join("backfill_state.json"))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_empty_store() {
    let dir = TempDir::new().unwrap();
    let store = open_in(&dir).await;
    assert_eq!(store.last_message_id("c").await, None);
    assert!(store.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_update_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("backfill_state.json");

    {
        let store = BackfillStateStore::open(&path).await.unwrap();
        store.update_chat("c1", 100).await.unwrap();
        store.update_chat("c2", 5).await.unwrap();
    }

    let reloaded = BackfillStateStore::open(&path).await.unwrap();
    assert_eq!(reloaded.last_message_id("c1").await, Some(100));
    assert_eq!(reloaded.last_message_id("c2").await, Some(5));
}

#[tokio::test]
async fn test_regression_ignored() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("backfill_state.json");

    let store = BackfillStateStore::open(&path).await.unwrap();
    store.update_chat("c", 100).await.unwrap();
    store.update_chat("c", 90).await.unwrap();
    assert_eq!(store.last_message_id("c").await, Some(100));

    // And the file on disk agrees.
    drop(store);
    let reloaded = BackfillStateStore::open(&path).await.unwrap();
    assert_eq!(reloaded.last_message_id("c").await, Some(100));
}

#[tokio::test]
async fn test_monotonic_under_interleaving() {
    let dir = TempDir::new().unwrap();
    let store = open_in(&dir).await;

    for id in [10, 50, 30, 50, 49, 51] {
        store.update_chat("c", id).await.unwrap();
    }
    assert_eq!(store.last_message_id("c").await, Some(51));
}

#[tokio::test]
async fn test_corrupt_file_starts_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("backfill_state.json");
    tokio::fs::write(&path, b"{not json").await.unwrap();

    let store = BackfillStateStore::open(&path).await.unwrap();
    assert!(store.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_parent_dir_created() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/dir/state.json");

    let store = BackfillStateStore::open(&path).await.unwrap();
    store.update_chat("c", 1).await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn test_wire_format() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    let store = BackfillStateStore::open(&path).await.unwrap();
    store.update_chat("chat-1", 7).await.unwrap();

    let content = tokio::fs::read_to_string(&path).await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(value["chats"]["chat-1"]["last_message_id"], 7);
    assert!(value["chats"]["chat-1"]["updated_at"].is_string());
}
