use super::*;

fn chunk(chat_id: &str, message_id: i64, chunk_idx: i32) -> ChunkRecord {
    ChunkRecord {
        chunk_id: ChunkRecord::format_id(chat_id, message_id, chunk_idx, 1),
        chat_id: chat_id.to_string(),
        message_id,
        chunk_idx,
        text_hash: format!("hash-{}-{}", message_id, chunk_idx),
        message_date: 1_700_000_000,
        edit_date: None,
        deleted_at: None,
        sender: Some("Sender".to_string()),
        sender_username: None,
        chat_username: None,
        chat_type: Some("group".to_string()),
        thread_id: None,
        has_link: false,
    }
}

#[test]
fn test_chunk_id_format() {
    assert_eq!(ChunkRecord::format_id("chat-1", 42, 3, 2), "chat-1:42:3:v2");
}

#[tokio::test]
async fn test_mock_upsert_is_idempotent_on_chunk_id() {
    let store = MockStore::new();
    store.upsert_chunk(&chunk("c", 1, 0)).await.unwrap();
    store.upsert_chunk(&chunk("c", 1, 0)).await.unwrap();
    assert_eq!(store.chunk_count(), 1);
}

#[tokio::test]
async fn test_mock_existing_chunks_sorted() {
    let store = MockStore::new();
    store.upsert_chunk(&chunk("c", 1, 1)).await.unwrap();
    store.upsert_chunk(&chunk("c", 1, 0)).await.unwrap();
    store.upsert_chunk(&chunk("c", 2, 0)).await.unwrap();

    let found = store.get_existing_chunks("c", 1).await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].chunk_idx, 0);
    assert_eq!(found[1].chunk_idx, 1);
}

#[tokio::test]
async fn test_mock_cache_insert_conflict_is_noop() {
    let store = MockStore::new();
    let entry = CachedEmbedding {
        text_hash: "h".to_string(),
        model: "text-embedding-3-small".to_string(),
        dim: 3,
        vector: vec![0, 0, 128, 63],
        lang: None,
        chunking_version: 1,
        preprocess_version: 1,
    };
    store.cache_embedding(&entry).await.unwrap();

    let changed = CachedEmbedding {
        dim: 99,
        ..entry.clone()
    };
    store.cache_embedding(&changed).await.unwrap();

    // First write wins, as with ON CONFLICT DO NOTHING.
    let cached = store.get_cached_embedding("h").await.unwrap().unwrap();
    assert_eq!(cached.dim, 3);
    assert_eq!(store.embedding_writes(), 2);
    assert_eq!(store.embedding_count(), 1);
}

#[tokio::test]
async fn test_mock_mark_deleted() {
    let store = MockStore::new();
    store.upsert_chunk(&chunk("c", 1, 0)).await.unwrap();
    store.upsert_chunk(&chunk("c", 1, 1)).await.unwrap();
    store.upsert_chunk(&chunk("c", 2, 0)).await.unwrap();

    store.mark_chunks_deleted("c", 1, 1_700_000_500).await.unwrap();

    for c in store.get_existing_chunks("c", 1).await.unwrap() {
        assert_eq!(c.deleted_at, Some(1_700_000_500));
    }
    assert_eq!(
        store.get_existing_chunks("c", 2).await.unwrap()[0].deleted_at,
        None
    );
}
