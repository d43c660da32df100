use super::*;

use recall::embed::{EMBED_MODEL_SMALL, EmbedConfig, StubEmbeddings};
use recall::source::{ChatType, StubSource};
use recall::store::MockStore;
use recall::vespa::MockIndexClient;

fn message(chat_id: &str, message_id: i64, text: &str) -> SourceMessage {
    SourceMessage {
        chat_id: chat_id.to_string(),
        message_id,
        message_date: 1_700_000_000,
        edit_date: None,
        sender: Some("Test User".to_string()),
        sender_username: Some("testuser".to_string()),
        chat_username: None,
        chat_type: ChatType::Group,
        thread_id: None,
        reply_to_msg_id: None,
        text: text.to_string(),
        source_title: Some("Test Chat".to_string()),
    }
}

struct Fixture {
    store: MockStore,
    index: MockIndexClient,
    source: StubSource,
    processor: MessageProcessor,
}

fn fixture(dry_run: bool, budget: f64) -> Fixture {
    let store = MockStore::new();
    let index = MockIndexClient::new();
    let source = StubSource::new();

    let embed_config = EmbedConfig {
        model: EMBED_MODEL_SMALL.to_string(),
        daily_budget_usd: budget,
        backoff_base_ms: 1,
        stub: true,
        ..EmbedConfig::default()
    };
    let provider = Arc::new(StubEmbeddings::new(EMBED_MODEL_SMALL.to_string(), 1536));
    let embedder = Arc::new(Embedder::new(
        Arc::new(store.clone()),
        provider,
        embed_config.clone(),
        1,
        1,
    ));

    let processor = MessageProcessor::new(
        Arc::new(store.clone()),
        Arc::new(index.clone()),
        Arc::new(source.clone()),
        embedder,
        Config::default(),
        &embed_config,
        dry_run,
    );

    Fixture {
        store,
        index,
        source,
        processor,
    }
}

#[tokio::test]
async fn test_message_indexed_end_to_end() {
    let f = fixture(false, 0.0);
    let msg = message("chat-1", 42, "hello world with some content");

    let outcome = f.processor.process(&msg).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Indexed { chunks: 1 });

    let chunks = f.store.get_existing_chunks("chat-1", 42).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].chunk_id, "chat-1:42:0:v1");
    assert_eq!(chunks[0].chat_type.as_deref(), Some("group"));

    let fed = f.index.fed_documents();
    assert_eq!(fed.len(), 1);
    assert_eq!(fed[0].id, "chat-1:42:0:v1");
    assert!(fed[0].vector_small.is_some(), "small model routes to vector_small");
    assert!(fed[0].vector_large.is_none());
    assert!(fed[0].text.starts_with('['), "indexed text carries the header");
    assert!(!fed[0].bm25_text.starts_with('['), "lexical text has no header");
}

#[tokio::test]
async fn test_reingest_unchanged_is_idempotent() {
    let f = fixture(false, 0.0);
    let msg = message("chat-1", 42, "hello world with some content");

    f.processor.process(&msg).await.unwrap();
    let hashes_before: Vec<String> = f
        .store
        .all_chunks()
        .iter()
        .map(|c| c.text_hash.clone())
        .collect();
    let writes_before = f.store.embedding_writes();

    let outcome = f.processor.process(&msg).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Skipped);

    let hashes_after: Vec<String> = f
        .store
        .all_chunks()
        .iter()
        .map(|c| c.text_hash.clone())
        .collect();
    assert_eq!(hashes_before, hashes_after, "chunk ids and hashes unchanged");
    assert_eq!(
        f.store.embedding_writes(),
        writes_before,
        "no embedding traffic on unchanged re-ingest"
    );
    assert_eq!(f.index.fed_documents().len(), 1, "no second feed");
}

#[tokio::test]
async fn test_edited_message_reprocessed() {
    let f = fixture(false, 0.0);
    let msg = message("chat-1", 42, "original text goes here");
    f.processor.process(&msg).await.unwrap();

    let mut edited = message("chat-1", 42, "edited text goes here instead");
    edited.edit_date = Some(1_700_000_500);

    let outcome = f.processor.process(&edited).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Indexed { chunks: 1 });

    let chunks = f.store.get_existing_chunks("chat-1", 42).await.unwrap();
    assert_eq!(chunks.len(), 1, "same chunk id upserted");
    assert_eq!(chunks[0].edit_date, Some(1_700_000_500));
    assert_eq!(f.index.fed_documents().len(), 2);
}

#[tokio::test]
async fn test_same_edit_date_skipped() {
    let f = fixture(false, 0.0);
    let mut msg = message("chat-1", 42, "text");
    msg.edit_date = Some(1_700_000_100);

    f.processor.process(&msg).await.unwrap();
    let outcome = f.processor.process(&msg).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Skipped);
}

#[tokio::test]
async fn test_empty_text_not_indexed() {
    let f = fixture(false, 0.0);
    let outcome = f
        .processor
        .process(&message("chat-1", 1, "   "))
        .await
        .unwrap();
    assert_eq!(outcome, ProcessOutcome::Empty);
    assert_eq!(f.store.chunk_count(), 0);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let f = fixture(true, 0.0);
    let outcome = f
        .processor
        .process(&message("chat-1", 1, "some content"))
        .await
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::DryRun);
    assert_eq!(f.store.chunk_count(), 0);
    assert_eq!(f.store.embedding_count(), 0);
    assert!(f.index.fed_documents().is_empty());
}

#[tokio::test]
async fn test_budget_exceeded_surfaces() {
    let f = fixture(false, 0.000_000_001);
    let err = f
        .processor
        .process(&message("chat-1", 1, "some content to embed"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::Embed(EmbedError::BudgetExceeded { .. })));
    assert_eq!(f.store.chunk_count(), 0, "nothing persisted after refusal");
}

#[tokio::test]
async fn test_reply_context_spliced() {
    let f = fixture(false, 0.0);

    let chat = ResolvedChat {
        chat_id: "chat-1".to_string(),
        title: "Test Chat".to_string(),
        chat_type: ChatType::Group,
        username: None,
    };
    f.source
        .push_chat(chat, vec![message("chat-1", 10, "the original question")]);

    let mut msg = message("chat-1", 11, "the answer to that");
    msg.reply_to_msg_id = Some(10);

    f.processor.process(&msg).await.unwrap();

    let fed = f.index.fed_documents();
    assert_eq!(fed.len(), 1);
    assert!(fed[0].text.contains("the original question"));
    assert!(fed[0].text.contains("——"));
    assert!(fed[0].text.contains("the answer to that"));
}

#[tokio::test]
async fn test_missing_reply_context_is_tolerated() {
    let f = fixture(false, 0.0);
    let mut msg = message("chat-1", 11, "reply into the void");
    msg.reply_to_msg_id = Some(999);

    let outcome = f.processor.process(&msg).await.unwrap();
    assert_eq!(outcome, ProcessOutcome::Indexed { chunks: 1 });
}

#[tokio::test]
async fn test_delete_message_tombstones_and_clears_index() {
    let f = fixture(false, 0.0);
    f.processor
        .process(&message("chat-1", 42, "message to be deleted"))
        .await
        .unwrap();

    let store: Arc<dyn recall::Store> = Arc::new(f.store.clone());
    let index: Arc<dyn recall::IndexClient> = Arc::new(f.index.clone());
    let deleted = delete_message(&store, &index, "chat-1", 42, 1).await.unwrap();

    // Every chunk index in the fixed range is probed.
    assert_eq!(deleted, recall::vespa::MAX_CHUNKS_PER_MESSAGE as usize);
    let ids = f.index.deleted_ids();
    assert!(ids.contains(&"chat-1:42:0:v1".to_string()));

    let chunks = f.store.get_existing_chunks("chat-1", 42).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].deleted_at.is_some(), "chunk record carries the tombstone");

    // Unrelated messages are untouched.
    f.processor
        .process(&message("chat-1", 43, "still alive"))
        .await
        .unwrap();
    let alive = f.store.get_existing_chunks("chat-1", 43).await.unwrap();
    assert_eq!(alive[0].deleted_at, None);
}

#[tokio::test]
async fn test_long_message_produces_multiple_chunks() {
    let f = fixture(false, 0.0);
    let long_text = "This sentence is repeated to exceed one chunk window. ".repeat(200);

    let outcome = f
        .processor
        .process(&message("chat-1", 7, &long_text))
        .await
        .unwrap();

    match outcome {
        ProcessOutcome::Indexed { chunks } => assert!(chunks > 1),
        other => panic!("expected Indexed, got {:?}", other),
    }

    let records = f.store.get_existing_chunks("chat-1", 7).await.unwrap();
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.chunk_idx, i as i32);
        assert_eq!(
            record.chunk_id,
            format!("chat-1:7:{}:v1", i),
            "chunk ids enumerate chunk_idx"
        );
    }
}
