use super::*;

use std::sync::atomic::Ordering;

use tempfile::TempDir;
use tokio::sync::watch;

use recall::Config;
use recall::embed::{EMBED_MODEL_SMALL, EmbedConfig, Embedder, StubEmbeddings};
use recall::source::{ChatType, SourceEvent, SourceMessage, StubSource};
use recall::Store;
use recall::store::MockStore;
use recall::vespa::MockIndexClient;

use crate::pipeline::MessageProcessor;

fn chat(id: &str, title: &str) -> ResolvedChat {
    ResolvedChat {
        chat_id: id.to_string(),
        title: title.to_string(),
        chat_type: ChatType::Group,
        username: None,
    }
}

fn message(chat_id: &str, id: i64, date: i64, text: &str) -> SourceMessage {
    SourceMessage {
        chat_id: chat_id.to_string(),
        message_id: id,
        message_date: date,
        edit_date: None,
        sender: Some("Tester".to_string()),
        sender_username: Some("tester".to_string()),
        chat_username: None,
        chat_type: ChatType::Group,
        thread_id: None,
        reply_to_msg_id: None,
        text: text.to_string(),
        source_title: Some("Chat".to_string()),
    }
}

struct Fixture {
    daemon: Arc<Daemon>,
    store: MockStore,
    source: StubSource,
    _dir: TempDir,
}

async fn fixture(config: DaemonConfig, seeded: Vec<(ResolvedChat, Vec<SourceMessage>)>) -> Fixture {
    let store = MockStore::new();
    let index = MockIndexClient::new();
    let source = StubSource::new();

    let mut chats = Vec::new();
    for (chat, messages) in seeded {
        chats.push(chat.clone());
        source.push_chat(chat, messages);
    }

    let embed_config = EmbedConfig {
        model: EMBED_MODEL_SMALL.to_string(),
        backoff_base_ms: 1,
        stub: true,
        ..EmbedConfig::default()
    };
    let embedder = Arc::new(Embedder::new(
        Arc::new(store.clone()),
        Arc::new(StubEmbeddings::new(EMBED_MODEL_SMALL.to_string(), 1536)),
        embed_config.clone(),
        1,
        1,
    ));

    let processor = Arc::new(MessageProcessor::new(
        Arc::new(store.clone()),
        Arc::new(index.clone()),
        Arc::new(source.clone()),
        embedder,
        Config::default(),
        &embed_config,
        false,
    ));

    let dir = TempDir::new().unwrap();
    let state = Arc::new(
        BackfillStateStore::open(dir.path().join("state.json"))
            .await
            .unwrap(),
    );

    let daemon = Arc::new(Daemon::new(
        processor,
        Arc::new(source.clone()),
        state,
        config,
        chats,
    ));

    Fixture {
        daemon,
        store,
        source,
        _dir: dir,
    }
}

fn fast_config() -> DaemonConfig {
    DaemonConfig {
        worker_concurrency: 3,
        lookback_minutes: 5,
        connection_check_secs: 1,
        sweep_interval_minutes: 60,
        sweep_days: 7,
        checkpoint_interval: 2,
        lookback_message_limit: 250,
        ..DaemonConfig::default()
    }
}

async fn wait_until<F: Fn() -> bool>(predicate: F, timeout_ms: u64) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    predicate()
}

#[tokio::test]
async fn test_backfill_indexes_seeded_history() {
    let now = Utc::now().timestamp();
    let f = fixture(
        fast_config(),
        vec![(
            chat("c1", "Chat One"),
            (1..=5)
                .map(|i| message("c1", i, now - 1000 + i, &format!("backfill message {}", i)))
                .collect(),
        )],
    )
    .await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&f.daemon).run(shutdown_rx));

    let store = f.store.clone();
    assert!(
        wait_until(move || store.chunk_count() >= 5, 5000).await,
        "backfill must index all seeded messages"
    );

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(
        f.daemon.metrics.backfill_enqueued.load(Ordering::Relaxed),
        5
    );
}

#[tokio::test]
async fn test_checkpoint_resume_skips_processed_ids() {
    let now = Utc::now().timestamp();
    let seeded = vec![(
        chat("c1", "Chat One"),
        (1..=6)
            .map(|i| message("c1", i, now - 1000 + i, &format!("message {}", i)))
            .collect::<Vec<_>>(),
    )];

    let f = fixture(fast_config(), seeded).await;
    // Simulate a previous run that checkpointed at message 4.
    f.daemon.state.update_chat("c1", 4).await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&f.daemon).run(shutdown_rx));

    let store = f.store.clone();
    assert!(
        wait_until(move || store.chunk_count() >= 2, 5000).await,
        "messages after the checkpoint must be indexed"
    );
    // Give the backfill a moment to (incorrectly) enqueue more.
    tokio::time::sleep(Duration::from_millis(200)).await;

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(
        f.daemon.metrics.backfill_enqueued.load(Ordering::Relaxed),
        2,
        "only ids strictly above the checkpoint are backfilled"
    );
    assert_eq!(f.daemon.state.last_message_id("c1").await, Some(6));
}

#[tokio::test]
async fn test_live_events_enqueue_work() {
    let now = Utc::now().timestamp();
    let f = fixture(fast_config(), vec![(chat("c1", "Chat One"), vec![])]).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&f.daemon).run(shutdown_rx));

    // Let the tailer subscribe before emitting.
    tokio::time::sleep(Duration::from_millis(100)).await;
    f.source
        .emit(SourceEvent::NewMessage(message("c1", 10, now, "live one")));
    f.source.emit(SourceEvent::MessageEdited(message(
        "c1", 10, now, "live one edited",
    )));
    // Events for unknown chats are filtered out.
    f.source
        .emit(SourceEvent::NewMessage(message("c9", 1, now, "other chat")));

    let store = f.store.clone();
    assert!(
        wait_until(move || store.chunk_count() >= 1, 5000).await,
        "live events must be processed"
    );

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(f.daemon.metrics.events_enqueued.load(Ordering::Relaxed), 2);
    assert_eq!(f.store.get_existing_chunks("c9", 1).await.unwrap().len(), 0);
}

#[tokio::test]
async fn test_startup_lookback_runs() {
    let now = Utc::now().timestamp();
    // One recent message inside the look-back window, one ancient.
    let f = fixture(
        fast_config(),
        vec![(
            chat("c1", "Chat One"),
            vec![
                message("c1", 1, now - 10_000_000, "ancient"),
                message("c1", 2, now - 30, "recent"),
            ],
        )],
    )
    .await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&f.daemon).run(shutdown_rx));

    let daemon = Arc::clone(&f.daemon);
    assert!(
        wait_until(
            move || daemon.metrics.lookbacks_completed.load(Ordering::Relaxed) >= 1,
            5000
        )
        .await,
        "startup look-back must complete"
    );

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_lookbacks_serialise() {
    let f = fixture(fast_config(), vec![(chat("c1", "Chat One"), vec![])]).await;
    let (tx, mut rx) = mpsc::channel::<Option<WorkItem>>(16);
    tokio::spawn(async move { while rx.recv().await.is_some() {} });

    // Hold the look-back lock; a concurrent look-back must wait.
    let guard = f.daemon.lookback_lock.lock().await;

    let daemon = Arc::clone(&f.daemon);
    let tx_clone = tx.clone();
    let blocked = tokio::spawn(async move { daemon.run_lookback(&tx_clone).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        f.daemon.metrics.lookbacks_completed.load(Ordering::Relaxed),
        0,
        "look-back must not run while another holds the lock"
    );

    drop(guard);
    blocked.await.unwrap();
    assert_eq!(
        f.daemon.metrics.lookbacks_completed.load(Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn test_watchdog_triggers_reconnect_lookback() {
    let config = DaemonConfig {
        connection_check_secs: 1,
        ..fast_config()
    };
    let f = fixture(config, vec![(chat("c1", "Chat One"), vec![])]).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&f.daemon).run(shutdown_rx));

    // Startup look-back counts one.
    let daemon = Arc::clone(&f.daemon);
    assert!(
        wait_until(
            move || daemon.metrics.lookbacks_completed.load(Ordering::Relaxed) >= 1,
            3000
        )
        .await
    );

    // Drop the connection, wait a sample, restore it.
    f.source.set_connected(false);
    tokio::time::sleep(Duration::from_millis(1200)).await;
    f.source.set_connected(true);

    let daemon = Arc::clone(&f.daemon);
    assert!(
        wait_until(
            move || daemon.metrics.lookbacks_completed.load(Ordering::Relaxed) >= 2,
            5000
        )
        .await,
        "the false→true edge must trigger a reconnect look-back"
    );

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_is_prompt() {
    let f = fixture(fast_config(), vec![(chat("c1", "Chat One"), vec![])]).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&f.daemon).run(shutdown_rx));

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown_tx.send(true).unwrap();

    let finished = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(finished.is_ok(), "daemon must stop promptly on shutdown");
}
