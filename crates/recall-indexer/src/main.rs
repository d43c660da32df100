//! Recall indexer entrypoint: one-shot backfill or live daemon.

use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;

use recall::config::{bool_from_env, string_from_env};
use recall::source::MessageSource;
use recall::state::BackfillStateStore;
use recall::store::PgStore;
use recall::vespa::{IndexClient, VespaClient};
use recall::{Config, EmbedConfig, Embedder, StubSource};

use recall_indexer::daemon::{Daemon, DaemonConfig};
use recall_indexer::oneshot::{OneShotOptions, resolve_selection, run_once};
use recall_indexer::pipeline::{MessageProcessor, delete_message};

#[derive(Debug, Parser)]
#[command(name = "recall-indexer", about = "Index chat messages into the search engine")]
struct Cli {
    /// Run one-shot indexing instead of the daemon.
    #[arg(long)]
    once: bool,

    /// Comma-separated chat names/usernames/ids (default: all chats).
    #[arg(long)]
    chats: Option<String>,

    /// Days of history to fetch (default: entire history).
    #[arg(long)]
    days: Option<i64>,

    /// Estimate costs without calling APIs or writing anything.
    #[arg(long)]
    dry_run: bool,

    /// Global cap on processed messages.
    #[arg(long)]
    limit_messages: Option<usize>,

    /// Override embedding batch size.
    #[arg(long)]
    embed_batch_size: Option<usize>,

    /// Override embedding concurrency.
    #[arg(long)]
    embed_concurrency: Option<usize>,

    /// Sleep between messages (one-shot only).
    #[arg(long, default_value_t = 0)]
    sleep_ms: u64,

    /// Log level (overridden by RUST_LOG).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Reconnect/startup look-back window in minutes.
    #[arg(long)]
    daemon_lookback_minutes: Option<u64>,

    /// Connection watchdog sampling period in seconds.
    #[arg(long)]
    daemon_connection_check_secs: Option<u64>,

    /// Worker pool size.
    #[arg(long)]
    daemon_worker_concurrency: Option<usize>,

    /// Periodic sweep depth in days.
    #[arg(long)]
    hourly_sweep_days: Option<u64>,

    /// Periodic sweep interval in minutes.
    #[arg(long)]
    hourly_sweep_interval_minutes: Option<u64>,

    /// Checkpoint file location.
    #[arg(long)]
    backfill_state_path: Option<String>,

    /// Messages between checkpoint writes.
    #[arg(long)]
    backfill_checkpoint_interval: Option<usize>,

    /// Per-chat cap during look-backs and sweeps.
    #[arg(long)]
    lookback_message_limit: Option<usize>,

    /// Tombstone one deleted message's chunks and remove them from the
    /// index, then exit.
    #[arg(long, value_name = "CHAT_ID:MESSAGE_ID")]
    delete_message: Option<String>,
}

impl Cli {
    fn chat_list(&self) -> Vec<String> {
        self.chats
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn apply_overrides(&self, embed: &mut EmbedConfig, daemon: &mut DaemonConfig) {
        if let Some(batch_size) = self.embed_batch_size {
            embed.batch_size = batch_size.max(1);
        }
        if let Some(concurrency) = self.embed_concurrency {
            embed.concurrency = concurrency.max(1);
        }
        if let Some(minutes) = self.daemon_lookback_minutes {
            daemon.lookback_minutes = minutes;
        }
        if let Some(secs) = self.daemon_connection_check_secs {
            daemon.connection_check_secs = secs.max(1);
        }
        if let Some(workers) = self.daemon_worker_concurrency {
            daemon.worker_concurrency = workers.max(1);
        }
        if let Some(days) = self.hourly_sweep_days {
            daemon.sweep_days = days;
        }
        if let Some(minutes) = self.hourly_sweep_interval_minutes {
            daemon.sweep_interval_minutes = minutes.max(1);
        }
        if let Some(path) = &self.backfill_state_path {
            daemon.backfill_state_path = path.clone();
        }
        if let Some(interval) = self.backfill_checkpoint_interval {
            daemon.checkpoint_interval = interval.max(1);
        }
        if let Some(limit) = self.lookback_message_limit {
            daemon.lookback_message_limit = limit;
        }
    }
}

fn parse_delete_target(target: &str) -> anyhow::Result<(String, i64)> {
    // Chat ids never contain a colon; split on the last one regardless.
    let Some((chat_id, message_id)) = target.rsplit_once(':') else {
        bail!("--delete-message expects CHAT_ID:MESSAGE_ID, got {:?}", target);
    };
    let message_id: i64 = message_id
        .parse()
        .with_context(|| format!("invalid message id in {:?}", target))?;
    if chat_id.is_empty() {
        bail!("--delete-message expects a non-empty chat id, got {:?}", target);
    }
    Ok((chat_id.to_string(), message_id))
}

fn build_source() -> anyhow::Result<Arc<dyn MessageSource>> {
    if bool_from_env("SOURCE_STUB", false) {
        tracing::warn!("SOURCE_STUB enabled, using the in-memory stub source");
        return Ok(Arc::new(StubSource::new()));
    }

    let connector = string_from_env("MESSAGE_SOURCE", "stub".to_string());
    match connector.as_str() {
        "stub" => Ok(Arc::new(StubSource::new())),
        other => bail!(
            "unknown MESSAGE_SOURCE {:?}; link a platform connector implementing MessageSource",
            other
        ),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        mode = if cli.once { "one-shot" } else { "daemon" },
        "starting indexer"
    );

    let config = Config::from_env().context("configuration error")?;
    config.validate().context("configuration error")?;
    let mut embed_config = EmbedConfig::from_env().context("configuration error")?;
    let mut daemon_config = DaemonConfig::from_env();
    cli.apply_overrides(&mut embed_config, &mut daemon_config);

    let database_url = config.require_database_url()?.to_string();
    let store = Arc::new(
        PgStore::connect(&database_url)
            .await
            .context("database connection failed")?,
    );

    let index_client = VespaClient::new(&config.vespa_endpoint, embed_config.backoff_base_ms);
    if !index_client.health_check().await {
        tracing::warn!("search engine health check failed, documents may not be indexed");
    }
    let feed_metrics = index_client.metrics();
    let index: Arc<dyn IndexClient> = Arc::new(index_client);

    if let Some(target) = &cli.delete_message {
        let (chat_id, message_id) = parse_delete_target(target)?;
        let store_handle: Arc<dyn recall::Store> = store.clone();
        let deleted =
            delete_message(&store_handle, &index, &chat_id, message_id, config.chunking_version)
                .await?;
        tracing::info!(chat_id = %chat_id, message_id, deleted, "message deleted");
        store.close().await;
        return Ok(());
    }

    let source = build_source()?;
    source.start().await.context("source start failed")?;

    let provider = embed_config.build_provider()?;
    let embedder = Arc::new(Embedder::new(
        store.clone(),
        provider,
        embed_config.clone(),
        config.chunking_version,
        config.preprocess_version,
    ));
    let embed_metrics = embedder.metrics();

    let processor = Arc::new(MessageProcessor::new(
        store.clone(),
        index.clone(),
        source.clone(),
        embedder,
        config.clone(),
        &embed_config,
        cli.dry_run,
    ));

    let result = if cli.once {
        let options = OneShotOptions {
            chats: cli.chat_list(),
            days: cli.days,
            limit_messages: cli.limit_messages,
            sleep_ms: cli.sleep_ms,
            worker_concurrency: daemon_config.worker_concurrency,
        };
        let outcome = run_once(&processor, &source, &options).await;
        processor.metrics.report(&embed_metrics, &feed_metrics);
        outcome
    } else {
        let state = Arc::new(
            BackfillStateStore::open(&daemon_config.backfill_state_path)
                .await
                .context("failed to open backfill state")?,
        );
        let chats = resolve_selection(&source, &cli.chat_list()).await?;
        let daemon = Arc::new(Daemon::new(
            processor.clone(),
            source.clone(),
            state,
            daemon_config,
            chats,
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        });

        let outcome = daemon.run(shutdown_rx).await;
        processor.metrics.report(&embed_metrics, &feed_metrics);
        outcome
    };

    source.stop().await.ok();
    store.close().await;
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}
