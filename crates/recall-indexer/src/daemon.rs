//! Daemon mode: initial backfill, live tailing, look-backs, periodic
//! sweeps, and a connection watchdog sharing one bounded work queue.

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info, warn};

use recall::config::{string_from_env, u64_from_env, usize_from_env};
use recall::source::{FetchOptions, MessageSource, ResolvedChat};
use recall::state::BackfillStateStore;

use crate::oneshot::enrich;
use crate::pipeline::{MessageProcessor, QUEUE_CAPACITY, WorkItem, spawn_workers};

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub worker_concurrency: usize,
    pub lookback_minutes: u64,
    pub connection_check_secs: u64,
    pub sweep_interval_minutes: u64,
    pub sweep_days: u64,
    pub backfill_state_path: String,
    pub checkpoint_interval: usize,
    pub lookback_message_limit: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 3,
            lookback_minutes: 5,
            connection_check_secs: 60,
            sweep_interval_minutes: 60,
            sweep_days: 7,
            backfill_state_path: "./data/backfill_state.json".to_string(),
            checkpoint_interval: 50,
            lookback_message_limit: 250,
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            worker_concurrency: usize_from_env(
                "DAEMON_WORKER_CONCURRENCY",
                defaults.worker_concurrency,
            )
            .max(1),
            lookback_minutes: u64_from_env("DAEMON_LOOKBACK_MINUTES", defaults.lookback_minutes),
            connection_check_secs: u64_from_env(
                "DAEMON_CONNECTION_CHECK_SECS",
                defaults.connection_check_secs,
            )
            .max(1),
            sweep_interval_minutes: u64_from_env(
                "HOURLY_SWEEP_INTERVAL_MINUTES",
                defaults.sweep_interval_minutes,
            )
            .max(1),
            sweep_days: u64_from_env("HOURLY_SWEEP_DAYS", defaults.sweep_days),
            backfill_state_path: string_from_env(
                "BACKFILL_STATE_PATH",
                defaults.backfill_state_path,
            ),
            checkpoint_interval: usize_from_env(
                "BACKFILL_CHECKPOINT_INTERVAL",
                defaults.checkpoint_interval,
            )
            .max(1),
            lookback_message_limit: usize_from_env(
                "LOOKBACK_MESSAGE_LIMIT",
                defaults.lookback_message_limit,
            ),
        }
    }
}

/// Daemon activity counters.
#[derive(Default)]
pub struct DaemonMetrics {
    pub backfill_enqueued: AtomicU64,
    pub events_enqueued: AtomicU64,
    pub lookbacks_completed: AtomicU64,
    pub sweeps_completed: AtomicU64,
}

/// The live indexing daemon.
pub struct Daemon {
    processor: Arc<MessageProcessor>,
    source: Arc<dyn MessageSource>,
    state: Arc<BackfillStateStore>,
    config: DaemonConfig,
    chats: Vec<ResolvedChat>,
    chat_ids: HashSet<String>,
    lookback_lock: Mutex<()>,
    pub metrics: Arc<DaemonMetrics>,
}

impl Daemon {
    pub fn new(
        processor: Arc<MessageProcessor>,
        source: Arc<dyn MessageSource>,
        state: Arc<BackfillStateStore>,
        config: DaemonConfig,
        chats: Vec<ResolvedChat>,
    ) -> Self {
        let chat_ids = chats.iter().map(|c| c.chat_id.clone()).collect();
        Self {
            processor,
            source,
            state,
            config,
            chats,
            chat_ids,
            lookback_lock: Mutex::new(()),
            metrics: Arc::new(DaemonMetrics::default()),
        }
    }

    /// Runs until `shutdown` flips to true, then drains workers and exits.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(
            chats = self.chats.len(),
            workers = self.config.worker_concurrency,
            "daemon starting"
        );

        let (tx, rx) = mpsc::channel::<Option<WorkItem>>(QUEUE_CAPACITY);
        let workers = spawn_workers(
            Arc::clone(&self.processor),
            rx,
            self.config.worker_concurrency,
        );

        // Live tailing starts before the backfill so nothing posted during
        // the backfill window is missed.
        let tailer = tokio::spawn({
            let daemon = Arc::clone(&self);
            let tx = tx.clone();
            let shutdown = shutdown.clone();
            async move { daemon.tail_events(tx, shutdown).await }
        });

        let backfill = tokio::spawn({
            let daemon = Arc::clone(&self);
            let tx = tx.clone();
            async move { daemon.initial_backfill(tx).await }
        });

        // Startup look-back.
        self.run_lookback(&tx).await;

        let sweeper = tokio::spawn({
            let daemon = Arc::clone(&self);
            let tx = tx.clone();
            let shutdown = shutdown.clone();
            async move { daemon.sweep_loop(tx, shutdown).await }
        });

        let watchdog = tokio::spawn({
            let daemon = Arc::clone(&self);
            let tx = tx.clone();
            let shutdown = shutdown.clone();
            async move { daemon.connection_watchdog(tx, shutdown).await }
        });

        // Block until shutdown is signalled.
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        info!("shutdown signalled, draining workers");

        // Sentinels wake every worker; background loops observe the flag.
        for _ in 0..self.config.worker_concurrency {
            let _ = tx.send(None).await;
        }
        // Daemon workers log failures instead of surfacing them.
        let _ = workers.join().await;

        backfill.abort();
        tailer.abort();
        sweeper.abort();
        watchdog.abort();

        info!("daemon stopped");
        Ok(())
    }

    /// Oldest-to-newest catch-up per chat, resuming after the stored
    /// checkpoint and persisting progress periodically.
    async fn initial_backfill(&self, tx: mpsc::Sender<Option<WorkItem>>) {
        for chat in &self.chats {
            let min_id = self.state.last_message_id(&chat.chat_id).await;
            info!(title = %chat.title, min_id, "backfill starting");

            let opts = FetchOptions {
                min_id,
                reverse: true,
                ..FetchOptions::default()
            };
            let mut stream = match self.source.iter_messages(chat, opts).await {
                Ok(stream) => stream,
                Err(e) => {
                    error!(title = %chat.title, error = %e, "backfill iteration failed");
                    continue;
                }
            };

            let mut since_checkpoint = 0usize;
            let mut last_id = None;

            while let Some(message) = stream.next().await {
                let message = match message {
                    Ok(message) => enrich(message, chat),
                    Err(e) => {
                        error!(title = %chat.title, error = %e, "backfill stream error");
                        break;
                    }
                };

                last_id = Some(message.message_id);
                if tx
                    .send(Some(WorkItem {
                        message,
                        is_edit: false,
                    }))
                    .await
                    .is_err()
                {
                    return;
                }
                self.metrics.backfill_enqueued.fetch_add(1, Ordering::Relaxed);

                since_checkpoint += 1;
                if since_checkpoint >= self.config.checkpoint_interval {
                    since_checkpoint = 0;
                    if let Some(id) = last_id {
                        if let Err(e) = self.state.update_chat(&chat.chat_id, id).await {
                            warn!(error = %e, "checkpoint write failed");
                        }
                    }
                }
            }

            if let Some(id) = last_id {
                if let Err(e) = self.state.update_chat(&chat.chat_id, id).await {
                    warn!(error = %e, "final checkpoint write failed");
                }
            }
            info!(title = %chat.title, last_id, "backfill complete");
        }
    }

    /// Forwards live events for the resolved chat set into the queue.
    async fn tail_events(
        &self,
        tx: mpsc::Sender<Option<WorkItem>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut events = self.source.subscribe_events();

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if !self.chat_ids.contains(&event.message().chat_id) {
                                continue;
                            }
                            let work = WorkItem {
                                is_edit: event.is_edit(),
                                message: event.message().clone(),
                            };
                            if tx.send(Some(work)).await.is_err() {
                                break;
                            }
                            self.metrics.events_enqueued.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "event stream lagged, a sweep will catch up");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }

    /// Bounded re-scan of the last `lookback_minutes` across all chats.
    /// Serialised: at most one look-back runs at any instant.
    pub async fn run_lookback(&self, tx: &mpsc::Sender<Option<WorkItem>>) {
        let _guard = self.lookback_lock.lock().await;
        let since = Utc::now().timestamp() - (self.config.lookback_minutes as i64) * 60;

        debug!(minutes = self.config.lookback_minutes, "look-back starting");
        self.scan_recent(tx, since).await;
        self.metrics.lookbacks_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Periodic wide re-scan covering `sweep_days`.
    async fn sweep_loop(&self, tx: mpsc::Sender<Option<WorkItem>>, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.sweep_interval_minutes * 60);
        let mut interval = tokio::time::interval(period);
        // The immediate first tick would duplicate the startup look-back.
        interval.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let since = Utc::now().timestamp() - (self.config.sweep_days as i64) * 86_400;
                    info!(days = self.config.sweep_days, "periodic sweep starting");
                    self.scan_recent(&tx, since).await;
                    self.metrics.sweeps_completed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Samples connectivity; a false→true edge triggers a reconnect
    /// look-back.
    async fn connection_watchdog(
        &self,
        tx: mpsc::Sender<Option<WorkItem>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.connection_check_secs));
        let mut was_connected = true;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let connected = self.source.is_connected().await;
                    if connected && !was_connected {
                        info!("connection restored, running reconnect look-back");
                        self.run_lookback(&tx).await;
                    } else if !connected && was_connected {
                        warn!("source connection lost");
                    }
                    was_connected = connected;
                }
            }
        }
    }

    /// Enqueues recent messages (bounded per chat) from every chat.
    async fn scan_recent(&self, tx: &mpsc::Sender<Option<WorkItem>>, since: i64) {
        for chat in &self.chats {
            let opts = FetchOptions {
                since: Some(since),
                limit: Some(self.config.lookback_message_limit),
                ..FetchOptions::default()
            };
            let mut stream = match self.source.iter_messages(chat, opts).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(title = %chat.title, error = %e, "recent scan failed");
                    continue;
                }
            };

            while let Some(message) = stream.next().await {
                match message {
                    Ok(message) => {
                        let work = WorkItem {
                            message: enrich(message, chat),
                            is_edit: false,
                        };
                        if tx.send(Some(work)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!(title = %chat.title, error = %e, "recent scan stream error");
                        break;
                    }
                }
            }
        }
    }
}
