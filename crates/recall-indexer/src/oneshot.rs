//! One-shot indexing: drain selected chats' history through the worker
//! pool and exit.


use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{error, info};

use recall::source::{FetchOptions, MessageSource, ResolvedChat, SourceMessage};

use crate::pipeline::{MessageProcessor, QUEUE_CAPACITY, WorkItem, spawn_workers};

/// One-shot run options.
#[derive(Debug, Clone)]
pub struct OneShotOptions {
    /// Chat selection, already split; empty means all chats.
    pub chats: Vec<String>,
    /// History depth in days; `None` means full history.
    pub days: Option<i64>,
    /// Global message cap across all chats.
    pub limit_messages: Option<usize>,
    /// Inter-message throttle.
    pub sleep_ms: u64,
    /// Worker pool size.
    pub worker_concurrency: usize,
}

impl Default for OneShotOptions {
    fn default() -> Self {
        Self {
            chats: Vec::new(),
            days: None,
            limit_messages: None,
            sleep_ms: 0,
            worker_concurrency: 3,
        }
    }
}

/// Resolves the chat selection, logging and skipping failures.
pub async fn resolve_selection(
    source: &Arc<dyn MessageSource>,
    selection: &[String],
) -> anyhow::Result<Vec<ResolvedChat>> {
    let names = if selection.is_empty() {
        let all = source
            .get_all_chats()
            .await
            .context("failed to list chats")?;
        info!(count = all.len(), "no chat selection given, using all chats");
        all
    } else {
        selection.to_vec()
    };

    let mut resolved = Vec::new();
    for (name, result) in source.resolve_chats(&names).await {
        match result {
            Ok(chat) => {
                info!(name = %name, title = %chat.title, chat_type = %chat.chat_type, "chat resolved");
                resolved.push(chat);
            }
            Err(e) => error!(name = %name, error = %e, "failed to resolve chat"),
        }
    }

    if resolved.is_empty() {
        bail!("no valid chats found");
    }
    Ok(resolved)
}

/// Runs one-shot indexing over the resolved selection.
///
/// Messages are enqueued onto the shared work queue and drained by the
/// worker pool; the first processing failure (budget refusal, storage
/// error) fails the run.
pub async fn run_once(
    processor: &Arc<MessageProcessor>,
    source: &Arc<dyn MessageSource>,
    options: &OneShotOptions,
) -> anyhow::Result<()> {
    match options.days {
        Some(days) => info!(days, "starting one-shot indexing"),
        None => info!("starting one-shot indexing over full history"),
    }

    let chats = resolve_selection(source, &options.chats).await?;
    let since = options
        .days
        .map(|days| Utc::now().timestamp() - days * 86_400);

    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let pool = spawn_workers(Arc::clone(processor), rx, options.worker_concurrency);

    let mut total_enqueued = 0usize;
    'chats: for chat in &chats {
        let remaining = match options.limit_messages {
            Some(limit) => {
                let remaining = limit.saturating_sub(total_enqueued);
                if remaining == 0 {
                    info!(limit, "message limit reached, stopping");
                    break;
                }
                Some(remaining)
            }
            None => None,
        };

        info!(title = %chat.title, "processing chat");
        let opts = FetchOptions {
            since,
            limit: remaining,
            ..FetchOptions::default()
        };
        let mut stream = source
            .iter_messages(chat, opts)
            .await
            .with_context(|| format!("error iterating chat {}", chat.title))?;

        let mut enqueued = 0usize;
        while let Some(message) = stream.next().await {
            let message = enrich(
                message.with_context(|| format!("error reading chat {}", chat.title))?,
                chat,
            );
            if message.text.trim().is_empty() {
                continue;
            }

            if tx.send(Some(WorkItem::new(message))).await.is_err() {
                break 'chats;
            }
            enqueued += 1;
            total_enqueued += 1;

            if options.sleep_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(options.sleep_ms)).await;
            }
            if enqueued % 100 == 0 {
                info!(title = %chat.title, enqueued, "progress");
            }
        }

        info!(title = %chat.title, enqueued, "chat drained");
    }

    for _ in 0..options.worker_concurrency.max(1) {
        let _ = tx.send(None).await;
    }

    if let Some(e) = pool.join().await {
        return Err(e.into());
    }
    info!(total_enqueued, "one-shot indexing complete");
    Ok(())
}

/// Fills chat-level fields the source may not denormalise per message.
pub fn enrich(mut message: SourceMessage, chat: &ResolvedChat) -> SourceMessage {
    if message.source_title.is_none() {
        message.source_title = Some(chat.title.clone());
    }
    if message.chat_username.is_none() {
        message.chat_username = chat.username.clone();
    }
    message
}
