//! Runtime counters and the end-of-run report.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use recall::embed::EmbedMetrics;
use recall::vespa::FeedMetrics;

/// Indexer-level counters; embed and feed counters live with their
/// components and are referenced here for reporting.
#[derive(Default)]
pub struct IndexerMetrics {
    pub messages_scanned: AtomicU64,
    pub messages_indexed: AtomicU64,
    pub messages_skipped: AtomicU64,
    pub chunks_written: AtomicU64,
    pub process_failures: AtomicU64,
}

impl IndexerMetrics {
    /// Logs the final summary block.
    pub fn report(&self, embed: &Arc<EmbedMetrics>, feed: &Arc<FeedMetrics>) {
        info!("{}", "=".repeat(60));
        info!("INDEXING COMPLETE");
        info!("{}", "=".repeat(60));
        info!(
            "Messages scanned: {}",
            self.messages_scanned.load(Ordering::Relaxed)
        );
        info!(
            "Messages indexed: {}",
            self.messages_indexed.load(Ordering::Relaxed)
        );
        info!(
            "Messages skipped (unchanged): {}",
            self.messages_skipped.load(Ordering::Relaxed)
        );
        info!(
            "Chunks written: {}",
            self.chunks_written.load(Ordering::Relaxed)
        );
        info!("Cache hit rate: {:.1}%", embed.cache_hit_rate());
        info!(
            "Embedding tokens: {}",
            embed.total_tokens.load(Ordering::Relaxed)
        );
        info!("Estimated cost: ${:.4}", embed.cost_usd());
        info!(
            "Index feeds: {} success, {} retries, {} failures",
            feed.success.load(Ordering::Relaxed),
            feed.retries.load(Ordering::Relaxed),
            feed.failures.load(Ordering::Relaxed),
        );
        info!("{}", "=".repeat(60));
    }
}
