//! Indexing pipeline: one-shot backfill and the live daemon.
//!
//! This crate is primarily used by the `recall-indexer` binary.

pub mod daemon;
pub mod metrics;
pub mod oneshot;
pub mod pipeline;

pub use daemon::{Daemon, DaemonConfig};
pub use metrics::IndexerMetrics;
pub use oneshot::{OneShotOptions, run_once};
pub use pipeline::{
    MessageProcessor, ProcessError, ProcessOutcome, WorkItem, WorkerPool, delete_message,
    spawn_workers,
};
