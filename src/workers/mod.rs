//! Enrichment Workers (C6): a small set of cooperative, independently
//! backed-off long-running loops — summarizer, embedder, and (stubbed)
//! upstream fetchers — plus the batch monitor loop that drives
//! `crate::batch::BatchOrchestrator::monitor_once`.
//!
//! Supervisor shape grounded in the donor's worker-loop convention (scan →
//! process → sleep, with capped exponential backoff on repeated failure);
//! the exact backoff formula (`min(backoff * 2^failures, max_backoff)`,
//! reset on success) is this crate's own expansion of the donor's flat-sleep
//! pattern, since the original Python's `WORKER_BACKOFF_SECONDS`/
//! `WORKER_MAX_BACKOFF_SECONDS` pair implies but doesn't spell out the
//! schedule (SPEC_FULL.md §4.6).

pub mod embedder;
pub mod fetchers;
pub mod summarizer;

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::WorkerConfig;

pub type WorkerError = Box<dyn std::error::Error + Send + Sync>;

/// Run `cycle` repeatedly until `shutdown` fires. `cycle` returns the number
/// of entities it processed this pass; zero means "nothing to do right
/// now", which is treated as success (full poll-interval sleep, backoff
/// reset) rather than an error.
pub async fn supervise<F, Fut>(name: &'static str, cfg: WorkerConfig, mut shutdown: watch::Receiver<bool>, mut cycle: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<usize, WorkerError>>,
{
    let mut backoff = cfg.backoff;
    loop {
        if *shutdown.borrow() {
            tracing::info!(loop_name = name, "worker loop shutting down gracefully");
            return;
        }

        let outcome = cycle().await;
        let sleep_for = match outcome {
            Ok(processed) => {
                backoff = cfg.backoff;
                if processed > 0 {
                    tracing::debug!(loop_name = name, processed, "worker cycle processed entities");
                    Duration::from_millis(50)
                } else {
                    cfg.poll_interval
                }
            }
            Err(e) => {
                tracing::warn!(loop_name = name, error = %e, backoff_secs = backoff.as_secs(), "worker cycle failed, backing off");
                let this_backoff = backoff;
                backoff = std::cmp::min(backoff * 2, cfg.max_backoff);
                this_backoff
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = shutdown.changed() => {}
        }
    }
}
