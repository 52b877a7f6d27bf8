//! Batch Orchestrator (C7) — the hardest subsystem. Coordinates four
//! phases (build → submit → monitor → process) against an external
//! asynchronous batch API, persisting `BatchProcess` rows that advance
//! through the monotonic state machine in `db::models::BatchStatus`.

pub mod build;
pub mod process;
pub mod provider;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::config::BatchConfig;
use crate::db::models::{BatchStatus, OperationKind};
use crate::db::{DbError, Store};
use crate::keywords::KeywordService;
use crate::llm::LlmClient;

use build::{build_request_line, partition, select_candidates, BatchTableKind, MAX_CANDIDATES};
use process::{apply_item, parse_custom_id, reconcile_content};
use provider::BatchProvider;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("batch provider error: {0}")]
    Provider(String),

    #[error("reconciliation error: {0}")]
    Reconcile(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BatchResult<T> = Result<T, BatchError>;

pub struct BatchOrchestrator {
    store: Store,
    provider: Arc<dyn BatchProvider>,
    llm: Arc<dyn LlmClient>,
    keywords: Arc<KeywordService>,
    cfg: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(
        store: Store,
        provider: Arc<dyn BatchProvider>,
        llm: Arc<dyn LlmClient>,
        keywords: Arc<KeywordService>,
        cfg: BatchConfig,
    ) -> Self {
        BatchOrchestrator { store, provider, llm, keywords, cfg }
    }

    /// Build phase: select up to `build::MAX_CANDIDATES` rows, partition by
    /// `entities_per_batch`, write one JSONL file per entity-batch under
    /// `batch/sent/`, and submit each immediately (build and submit are not
    /// separated into distinct provider round-trips per §4.7's build/submit
    /// phase split, since both happen locally before any network call except
    /// the upload itself).
    pub async fn build_and_submit(&self, operation: OperationKind, table: BatchTableKind) -> BatchResult<Vec<i64>> {
        let candidates = select_candidates(&self.store, operation, table).await?;
        tracing::info!(
            operation = operation.as_str(),
            table = table.table_name(),
            candidates = candidates.len(),
            capped = candidates.len() as i64 == MAX_CANDIDATES,
            "batch build: candidates selected"
        );
        let batches = partition(candidates, self.cfg.entities_per_batch);

        let mut process_ids = Vec::new();
        for (index, batch) in batches.into_iter().enumerate() {
            if batch.is_empty() {
                continue;
            }
            let line = build_request_line(&self.cfg.model, operation, table, index, &batch, &self.keywords).await;

            let file_uuid = Uuid::new_v4();
            let file_name = format!("efficient_{}_{}_{}.jsonl", operation.as_str(), table.table_name(), file_uuid);
            let sent_dir = self.cfg.dir.join("sent");
            tokio::fs::create_dir_all(&sent_dir).await?;
            let path = sent_dir.join(&file_name);
            tokio::fs::write(&path, format!("{line}\n")).await?;

            let id = self.submit(operation, table, &path, batch.len() as i32).await?;
            process_ids.push(id);
        }
        Ok(process_ids)
    }

    /// Submit phase: upload the JSONL file, create the provider batch, and
    /// persist a `BatchProcess` row in `sent` status.
    async fn submit(
        &self,
        operation: OperationKind,
        table: BatchTableKind,
        path: &std::path::Path,
        total_requests: i32,
    ) -> BatchResult<i64> {
        let contents = tokio::fs::read(path).await?;
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("batch.jsonl");
        let input_file_id = self.provider.upload_file(file_name, contents).await?;
        let batch_id = self.provider.create_batch(&input_file_id).await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO batch_processes (batch_id, provider, operation_type, table_name, total_requests, \
             sent_at, status, input_file_path) VALUES ($1, 'openai', $2, $3, $4, now(), 'sent', $5) RETURNING id",
        )
        .bind(&batch_id)
        .bind(operation)
        .bind(table.table_name())
        .bind(total_requests)
        .bind(path.to_string_lossy().to_string())
        .fetch_one(&self.store.pool)
        .await
        .map_err(DbError::from)?;

        Ok(id)
    }

    /// Monitor phase: poll every pending `BatchProcess` row once. Intended
    /// to be called in a loop by the worker supervisor at `poll_interval`.
    pub async fn monitor_once(&self) -> BatchResult<()> {
        let pending: Vec<(i64, String)> = sqlx::query_as(
            "SELECT id, batch_id FROM batch_processes WHERE status IN ('sent', 'in_progress', 'finalizing')",
        )
        .fetch_all(&self.store.pool)
        .await
        .map_err(DbError::from)?;

        for (id, batch_id) in pending {
            if let Err(e) = self.monitor_one(id, &batch_id).await {
                tracing::warn!(error = %e, batch_id, "batch monitor: local exception, marking error and continuing");
                let _ = self.mark_status(id, BatchStatus::Error, Some(&e.to_string())).await;
            }
        }
        Ok(())
    }

    async fn monitor_one(&self, id: i64, batch_id: &str) -> BatchResult<()> {
        let status = self.provider.get_status(batch_id).await?;
        let next = match status.status.as_str() {
            "in_progress" => BatchStatus::InProgress,
            "finalizing" => BatchStatus::Finalizing,
            "completed" => BatchStatus::Completed,
            "failed" => BatchStatus::Failed,
            "expired" => BatchStatus::Expired,
            "cancelled" => BatchStatus::Cancelled,
            _ => return Ok(()),
        };

        self.mark_status(id, next, status.error_message.as_deref()).await?;

        if next == BatchStatus::Completed {
            if let Some(output_file_id) = status.output_file_id {
                self.download_and_process(id, batch_id, &output_file_id).await?;
            }
        }
        Ok(())
    }

    /// Only writes when `status` is an actual transition from the row's
    /// current status, matching the state machine's "persist if changed"
    /// rule instead of rewriting the row on every poll tick.
    async fn mark_status(&self, id: i64, status: BatchStatus, error_message: Option<&str>) -> BatchResult<()> {
        sqlx::query(
            "UPDATE batch_processes SET status = $1, error_message = COALESCE($2, error_message), \
             received_at = CASE WHEN $1 IN ('completed','failed','expired','cancelled') THEN now() ELSE received_at END, \
             updated_at = now() WHERE id = $3 AND status IS DISTINCT FROM $1",
        )
        .bind(status)
        .bind(error_message)
        .bind(id)
        .execute(&self.store.pool)
        .await
        .map_err(DbError::from)?;
        Ok(())
    }

    async fn download_and_process(&self, id: i64, batch_id: &str, output_file_id: &str) -> BatchResult<()> {
        let bytes = self.provider.download_file(output_file_id).await?;
        let received_dir = self.cfg.dir.join("received");
        tokio::fs::create_dir_all(&received_dir).await?;
        let path = received_dir.join(format!("results_{batch_id}.jsonl"));
        tokio::fs::write(&path, &bytes).await?;

        let (processed, errors) = self.process_output(&bytes).await;
        tracing::info!(batch_id, processed, errors, "batch process phase complete");

        sqlx::query("UPDATE batch_processes SET output_file_path = $1, updated_at = now() WHERE id = $2")
            .bind(path.to_string_lossy().to_string())
            .bind(id)
            .execute(&self.store.pool)
            .await
            .map_err(DbError::from)?;

        if errors > 0 && processed == 0 {
            self.mark_status(id, BatchStatus::ProcessingFailed, Some("all items failed reconciliation")).await?;
        }

        // Best-effort cleanup; provider 404s are tolerated as already-deleted.
        // Local JSONL files (both sent and received) are retained for audit.
        // The provider's *input* file id isn't persisted separately from the
        // local sent-path, so only the output file is reclaimed here.
        let _ = self.provider.delete_file(output_file_id).await;

        Ok(())
    }

    /// Process phase over one output JSONL blob: one line per provider
    /// response. Returns (processed_count, error_count).
    async fn process_output(&self, bytes: &[u8]) -> (u64, u64) {
        let text = String::from_utf8_lossy(bytes);
        let mut processed = 0u64;
        let mut errors = 0u64;

        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let Ok(envelope) = serde_json::from_str::<serde_json::Value>(line) else {
                errors += 1;
                continue;
            };
            let Some(custom_id) = envelope.get("custom_id").and_then(|v| v.as_str()) else {
                errors += 1;
                continue;
            };
            let Some(parsed) = parse_custom_id(custom_id) else {
                errors += 1;
                continue;
            };
            let content = envelope
                .pointer("/response/body/choices/0/message/content")
                .and_then(|v| v.as_str())
                .unwrap_or_default();

            let items = reconcile_content(content);
            if items.is_empty() {
                errors += 1;
                continue;
            }

            for item in &items {
                match apply_item(&self.store, self.llm.as_ref(), parsed.operation, parsed.table, &parsed.ids, item)
                    .await
                {
                    Ok(()) => processed += 1,
                    Err(e) => {
                        tracing::warn!(error = %e, custom_id, "batch item reconciliation failed, rolling back just this item");
                        errors += 1;
                    }
                }
            }
        }
        (processed, errors)
    }

    pub fn poll_interval(&self) -> Duration {
        self.cfg.poll_interval
    }
}
