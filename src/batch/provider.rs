//! HTTP client for the external batch API (OpenAI-shaped: `/v1/files`,
//! `/v1/batches`). A trait seam so tests can swap in an in-memory fake
//! rather than hitting the network, following the donor's
//! provider-trait-plus-mock-impl pattern used throughout this crate.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::BatchConfig;

use super::BatchError;

pub struct ProviderStatus {
    pub status: String,
    pub output_file_id: Option<String>,
    pub error_message: Option<String>,
}

#[async_trait]
pub trait BatchProvider: Send + Sync {
    async fn upload_file(&self, name: &str, contents: Vec<u8>) -> Result<String, BatchError>;
    async fn create_batch(&self, input_file_id: &str) -> Result<String, BatchError>;
    async fn get_status(&self, batch_id: &str) -> Result<ProviderStatus, BatchError>;
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, BatchError>;
    /// Best-effort delete; a 404 means "already gone" and counts as success.
    async fn delete_file(&self, file_id: &str) -> Result<(), BatchError>;
}

pub struct HttpBatchProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl HttpBatchProvider {
    pub fn new(cfg: &BatchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(cfg.http_timeout)
            .build()
            .expect("reqwest client builds");
        HttpBatchProvider {
            client,
            api_base: cfg.api_base.clone(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
        }
    }
}

#[derive(Deserialize)]
struct FileUploadResponse {
    id: String,
}

#[derive(Deserialize)]
struct BatchCreateResponse {
    id: String,
}

#[derive(Deserialize)]
struct BatchStatusResponse {
    status: String,
    output_file_id: Option<String>,
    errors: Option<serde_json::Value>,
}

#[async_trait]
impl BatchProvider for HttpBatchProvider {
    async fn upload_file(&self, name: &str, contents: Vec<u8>) -> Result<String, BatchError> {
        let part = reqwest::multipart::Part::bytes(contents)
            .file_name(name.to_string())
            .mime_str("application/jsonl")
            .map_err(|e| BatchError::Provider(e.to_string()))?;
        let form = reqwest::multipart::Form::new().text("purpose", "batch").part("file", part);

        let resp = self
            .client
            .post(format!("{}/v1/files", self.api_base))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BatchError::Provider(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(BatchError::Provider(format!("file upload failed: {}", resp.status())));
        }
        let body: FileUploadResponse =
            resp.json().await.map_err(|e| BatchError::Provider(e.to_string()))?;
        Ok(body.id)
    }

    async fn create_batch(&self, input_file_id: &str) -> Result<String, BatchError> {
        let resp = self
            .client
            .post(format!("{}/v1/batches", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "input_file_id": input_file_id,
                "endpoint": "/v1/chat/completions",
                "completion_window": "24h",
                "metadata": { "model": self.model },
            }))
            .send()
            .await
            .map_err(|e| BatchError::Provider(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(BatchError::Provider(format!("batch create failed: {}", resp.status())));
        }
        let body: BatchCreateResponse =
            resp.json().await.map_err(|e| BatchError::Provider(e.to_string()))?;
        Ok(body.id)
    }

    async fn get_status(&self, batch_id: &str) -> Result<ProviderStatus, BatchError> {
        let resp = self
            .client
            .get(format!("{}/v1/batches/{batch_id}", self.api_base))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| BatchError::Provider(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(BatchError::Provider(format!("status check failed: {}", resp.status())));
        }
        let body: BatchStatusResponse =
            resp.json().await.map_err(|e| BatchError::Provider(e.to_string()))?;
        Ok(ProviderStatus {
            status: body.status,
            output_file_id: body.output_file_id,
            error_message: body.errors.map(|e| e.to_string()),
        })
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, BatchError> {
        let resp = self
            .client
            .get(format!("{}/v1/files/{file_id}/content", self.api_base))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| BatchError::Provider(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(BatchError::Provider(format!("file download failed: {}", resp.status())));
        }
        Ok(resp.bytes().await.map_err(|e| BatchError::Provider(e.to_string()))?.to_vec())
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), BatchError> {
        let resp = self
            .client
            .delete(format!("{}/v1/files/{file_id}", self.api_base))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| BatchError::Provider(e.to_string()))?;
        if resp.status().is_success() || resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        tracing::warn!(status = %resp.status(), file_id, "batch file deletion failed, non-fatal");
        Ok(())
    }
}
