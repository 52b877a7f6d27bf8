//! Duplicate-detection and retrieval-augmented Q&A service over an open
//! source project's support surface: GitHub issues, Discourse forum posts,
//! and documentation pages.
//!
//! Pipeline: incoming text is embedded (`embedding`), searched against
//! stored entities via pgvector cosine similarity (`search`), optionally
//! reranked by a cross-encoder, and surfaced either as raw similarity
//! results or woven into a security-filtered RAG answer (`chat`).
//! Background workers (`workers`) keep summaries and embeddings current;
//! a batch orchestrator (`batch`) offloads bulk summarization and question
//! extraction to an asynchronous batch API. `http` exposes all of it as an
//! authenticated, rate-limited JSON API.

pub mod batch;
pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod http;
pub mod keywords;
pub mod llm;
pub mod reranker;
pub mod search;
pub mod workers;

pub use config::Config;
pub use db::Store;
pub use error::{ApiError, ApiResult};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
