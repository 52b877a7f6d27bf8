//! Process-wide configuration, loaded once at startup from the environment.
//!
//! Grounded in the donor CLI's `clap`/`dirs` configuration style, generalized
//! to an env-var-first layout since this crate runs as a long-lived service
//! rather than a one-shot CLI invocation. `dotenvy::dotenv()` is called once
//! in `main` before `Config::from_env()` so a local `.env` file is honored.

use std::time::Duration;

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    Local,
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankerProvider {
    Local,
    Api,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub device: String,
    pub api_base: String,
    pub api_key: String,
    pub api_path: String,
    pub dimensions: usize,
}

#[derive(Debug, Clone)]
pub struct RerankerConfig {
    pub enabled: bool,
    pub provider: RerankerProvider,
    pub model: String,
    pub device: String,
    pub max_candidates: usize,
    pub batch_size: usize,
    pub api_base: String,
    pub api_key: String,
    pub api_path: String,
    pub api_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    pub model_name: String,
    pub rpm: u32,
    pub fast_model: String,
    pub slow_model: String,
    pub max_retries: u32,
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub entities_per_batch: usize,
    pub poll_interval: Duration,
    pub http_timeout: Duration,
    pub dir: std::path::PathBuf,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub backoff: Duration,
    pub max_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct SimilarityConfig {
    pub default_limit: i64,
    pub candidate_limit: i64,
    pub chat_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub similarity_per_minute: u32,
    pub embedding_per_minute: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub reranker: RerankerConfig,
    pub llm: LlmConfig,
    pub batch: BatchConfig,
    pub worker: WorkerConfig,
    pub similarity: SimilarityConfig,
    pub rate_limit: RateLimitConfig,
    pub api_key: String,
    pub http_timeout: Duration,
    pub bind_addr: String,
}

impl Config {
    /// Read configuration from the process environment. Missing values fall
    /// back to the defaults documented in SPEC_FULL.md §6.
    pub fn from_env() -> Self {
        let embedding_provider = match env_string("EMBEDDING_PROVIDER", "local").as_str() {
            "api" => EmbeddingProvider::Api,
            _ => EmbeddingProvider::Local,
        };
        let reranker_provider = match env_string("RERANKER_PROVIDER", "local").as_str() {
            "api" => RerankerProvider::Api,
            _ => RerankerProvider::Local,
        };
        let api_key = env_string("API_KEY", "a_super_secret_key_for_your_api");

        Config {
            database: DatabaseConfig {
                url: env_string(
                    "DATABASE_URL",
                    "postgres://localhost/similarity_engine",
                ),
                max_connections: env_parsed("DATABASE_POOL_MAX_CONNECTIONS", 10),
                min_connections: env_parsed("DATABASE_POOL_MIN_CONNECTIONS", 1),
                connect_timeout: Duration::from_secs(env_parsed(
                    "DATABASE_CONNECT_TIMEOUT_SECONDS",
                    10,
                )),
                idle_timeout: Duration::from_secs(env_parsed(
                    "DATABASE_IDLE_TIMEOUT_SECONDS",
                    600,
                )),
            },
            embedding: EmbeddingConfig {
                provider: embedding_provider,
                model: env_string("EMBEDDING_MODEL", "sentence-transformers/all-mpnet-base-v2"),
                device: env_string("EMBEDDING_DEVICE", "cpu"),
                api_base: env_string("EMBEDDING_API_BASE", "http://localhost:8000"),
                api_key: env_opt_string("EMBEDDING_API_KEY").unwrap_or_else(|| api_key.clone()),
                api_path: env_string("EMBEDDING_API_PATH", "/embedding"),
                dimensions: env_parsed("EMBEDDING_DIM", 768),
            },
            reranker: RerankerConfig {
                enabled: env_parsed("RERANKER_ENABLED", true),
                provider: reranker_provider,
                model: env_string("RERANKER_MODEL", "cross-encoder/ms-marco-MiniLM-L6-v2"),
                device: env_string("RERANKER_DEVICE", "cpu"),
                max_candidates: env_parsed("RERANKER_MAX_CANDIDATES", 20),
                batch_size: env_parsed("RERANKER_BATCH_SIZE", 8),
                api_base: env_string("RERANKER_API_BASE", "http://localhost:8000"),
                api_key: env_opt_string("RERANKER_API_KEY").unwrap_or_else(|| api_key.clone()),
                api_path: env_string("RERANKER_API_PATH", "/rerank"),
                api_timeout: Duration::from_secs(env_parsed("RERANKER_API_TIMEOUT", 30)),
            },
            llm: LlmConfig {
                api_base: env_string("LITELLM_API_BASE", "http://localhost:4000"),
                api_key: env_string("LITELLM_API_KEY", "your-litellm-proxy-api-key"),
                model_name: env_string("LITELLM_MODEL_NAME", "gemini-2.5-flash-lite-preview-06-17"),
                rpm: env_parsed("LITELLM_RPM", 15),
                fast_model: env_string("LITELLM_FAST_MODEL", "openai-fast"),
                slow_model: env_string("LITELLM_SLOW_MODEL", "openai-slow"),
                max_retries: env_parsed("LLM_MAX_RETRIES", 3),
            },
            batch: BatchConfig {
                api_base: env_string("OPENAI_API_BASE", "https://api.openai.com"),
                api_key: env_string("OPENAI_API_KEY", "your_openai_api_key_here"),
                model: env_string("OPENAI_BATCH_MODEL", "gpt-4.1-nano"),
                entities_per_batch: env_parsed("OPENAI_BATCH_ENTITIES_PER_BATCH", 100),
                poll_interval: Duration::from_secs(env_parsed(
                    "WORKER_POLL_INTERVAL_SECONDS",
                    5,
                )),
                http_timeout: Duration::from_secs(env_parsed("HTTP_TIMEOUT_SECONDS", 30)),
                dir: std::path::PathBuf::from(env_string("BATCH_DIR", "./batch")),
            },
            worker: WorkerConfig {
                poll_interval: Duration::from_secs(env_parsed(
                    "WORKER_POLL_INTERVAL_SECONDS",
                    5,
                )),
                backoff: Duration::from_secs(env_parsed("WORKER_BACKOFF_SECONDS", 60)),
                max_backoff: Duration::from_secs(env_parsed("WORKER_MAX_BACKOFF_SECONDS", 600)),
            },
            similarity: SimilarityConfig {
                default_limit: env_parsed("SIMILARITY_DEFAULT_LIMIT", 10),
                candidate_limit: env_parsed("SIMILARITY_CANDIDATE_LIMIT", 20),
                chat_threshold: env_parsed("SIMILARITY_CHAT_THRESHOLD", 0.5),
            },
            rate_limit: RateLimitConfig {
                similarity_per_minute: env_parsed("RATE_LIMIT_PER_MINUTE", 10),
                embedding_per_minute: env_parsed("RATE_LIMIT_EMBEDDING_PER_MINUTE", 100),
            },
            api_key,
            http_timeout: Duration::from_secs(env_parsed("HTTP_TIMEOUT_SECONDS", 30)),
            bind_addr: env_string("BIND_ADDR", "0.0.0.0:8080"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values_when_env_unset() {
        // SAFETY: test runs single-threaded per process; no other test mutates these keys.
        for key in ["LITELLM_RPM", "EMBEDDING_DIM", "RERANKER_ENABLED"] {
            std::env::remove_var(key);
        }
        let cfg = Config::from_env();
        assert_eq!(cfg.llm.rpm, 15);
        assert_eq!(cfg.embedding.dimensions, 768);
        assert!(cfg.reranker.enabled);
    }
}
