//! Vector Store Adapter (C1): pooled Postgres+pgvector persistence.
//!
//! Grounded in the donor's `storage::traits::GraphStore` contract (a trait
//! with explicit CRUD + error enum), generalized from a single
//! `Mutex<Connection>` to a real `sqlx::PgPool` because the distilled spec's
//! own contract text requires "connection pool with pre-ping and idle
//! recycling; keepalives enabled; connect timeout bounded" — a property a
//! single mutex-guarded connection cannot provide.

pub mod models;

use sqlx::postgres::{PgPoolOptions, PgPool};
use thiserror::Error;

use crate::config::DatabaseConfig;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thin wrapper around the pool plus the handful of cross-cutting helpers
/// (missing-row scans, embedding patches) shared by every worker and
/// handler. Table-specific queries live in `search`, `batch`, and `keywords`
/// next to the logic that needs them, rather than centralized here, mirroring
/// the donor's preference for per-concern modules over a single god-object
/// store.
#[derive(Clone)]
pub struct Store {
    pub pool: PgPool,
}

impl Store {
    pub async fn connect(cfg: &DatabaseConfig) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .min_connections(cfg.min_connections)
            .acquire_timeout(cfg.connect_timeout)
            .idle_timeout(cfg.idle_timeout)
            .test_before_acquire(true)
            .connect(&cfg.url)
            .await?;
        Ok(Store { pool })
    }

    #[cfg(test)]
    pub fn from_pool(pool: PgPool) -> Self {
        Store { pool }
    }

    /// Run idempotent schema migrations. Kept as a single `CREATE TABLE IF
    /// NOT EXISTS` batch rather than a versioned migration chain — schema
    /// DDL management proper is explicitly out of scope (§1).
    pub async fn migrate(&self) -> DbResult<()> {
        sqlx::query(include_str!("schema.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Seed a bootstrap API key if the table is empty, so a fresh deployment
    /// is reachable without a separate admin step.
    pub async fn ensure_bootstrap_api_key(&self, key: &str) -> DbResult<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_keys")
            .fetch_one(&self.pool)
            .await?;
        if count == 0 {
            sqlx::query("INSERT INTO api_keys (key, description) VALUES ($1, $2)")
                .bind(key)
                .bind("bootstrap key")
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn is_valid_api_key(&self, key: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_keys WHERE key = $1")
            .bind(key)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

/// Render an embedding vector as the literal `'[v1,v2,...]'::vector` SQL
/// fragment the original uses, since the driver cannot reliably bind a
/// vector parameter. This is the *only* place in the crate allowed to
/// format a vector as SQL text — everything else calls through here
/// (§9 "Vector SQL" design note).
pub fn vector_literal(vec: &[f32]) -> String {
    let mut s = String::with_capacity(vec.len() * 8 + 2);
    s.push('\'');
    s.push('[');
    for (i, v) in vec.iter().enumerate() {
        if i > 0 {
            s.push(',');
        }
        s.push_str(&v.to_string());
    }
    s.push(']');
    s.push('\'');
    s.push_str("::vector");
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_literal_formats_as_pgvector_literal() {
        assert_eq!(vector_literal(&[1.0, 0.5, -2.0]), "'[1,0.5,-2]'::vector");
    }

    #[test]
    fn vector_literal_empty_vector() {
        assert_eq!(vector_literal(&[]), "'[]'::vector");
    }
}
