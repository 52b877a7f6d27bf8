//! Similarity Search Engine (C8) and Reranked Search Facade (C9).
//!
//! SQL shape grounded exactly in
//! `original_source/src/similarity_query_builder.py`: one CTE per embedding
//! column, `1 - (col <=> embedding) AS similarity`, `UNION ALL`, outer
//! `GROUP BY` with `MAX(similarity)`.

pub mod rerank_facade;

use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::db::{vector_literal, DbError, DbResult, Store};

/// One embedding column contributing a CTE to the union.
pub struct ColumnSpec {
    pub purpose: &'static str,
    pub column: &'static str,
}

pub struct SimilarityQuery {
    pub table: &'static str,
    pub select_cols: &'static str,
    pub group_by: &'static str,
    pub columns: Vec<ColumnSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityRow {
    pub id: i64,
    pub similarity: f32,
}

pub struct SimilarityEngine {
    store: Store,
    pub default_limit: i64,
    pub candidates_per_column: i64,
}

impl SimilarityEngine {
    pub fn new(store: Store, default_limit: i64, candidates_per_column: i64) -> Self {
        SimilarityEngine { store, default_limit, candidates_per_column }
    }

    /// Build the CTE union-merge SQL for `query`. Exposed separately from
    /// `search` so tests can assert on the generated shape without a live
    /// database.
    pub fn build_query(
        &self,
        query: &SimilarityQuery,
        embedding: &[f32],
        where_clause: Option<&str>,
        limit: Option<i64>,
    ) -> String {
        let limit = limit.unwrap_or(self.default_limit);
        let embedding_sql = vector_literal(embedding);

        let mut ctes = Vec::new();
        let mut union_parts = Vec::new();
        for col in &query.columns {
            let cte_name = format!("{}_{}_sim", query.table, col.purpose);
            ctes.push(format!(
                "{cte_name} AS (\n    SELECT {sel}, 1 - ({col} <=> {emb}) AS similarity\n    FROM {table}\n    WHERE {col} IS NOT NULL\n    ORDER BY {col} <=> {emb}\n    LIMIT {cand}\n)",
                cte_name = cte_name,
                sel = query.select_cols,
                col = col.column,
                emb = embedding_sql,
                table = query.table,
                cand = self.candidates_per_column,
            ));
            union_parts.push(format!("SELECT * FROM {cte_name}"));
        }

        let all_sim = format!("all_sim AS (\n    {}\n)", union_parts.join("\n    UNION ALL\n    "));
        let where_part = where_clause.map(|w| format!("WHERE {w}")).unwrap_or_default();

        format!(
            "WITH {ctes},\n{all_sim}\nSELECT {group_by}, MAX(similarity) AS similarity\nFROM all_sim\n{where_part}\nGROUP BY {group_by}\nORDER BY similarity DESC\nLIMIT {limit}",
            ctes = ctes.join(",\n"),
            all_sim = all_sim,
            group_by = query.group_by,
            where_part = where_part,
            limit = limit,
        )
    }

    pub async fn search(
        &self,
        query: &SimilarityQuery,
        embedding: &[f32],
        where_clause: Option<&str>,
        limit: Option<i64>,
    ) -> DbResult<Vec<SimilarityRow>> {
        let sql = self.build_query(query, embedding, where_clause, limit);
        let rows = sqlx::query(&sql).fetch_all(&self.store.pool).await.map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(|r| SimilarityRow { id: r.get::<i64, _>("id"), similarity: r.get::<f32, _>("similarity") })
            .collect())
    }
}

pub fn issue_query() -> SimilarityQuery {
    SimilarityQuery {
        table: "issues",
        select_cols: "id",
        group_by: "id",
        columns: vec![
            ColumnSpec { purpose: "title", column: "title_embedding" },
            ColumnSpec { purpose: "body", column: "issue_embedding" },
            ColumnSpec { purpose: "summary", column: "summary_embedding" },
        ],
    }
}

pub fn forum_query() -> SimilarityQuery {
    SimilarityQuery {
        table: "discourse_posts",
        select_cols: "id",
        group_by: "id",
        columns: vec![
            ColumnSpec { purpose: "conversation", column: "conversation_embedding" },
            ColumnSpec { purpose: "summary", column: "summary_embedding" },
            ColumnSpec { purpose: "solution", column: "solution_embedding" },
        ],
    }
}

pub fn doc_query() -> SimilarityQuery {
    SimilarityQuery {
        table: "metabase_docs",
        select_cols: "id",
        group_by: "id",
        columns: vec![
            ColumnSpec { purpose: "markdown", column: "markdown_embedding" },
            ColumnSpec { purpose: "summary", column: "summary_embedding" },
        ],
    }
}

pub fn qa_query() -> SimilarityQuery {
    SimilarityQuery {
        table: "questions",
        select_cols: "id",
        group_by: "id",
        columns: vec![
            ColumnSpec { purpose: "question", column: "question_embedding" },
            ColumnSpec { purpose: "answer", column: "answer_embedding" },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SimilarityEngine {
        // No live pool needed: build_query never touches the database.
        SimilarityEngine { store: Store { pool: unconnected_pool() }, default_limit: 10, candidates_per_column: 20 }
    }

    fn unconnected_pool() -> sqlx::PgPool {
        sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/does-not-matter")
            .expect("lazy pool construction never touches the network")
    }

    #[test]
    fn builds_one_cte_per_column_unioned_and_grouped() {
        let engine = engine();
        let sql = engine.build_query(&issue_query(), &[0.1, 0.2, 0.3], None, None);
        assert!(sql.contains("issues_title_sim AS ("));
        assert!(sql.contains("issues_body_sim AS ("));
        assert!(sql.contains("issues_summary_sim AS ("));
        assert!(sql.contains("UNION ALL"));
        assert!(sql.contains("GROUP BY id"));
        assert!(sql.contains("ORDER BY similarity DESC"));
        assert!(sql.contains("LIMIT 10"));
        assert!(sql.contains("'[0.1,0.2,0.3]'::vector"));
    }

    #[test]
    fn respects_custom_limit_and_where_clause() {
        let engine = engine();
        let sql = engine.build_query(&issue_query(), &[1.0], Some("state = 'open'"), Some(5));
        assert!(sql.contains("WHERE state = 'open'"));
        assert!(sql.contains("LIMIT 5"));
    }
}
