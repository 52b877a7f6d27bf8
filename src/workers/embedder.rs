//! Embedder loop: fills `*_embedding` columns across every table, in the
//! per-entity order fixed by §4.6 — Issue: title→body→summary; ForumPost:
//! conversation→summary; Doc: markdown→summary; QA: question→answer;
//! Keyword: one vector from keyword+definition+synonyms; Synonym: word
//! vector and a `"word: W\nsynonym_of: K"` relation vector.

use std::sync::Arc;

use crate::db::{vector_literal, Store};
use crate::embedding::Embedder;

use super::WorkerError;

const PAGE_SIZE: i64 = 100;

/// One column on one table: `text_col` supplies the source text, `vec_col`
/// is the embedding target. A row is a work item iff its text is non-null
/// and its vector is still null.
struct ColumnJob {
    table: &'static str,
    text_col: &'static str,
    vec_col: &'static str,
}

const JOBS: &[ColumnJob] = &[
    ColumnJob { table: "issues", text_col: "title", vec_col: "title_embedding" },
    ColumnJob { table: "issues", text_col: "body", vec_col: "issue_embedding" },
    ColumnJob { table: "issues", text_col: "llm_summary", vec_col: "summary_embedding" },
    ColumnJob { table: "discourse_posts", text_col: "conversation", vec_col: "conversation_embedding" },
    ColumnJob { table: "discourse_posts", text_col: "llm_summary", vec_col: "summary_embedding" },
    ColumnJob { table: "metabase_docs", text_col: "markdown", vec_col: "markdown_embedding" },
    ColumnJob { table: "metabase_docs", text_col: "llm_summary", vec_col: "summary_embedding" },
    ColumnJob { table: "questions", text_col: "question", vec_col: "question_embedding" },
    ColumnJob { table: "questions", text_col: "answer", vec_col: "answer_embedding" },
];

pub async fn run_cycle(store: &Store, embedder: &Arc<dyn Embedder>) -> Result<usize, WorkerError> {
    let mut total = 0usize;
    for job in JOBS {
        total += run_column_job(store, embedder, job).await?;
    }
    total += embed_keywords(store, embedder).await?;
    total += embed_synonyms(store, embedder).await?;
    Ok(total)
}

async fn run_column_job(store: &Store, embedder: &Arc<dyn Embedder>, job: &ColumnJob) -> Result<usize, WorkerError> {
    let sql = format!(
        "SELECT id, {text} FROM {table} WHERE {text} IS NOT NULL AND {vec} IS NULL LIMIT $1",
        text = job.text_col,
        table = job.table,
        vec = job.vec_col,
    );
    let rows: Vec<(i64, String)> = sqlx::query_as(&sql).bind(PAGE_SIZE).fetch_all(&store.pool).await?;
    if rows.is_empty() {
        return Ok(0);
    }

    let mut processed = 0usize;
    for (id, text) in rows {
        let Some(vec) = embedder.embed(&text).await? else { continue };
        let update = format!("UPDATE {table} SET {vec_col} = {literal} WHERE id = $1", table = job.table, vec_col = job.vec_col, literal = vector_literal(&vec));
        sqlx::query(&update).bind(id).execute(&store.pool).await?;
        processed += 1;
    }
    Ok(processed)
}

async fn embed_keywords(store: &Store, embedder: &Arc<dyn Embedder>) -> Result<usize, WorkerError> {
    let rows: Vec<(i64, String, String, Vec<String>)> = sqlx::query_as(
        "SELECT k.id, k.keyword, k.definition, \
         COALESCE(array_agg(s.word) FILTER (WHERE s.word IS NOT NULL), ARRAY[]::text[]) \
         FROM keyword_definitions k LEFT JOIN synonyms s ON s.synonym_of = k.keyword \
         WHERE k.keyword_embedding IS NULL GROUP BY k.id LIMIT $1",
    )
    .bind(PAGE_SIZE)
    .fetch_all(&store.pool)
    .await?;
    if rows.is_empty() {
        return Ok(0);
    }

    let mut processed = 0usize;
    for (id, keyword, definition, synonyms) in rows {
        let composed = format!("{keyword}: {definition}\nsynonyms: {}", synonyms.join(", "));
        let Some(vec) = embedder.embed(&composed).await? else { continue };
        let update = format!("UPDATE keyword_definitions SET keyword_embedding = {} WHERE id = $1", vector_literal(&vec));
        sqlx::query(&update).bind(id).execute(&store.pool).await?;
        processed += 1;
    }
    Ok(processed)
}

async fn embed_synonyms(store: &Store, embedder: &Arc<dyn Embedder>) -> Result<usize, WorkerError> {
    let rows: Vec<(i64, String, String)> = sqlx::query_as(
        "SELECT id, word, synonym_of FROM synonyms WHERE word_embedding IS NULL OR synonym_embedding IS NULL LIMIT $1",
    )
    .bind(PAGE_SIZE)
    .fetch_all(&store.pool)
    .await?;
    if rows.is_empty() {
        return Ok(0);
    }

    let mut processed = 0usize;
    for (id, word, synonym_of) in rows {
        let Some(word_vec) = embedder.embed(&word).await? else { continue };
        let relation_text = format!("word: {word}\nsynonym_of: {synonym_of}");
        let Some(relation_vec) = embedder.embed(&relation_text).await? else { continue };
        let update = format!(
            "UPDATE synonyms SET word_embedding = {}, synonym_embedding = {} WHERE id = $1",
            vector_literal(&word_vec),
            vector_literal(&relation_vec),
        );
        sqlx::query(&update).bind(id).execute(&store.pool).await?;
        processed += 1;
    }
    Ok(processed)
}
