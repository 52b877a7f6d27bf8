//! Summarizer loop: fills `llm_summary` across issues/forum posts/docs using
//! C4's **fast** model, in small batched calls (up to `PAGE_SIZE` items per
//! prompt) returning a JSON object mapping id → summary (§4.6).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::db::Store;
use crate::llm::{CallOptions, ChatMessage, LlmClient, ModelAlias};

use super::WorkerError;

const PAGE_SIZE: i64 = 300;
const SYSTEM_PROMPT: &str =
    "Summarize each entity below in two to three sentences, preserving any version numbers or \
     stack traces mentioned. Respond ONLY as a JSON object mapping each id (as a string) to its \
     summary string — no surrounding prose.";

#[derive(Debug, Clone, Copy)]
enum Table {
    Issue,
    ForumPost,
    Doc,
}

const TABLES: [Table; 3] = [Table::Issue, Table::ForumPost, Table::Doc];

impl Table {
    fn select_sql(self) -> &'static str {
        match self {
            Table::Issue => "SELECT id, title, body FROM issues WHERE llm_summary IS NULL LIMIT $1",
            Table::ForumPost => "SELECT id, title, conversation FROM discourse_posts WHERE llm_summary IS NULL LIMIT $1",
            Table::Doc => "SELECT id, url, markdown FROM metabase_docs WHERE llm_summary IS NULL LIMIT $1",
        }
    }

    fn update_sql(self) -> &'static str {
        match self {
            Table::Issue => "UPDATE issues SET llm_summary = $1 WHERE id = $2",
            Table::ForumPost => "UPDATE discourse_posts SET llm_summary = $1 WHERE id = $2",
            Table::Doc => "UPDATE metabase_docs SET llm_summary = $1 WHERE id = $2",
        }
    }
}

/// One pass over all three tables. Returns the number of rows summarized.
pub async fn run_cycle(store: &Store, llm: &Arc<dyn LlmClient>) -> Result<usize, WorkerError> {
    let mut total = 0usize;
    for table in TABLES {
        total += summarize_table(store, llm, table).await?;
    }
    Ok(total)
}

async fn summarize_table(store: &Store, llm: &Arc<dyn LlmClient>, table: Table) -> Result<usize, WorkerError> {
    let rows: Vec<(i64, String, Option<String>)> =
        sqlx::query_as(table.select_sql()).bind(PAGE_SIZE).fetch_all(&store.pool).await?;
    if rows.is_empty() {
        return Ok(0);
    }

    let mut user = String::from("Entities:\n");
    for (id, field_a, field_b) in &rows {
        user.push_str(&format!("id={id}\n{field_a}\n{}\n\n", field_b.as_deref().unwrap_or_default()));
    }

    let messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)];
    let mut opts = CallOptions::new();
    opts.response_format_json = true;
    opts.inject_keywords = false;

    let Some(response) = llm.call(messages, ModelAlias::Fast, opts).await? else {
        return Ok(0);
    };

    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&response) else {
        tracing::warn!(table = ?table, "summarizer: response was not a JSON object, skipping cycle");
        return Ok(0);
    };

    let summaries: HashMap<i64, String> = map
        .into_iter()
        .filter_map(|(k, v)| Some((k.parse::<i64>().ok()?, v.as_str()?.to_string())))
        .collect();

    let mut updated = 0usize;
    for (id, _, _) in &rows {
        let Some(summary) = summaries.get(id) else { continue };
        sqlx::query(table.update_sql()).bind(summary).bind(id).execute(&store.pool).await?;
        updated += 1;
    }
    Ok(updated)
}
