//! Build phase: select candidates, partition into entity-batches, and write
//! provider-ready JSONL request files. Ground truth for formatting rules
//! (`custom_id` shape, per-field truncation, max_tokens split by operation)
//! is `original_source/src/batch_processor.py` as summarized in
//! SPEC_FULL.md §4.7.

use std::path::PathBuf;

use serde::Serialize;

use crate::db::models::OperationKind;
use crate::db::{DbResult, Store};
use crate::keywords::KeywordService;

pub const MAX_CANDIDATES: i64 = 50_000;
const FIELD_TRUNCATE_LEN: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchTableKind {
    Issue,
    ForumPost,
    Doc,
}

impl BatchTableKind {
    pub fn table_name(self) -> &'static str {
        match self {
            BatchTableKind::Issue => "issues",
            BatchTableKind::ForumPost => "discourse_posts",
            BatchTableKind::Doc => "metabase_docs",
        }
    }

    pub fn source_kind(self) -> crate::db::models::SourceKind {
        match self {
            BatchTableKind::Issue => crate::db::models::SourceKind::Issue,
            BatchTableKind::ForumPost => crate::db::models::SourceKind::DiscoursePost,
            BatchTableKind::Doc => crate::db::models::SourceKind::MetabaseDoc,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: i64,
    pub fields: Vec<(&'static str, String)>,
}

fn truncate(s: &str) -> String {
    s.chars().take(FIELD_TRUNCATE_LEN).collect()
}

/// Select up to `MAX_CANDIDATES` rows missing the target artifact for
/// `(operation, table)`. `summarize` targets rows with no `llm_summary` yet;
/// `questions`/`questions_and_concepts` target summarized rows that have not
/// yet produced a QA row.
pub async fn select_candidates(
    store: &Store,
    operation: OperationKind,
    table: BatchTableKind,
) -> DbResult<Vec<Candidate>> {
    let sql = match (operation, table) {
        (OperationKind::Summarize, BatchTableKind::Issue) => {
            "SELECT id, title, body FROM issues WHERE llm_summary IS NULL LIMIT $1"
        }
        (OperationKind::Summarize, BatchTableKind::ForumPost) => {
            "SELECT id, title, conversation FROM discourse_posts WHERE llm_summary IS NULL LIMIT $1"
        }
        (OperationKind::Summarize, BatchTableKind::Doc) => {
            "SELECT id, url, markdown FROM metabase_docs WHERE llm_summary IS NULL LIMIT $1"
        }
        (_, BatchTableKind::Issue) => {
            "SELECT i.id, i.title, i.llm_summary FROM issues i \
             WHERE i.llm_summary IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM questions q WHERE q.source_type = 'issue' AND q.source_id = i.id) \
             LIMIT $1"
        }
        (_, BatchTableKind::ForumPost) => {
            "SELECT d.id, d.title, d.llm_summary FROM discourse_posts d \
             WHERE d.llm_summary IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM questions q WHERE q.source_type = 'discourse_post' AND q.source_id = d.id) \
             LIMIT $1"
        }
        (_, BatchTableKind::Doc) => {
            "SELECT m.id, m.url, m.llm_summary FROM metabase_docs m \
             WHERE m.llm_summary IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM questions q WHERE q.source_type = 'metabase_doc' AND q.source_id = m.id) \
             LIMIT $1"
        }
    };

    let rows: Vec<(i64, String, Option<String>)> =
        sqlx::query_as(sql).bind(MAX_CANDIDATES).fetch_all(&store.pool).await?;

    Ok(rows
        .into_iter()
        .map(|(id, field_a, field_b)| Candidate {
            id,
            fields: vec![
                ("primary", truncate(&field_a)),
                ("secondary", truncate(&field_b.unwrap_or_default())),
            ],
        })
        .collect())
}

pub fn partition(candidates: Vec<Candidate>, entities_per_batch: usize) -> Vec<Vec<Candidate>> {
    candidates.chunks(entities_per_batch.max(1)).map(|c| c.to_vec()).collect()
}

fn max_tokens_for(operation: OperationKind) -> u32 {
    match operation {
        OperationKind::Summarize => 2000,
        OperationKind::Questions | OperationKind::QuestionsAndConcepts => 3000,
    }
}

fn task_prompt(operation: OperationKind) -> &'static str {
    match operation {
        OperationKind::Summarize => {
            "Summarize each entity below in two to three sentences. Respond as a JSON object \
             mapping each numeric id to its summary string."
        }
        OperationKind::Questions => {
            "For each entity below, extract the question being asked and its answer, if any. \
             Respond as a JSON array of objects with fields id, question, answer."
        }
        OperationKind::QuestionsAndConcepts => {
            "For each entity below, extract the question, its answer (if present), and any \
             specialized concept/terminology worth defining. Respond as a JSON array of objects \
             with fields id, question, answer, concept."
        }
    }
}

#[derive(Serialize)]
struct BatchRequestLine<'a> {
    custom_id: String,
    method: &'static str,
    url: &'static str,
    body: BatchRequestBody<'a>,
}

#[derive(Serialize)]
struct BatchRequestBody<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    response_format: serde_json::Value,
    messages: Vec<serde_json::Value>,
}

/// Render one entity-batch as a single provider request line, grounded in
/// §4.7's `custom_id` format and message-assembly rule.
pub async fn build_request_line(
    model: &str,
    operation: OperationKind,
    table: BatchTableKind,
    batch_index: usize,
    batch: &[Candidate],
    keywords: &KeywordService,
) -> String {
    let ids: Vec<String> = batch.iter().map(|c| c.id.to_string()).collect();
    let custom_id = format!(
        "efficient_{}_{}_batch_{}_{}",
        operation.as_str(),
        table.table_name(),
        batch_index,
        ids.join(",")
    );

    let concatenated: String = batch.iter().flat_map(|c| c.fields.iter().map(|(_, v)| v.as_str())).collect();
    let keyword_block =
        match keywords.get_relevant_keywords(&concatenated).await {
            Ok(relevant) if !relevant.is_empty() => {
                let mut block = String::from("\nRelevant terminology:\n");
                for kw in relevant {
                    block.push_str(&format!("- {}: {}\n", kw.keyword, kw.definition));
                }
                block
            }
            _ => String::new(),
        };

    let system = format!(
        "You are a support-content processing assistant for this project.{keyword_block}\n{}",
        task_prompt(operation)
    );

    let mut user = String::from("Entities:\n");
    for candidate in batch {
        user.push_str(&format!("id={}\n", candidate.id));
        for (name, value) in &candidate.fields {
            if !value.is_empty() {
                user.push_str(&format!("{name}: {value}\n"));
            }
        }
        user.push('\n');
    }

    let line = BatchRequestLine {
        custom_id,
        method: "POST",
        url: "/v1/chat/completions",
        body: BatchRequestBody {
            model,
            temperature: 0.1,
            max_tokens: max_tokens_for(operation),
            response_format: serde_json::json!({ "type": "json_object" }),
            messages: vec![
                serde_json::json!({ "role": "system", "content": system }),
                serde_json::json!({ "role": "user", "content": user }),
            ],
        },
    };

    serde_json::to_string(&line).expect("batch request line serializes")
}

pub fn jsonl_path(dir: &std::path::Path, operation: OperationKind, table: BatchTableKind, id: &str) -> PathBuf {
    dir.join("sent").join(format!("efficient_{}_{}_{}.jsonl", operation.as_str(), table.table_name(), id))
}
