//! Relational data model (§3). Column names mirror `original_source/src/models.py`
//! so the SQL in `search` and `batch` reads directly off these field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Polymorphic reference to the entity a QA pair or chat session entity was
/// derived from. Modeled as a tagged variant rather than a runtime-typed
/// relationship, per the "Polymorphic source references" redesign note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[sqlx(rename_all = "snake_case")]
pub enum SourceKind {
    Issue,
    DiscoursePost,
    MetabaseDoc,
}

impl SourceKind {
    pub fn table_name(self) -> &'static str {
        match self {
            SourceKind::Issue => "issues",
            SourceKind::DiscoursePost => "discourse_posts",
            SourceKind::MetabaseDoc => "metabase_docs",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Issue => "issue",
            SourceKind::DiscoursePost => "discourse_post",
            SourceKind::MetabaseDoc => "metabase_doc",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub number: i64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub labels: Option<serde_json::Value>,
    pub user_login: String,
    pub llm_summary: Option<String>,
    pub reported_version: Option<String>,
    pub stack_trace_file: Option<String>,
    pub fixed_in_version: Option<String>,
    pub token_count: Option<i32>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ForumPost {
    pub id: i64,
    pub topic_id: i64,
    pub title: String,
    pub conversation: String,
    pub created_at: DateTime<Utc>,
    pub slug: String,
    pub llm_summary: Option<String>,
    pub type_of_topic: Option<String>,
    pub solution: Option<String>,
    pub version: Option<String>,
    pub reference: Option<String>,
    pub token_count: Option<i32>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Doc {
    pub id: i64,
    pub url: String,
    pub markdown: String,
    pub llm_summary: Option<String>,
    pub token_count: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Qa {
    pub id: i64,
    pub source_type: SourceKind,
    pub source_id: i64,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Keyword {
    pub id: i64,
    pub keyword: String,
    pub definition: String,
    pub category: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Synonym {
    pub id: i64,
    pub word: String,
    pub synonym_of: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[sqlx(rename_all = "snake_case")]
pub enum OperationKind {
    Summarize,
    Questions,
    QuestionsAndConcepts,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Summarize => "summarize",
            OperationKind::Questions => "questions",
            OperationKind::QuestionsAndConcepts => "questions_and_concepts",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[sqlx(rename_all = "snake_case")]
pub enum BatchStatus {
    Created,
    Sent,
    InProgress,
    Finalizing,
    Completed,
    Failed,
    Expired,
    Cancelled,
    ProcessingFailed,
    Error,
}

impl BatchStatus {
    /// True if `next` is a legal successor of `self` per the monotonic state
    /// machine in §4.7. `error` is reachable from any non-terminal state.
    pub fn can_transition_to(self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        if next == Error {
            return !matches!(self, Completed | Failed | Expired | Cancelled | ProcessingFailed);
        }
        matches!(
            (self, next),
            (Created, Sent)
                | (Sent, InProgress)
                | (Sent, Finalizing)
                | (Sent, Completed)
                | (Sent, Failed)
                | (Sent, Expired)
                | (Sent, Cancelled)
                | (InProgress, Finalizing)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Expired)
                | (InProgress, Cancelled)
                | (Finalizing, Completed)
                | (Finalizing, Failed)
                | (Finalizing, Expired)
                | (Finalizing, Cancelled)
                | (Completed, ProcessingFailed)
        )
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct BatchProcess {
    pub id: i64,
    pub batch_id: String,
    pub provider: String,
    pub operation_type: OperationKind,
    pub table_name: String,
    pub total_requests: i32,
    pub sent_at: Option<DateTime<Utc>>,
    pub received_at: Option<DateTime<Utc>>,
    pub status: BatchStatus,
    pub input_file_path: Option<String>,
    pub output_file_path: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ApiKeyRow {
    pub id: i64,
    pub key: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: i64,
    pub chat_id: i64,
    pub user_request: String,
    pub prompt: Option<String>,
    pub sources: Option<serde_json::Value>,
    pub response: Option<String>,
    pub tokens_sent: Option<i32>,
    pub tokens_received: Option<i32>,
    pub cache_hit: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ChatSessionEntity {
    pub id: i64,
    pub chat_id: i64,
    pub entity_type: String,
    pub entity_id: i64,
    pub entity_url: Option<String>,
    pub similarity_score: Option<f32>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_status_transitions_are_monotonic() {
        assert!(BatchStatus::Created.can_transition_to(BatchStatus::Sent));
        assert!(!BatchStatus::Created.can_transition_to(BatchStatus::Completed));
        assert!(BatchStatus::Sent.can_transition_to(BatchStatus::InProgress));
        assert!(BatchStatus::Completed.can_transition_to(BatchStatus::ProcessingFailed));
        assert!(!BatchStatus::Completed.can_transition_to(BatchStatus::Error));
        assert!(BatchStatus::InProgress.can_transition_to(BatchStatus::Error));
    }

    #[test]
    fn source_kind_table_names_match_schema() {
        assert_eq!(SourceKind::Issue.table_name(), "issues");
        assert_eq!(SourceKind::DiscoursePost.table_name(), "discourse_posts");
        assert_eq!(SourceKind::MetabaseDoc.table_name(), "metabase_docs");
    }
}
