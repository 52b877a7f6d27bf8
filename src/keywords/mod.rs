//! Keyword/Synonym Service (C5). Ground truth for the relevance algorithm,
//! plural-generation rule, and prompt-injection formatting:
//! `original_source/src/keyword_service.py`.

use std::collections::{HashMap, HashSet};

use crate::db::{
    models::{Keyword, Synonym},
    DbError, DbResult, Store,
};

#[derive(Debug, Clone)]
pub struct RelevantKeyword {
    pub keyword: String,
    pub definition: String,
    pub category: String,
}

pub struct KeywordService {
    store: Store,
}

/// Generate potential plural forms of a lowercased word: ending in 'y' →
/// replace with "ies"; else, if not already ending in 's', append 's'.
/// A word already ending in 's' gets no plural form (matches the original
/// exactly, including that corner case).
fn generate_plural_forms(word: &str) -> Vec<String> {
    if let Some(stem) = word.strip_suffix('y') {
        vec![format!("{stem}ies")]
    } else if !word.ends_with('s') {
        vec![format!("{word}s")]
    } else {
        Vec::new()
    }
}

fn check_keyword_match(
    keyword: &str,
    message_lower: &str,
    found_keywords: &HashSet<String>,
    target_keyword: Option<&str>,
) -> bool {
    let check_keyword = target_keyword.unwrap_or(keyword);
    if found_keywords.contains(check_keyword) {
        return false;
    }
    if message_lower.contains(keyword) {
        return true;
    }
    generate_plural_forms(keyword).iter().any(|p| message_lower.contains(p.as_str()))
}

impl KeywordService {
    pub fn new(store: Store) -> Self {
        KeywordService { store }
    }

    pub async fn get_active_keywords(&self) -> DbResult<Vec<Keyword>> {
        sqlx::query_as::<_, Keyword>(
            "SELECT * FROM keyword_definitions WHERE is_active = true ORDER BY keyword",
        )
        .fetch_all(&self.store.pool)
        .await
        .map_err(DbError::from)
    }

    /// Compute the subset of active keywords relevant to `message`, per the
    /// four-step algorithm in §4.5: lowercase, substring/plural match on
    /// keywords, substring/plural match on synonyms mapped back to their
    /// canonical keyword, dedup.
    pub async fn get_relevant_keywords(&self, message: &str) -> DbResult<Vec<RelevantKeyword>> {
        let keywords = self.get_active_keywords().await?;
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        let synonyms: Vec<(String, String)> = sqlx::query_as("SELECT word, synonym_of FROM synonyms")
            .fetch_all(&self.store.pool)
            .await?;

        let message_lower = message.to_lowercase();

        let mut keyword_map: HashMap<String, &Keyword> = HashMap::new();
        for kw in &keywords {
            keyword_map.insert(kw.keyword.to_lowercase(), kw);
        }

        let mut relevant = Vec::new();
        let mut found: HashSet<String> = HashSet::new();

        for kw in &keywords {
            let lower = kw.keyword.to_lowercase();
            if check_keyword_match(&lower, &message_lower, &found, None) {
                relevant.push(to_relevant(kw));
                found.insert(lower);
            }
        }

        for (word, synonym_of) in &synonyms {
            let synonym_word = word.to_lowercase();
            let canonical = synonym_of.to_lowercase();
            let Some(kw) = keyword_map.get(&canonical) else { continue };
            if check_keyword_match(&synonym_word, &message_lower, &found, Some(&canonical)) {
                relevant.push(to_relevant(kw));
                found.insert(canonical);
            }
        }

        Ok(relevant)
    }

    /// Prepend a category-grouped keyword-definitions block to `prompt`.
    /// Idempotent: if the header marker is already present, the prompt is
    /// returned unchanged rather than re-injected (Testable Property:
    /// "Keyword injection ... does not re-inject").
    pub async fn inject_relevant_keywords_into_prompt(&self, prompt: &str) -> String {
        const MARKER: &str = "IMPORTANT CONTEXT - Relevant Specialized Terminology:";
        if prompt.contains(MARKER) {
            return prompt.to_string();
        }
        let relevant = match self.get_relevant_keywords(prompt).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "failed to compute relevant keywords");
                return prompt.to_string();
            }
        };
        if relevant.is_empty() {
            return prompt.to_string();
        }
        format_injection_block(&relevant, prompt)
    }

    pub async fn add_keyword(&self, keyword: &str, definition: &str, category: Option<&str>) -> DbResult<bool> {
        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM keyword_definitions WHERE keyword = $1")
            .bind(keyword)
            .fetch_one(&self.store.pool)
            .await?;
        if existing > 0 {
            return Ok(false);
        }
        sqlx::query(
            "INSERT INTO keyword_definitions (keyword, definition, category, is_active) VALUES ($1, $2, $3, true)",
        )
        .bind(keyword)
        .bind(definition)
        .bind(category)
        .execute(&self.store.pool)
        .await?;
        Ok(true)
    }

    pub async fn update_keyword(&self, keyword: &str, definition: &str, category: Option<&str>) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE keyword_definitions SET definition = $1, category = COALESCE($2, category), updated_at = now() WHERE keyword = $3",
        )
        .bind(definition)
        .bind(category)
        .bind(keyword)
        .execute(&self.store.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_keyword(&self, keyword: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM keyword_definitions WHERE keyword = $1")
            .bind(keyword)
            .execute(&self.store.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn toggle_keyword_status(&self, keyword: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE keyword_definitions SET is_active = NOT is_active, updated_at = now() WHERE keyword = $1",
        )
        .bind(keyword)
        .execute(&self.store.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_keywords(&self, category: Option<&str>) -> DbResult<Vec<Keyword>> {
        match category {
            Some(c) => sqlx::query_as::<_, Keyword>(
                "SELECT * FROM keyword_definitions WHERE category = $1 ORDER BY keyword",
            )
            .bind(c)
            .fetch_all(&self.store.pool)
            .await
            .map_err(DbError::from),
            None => sqlx::query_as::<_, Keyword>("SELECT * FROM keyword_definitions ORDER BY keyword")
                .fetch_all(&self.store.pool)
                .await
                .map_err(DbError::from),
        }
    }

    pub async fn add_synonym(&self, word: &str, synonym_of: &str) -> DbResult<bool> {
        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM synonyms WHERE word = $1 AND synonym_of = $2")
            .bind(word)
            .bind(synonym_of)
            .fetch_one(&self.store.pool)
            .await?;
        if existing > 0 {
            return Ok(false);
        }
        sqlx::query("INSERT INTO synonyms (word, synonym_of) VALUES ($1, $2)")
            .bind(word)
            .bind(synonym_of)
            .execute(&self.store.pool)
            .await?;
        Ok(true)
    }

    pub async fn delete_synonym(&self, word: &str, synonym_of: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM synonyms WHERE word = $1 AND synonym_of = $2")
            .bind(word)
            .bind(synonym_of)
            .execute(&self.store.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_synonyms(&self, synonym_of: Option<&str>) -> DbResult<Vec<Synonym>> {
        match synonym_of {
            Some(k) => sqlx::query_as::<_, Synonym>("SELECT * FROM synonyms WHERE synonym_of = $1 ORDER BY word")
                .bind(k)
                .fetch_all(&self.store.pool)
                .await
                .map_err(DbError::from),
            None => sqlx::query_as::<_, Synonym>("SELECT * FROM synonyms ORDER BY synonym_of, word")
                .fetch_all(&self.store.pool)
                .await
                .map_err(DbError::from),
        }
    }
}

fn to_relevant(kw: &Keyword) -> RelevantKeyword {
    RelevantKeyword {
        keyword: kw.keyword.clone(),
        definition: kw.definition.clone(),
        category: kw.category.clone().unwrap_or_else(|| "General".to_string()),
    }
}

/// Build the injection block and prepend it to `prompt`. Format mirrors
/// `inject_relevant_keywords_into_prompt` exactly: header, instruction line,
/// per-category bullets (category header omitted for "General"), trailing
/// instruction, then the original prompt.
fn format_injection_block(relevant: &[RelevantKeyword], prompt: &str) -> String {
    let mut by_category: Vec<(String, Vec<&RelevantKeyword>)> = Vec::new();
    for kw in relevant {
        if let Some(entry) = by_category.iter_mut().find(|(c, _)| c == &kw.category) {
            entry.1.push(kw);
        } else {
            by_category.push((kw.category.clone(), vec![kw]));
        }
    }

    let mut block = String::new();
    block.push_str("\n\nIMPORTANT CONTEXT - Relevant Specialized Terminology:\n");
    block.push_str("The following terms are mentioned in your request. Please use these definitions:\n\n");
    for (category, kws) in &by_category {
        if category != "General" {
            block.push_str(&format!("--- {category} ---\n"));
        }
        for kw in kws {
            block.push_str(&format!("• {}: {}\n", kw.keyword, kw.definition));
        }
        block.push('\n');
    }
    block.push_str("Please consider these definitions when generating your response.\n");

    format!("{block}\n{prompt}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plural_forms_follow_the_y_ies_and_append_s_rules() {
        assert_eq!(generate_plural_forms("pulse"), vec!["pulses"]);
        assert_eq!(generate_plural_forms("query"), vec!["queries"]);
        assert_eq!(generate_plural_forms("dashboards"), Vec::<String>::new());
    }

    #[test]
    fn match_respects_already_found_dedup() {
        let mut found = HashSet::new();
        found.insert("pulse".to_string());
        assert!(!check_keyword_match("pulse", "a pulse here", &found, None));
    }

    #[test]
    fn match_checks_plural_when_exact_fails() {
        let found = HashSet::new();
        assert!(check_keyword_match("query", "many queries here", &found, None));
    }

    #[test]
    fn injection_block_is_prepended_and_grouped_by_category() {
        let relevant = vec![
            RelevantKeyword { keyword: "Pulse".into(), definition: "scheduled delivery".into(), category: "General".into() },
            RelevantKeyword { keyword: "Dashboard".into(), definition: "a collection of cards".into(), category: "Core".into() },
        ];
        let out = format_injection_block(&relevant, "original question");
        assert!(out.starts_with("\n\nIMPORTANT CONTEXT"));
        assert!(out.contains("--- Core ---"));
        assert!(!out.contains("--- General ---"));
        assert!(out.trim_end().ends_with("original question"));
    }
}
