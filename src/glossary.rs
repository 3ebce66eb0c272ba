//! 术语表：领域术语及其同义词，运行时按交互内容检索相关术语

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: String,
    pub name: String,
    pub description: String,
    pub synonyms: Vec<String>,
    pub creation_utc: DateTime<Utc>,
}

impl Term {
    /// 名称或任一同义词出现在文本中（不区分大小写）
    pub fn mentioned_in(&self, text_lower: &str) -> bool {
        std::iter::once(&self.name)
            .chain(self.synonyms.iter())
            .map(|s| s.trim().to_lowercase())
            .any(|s| !s.is_empty() && text_lower.contains(&s))
    }
}

#[async_trait]
pub trait GlossaryStore: Send + Sync {
    async fn create_term(
        &self,
        term_set: &str,
        name: &str,
        description: &str,
        synonyms: Vec<String>,
    ) -> Result<Term, StoreError>;

    async fn list_terms(&self, term_set: &str) -> Result<Vec<Term>, StoreError>;

    async fn find_relevant_terms(&self, term_set: &str, query: &str)
        -> Result<Vec<Term>, StoreError>;
}

#[derive(Default)]
pub struct MemoryGlossaryStore {
    sets: RwLock<HashMap<String, Vec<Term>>>,
}

impl MemoryGlossaryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GlossaryStore for MemoryGlossaryStore {
    async fn create_term(
        &self,
        term_set: &str,
        name: &str,
        description: &str,
        synonyms: Vec<String>,
    ) -> Result<Term, StoreError> {
        let term = Term {
            id: format!("term_{}", uuid::Uuid::new_v4()),
            name: name.to_string(),
            description: description.to_string(),
            synonyms,
            creation_utc: Utc::now(),
        };
        self.sets
            .write()
            .await
            .entry(term_set.to_string())
            .or_default()
            .push(term.clone());
        Ok(term)
    }

    async fn list_terms(&self, term_set: &str) -> Result<Vec<Term>, StoreError> {
        Ok(self
            .sets
            .read()
            .await
            .get(term_set)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_relevant_terms(
        &self,
        term_set: &str,
        query: &str,
    ) -> Result<Vec<Term>, StoreError> {
        let query = query.to_lowercase();
        Ok(self
            .list_terms(term_set)
            .await?
            .into_iter()
            .filter(|t| t.mentioned_in(&query))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_by_name_or_synonym() {
        let store = MemoryGlossaryStore::new();
        store
            .create_term("agent", "Bundle", "A package deal", vec!["combo".into()])
            .await
            .unwrap();
        store
            .create_term("agent", "Refund", "Money back", vec![])
            .await
            .unwrap();

        let found = store
            .find_relevant_terms("agent", "Can I get the COMBO?")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Bundle");

        assert!(store
            .find_relevant_terms("other", "refund")
            .await
            .unwrap()
            .is_empty());
    }
}
