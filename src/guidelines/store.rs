//! Guideline 存储
//!
//! Guideline 一旦创建即不可变；同一 guideline set 内按 (condition, action) 内容去重，
//! 重复创建返回已有条目。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::StoreError;

/// Guideline ID
pub type GuidelineId = String;

/// 条件 -> 动作 规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guideline {
    pub id: GuidelineId,
    pub condition: String,
    pub action: String,
    pub creation_utc: DateTime<Utc>,
}

impl Guideline {
    /// 内容寻址键：用于重复检测
    pub fn content_key(&self) -> (&str, &str) {
        (self.condition.as_str(), self.action.as_str())
    }
}

/// Guideline 存储接口（运行时只读）
#[async_trait]
pub trait GuidelineStore: Send + Sync {
    async fn create_guideline(
        &self,
        guideline_set: &str,
        condition: &str,
        action: &str,
    ) -> Result<Guideline, StoreError>;

    async fn list_guidelines(&self, guideline_set: &str) -> Result<Vec<Guideline>, StoreError>;

    async fn read_guideline(
        &self,
        guideline_set: &str,
        guideline_id: &str,
    ) -> Result<Guideline, StoreError>;
}

/// 内存 Guideline 存储：set -> 按创建顺序排列的 guideline
#[derive(Default)]
pub struct MemoryGuidelineStore {
    sets: RwLock<HashMap<String, Vec<Guideline>>>,
}

impl MemoryGuidelineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GuidelineStore for MemoryGuidelineStore {
    async fn create_guideline(
        &self,
        guideline_set: &str,
        condition: &str,
        action: &str,
    ) -> Result<Guideline, StoreError> {
        let mut sets = self.sets.write().await;
        let set = sets.entry(guideline_set.to_string()).or_default();

        if let Some(existing) = set.iter().find(|g| g.content_key() == (condition, action)) {
            return Ok(existing.clone());
        }

        let guideline = Guideline {
            id: format!("guideline_{}", uuid::Uuid::new_v4()),
            condition: condition.to_string(),
            action: action.to_string(),
            creation_utc: Utc::now(),
        };
        set.push(guideline.clone());
        Ok(guideline)
    }

    async fn list_guidelines(&self, guideline_set: &str) -> Result<Vec<Guideline>, StoreError> {
        Ok(self
            .sets
            .read()
            .await
            .get(guideline_set)
            .cloned()
            .unwrap_or_default())
    }

    async fn read_guideline(
        &self,
        guideline_set: &str,
        guideline_id: &str,
    ) -> Result<Guideline, StoreError> {
        self.sets
            .read()
            .await
            .get(guideline_set)
            .and_then(|set| set.iter().find(|g| g.id == guideline_id).cloned())
            .ok_or_else(|| StoreError::not_found("Guideline", guideline_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_content_returns_existing() {
        let store = MemoryGuidelineStore::new();
        let a = store.create_guideline("agent", "greets", "greet back").await.unwrap();
        let b = store.create_guideline("agent", "greets", "greet back").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.list_guidelines("agent").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sets_are_isolated() {
        let store = MemoryGuidelineStore::new();
        let a = store.create_guideline("a", "c", "x").await.unwrap();
        assert!(store.list_guidelines("b").await.unwrap().is_empty());
        assert!(store.read_guideline("b", &a.id).await.is_err());
        assert_eq!(store.read_guideline("a", &a.id).await.unwrap(), a);
    }
}
