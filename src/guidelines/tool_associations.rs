//! Guideline 与工具的关联
//!
//! 被关联的 guideline 激活时，对应工具成为本轮的候选工具。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::StoreError;
use crate::guidelines::GuidelineId;
use crate::tools::ToolId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidelineToolAssociation {
    pub id: String,
    pub guideline_id: GuidelineId,
    pub tool_id: ToolId,
    pub creation_utc: DateTime<Utc>,
}

#[async_trait]
pub trait GuidelineToolAssociationStore: Send + Sync {
    async fn create_association(
        &self,
        guideline_id: &str,
        tool_id: ToolId,
    ) -> Result<GuidelineToolAssociation, StoreError>;

    async fn list_associations(&self) -> Result<Vec<GuidelineToolAssociation>, StoreError>;
}

#[derive(Default)]
pub struct MemoryToolAssociationStore {
    associations: RwLock<Vec<GuidelineToolAssociation>>,
}

impl MemoryToolAssociationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GuidelineToolAssociationStore for MemoryToolAssociationStore {
    async fn create_association(
        &self,
        guideline_id: &str,
        tool_id: ToolId,
    ) -> Result<GuidelineToolAssociation, StoreError> {
        let mut associations = self.associations.write().await;
        if let Some(existing) = associations
            .iter()
            .find(|a| a.guideline_id == guideline_id && a.tool_id == tool_id)
        {
            return Ok(existing.clone());
        }

        let association = GuidelineToolAssociation {
            id: format!("association_{}", uuid::Uuid::new_v4()),
            guideline_id: guideline_id.to_string(),
            tool_id,
            creation_utc: Utc::now(),
        };
        associations.push(association.clone());
        Ok(association)
    }

    async fn list_associations(&self) -> Result<Vec<GuidelineToolAssociation>, StoreError> {
        Ok(self.associations.read().await.clone())
    }
}
