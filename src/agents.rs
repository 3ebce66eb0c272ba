//! Agent 定义与存储

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// 每次处理最多的准备迭代次数（工具循环上限）
    pub max_engine_iterations: usize,
    pub creation_utc: DateTime<Utc>,
}

#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn create_agent(
        &self,
        name: &str,
        description: Option<String>,
        max_engine_iterations: usize,
    ) -> Result<Agent, StoreError>;

    async fn read_agent(&self, agent_id: &str) -> Result<Agent, StoreError>;

    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError>;
}

#[derive(Default)]
pub struct MemoryAgentStore {
    agents: RwLock<HashMap<String, Agent>>,
}

impl MemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentStore for MemoryAgentStore {
    async fn create_agent(
        &self,
        name: &str,
        description: Option<String>,
        max_engine_iterations: usize,
    ) -> Result<Agent, StoreError> {
        let agent = Agent {
            id: format!("agent_{}", uuid::Uuid::new_v4()),
            name: name.to_string(),
            description,
            max_engine_iterations: max_engine_iterations.max(1),
            creation_utc: Utc::now(),
        };
        self.agents
            .write()
            .await
            .insert(agent.id.clone(), agent.clone());
        Ok(agent)
    }

    async fn read_agent(&self, agent_id: &str) -> Result<Agent, StoreError> {
        self.agents
            .read()
            .await
            .get(agent_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Agent", agent_id))
    }

    async fn list_agents(&self) -> Result<Vec<Agent>, StoreError> {
        let mut agents: Vec<Agent> = self.agents.read().await.values().cloned().collect();
        agents.sort_by(|a, b| a.creation_utc.cmp(&b.creation_utc));
        Ok(agents)
    }
}
