//! Guideline 连接图（离线构建，运行时只读）
//!
//! 有向边 source -> target，类型为 Entails（必然）或 Suggests（可选）。
//! 不允许自环；图可以有环，间接查询（indirect）按 BFS 展开并以 visited 集合防止死循环。

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::StoreError;
use crate::guidelines::GuidelineId;

/// 连接类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Entails,
    Suggests,
}

impl ConnectionKind {
    /// 由源 proposition 的分数推出被连接 guideline 的分数
    pub fn inferred_score(self, source_score: u8) -> u8 {
        match self {
            ConnectionKind::Entails => source_score,
            ConnectionKind::Suggests => (source_score / 2).max(1),
        }
    }
}

/// 连接（有向边）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidelineConnection {
    pub id: String,
    pub source: GuidelineId,
    pub target: GuidelineId,
    pub kind: ConnectionKind,
    pub creation_utc: DateTime<Utc>,
}

/// 按源或按目标查询
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionQuery {
    Source(GuidelineId),
    Target(GuidelineId),
}

/// 连接存储接口
#[async_trait]
pub trait GuidelineConnectionStore: Send + Sync {
    async fn create_connection(
        &self,
        source: &str,
        target: &str,
        kind: ConnectionKind,
    ) -> Result<GuidelineConnection, StoreError>;

    /// indirect=false 只返回一跳；indirect=true 返回可达的全部边
    async fn list_connections(
        &self,
        query: ConnectionQuery,
        indirect: bool,
    ) -> Result<Vec<GuidelineConnection>, StoreError>;
}

/// 内存连接存储
#[derive(Default)]
pub struct MemoryConnectionStore {
    connections: RwLock<Vec<GuidelineConnection>>,
}

impl MemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GuidelineConnectionStore for MemoryConnectionStore {
    async fn create_connection(
        &self,
        source: &str,
        target: &str,
        kind: ConnectionKind,
    ) -> Result<GuidelineConnection, StoreError> {
        if source == target {
            return Err(StoreError::InvalidConnection(format!(
                "self-loop on guideline {}",
                source
            )));
        }

        let mut connections = self.connections.write().await;
        // 同一对 (source, target) 只保留一条边，重复创建覆盖类型
        connections.retain(|c| !(c.source == source && c.target == target));

        let connection = GuidelineConnection {
            id: format!("connection_{}", uuid::Uuid::new_v4()),
            source: source.to_string(),
            target: target.to_string(),
            kind,
            creation_utc: Utc::now(),
        };
        connections.push(connection.clone());
        Ok(connection)
    }

    async fn list_connections(
        &self,
        query: ConnectionQuery,
        indirect: bool,
    ) -> Result<Vec<GuidelineConnection>, StoreError> {
        let connections = self.connections.read().await;

        let (start, forward) = match query {
            ConnectionQuery::Source(id) => (id, true),
            ConnectionQuery::Target(id) => (id, false),
        };

        let mut by_node: HashMap<&str, Vec<&GuidelineConnection>> = HashMap::new();
        for c in connections.iter() {
            let key = if forward { c.source.as_str() } else { c.target.as_str() };
            by_node.entry(key).or_default().push(c);
        }

        let mut result = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        visited.insert(start.as_str());
        queue.push_back(start.as_str());

        while let Some(node) = queue.pop_front() {
            for c in by_node.get(node).into_iter().flatten() {
                result.push((*c).clone());
                let next = if forward { c.target.as_str() } else { c.source.as_str() };
                if indirect && visited.insert(next) {
                    queue.push_back(next);
                }
            }
            if !indirect {
                break;
            }
        }

        Ok(result)
    }
}
