//! 上下文变量：按 (变量集 = agent id, key = 终端用户 id, 变量 id) 存储的键值状态
//!
//! 变量可由工具支撑（tool_id）并带新鲜度规则；引擎运行时只读取，读取 key 时回退到 DEFAULT。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::core::StoreError;
use crate::tools::ToolId;

/// 所有终端用户共享的默认 key
pub const DEFAULT_KEY: &str = "DEFAULT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextVariable {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub tool_id: Option<ToolId>,
    /// cron 形式的刷新规则，由外部调度方解释
    pub freshness_rules: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextVariableValue {
    pub id: String,
    pub variable_id: String,
    pub last_modified: DateTime<Utc>,
    pub data: Value,
}

#[async_trait]
pub trait ContextVariableStore: Send + Sync {
    async fn create_variable(
        &self,
        variable_set: &str,
        name: &str,
        description: Option<String>,
        tool_id: Option<ToolId>,
        freshness_rules: Option<String>,
    ) -> Result<ContextVariable, StoreError>;

    async fn list_variables(&self, variable_set: &str) -> Result<Vec<ContextVariable>, StoreError>;

    async fn update_value(
        &self,
        variable_set: &str,
        key: &str,
        variable_id: &str,
        data: Value,
    ) -> Result<ContextVariableValue, StoreError>;

    async fn read_value(
        &self,
        variable_set: &str,
        key: &str,
        variable_id: &str,
    ) -> Result<Option<ContextVariableValue>, StoreError>;
}

/// 读取终端用户的值，不存在时回退到 DEFAULT key
pub async fn load_context_variables(
    store: &dyn ContextVariableStore,
    variable_set: &str,
    end_user_id: &str,
) -> Result<Vec<(ContextVariable, ContextVariableValue)>, StoreError> {
    let mut loaded = Vec::new();
    for variable in store.list_variables(variable_set).await? {
        let value = match store.read_value(variable_set, end_user_id, &variable.id).await? {
            Some(v) => Some(v),
            None => store.read_value(variable_set, DEFAULT_KEY, &variable.id).await?,
        };
        if let Some(value) = value {
            loaded.push((variable, value));
        }
    }
    Ok(loaded)
}

#[derive(Default)]
struct VariableSet {
    variables: Vec<ContextVariable>,
    /// (key, variable_id) -> value
    values: HashMap<(String, String), ContextVariableValue>,
}

#[derive(Default)]
pub struct MemoryContextVariableStore {
    sets: RwLock<HashMap<String, VariableSet>>,
}

impl MemoryContextVariableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextVariableStore for MemoryContextVariableStore {
    async fn create_variable(
        &self,
        variable_set: &str,
        name: &str,
        description: Option<String>,
        tool_id: Option<ToolId>,
        freshness_rules: Option<String>,
    ) -> Result<ContextVariable, StoreError> {
        let variable = ContextVariable {
            id: format!("variable_{}", uuid::Uuid::new_v4()),
            name: name.to_string(),
            description,
            tool_id,
            freshness_rules,
        };
        self.sets
            .write()
            .await
            .entry(variable_set.to_string())
            .or_default()
            .variables
            .push(variable.clone());
        Ok(variable)
    }

    async fn list_variables(&self, variable_set: &str) -> Result<Vec<ContextVariable>, StoreError> {
        Ok(self
            .sets
            .read()
            .await
            .get(variable_set)
            .map(|s| s.variables.clone())
            .unwrap_or_default())
    }

    async fn update_value(
        &self,
        variable_set: &str,
        key: &str,
        variable_id: &str,
        data: Value,
    ) -> Result<ContextVariableValue, StoreError> {
        let mut sets = self.sets.write().await;
        let set = sets
            .get_mut(variable_set)
            .filter(|s| s.variables.iter().any(|v| v.id == variable_id))
            .ok_or_else(|| StoreError::not_found("ContextVariable", variable_id))?;

        let value = ContextVariableValue {
            id: format!("value_{}", uuid::Uuid::new_v4()),
            variable_id: variable_id.to_string(),
            last_modified: Utc::now(),
            data,
        };
        set.values
            .insert((key.to_string(), variable_id.to_string()), value.clone());
        Ok(value)
    }

    async fn read_value(
        &self,
        variable_set: &str,
        key: &str,
        variable_id: &str,
    ) -> Result<Option<ContextVariableValue>, StoreError> {
        Ok(self.sets.read().await.get(variable_set).and_then(|s| {
            s.values
                .get(&(key.to_string(), variable_id.to_string()))
                .cloned()
        }))
    }
}
