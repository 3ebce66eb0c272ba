//! 工具服务与注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / call），由 LocalToolService
//! 按名注册；ServiceRegistry 按服务名查找 ToolService，工具以 ToolId（service:tool）寻址。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::sessions::SessionMode;

/// 工具服务错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool service: {0}")]
    ServiceNotFound(String),

    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    Timeout(String),
}

/// 工具标识：服务名 + 工具名
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToolId {
    pub service_name: String,
    pub tool_name: String,
}

impl ToolId {
    pub fn new(service_name: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            tool_name: tool_name.into(),
        }
    }

    /// 解析 "service:tool" 形式
    pub fn parse(s: &str) -> Option<Self> {
        let (service, tool) = s.split_once(':')?;
        if service.is_empty() || tool.is_empty() {
            return None;
        }
        Some(Self::new(service, tool))
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service_name, self.tool_name)
    }
}

/// 工具描述（供 LLM 理解功能与参数）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 工具调用上下文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolContext {
    pub agent_id: String,
    pub session_id: String,
    pub end_user_id: String,
}

/// 工具结果附带的控制指令（如切换会话模式）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultControl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SessionMode>,
}

/// 工具结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub data: Value,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub control: ToolResultControl,
}

impl ToolResult {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            metadata: Value::Object(Default::default()),
            control: ToolResultControl::default(),
        }
    }

    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.control.mode = Some(mode);
        self
    }

    /// 工具调用失败时的替代结果：固定 data，错误详情放入 metadata
    pub fn error(details: impl Into<String>) -> Self {
        Self {
            data: Value::String("Tool call error".to_string()),
            metadata: serde_json::json!({ "error_details": details.into() }),
            control: ToolResultControl::default(),
        }
    }
}

/// 工具 trait：名称、描述、参数 schema、异步调用（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认表示无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn call(&self, context: &ToolContext, args: Value) -> Result<ToolResult, String>;
}

/// 工具服务接口（本地或远程）
#[async_trait]
pub trait ToolService: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError>;

    async fn read_tool(&self, name: &str) -> Result<ToolDescriptor, ToolError>;

    async fn call_tool(
        &self,
        name: &str,
        context: &ToolContext,
        arguments: Value,
    ) -> Result<ToolResult, ToolError>;
}

/// 进程内工具服务：按名称存储 Arc<dyn Tool>
#[derive(Default)]
pub struct LocalToolService {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl LocalToolService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    fn describe(tool: &dyn Tool) -> ToolDescriptor {
        ToolDescriptor {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters_schema(),
        }
    }
}

#[async_trait]
impl ToolService for LocalToolService {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        let mut tools: Vec<ToolDescriptor> = self
            .tools
            .values()
            .map(|t| Self::describe(t.as_ref()))
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tools)
    }

    async fn read_tool(&self, name: &str) -> Result<ToolDescriptor, ToolError> {
        self.tools
            .get(name)
            .map(|t| Self::describe(t.as_ref()))
            .ok_or_else(|| ToolError::ToolNotFound(name.to_string()))
    }

    async fn call_tool(
        &self,
        name: &str,
        context: &ToolContext,
        arguments: Value,
    ) -> Result<ToolResult, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::ToolNotFound(name.to_string()))?;
        tool.call(context, arguments)
            .await
            .map_err(ToolError::ExecutionFailed)
    }
}

/// 服务注册表：服务名 -> ToolService
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<dyn ToolService>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_service(&mut self, name: impl Into<String>, service: Arc<dyn ToolService>) {
        self.services.insert(name.into(), service);
    }

    pub fn read_tool_service(&self, name: &str) -> Result<Arc<dyn ToolService>, ToolError> {
        self.services
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::ServiceNotFound(name.to_string()))
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn read_tool(&self, tool_id: &ToolId) -> Result<ToolDescriptor, ToolError> {
        self.read_tool_service(&tool_id.service_name)?
            .read_tool(&tool_id.tool_name)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;

    fn ctx() -> ToolContext {
        ToolContext {
            agent_id: "a".into(),
            session_id: "s".into(),
            end_user_id: "u".into(),
        }
    }

    #[test]
    fn test_tool_id_parse_and_display() {
        let id = ToolId::parse("local:echo").unwrap();
        assert_eq!(id, ToolId::new("local", "echo"));
        assert_eq!(id.to_string(), "local:echo");
        assert!(ToolId::parse("echo").is_none());
        assert!(ToolId::parse(":echo").is_none());
    }

    #[tokio::test]
    async fn test_local_service_call_and_lookup() {
        let mut service = LocalToolService::new();
        service.register(EchoTool);

        let tools = service.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(service.read_tool("echo").await.unwrap().name, "echo");

        let result = service
            .call_tool("echo", &ctx(), serde_json::json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(result.data, serde_json::json!("hi"));

        let err = service.call_tool("nope", &ctx(), Value::Null).await.unwrap_err();
        assert_eq!(err, ToolError::ToolNotFound("nope".into()));
    }

    #[test]
    fn test_error_result_shape() {
        let r = ToolResult::error("boom");
        assert_eq!(r.data, serde_json::json!("Tool call error"));
        assert_eq!(r.metadata["error_details"], "boom");
        assert_eq!(r.control.mode, None);
    }
}
