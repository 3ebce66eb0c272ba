//! 会话与事件日志
//!
//! - **Session**: 终端用户与 agent 的一次对话；mode 决定是否自动回复
//! - **Event**: 追加写入的事件日志，offset 按会话单调递增且无空洞，逻辑删除不重排
//! - **Inspection**: 一次处理（correlation id）的推理快照
//! - **listener**: 轮询等待新事件

pub mod inspection;
pub mod listener;
pub mod store;

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use inspection::{
    ContextVariableRecord, Inspection, MessageGenerationInspection, PreparationIteration,
    PropositionRecord, ToolCallRecord,
};
pub use listener::{PollingSessionListener, SessionListener};
pub use store::{MemorySessionStore, SessionStore, SessionUpdateParams};

pub type SessionId = String;
pub type EventId = String;

/// 会话模式：auto 由 agent 自动回复，manual 由人工接管
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Auto,
    Manual,
}

/// 会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub agent_id: String,
    pub end_user_id: String,
    pub creation_utc: DateTime<Utc>,
    pub mode: SessionMode,
    /// 消费者（如 "client"）已读到的 offset
    pub consumption_offsets: HashMap<String, u64>,
    pub title: Option<String>,
}

/// 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    Tool,
    Status,
    Custom,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Message => "message",
            EventKind::Tool => "tool",
            EventKind::Status => "status",
            EventKind::Custom => "custom",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 事件来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Customer,
    CustomerUi,
    HumanAgent,
    HumanAgentOnBehalfOfAiAgent,
    AiAgent,
    System,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Customer => "customer",
            EventSource::CustomerUi => "customer_ui",
            EventSource::HumanAgent => "human_agent",
            EventSource::HumanAgentOnBehalfOfAiAgent => "human_agent_on_behalf_of_ai_agent",
            EventSource::AiAgent => "ai_agent",
            EventSource::System => "system",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 日志中的一条事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub session_id: SessionId,
    pub offset: u64,
    pub source: EventSource,
    pub kind: EventKind,
    pub correlation_id: String,
    pub data: Value,
    pub creation_utc: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

impl Event {
    /// message 事件的文本
    pub fn message(&self) -> Option<&str> {
        if self.kind != EventKind::Message {
            return None;
        }
        self.data.get("message").and_then(|m| m.as_str())
    }

    /// status 事件的状态
    pub fn status(&self) -> Option<SessionStatus> {
        if self.kind != EventKind::Status {
            return None;
        }
        self.data
            .get("status")
            .and_then(|s| serde_json::from_value(s.clone()).ok())
    }
}

/// 处理状态（status 事件的 data.status）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Acknowledged,
    Processing,
    Typing,
    Ready,
    Cancelled,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Acknowledged => "acknowledged",
            SessionStatus::Processing => "processing",
            SessionStatus::Typing => "typing",
            SessionStatus::Ready => "ready",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Error => "error",
        }
    }
}
