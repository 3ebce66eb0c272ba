//! 事件发射：处理过程产生的 status / tool / message 事件经由 EventEmitter 写出
//!
//! SessionEventEmitter 直接写入会话日志；EventBuffer 只在内存中收集，供测试与预演使用。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::core::StoreError;
use crate::sessions::{EventKind, EventSource, SessionStore};

/// 已发射的事件（与存储无关的视图）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedEvent {
    pub source: EventSource,
    pub kind: EventKind,
    pub correlation_id: String,
    pub data: Value,
}

#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit_status_event(
        &self,
        correlation_id: &str,
        data: Value,
    ) -> Result<EmittedEvent, StoreError>;

    async fn emit_tool_event(
        &self,
        correlation_id: &str,
        data: Value,
    ) -> Result<EmittedEvent, StoreError>;

    async fn emit_message_event(
        &self,
        correlation_id: &str,
        message: &str,
    ) -> Result<EmittedEvent, StoreError>;
}

fn status(correlation_id: &str, data: Value) -> EmittedEvent {
    EmittedEvent {
        source: EventSource::System,
        kind: EventKind::Status,
        correlation_id: correlation_id.to_string(),
        data,
    }
}

fn tool(correlation_id: &str, data: Value) -> EmittedEvent {
    EmittedEvent {
        source: EventSource::System,
        kind: EventKind::Tool,
        correlation_id: correlation_id.to_string(),
        data,
    }
}

fn message(correlation_id: &str, text: &str) -> EmittedEvent {
    EmittedEvent {
        source: EventSource::AiAgent,
        kind: EventKind::Message,
        correlation_id: correlation_id.to_string(),
        data: serde_json::json!({ "message": text }),
    }
}

/// 写入会话日志的发射器
pub struct SessionEventEmitter {
    store: Arc<dyn SessionStore>,
    session_id: String,
}

impl SessionEventEmitter {
    pub fn new(store: Arc<dyn SessionStore>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
        }
    }

    async fn persist(&self, event: EmittedEvent) -> Result<EmittedEvent, StoreError> {
        self.store
            .create_event(
                &self.session_id,
                event.source,
                event.kind,
                &event.correlation_id,
                event.data.clone(),
            )
            .await?;
        Ok(event)
    }
}

#[async_trait]
impl EventEmitter for SessionEventEmitter {
    async fn emit_status_event(
        &self,
        correlation_id: &str,
        data: Value,
    ) -> Result<EmittedEvent, StoreError> {
        self.persist(status(correlation_id, data)).await
    }

    async fn emit_tool_event(
        &self,
        correlation_id: &str,
        data: Value,
    ) -> Result<EmittedEvent, StoreError> {
        self.persist(tool(correlation_id, data)).await
    }

    async fn emit_message_event(
        &self,
        correlation_id: &str,
        text: &str,
    ) -> Result<EmittedEvent, StoreError> {
        self.persist(message(correlation_id, text)).await
    }
}

/// 内存发射器
#[derive(Default)]
pub struct EventBuffer {
    events: Mutex<Vec<EmittedEvent>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<EmittedEvent> {
        self.events.lock().await.clone()
    }

    async fn push(&self, event: EmittedEvent) -> EmittedEvent {
        self.events.lock().await.push(event.clone());
        event
    }
}

#[async_trait]
impl EventEmitter for EventBuffer {
    async fn emit_status_event(
        &self,
        correlation_id: &str,
        data: Value,
    ) -> Result<EmittedEvent, StoreError> {
        Ok(self.push(status(correlation_id, data)).await)
    }

    async fn emit_tool_event(
        &self,
        correlation_id: &str,
        data: Value,
    ) -> Result<EmittedEvent, StoreError> {
        Ok(self.push(tool(correlation_id, data)).await)
    }

    async fn emit_message_event(
        &self,
        correlation_id: &str,
        text: &str,
    ) -> Result<EmittedEvent, StoreError> {
        Ok(self.push(message(correlation_id, text)).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::MemorySessionStore;

    #[tokio::test]
    async fn test_session_emitter_persists() {
        let store = Arc::new(MemorySessionStore::new());
        let session = store.create_session("u", "a", None).await.unwrap();
        let emitter = SessionEventEmitter::new(store.clone(), &session.id);

        emitter.emit_message_event("c1", "hello").await.unwrap();
        let events = store.list_events(&session.id, None, &[], true).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, EventSource::AiAgent);
        assert_eq!(events[0].message(), Some("hello"));
        assert_eq!(events[0].correlation_id, "c1");
    }

    #[tokio::test]
    async fn test_buffer_collects_in_order() {
        let buffer = EventBuffer::new();
        buffer
            .emit_status_event("c", serde_json::json!({"status": "ready"}))
            .await
            .unwrap();
        buffer.emit_tool_event("c", Value::Null).await.unwrap();
        let kinds: Vec<EventKind> = buffer.events().await.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Status, EventKind::Tool]);
    }
}
