//! 会话 / 事件存储
//!
//! 事件 offset 在插入时分配，按会话从 0 开始连续递增；删除只打标记，不回收、不重排 offset。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::core::StoreError;
use crate::sessions::{
    Event, EventKind, EventSource, Inspection, MessageGenerationInspection, PreparationIteration,
    Session, SessionMode,
};

/// 会话的可更新字段；None 表示不修改
#[derive(Debug, Clone, Default)]
pub struct SessionUpdateParams {
    pub mode: Option<SessionMode>,
    pub title: Option<String>,
    /// (consumer, offset)
    pub consumption_offset: Option<(String, u64)>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(
        &self,
        end_user_id: &str,
        agent_id: &str,
        title: Option<String>,
    ) -> Result<Session, StoreError>;

    async fn read_session(&self, session_id: &str) -> Result<Session, StoreError>;

    async fn update_session(
        &self,
        session_id: &str,
        params: SessionUpdateParams,
    ) -> Result<Session, StoreError>;

    async fn create_event(
        &self,
        session_id: &str,
        source: EventSource,
        kind: EventKind,
        correlation_id: &str,
        data: Value,
    ) -> Result<Event, StoreError>;

    /// 逻辑删除
    async fn delete_event(&self, event_id: &str) -> Result<(), StoreError>;

    /// 按 offset 升序返回；kinds 为空表示不过滤
    async fn list_events(
        &self,
        session_id: &str,
        min_offset: Option<u64>,
        kinds: &[EventKind],
        exclude_deleted: bool,
    ) -> Result<Vec<Event>, StoreError>;

    async fn create_inspection(
        &self,
        session_id: &str,
        correlation_id: &str,
        preparation_iterations: Vec<PreparationIteration>,
        message_generations: Vec<MessageGenerationInspection>,
    ) -> Result<Inspection, StoreError>;

    async fn read_inspection(
        &self,
        session_id: &str,
        correlation_id: &str,
    ) -> Result<Inspection, StoreError>;
}

struct SessionEntry {
    session: Session,
    events: Vec<Event>,
}

#[derive(Default)]
struct State {
    sessions: HashMap<String, SessionEntry>,
    /// event id -> session id
    event_index: HashMap<String, String>,
    inspections: HashMap<(String, String), Inspection>,
}

/// 内存会话存储；单把写锁串行化同一会话的 offset 分配
#[derive(Default)]
pub struct MemorySessionStore {
    state: RwLock<State>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(
        &self,
        end_user_id: &str,
        agent_id: &str,
        title: Option<String>,
    ) -> Result<Session, StoreError> {
        let session = Session {
            id: format!("session_{}", uuid::Uuid::new_v4()),
            agent_id: agent_id.to_string(),
            end_user_id: end_user_id.to_string(),
            creation_utc: Utc::now(),
            mode: SessionMode::Auto,
            consumption_offsets: HashMap::from([("client".to_string(), 0)]),
            title,
        };
        self.state.write().await.sessions.insert(
            session.id.clone(),
            SessionEntry {
                session: session.clone(),
                events: Vec::new(),
            },
        );
        Ok(session)
    }

    async fn read_session(&self, session_id: &str) -> Result<Session, StoreError> {
        self.state
            .read()
            .await
            .sessions
            .get(session_id)
            .map(|e| e.session.clone())
            .ok_or_else(|| StoreError::not_found("Session", session_id))
    }

    async fn update_session(
        &self,
        session_id: &str,
        params: SessionUpdateParams,
    ) -> Result<Session, StoreError> {
        let mut state = self.state.write().await;
        let entry = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::not_found("Session", session_id))?;

        if let Some(mode) = params.mode {
            entry.session.mode = mode;
        }
        if let Some(title) = params.title {
            entry.session.title = Some(title);
        }
        if let Some((consumer, offset)) = params.consumption_offset {
            entry.session.consumption_offsets.insert(consumer, offset);
        }
        Ok(entry.session.clone())
    }

    async fn create_event(
        &self,
        session_id: &str,
        source: EventSource,
        kind: EventKind,
        correlation_id: &str,
        data: Value,
    ) -> Result<Event, StoreError> {
        let mut state = self.state.write().await;
        let entry = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| StoreError::not_found("Session", session_id))?;

        let event = Event {
            id: format!("event_{}", uuid::Uuid::new_v4()),
            session_id: session_id.to_string(),
            offset: entry.events.len() as u64,
            source,
            kind,
            correlation_id: correlation_id.to_string(),
            data,
            creation_utc: Utc::now(),
            deleted: false,
        };
        entry.events.push(event.clone());
        state
            .event_index
            .insert(event.id.clone(), session_id.to_string());
        Ok(event)
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let session_id = state
            .event_index
            .get(event_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Event", event_id))?;
        let event = state
            .sessions
            .get_mut(&session_id)
            .and_then(|e| e.events.iter_mut().find(|ev| ev.id == event_id))
            .ok_or_else(|| StoreError::not_found("Event", event_id))?;
        event.deleted = true;
        Ok(())
    }

    async fn list_events(
        &self,
        session_id: &str,
        min_offset: Option<u64>,
        kinds: &[EventKind],
        exclude_deleted: bool,
    ) -> Result<Vec<Event>, StoreError> {
        let state = self.state.read().await;
        let entry = state
            .sessions
            .get(session_id)
            .ok_or_else(|| StoreError::not_found("Session", session_id))?;

        let min_offset = min_offset.unwrap_or(0);
        Ok(entry
            .events
            .iter()
            .filter(|e| e.offset >= min_offset)
            .filter(|e| kinds.is_empty() || kinds.contains(&e.kind))
            .filter(|e| !(exclude_deleted && e.deleted))
            .cloned()
            .collect())
    }

    async fn create_inspection(
        &self,
        session_id: &str,
        correlation_id: &str,
        preparation_iterations: Vec<PreparationIteration>,
        message_generations: Vec<MessageGenerationInspection>,
    ) -> Result<Inspection, StoreError> {
        let inspection = Inspection {
            session_id: session_id.to_string(),
            correlation_id: correlation_id.to_string(),
            preparation_iterations,
            message_generations,
            creation_utc: Utc::now(),
        };
        self.state.write().await.inspections.insert(
            (session_id.to_string(), correlation_id.to_string()),
            inspection.clone(),
        );
        Ok(inspection)
    }

    async fn read_inspection(
        &self,
        session_id: &str,
        correlation_id: &str,
    ) -> Result<Inspection, StoreError> {
        self.state
            .read()
            .await
            .inspections
            .get(&(session_id.to_string(), correlation_id.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found("Inspection", correlation_id))
    }
}
