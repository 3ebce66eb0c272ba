//! 会话监听：等待会话出现满足条件的新事件，超时返回 false（不阻塞）

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::StoreError;
use crate::sessions::{EventKind, SessionStore};

#[async_trait]
pub trait SessionListener: Send + Sync {
    /// 存在 offset >= min_offset 且类型匹配的事件时返回 true；超时返回 false
    async fn wait_for_events(
        &self,
        session_id: &str,
        min_offset: u64,
        kinds: &[EventKind],
        timeout: Duration,
    ) -> Result<bool, StoreError>;
}

/// 轮询实现
pub struct PollingSessionListener {
    store: Arc<dyn SessionStore>,
    poll_interval: Duration,
}

impl PollingSessionListener {
    pub fn new(store: Arc<dyn SessionStore>, poll_interval_ms: u64) -> Self {
        Self {
            store,
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
        }
    }
}

#[async_trait]
impl SessionListener for PollingSessionListener {
    async fn wait_for_events(
        &self,
        session_id: &str,
        min_offset: u64,
        kinds: &[EventKind],
        timeout: Duration,
    ) -> Result<bool, StoreError> {
        let poll = async {
            loop {
                let events = self
                    .store
                    .list_events(session_id, Some(min_offset), kinds, true)
                    .await?;
                if !events.is_empty() {
                    return Ok::<bool, StoreError>(true);
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::{EventSource, MemorySessionStore};

    #[tokio::test(start_paused = true)]
    async fn test_times_out_without_events() {
        let store = Arc::new(MemorySessionStore::new());
        let session = store.create_session("u", "a", None).await.unwrap();
        let listener = PollingSessionListener::new(store, 10);
        let found = listener
            .wait_for_events(&session.id, 0, &[EventKind::Message], Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!found);
    }

    #[tokio::test]
    async fn test_wakes_on_new_event() {
        let store = Arc::new(MemorySessionStore::new());
        let session = store.create_session("u", "a", None).await.unwrap();
        let listener = PollingSessionListener::new(store.clone(), 5);

        let writer = {
            let store = store.clone();
            let id = session.id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                store
                    .create_event(
                        &id,
                        EventSource::AiAgent,
                        EventKind::Message,
                        "c",
                        serde_json::json!({"message": "hi"}),
                    )
                    .await
                    .unwrap();
            })
        };

        let found = listener
            .wait_for_events(&session.id, 0, &[EventKind::Message], Duration::from_secs(5))
            .await
            .unwrap();
        assert!(found);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_session_is_error() {
        let store = Arc::new(MemorySessionStore::new());
        let listener = PollingSessionListener::new(store, 5);
        assert!(listener
            .wait_for_events("nope", 0, &[], Duration::from_millis(50))
            .await
            .is_err());
    }
}
