//! 应用门面：会话创建、事件投递、处理派发、等待更新、关闭
//!
//! 同一会话只有最近一次派发的处理可以产生回复：dispatch 先取消该会话所有未完成的任务，
//! 再以新的 correlation id 启动处理任务。

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::Instrument;

use crate::core::{BackgroundTaskService, EngineError, ShutdownCleanup, StoreError};
use crate::engine::{Context, Engine, SessionEventEmitter};
use crate::sessions::{
    Event, EventKind, EventSource, Session, SessionListener, SessionMode, SessionStore,
};

pub struct Application {
    engine: Arc<Engine>,
    sessions: Arc<dyn SessionStore>,
    listener: Arc<dyn SessionListener>,
    tasks: BackgroundTaskService,
}

impl Application {
    pub fn new(engine: Arc<Engine>, listener: Arc<dyn SessionListener>, gc_interval_ms: u64) -> Self {
        let sessions = engine.stores().sessions.clone();
        Self {
            engine,
            sessions,
            listener,
            tasks: BackgroundTaskService::new(gc_interval_ms),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// 创建会话；allow_greeting 时立即派发一次处理，让 agent 有机会先开口
    pub async fn create_session(
        &self,
        end_user_id: &str,
        agent_id: &str,
        allow_greeting: bool,
    ) -> Result<Session, EngineError> {
        self.engine.stores().agents.read_agent(agent_id).await?;
        let session = self
            .sessions
            .create_session(end_user_id, agent_id, None)
            .await?;
        tracing::info!(session_id = %session.id, agent_id, "session created");

        if allow_greeting {
            self.dispatch(&session).await?;
        }
        Ok(session)
    }

    /// 写入事件；trigger_processing 且会话处于 auto 模式时派发处理
    pub async fn post_event(
        &self,
        session_id: &str,
        kind: EventKind,
        data: Value,
        source: EventSource,
        trigger_processing: bool,
    ) -> Result<Event, EngineError> {
        let session = self.sessions.read_session(session_id).await?;
        let correlation_id = new_correlation_id();
        let event = self
            .sessions
            .create_event(session_id, source, kind, &correlation_id, data)
            .await?;

        if trigger_processing && session.mode == SessionMode::Auto {
            self.dispatch(&session).await?;
        }
        Ok(event)
    }

    /// 派发一次处理，返回其 correlation id
    pub async fn dispatch(&self, session: &Session) -> Result<String, StoreError> {
        let acknowledged_offset = self
            .sessions
            .list_events(&session.id, None, &[], false)
            .await?
            .last()
            .map(|e| e.offset)
            .unwrap_or(0);

        let correlation_id = new_correlation_id();
        let ctx = Context {
            session_id: session.id.clone(),
            agent_id: session.agent_id.clone(),
            correlation_id: correlation_id.clone(),
            acknowledged_offset,
        };
        let engine = self.engine.clone();
        let emitter = SessionEventEmitter::new(self.sessions.clone(), &session.id);
        let span = tracing::info_span!(
            "process",
            session_id = %ctx.session_id,
            correlation_id = %ctx.correlation_id
        );

        {
            // 被替代的运行在此之后不会再写入回复
            let _emissions = self.engine.hold_emissions().await;
            self.tasks.cancel(&session.id).await;
        }
        self.tasks
            .restart(&session.id, correlation_id.clone(), move |cancel| {
                async move {
                    tracing::info!("processing started");
                    let outcome = engine.process(&ctx, &emitter, &cancel).await?;
                    tracing::info!(?outcome, "processing finished");
                    Ok(())
                }
                .instrument(span)
            })
            .await;

        Ok(correlation_id)
    }

    /// 等待会话出现新事件；超时返回 false
    pub async fn wait_for_update(
        &self,
        session_id: &str,
        min_offset: u64,
        kinds: &[EventKind],
        timeout: Duration,
    ) -> Result<bool, StoreError> {
        self.listener
            .wait_for_events(session_id, min_offset, kinds, timeout)
            .await
    }

    /// 取消会话上正在进行的处理
    pub async fn cancel_processing(&self, session_id: &str) {
        let _emissions = self.engine.hold_emissions().await;
        self.tasks.cancel(session_id).await;
    }

    /// 强制回收：取消并等待所有处理任务
    pub async fn shutdown(&self) {
        tracing::info!("shutting down; collecting all processing tasks");
        self.tasks.collect(true).await;
    }
}

fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// 关闭时回收处理任务
pub struct ApplicationCleanup {
    app: Arc<Application>,
}

impl ApplicationCleanup {
    pub fn new(app: Arc<Application>) -> Self {
        Self { app }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for ApplicationCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.app.shutdown().await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ProcessingTasks"
    }
}
