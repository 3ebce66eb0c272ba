//! 应用层测试：派发与替代、取消、强制回收、offset 与等待

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use common::*;
use tenet::agents::AgentStore;
use tenet::core::Application;
use tenet::engine::{
    EngineStores, GuidelineCheck, GuidelinePropositionsSchema, ToolCallEvaluation,
    ToolCallInferenceSchema,
};
use tenet::llm::FnGenerator;
use tenet::sessions::{
    EventKind, EventSource, PollingSessionListener, SessionMode, SessionUpdateParams,
};
use tenet::tools::{
    LocalToolService, ServiceRegistry, Tool, ToolContext, ToolExecutor, ToolId, ToolResult,
};

fn application(stores: EngineStores, reply_delay: Duration) -> Application {
    let listener = Arc::new(PollingSessionListener::new(stores.sessions.clone(), 10));
    let engine = engine(
        stores,
        no_checks(),
        no_tool_calls(),
        executor(Arc::default()),
        Arc::new(SlowReply {
            delay: reply_delay,
            content: "reply".to_string(),
        }),
    );
    Application::new(Arc::new(engine), listener, 0)
}

async fn customer_says(app: &Application, session_id: &str, text: &str, trigger: bool) -> u64 {
    app.post_event(
        session_id,
        EventKind::Message,
        serde_json::json!({ "message": text }),
        EventSource::Customer,
        trigger,
    )
    .await
    .unwrap()
    .offset
}

#[tokio::test]
async fn test_only_latest_dispatch_replies() {
    let stores = stores();
    let agent = agent(&stores, 3).await;
    let app = application(stores.clone(), Duration::from_millis(100));
    let session = app.create_session("user", &agent.id, false).await.unwrap();

    let mut correlations = Vec::new();
    let mut last_customer_offset = 0;
    for text in ["one", "two", "three"] {
        last_customer_offset = customer_says(&app, &session.id, text, false).await;
        correlations.push(app.dispatch(&session).await.unwrap());
    }

    assert!(app
        .wait_for_update(
            &session.id,
            last_customer_offset + 1,
            &[EventKind::Message],
            Duration::from_secs(5)
        )
        .await
        .unwrap());
    // 强制回收会等待被替代的运行结束
    app.shutdown().await;

    let events = all_events(&stores.sessions, &session.id).await;
    let replies: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::Message && e.source == EventSource::AiAgent)
        .collect();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].correlation_id, correlations[2]);

    for superseded in &correlations[..2] {
        let seen = statuses(&events, superseded);
        assert_eq!(seen.last().map(String::as_str), Some("ready"));
        assert!(seen.iter().any(|s| s == "cancelled"));
    }
    assert_eq!(statuses(&events, &correlations[2]).last().map(String::as_str), Some("ready"));
}

#[tokio::test]
async fn test_post_event_dispatches_and_waits_for_reply() {
    let stores = stores();
    let agent = agent(&stores, 3).await;
    let app = application(stores.clone(), Duration::from_millis(1));
    let session = app.create_session("user", &agent.id, false).await.unwrap();

    let offset = customer_says(&app, &session.id, "hello", true).await;
    assert!(app
        .wait_for_update(&session.id, offset + 1, &[EventKind::Message], Duration::from_secs(5))
        .await
        .unwrap());

    let replies = stores
        .sessions
        .list_events(&session.id, Some(offset + 1), &[EventKind::Message], true)
        .await
        .unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].source, EventSource::AiAgent);
    assert_eq!(replies[0].message(), Some("reply"));
}

#[tokio::test]
async fn test_manual_session_is_not_dispatched() {
    let stores = stores();
    let agent = agent(&stores, 3).await;
    let app = application(stores.clone(), Duration::from_millis(1));
    let session = app.create_session("user", &agent.id, false).await.unwrap();
    stores
        .sessions
        .update_session(
            &session.id,
            SessionUpdateParams {
                mode: Some(SessionMode::Manual),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let offset = customer_says(&app, &session.id, "hello", true).await;
    let updated = app
        .wait_for_update(&session.id, offset + 1, &[], Duration::from_millis(200))
        .await
        .unwrap();
    assert!(!updated);
}

#[tokio::test]
async fn test_greeting_without_history_emits_no_message() {
    let stores = stores();
    let agent = agent(&stores, 3).await;
    let app = application(stores.clone(), Duration::from_millis(1));
    let session = app.create_session("user", &agent.id, true).await.unwrap();

    assert!(app
        .wait_for_update(&session.id, 3, &[EventKind::Status], Duration::from_secs(5))
        .await
        .unwrap());
    app.shutdown().await;

    let events = all_events(&stores.sessions, &session.id).await;
    assert!(events.iter().all(|e| e.kind == EventKind::Status));
    let ready = events
        .iter()
        .filter(|e| e.status().map(|s| s.as_str()) == Some("ready"))
        .count();
    assert_eq!(ready, 1);
}

#[tokio::test]
async fn test_cancel_processing_stops_reply() {
    let stores = stores();
    let agent = agent(&stores, 3).await;
    let app = application(stores.clone(), Duration::from_millis(200));
    let session = app.create_session("user", &agent.id, false).await.unwrap();

    customer_says(&app, &session.id, "hello", false).await;
    let correlation_id = app.dispatch(&session).await.unwrap();
    app.cancel_processing(&session.id).await;
    app.shutdown().await;

    let events = all_events(&stores.sessions, &session.id).await;
    assert!(!events.iter().any(|e| e.source == EventSource::AiAgent));
    let seen = statuses(&events, &correlation_id);
    assert!(seen.iter().any(|s| s == "cancelled"));
    assert_eq!(seen.last().map(String::as_str), Some("ready"));
}

#[tokio::test]
async fn test_forced_collection_waits_for_cancelled_runs() {
    let stores = stores();
    let agent = agent(&stores, 3).await;
    let app = application(stores.clone(), Duration::from_millis(300));
    let session = app.create_session("user", &agent.id, false).await.unwrap();

    customer_says(&app, &session.id, "hello", false).await;
    let correlation_id = app.dispatch(&session).await.unwrap();
    // 让处理进入回复生成
    app.wait_for_update(&session.id, 3, &[EventKind::Status], Duration::from_secs(5))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), app.shutdown())
        .await
        .unwrap();

    let events = all_events(&stores.sessions, &session.id).await;
    assert_eq!(
        statuses(&events, &correlation_id),
        vec!["acknowledged", "processing", "typing", "cancelled", "ready"]
    );
}

#[tokio::test]
async fn test_offsets_stay_gapless_with_deletions() {
    let stores = stores();
    let agent = agent(&stores, 3).await;
    let app = application(stores.clone(), Duration::from_millis(1));
    let session = app.create_session("user", &agent.id, false).await.unwrap();

    customer_says(&app, &session.id, "first", false).await;
    customer_says(&app, &session.id, "second", false).await;
    let first = all_events(&stores.sessions, &session.id).await.remove(0);
    stores.sessions.delete_event(&first.id).await.unwrap();

    let correlation_id = app.dispatch(&session).await.unwrap();
    assert!(app
        .wait_for_update(&session.id, 2, &[EventKind::Message], Duration::from_secs(5))
        .await
        .unwrap());
    app.shutdown().await;

    let events = all_events(&stores.sessions, &session.id).await;
    let offsets: Vec<u64> = events.iter().map(|e| e.offset).collect();
    let expected: Vec<u64> = (0..events.len() as u64).collect();
    assert_eq!(offsets, expected);
    assert!(events[0].deleted);

    let acknowledged = events
        .iter()
        .find(|e| e.correlation_id == correlation_id && e.kind == EventKind::Status)
        .unwrap();
    assert_eq!(acknowledged.data["acknowledged_offset"], 1);

    let visible = stores
        .sessions
        .list_events(&session.id, None, &[], true)
        .await
        .unwrap();
    assert_eq!(visible.len(), events.len() - 1);
}

/// 实现有缺陷的工具：调用时越界 panic
struct ExplodingTool;

#[async_trait]
impl Tool for ExplodingTool {
    fn name(&self) -> &str {
        "explode"
    }

    fn description(&self) -> &str {
        "Indexes past the end of an empty list"
    }

    async fn call(&self, _context: &ToolContext, _args: Value) -> Result<ToolResult, String> {
        let empty: Vec<Value> = Vec::new();
        Ok(ToolResult::new(empty[0].clone()))
    }
}

#[tokio::test]
async fn test_panicking_tool_reports_error_and_other_sessions_keep_working() {
    let stores = stores();
    let agent = agent(&stores, 3).await;
    let guideline = stores
        .guidelines
        .create_guideline(&agent.id, "customer asks to explode", "call the tool")
        .await
        .unwrap();
    stores
        .tool_associations
        .create_association(&guideline.id, ToolId::new("local", "explode"))
        .await
        .unwrap();

    let mut local = LocalToolService::new();
    local.register(ExplodingTool);
    let mut registry = ServiceRegistry::new();
    registry.register_service("local", Arc::new(local));
    let executor = Arc::new(ToolExecutor::new(Arc::new(registry), 5));

    let proposer = Arc::new(FnGenerator::new(|_, _| {
        Ok(GuidelinePropositionsSchema {
            checks: vec![GuidelineCheck {
                condition_number: 1,
                condition: String::new(),
                rationale: "asked".to_string(),
                applies_score: 9,
                hard_to_ascertain: false,
            }],
        })
    }));
    let tools = Arc::new(FnGenerator::new(|_, _| {
        Ok(ToolCallInferenceSchema {
            tool_calls: vec![ToolCallEvaluation {
                rationale: String::new(),
                applicability_score: 9,
                arguments: BTreeMap::new(),
                same_call_is_already_staged: false,
            }],
        })
    }));
    let listener = Arc::new(PollingSessionListener::new(stores.sessions.clone(), 10));
    let engine = engine(stores.clone(), proposer, tools, executor, replying("still here"));
    let app = Application::new(Arc::new(engine), listener, 0);

    let failing = app.create_session("user", &agent.id, false).await.unwrap();
    customer_says(&app, &failing.id, "explode please", true).await;
    assert!(app
        .wait_for_update(&failing.id, 4, &[EventKind::Status], Duration::from_secs(5))
        .await
        .unwrap());

    // 另一个会话的派发会回收已 panic 的任务，且不受其影响
    let quiet_agent = stores
        .agents
        .create_agent("Quiet", None, 3)
        .await
        .unwrap();
    let other = app.create_session("user", &quiet_agent.id, false).await.unwrap();
    let offset = customer_says(&app, &other.id, "hello", true).await;
    assert!(app
        .wait_for_update(&other.id, offset + 1, &[EventKind::Message], Duration::from_secs(5))
        .await
        .unwrap());
    app.shutdown().await;

    let events = all_events(&stores.sessions, &failing.id).await;
    let correlation_id = events
        .iter()
        .find(|e| e.kind == EventKind::Status)
        .map(|e| e.correlation_id.clone())
        .unwrap();
    assert_eq!(
        statuses(&events, &correlation_id),
        vec!["acknowledged", "processing", "error", "ready"]
    );
    let error = events
        .iter()
        .find(|e| e.status().map(|s| s.as_str()) == Some("error"))
        .unwrap();
    assert!(error.data["data"]["exception"]
        .as_str()
        .unwrap()
        .contains("index out of bounds"));
    assert!(!events.iter().any(|e| e.source == EventSource::AiAgent));

    let other_events = all_events(&stores.sessions, &other.id).await;
    let replies: Vec<_> = other_events
        .iter()
        .filter(|e| e.source == EventSource::AiAgent)
        .collect();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].message(), Some("still here"));
}
