//! 集成测试共用：内存存储、可编排的生成器、记录参数的工具

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use tenet::agents::{Agent, AgentStore, MemoryAgentStore};
use tenet::context_variables::MemoryContextVariableStore;
use tenet::engine::{
    Engine, EngineStores, GuidelineProposer, GuidelinePropositionsSchema, MessageGenerator,
    MessageSchema, Revision, ToolCallInferenceSchema, ToolCaller,
};
use tenet::glossary::MemoryGlossaryStore;
use tenet::guidelines::{MemoryConnectionStore, MemoryGuidelineStore, MemoryToolAssociationStore};
use tenet::llm::{
    FnGenerator, GenerationError, GenerationHints, GenerationInfo, SchematicGenerationResult,
    SchematicGenerator,
};
use tenet::sessions::{Event, EventKind, MemorySessionStore, SessionStore};
use tenet::tools::{
    HandoffTool, LocalToolService, ServiceRegistry, Tool, ToolContext, ToolExecutor, ToolResult,
};

pub fn stores() -> EngineStores {
    EngineStores {
        agents: Arc::new(MemoryAgentStore::new()),
        sessions: Arc::new(MemorySessionStore::new()),
        guidelines: Arc::new(MemoryGuidelineStore::new()),
        connections: Arc::new(MemoryConnectionStore::new()),
        tool_associations: Arc::new(MemoryToolAssociationStore::new()),
        context_variables: Arc::new(MemoryContextVariableStore::new()),
        glossary: Arc::new(MemoryGlossaryStore::new()),
    }
}

pub async fn agent(stores: &EngineStores, max_engine_iterations: usize) -> Agent {
    stores
        .agents
        .create_agent("Tester", None, max_engine_iterations)
        .await
        .unwrap()
}

/// 记录每次调用参数的工具（注册为 local:record）
#[derive(Default)]
pub struct RecordingTool {
    pub calls: Mutex<Vec<Value>>,
}

impl RecordingTool {
    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }
}

pub struct SharedRecordingTool(pub Arc<RecordingTool>);

#[async_trait]
impl Tool for SharedRecordingTool {
    fn name(&self) -> &str {
        "record"
    }

    fn description(&self) -> &str {
        "Records its arguments"
    }

    async fn call(&self, _context: &ToolContext, args: Value) -> Result<ToolResult, String> {
        self.0.calls.lock().unwrap().push(args.clone());
        Ok(ToolResult::new(serde_json::json!({ "recorded": args })))
    }
}

pub fn executor(recorder: Arc<RecordingTool>) -> Arc<ToolExecutor> {
    let mut local = LocalToolService::new();
    local.register(SharedRecordingTool(recorder));
    local.register(HandoffTool);
    let mut registry = ServiceRegistry::new();
    registry.register_service("local", Arc::new(local));
    Arc::new(ToolExecutor::new(Arc::new(registry), 5))
}

pub fn no_checks() -> Arc<FnGenerator<GuidelinePropositionsSchema>> {
    Arc::new(FnGenerator::new(|_, _| {
        Ok(GuidelinePropositionsSchema { checks: vec![] })
    }))
}

pub fn no_tool_calls() -> Arc<FnGenerator<ToolCallInferenceSchema>> {
    Arc::new(FnGenerator::new(|_, _| {
        Ok(ToolCallInferenceSchema { tool_calls: vec![] })
    }))
}

pub fn reply(content: &str) -> MessageSchema {
    MessageSchema {
        produced_reply: true,
        rationale: String::new(),
        revisions: vec![Revision {
            revision_number: 1,
            content: content.to_string(),
            guidelines_followed: vec![],
            guidelines_broken: vec![],
            followed_all_guidelines: Some(true),
            guidelines_broken_due_to_missing_data: None,
            missing_data_rationale: None,
            guidelines_broken_only_due_to_prioritization: None,
            prioritization_rationale: None,
        }],
    }
}

pub fn replying(content: &'static str) -> Arc<FnGenerator<MessageSchema>> {
    Arc::new(FnGenerator::new(move |_, _| Ok(reply(content))))
}

/// 回复前先睡一会儿，用于制造处理中的运行
pub struct SlowReply {
    pub delay: Duration,
    pub content: String,
}

#[async_trait]
impl SchematicGenerator<MessageSchema> for SlowReply {
    async fn generate(
        &self,
        _prompt: &str,
        _hints: &GenerationHints,
    ) -> Result<SchematicGenerationResult<MessageSchema>, GenerationError> {
        tokio::time::sleep(self.delay).await;
        Ok(SchematicGenerationResult {
            content: reply(&self.content),
            info: GenerationInfo::default(),
        })
    }
}

pub fn engine(
    stores: EngineStores,
    proposer: Arc<dyn SchematicGenerator<GuidelinePropositionsSchema>>,
    tools: Arc<dyn SchematicGenerator<ToolCallInferenceSchema>>,
    executor: Arc<ToolExecutor>,
    messages: Arc<dyn SchematicGenerator<MessageSchema>>,
) -> Engine {
    Engine::new(
        stores,
        GuidelineProposer::new(proposer),
        ToolCaller::new(tools, executor),
        MessageGenerator::new(messages, 5),
    )
}

/// 会话中全部事件（含已删除）
pub async fn all_events(sessions: &Arc<dyn SessionStore>, session_id: &str) -> Vec<Event> {
    sessions
        .list_events(session_id, None, &[], false)
        .await
        .unwrap()
}

/// 某次运行的状态序列
pub fn statuses(events: &[Event], correlation_id: &str) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.kind == EventKind::Status && e.correlation_id == correlation_id)
        .filter_map(|e| e.status().map(|s| s.as_str().to_string()))
        .collect()
}
