//! Tenet - 命令行对话
//!
//! 入口：加载配置、初始化日志、装载 agent 与 guideline 种子，然后逐行读取标准输入作为客户消息，
//! 等待 agent 回复并打印。Ctrl+C 或 quit 触发优雅关闭（回收所有处理任务）。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tenet::agents::{AgentStore, MemoryAgentStore};
use tenet::config::{load_config, AppConfig};
use tenet::context_variables::MemoryContextVariableStore;
use tenet::core::{
    run_until_shutdown, Application, ApplicationCleanup, ShutdownCoordinator, ShutdownManager,
    ShutdownReason,
};
use tenet::engine::{
    Engine, EngineStores, GuidelineProposer, GuidelinePropositionsSchema, MessageGenerator,
    MessageSchema, ToolCallInferenceSchema, ToolCaller,
};
use tenet::glossary::MemoryGlossaryStore;
use tenet::guidelines::{MemoryConnectionStore, MemoryGuidelineStore, MemoryToolAssociationStore};
use tenet::llm::{
    GenerationMetrics, JsonSchematicGenerator, LlmClient, MeteredGenerator, MockLlmClient,
    OpenAiClient,
};
use tenet::seed::{apply_seed, read_seed_file};
use tenet::sessions::{EventKind, EventSource, MemorySessionStore, PollingSessionListener, Session};
use tenet::tools::{EchoTool, HandoffTool, LocalToolService, ServiceRegistry, ToolExecutor};
use tokio::io::{AsyncBufReadExt, BufReader};

fn create_llm(config: &AppConfig) -> Arc<dyn LlmClient> {
    let has_key = std::env::var("OPENAI_API_KEY").is_ok();
    if config.llm.provider == "mock" || !has_key {
        tracing::info!("using mock backend (set OPENAI_API_KEY to use a real model)");
        return Arc::new(MockLlmClient);
    }
    tracing::info!(model = %config.llm.model, "using OpenAI-compatible backend");
    Arc::new(OpenAiClient::new(
        config.llm.base_url.as_deref(),
        &config.llm.model,
        None,
    ))
}

fn build_engine(
    config: &AppConfig,
    llm: Arc<dyn LlmClient>,
    stores: EngineStores,
    metrics: Arc<GenerationMetrics>,
) -> Engine {
    let timeout = config.llm.timeouts.request;

    let proposer = MeteredGenerator::new(
        "guideline_proposer",
        Arc::new(JsonSchematicGenerator::<GuidelinePropositionsSchema>::new(llm.clone(), timeout)),
        metrics.clone(),
    );
    let tool_inference = MeteredGenerator::new(
        "tool_caller",
        Arc::new(JsonSchematicGenerator::<ToolCallInferenceSchema>::new(llm.clone(), timeout)),
        metrics.clone(),
    );
    let messages = MeteredGenerator::new(
        "message_generator",
        Arc::new(JsonSchematicGenerator::<MessageSchema>::new(llm, timeout)),
        metrics,
    );

    let mut local = LocalToolService::new();
    local.register(EchoTool);
    local.register(HandoffTool);
    let mut registry = ServiceRegistry::new();
    registry.register_service("local", Arc::new(local));
    let executor = Arc::new(ToolExecutor::new(
        Arc::new(registry),
        config.tools.tool_timeout_secs,
    ));

    Engine::new(
        stores,
        GuidelineProposer::new(Arc::new(proposer)),
        ToolCaller::new(Arc::new(tool_inference), executor),
        MessageGenerator::new(Arc::new(messages), config.engine.message_max_revisions),
    )
}

async fn repl(
    app: Arc<Application>,
    session: Session,
    wait: Duration,
    shutdown: ShutdownManager,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Type a message (quit to exit).");

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            shutdown.shutdown(ShutdownReason::UserInitiated);
            return Ok(());
        }

        let event = app
            .post_event(
                &session.id,
                EventKind::Message,
                serde_json::json!({ "message": line }),
                EventSource::Customer,
                true,
            )
            .await?;

        let min_offset = event.offset + 1;
        if !app
            .wait_for_update(&session.id, min_offset, &[EventKind::Message], wait)
            .await?
        {
            println!("(no reply)");
            continue;
        }

        let replies = app
            .engine()
            .stores()
            .sessions
            .list_events(&session.id, Some(min_offset), &[EventKind::Message], true)
            .await?;
        for reply in replies.iter().filter(|e| e.source == EventSource::AiAgent) {
            println!("{}", reply.message().unwrap_or_default());
        }
    }

    shutdown.shutdown(ShutdownReason::InputClosed);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tenet::observability::init();

    let config = load_config(std::env::args().nth(1).map(PathBuf::from))
        .context("Failed to load config")?;

    let stores = EngineStores {
        agents: Arc::new(MemoryAgentStore::new()),
        sessions: Arc::new(MemorySessionStore::new()),
        guidelines: Arc::new(MemoryGuidelineStore::new()),
        connections: Arc::new(MemoryConnectionStore::new()),
        tool_associations: Arc::new(MemoryToolAssociationStore::new()),
        context_variables: Arc::new(MemoryContextVariableStore::new()),
        glossary: Arc::new(MemoryGlossaryStore::new()),
    };

    let agent = stores
        .agents
        .create_agent(
            &config.agent.name,
            config.agent.description.clone(),
            config.engine.max_engine_iterations,
        )
        .await?;
    if let Some(path) = &config.agent.guidelines_path {
        let seed = read_seed_file(path)?;
        apply_seed(&stores, &agent.id, &seed).await?;
    }

    let metrics = Arc::new(GenerationMetrics::new());
    let llm = create_llm(&config);
    let listener = Arc::new(PollingSessionListener::new(
        stores.sessions.clone(),
        config.listener.poll_interval_ms,
    ));
    let engine = Arc::new(build_engine(&config, llm, stores, metrics.clone()));
    let app = Arc::new(Application::new(engine, listener, config.engine.gc_interval_ms));

    let session = app
        .create_session("cli-user", &agent.id, false)
        .await
        .context("Failed to create session")?;

    let shutdown = ShutdownManager::new();
    let mut coordinator = ShutdownCoordinator::new(10);
    coordinator.register(ApplicationCleanup::new(app.clone()));

    let wait = Duration::from_secs(config.listener.default_timeout_secs);
    let repl_shutdown = shutdown.clone();
    run_until_shutdown(
        &shutdown,
        async move {
            if let Err(e) = repl(app, session, wait, repl_shutdown).await {
                tracing::error!(error = ?e, "repl failed");
            }
        },
        &coordinator,
    )
    .await;

    let snapshot = metrics.snapshot();
    tracing::info!(
        calls = snapshot.calls,
        failures = snapshot.failures,
        input_tokens = snapshot.input_tokens,
        output_tokens = snapshot.output_tokens,
        "generation metrics"
    );
    Ok(())
}
