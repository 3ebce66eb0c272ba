//! 单次会话处理：propositions → tools → message
//!
//! 状态事件顺序：acknowledged → processing → typing → (cancelled | error)，最后总是 ready。
//! 取消是协作式的，在阶段边界检查；被取消的运行不产生 message 事件，也不保存 inspection。
//! 运行中的 panic 在 process 边界捕获，按 error 上报。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::{RwLock, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;

use crate::agents::AgentStore;
use crate::context_variables::{load_context_variables, ContextVariableStore};
use crate::core::EngineError;
use crate::engine::{
    infer_connected_propositions, partition_by_tool_association, EmittedEvent, EventEmitter,
    GuidelineProposer, InteractionSnapshot, MessageGenerator, PartitionedPropositions, ToolCaller,
};
use crate::glossary::GlossaryStore;
use crate::guidelines::{GuidelineConnectionStore, GuidelineStore, GuidelineToolAssociationStore};
use crate::sessions::{
    ContextVariableRecord, EventKind, PreparationIteration, SessionMode, SessionStatus,
    SessionStore, SessionUpdateParams,
};
use crate::tools::ToolContext;

/// 一次处理的标识
#[derive(Debug, Clone)]
pub struct Context {
    pub session_id: String,
    pub agent_id: String,
    pub correlation_id: String,
    /// 派发时日志中最后一条事件的 offset
    pub acknowledged_offset: u64,
}

/// 运行结果：完成或被取消（取消不是错误）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled,
}

/// 引擎依赖的存储
#[derive(Clone)]
pub struct EngineStores {
    pub agents: Arc<dyn AgentStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub guidelines: Arc<dyn GuidelineStore>,
    pub connections: Arc<dyn GuidelineConnectionStore>,
    pub tool_associations: Arc<dyn GuidelineToolAssociationStore>,
    pub context_variables: Arc<dyn ContextVariableStore>,
    pub glossary: Arc<dyn GlossaryStore>,
}

pub struct Engine {
    stores: EngineStores,
    proposer: GuidelineProposer,
    tool_caller: ToolCaller,
    message_generator: MessageGenerator,
    /// message 事件在读锁下检查取消并写入；取消运行的一方持有写锁
    emissions: RwLock<()>,
}

macro_rules! bail_if_cancelled {
    ($cancel:expr, $stage:expr) => {
        if $cancel.is_cancelled() {
            tracing::info!(stage = $stage, "processing cancelled");
            return Ok(RunOutcome::Cancelled);
        }
    };
}

impl Engine {
    pub fn new(
        stores: EngineStores,
        proposer: GuidelineProposer,
        tool_caller: ToolCaller,
        message_generator: MessageGenerator,
    ) -> Self {
        Self {
            stores,
            proposer,
            tool_caller,
            message_generator,
            emissions: RwLock::new(()),
        }
    }

    pub fn stores(&self) -> &EngineStores {
        &self.stores
    }

    /// 持有期间没有运行能写入 message 事件；在此期间取消的运行不会再回复
    pub async fn hold_emissions(&self) -> RwLockWriteGuard<'_, ()> {
        self.emissions.write().await
    }

    /// 处理一次；失败（包括 panic）会以 error 状态上报并返回 Err，ready 在任何情况下最后发出
    pub async fn process(
        &self,
        ctx: &Context,
        emitter: &dyn EventEmitter,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, EngineError> {
        let result = match AssertUnwindSafe(self.do_process(ctx, emitter, cancel))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(EngineError::Panicked(panic_message(panic.as_ref()))),
        };

        match &result {
            Ok(RunOutcome::Cancelled) => {
                emit_status(emitter, ctx, SessionStatus::Cancelled, Value::Object(Default::default()))
                    .await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "processing failed");
                emit_status(
                    emitter,
                    ctx,
                    SessionStatus::Error,
                    serde_json::json!({ "exception": e.to_string() }),
                )
                .await;
            }
            Ok(RunOutcome::Completed) => {}
        }
        emit_status(emitter, ctx, SessionStatus::Ready, Value::Object(Default::default())).await;

        result
    }

    async fn do_process(
        &self,
        ctx: &Context,
        emitter: &dyn EventEmitter,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, EngineError> {
        emit_status(emitter, ctx, SessionStatus::Acknowledged, Value::Object(Default::default()))
            .await;

        let stores = &self.stores;
        let session = stores.sessions.read_session(&ctx.session_id).await?;
        let agent = stores.agents.read_agent(&ctx.agent_id).await?;
        let history = stores
            .sessions
            .list_events(&session.id, None, &[EventKind::Message, EventKind::Tool], true)
            .await?;
        let context_variables = load_context_variables(
            stores.context_variables.as_ref(),
            &agent.id,
            &session.end_user_id,
        )
        .await?;
        let guidelines = stores.guidelines.list_guidelines(&agent.id).await?;
        let associations = stores.tool_associations.list_associations().await?;

        emit_status(emitter, ctx, SessionStatus::Processing, Value::Object(Default::default()))
            .await;

        let tool_context = ToolContext {
            agent_id: agent.id.clone(),
            session_id: session.id.clone(),
            end_user_id: session.end_user_id.clone(),
        };
        let variable_records: Vec<ContextVariableRecord> = context_variables
            .iter()
            .map(|(variable, value)| ContextVariableRecord {
                variable: variable.clone(),
                value: value.clone(),
            })
            .collect();

        let mut staged_events: Vec<EmittedEvent> = Vec::new();
        let mut iterations: Vec<PreparationIteration> = Vec::new();
        let mut propositions = PartitionedPropositions::default();
        let mut terms = Vec::new();
        let mut mode_directive: Option<SessionMode> = None;

        for iteration in 0..agent.max_engine_iterations {
            bail_if_cancelled!(cancel, "preparation");

            let search_text = InteractionSnapshot {
                agent: &agent,
                session: &session,
                history: &history,
                context_variables: &context_variables,
                terms: &[],
                staged_events: &staged_events,
            }
            .searchable_text();
            terms = stores
                .glossary
                .find_relevant_terms(&agent.id, &search_text)
                .await?;

            let snapshot = InteractionSnapshot {
                agent: &agent,
                session: &session,
                history: &history,
                context_variables: &context_variables,
                terms: &terms,
                staged_events: &staged_events,
            };

            let proposed = self.proposer.propose(&snapshot, &guidelines).await?;
            let inferred = infer_connected_propositions(
                stores.connections.as_ref(),
                &guidelines,
                &proposed.propositions,
            )
            .await?;
            let mut all = proposed.propositions;
            all.extend(inferred);
            propositions = partition_by_tool_association(all, &associations);

            bail_if_cancelled!(cancel, "propositions");

            let mut record = PreparationIteration {
                guideline_propositions: propositions.all().map(|p| p.record()).collect(),
                tool_calls: Vec::new(),
                terms: terms.clone(),
                context_variables: variable_records.clone(),
                generations: proposed.batch_generations,
            };

            let inference = self.tool_caller.infer_tool_calls(&snapshot, &propositions).await?;
            record.generations.extend(inference.generations);

            if inference.calls.is_empty() {
                tracing::debug!(iteration, "no new tool calls; ready to respond");
                iterations.push(record);
                break;
            }

            bail_if_cancelled!(cancel, "tool execution");

            let results = self
                .tool_caller
                .execute_tool_calls(&tool_context, &inference.calls)
                .await;

            bail_if_cancelled!(cancel, "tool results");

            if let Some(mode) = results.iter().rev().find_map(|r| r.result.control.mode) {
                mode_directive = Some(mode);
            }
            record.tool_calls = results.iter().map(|r| r.record()).collect();

            let event = emitter
                .emit_tool_event(
                    &ctx.correlation_id,
                    serde_json::json!({ "tool_calls": record.tool_calls }),
                )
                .await?;
            staged_events.push(event);
            iterations.push(record);

            if iteration + 1 == agent.max_engine_iterations {
                tracing::warn!(
                    max_engine_iterations = agent.max_engine_iterations,
                    "reached max engine iterations; responding with what is staged"
                );
            }
        }

        let mut mode = session.mode;
        if let Some(directive) = mode_directive {
            if directive != session.mode {
                tracing::info!(mode = ?directive, "tool result changed session mode");
                stores
                    .sessions
                    .update_session(
                        &session.id,
                        SessionUpdateParams {
                            mode: Some(directive),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
            mode = directive;
        }

        let mut message_generations = Vec::new();
        if mode == SessionMode::Manual {
            tracing::info!("session is in manual mode; skipping reply");
        } else {
            bail_if_cancelled!(cancel, "message generation");
            emit_status(emitter, ctx, SessionStatus::Typing, Value::Object(Default::default()))
                .await;

            let snapshot = InteractionSnapshot {
                agent: &agent,
                session: &session,
                history: &history,
                context_variables: &context_variables,
                terms: &terms,
                staged_events: &staged_events,
            };
            let outcome = self.message_generator.generate(&snapshot, &propositions).await?;

            {
                // 取消方持有写锁时，检查与写入之间不会插入取消
                let _emissions = self.emissions.read().await;
                bail_if_cancelled!(cancel, "message emission");
                if let Some(message) = &outcome.message {
                    emitter
                        .emit_message_event(&ctx.correlation_id, message)
                        .await?;
                }
            }
            message_generations.extend(outcome.inspection);
        }

        stores
            .sessions
            .create_inspection(&session.id, &ctx.correlation_id, iterations, message_generations)
            .await?;

        Ok(RunOutcome::Completed)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 状态事件写入失败只记录日志，不影响运行
async fn emit_status(emitter: &dyn EventEmitter, ctx: &Context, status: SessionStatus, data: Value) {
    let payload = serde_json::json!({
        "status": status.as_str(),
        "acknowledged_offset": ctx.acknowledged_offset,
        "data": data,
    });
    if let Err(e) = emitter.emit_status_event(&ctx.correlation_id, payload).await {
        tracing::warn!(status = status.as_str(), error = %e, "failed to emit status event");
    }
}
