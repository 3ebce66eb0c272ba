//! 工具调用推断与执行
//!
//! 每个候选工具（由激活的 tool-enabled guideline 关联而来）单独一批询问后端，各批并发；
//! 只执行 applicability_score ≥ 7 且未以相同参数暂存过的调用。执行失败替换为错误结果，不中断运行。

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::{join_all, try_join_all};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::EngineError;
use crate::engine::{GuidelineProposition, InteractionSnapshot, PartitionedPropositions, PromptBuilder};
use crate::llm::{GenerationHints, GenerationInfo, SchematicGenerator};
use crate::sessions::ToolCallRecord;
use crate::tools::{ToolContext, ToolDescriptor, ToolExecutor, ToolId, ToolResult};

pub const TOOL_CALL_THRESHOLD: i64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolCallEvaluation {
    #[serde(default)]
    pub rationale: String,
    /// 1 到 10；≥ 7 才会执行
    pub applicability_score: i64,
    #[serde(default)]
    pub arguments: BTreeMap<String, Value>,
    /// 后端认为相同工具与参数的调用本轮已执行过
    #[serde(default)]
    pub same_call_is_already_staged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolCallInferenceSchema {
    #[serde(default)]
    pub tool_calls: Vec<ToolCallEvaluation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool_id: ToolId,
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub id: String,
    pub tool_call: ToolCall,
    pub result: ToolResult,
}

impl ToolCallResult {
    pub fn record(&self) -> ToolCallRecord {
        ToolCallRecord {
            id: self.id.clone(),
            tool_id: self.tool_call.tool_id.clone(),
            arguments: self.tool_call.arguments.clone(),
            result: self.result.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolCallInference {
    pub calls: Vec<ToolCall>,
    pub generations: Vec<GenerationInfo>,
}

pub struct ToolCaller {
    generator: Arc<dyn SchematicGenerator<ToolCallInferenceSchema>>,
    executor: Arc<ToolExecutor>,
}

impl ToolCaller {
    pub fn new(
        generator: Arc<dyn SchematicGenerator<ToolCallInferenceSchema>>,
        executor: Arc<ToolExecutor>,
    ) -> Self {
        Self {
            generator,
            executor,
        }
    }

    /// 推断本轮需要执行的工具调用（已去重）
    pub async fn infer_tool_calls(
        &self,
        snapshot: &InteractionSnapshot<'_>,
        propositions: &PartitionedPropositions,
    ) -> Result<ToolCallInference, EngineError> {
        let candidates = propositions.candidate_tools();
        if candidates.is_empty() {
            return Ok(ToolCallInference::default());
        }

        let mut descriptors = Vec::with_capacity(candidates.len());
        for tool_id in candidates.keys() {
            descriptors.push(self.executor.registry().read_tool(tool_id).await?);
        }

        let batches = candidates
            .iter()
            .zip(descriptors.iter())
            .map(|((tool_id, enabling), descriptor)| {
                self.evaluate_tool(snapshot, propositions, tool_id, descriptor, enabling)
            });
        let results = try_join_all(batches).await?;

        let staged = snapshot.staged_tool_calls();
        let mut inference = ToolCallInference::default();
        for (tool_id, evaluations, info) in results {
            inference.generations.push(info);
            for evaluation in evaluations {
                if evaluation.applicability_score < TOOL_CALL_THRESHOLD {
                    continue;
                }
                let arguments = Value::Object(evaluation.arguments.into_iter().collect());
                let already_staged = staged
                    .iter()
                    .any(|r| r.tool_id == tool_id && r.arguments == arguments);
                if evaluation.same_call_is_already_staged != already_staged {
                    tracing::debug!(
                        tool = %tool_id,
                        backend_flag = evaluation.same_call_is_already_staged,
                        already_staged,
                        "backend staging flag disagrees with staged calls"
                    );
                }
                let duplicate_in_batch = inference
                    .calls
                    .iter()
                    .any(|c| c.tool_id == tool_id && c.arguments == arguments);
                if already_staged || duplicate_in_batch {
                    continue;
                }
                inference.calls.push(ToolCall {
                    id: format!("call_{}", uuid::Uuid::new_v4()),
                    tool_id: tool_id.clone(),
                    arguments,
                });
            }
        }
        Ok(inference)
    }

    async fn evaluate_tool(
        &self,
        snapshot: &InteractionSnapshot<'_>,
        propositions: &PartitionedPropositions,
        tool_id: &ToolId,
        descriptor: &ToolDescriptor,
        enabling: &[&GuidelineProposition],
    ) -> Result<(ToolId, Vec<ToolCallEvaluation>, GenerationInfo), EngineError> {
        let enabling: Vec<GuidelineProposition> = enabling.iter().map(|p| (*p).clone()).collect();
        let staged_for_tool = snapshot
            .staged_tool_calls()
            .into_iter()
            .filter(|r| &r.tool_id == tool_id)
            .map(|r| format!("- arguments: {} -> result: {}", r.arguments, r.result.data))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = PromptBuilder::new()
            .add_section(
                "TASK",
                "Decide whether the tool described below should be called now, before the agent \
                 replies. Return one entry per distinct call with its arguments, an \
                 applicability_score from 1 to 10, and same_call_is_already_staged = true if a \
                 call with exactly the same arguments already appears among the staged calls. \
                 Return an empty list if the tool is not needed.",
            )
            .add_agent_identity(snapshot.agent)
            .add_interaction_history(snapshot.history)
            .add_context_variables(snapshot.context_variables)
            .add_glossary(snapshot.terms)
            .add_guideline_propositions("ORDINARY GUIDELINES", &propositions.ordinary)
            .add_guideline_propositions("GUIDELINES THAT ENABLE THIS TOOL", &enabling)
            .add_section(
                "TOOL",
                format!(
                    "{}: {}\nparameters: {}",
                    tool_id, descriptor.description, descriptor.parameters
                ),
            )
            .add_section("STAGED CALLS", staged_for_tool)
            .build();

        let result = self
            .generator
            .generate(&prompt, &GenerationHints::with_temperature(0.05))
            .await?;
        Ok((tool_id.clone(), result.content.tool_calls, result.info))
    }

    /// 并发执行；失败替换为错误结果
    pub async fn execute_tool_calls(
        &self,
        context: &ToolContext,
        calls: &[ToolCall],
    ) -> Vec<ToolCallResult> {
        let runs = calls.iter().map(|call| async move {
            let result = match self
                .executor
                .execute(&call.tool_id, context, call.arguments.clone())
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(tool = %call.tool_id, error = %e, "tool call failed");
                    ToolResult::error(e.to_string())
                }
            };
            ToolCallResult {
                id: call.id.clone(),
                tool_call: call.clone(),
                result,
            }
        });
        join_all(runs).await
    }
}
