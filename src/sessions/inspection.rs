//! Inspection：一次处理的可观测快照，运行结束时持久化一次，之后不再修改

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context_variables::{ContextVariable, ContextVariableValue};
use crate::glossary::Term;
use crate::llm::GenerationInfo;
use crate::tools::{ToolId, ToolResult};

/// 某条 guideline 在本轮被判定适用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropositionRecord {
    pub guideline_id: String,
    pub condition: String,
    pub action: String,
    pub score: u8,
    pub rationale: String,
}

/// 一次工具调用及其结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub tool_id: ToolId,
    pub arguments: Value,
    pub result: ToolResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextVariableRecord {
    pub variable: ContextVariable,
    pub value: ContextVariableValue,
}

/// 一次准备迭代
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreparationIteration {
    pub guideline_propositions: Vec<PropositionRecord>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub terms: Vec<Term>,
    pub context_variables: Vec<ContextVariableRecord>,
    pub generations: Vec<GenerationInfo>,
}

/// 一次回复生成
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageGenerationInspection {
    pub generation: GenerationInfo,
    pub messages: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    pub session_id: String,
    pub correlation_id: String,
    pub preparation_iterations: Vec<PreparationIteration>,
    pub message_generations: Vec<MessageGenerationInspection>,
    pub creation_utc: DateTime<Utc>,
}
