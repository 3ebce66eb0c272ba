//! 回复生成：起草并自我修订，最多取前 5 个修订版本
//!
//! 选择规则：第一个遵守了全部 guideline，或仅因优先级取舍 / 缺少数据而违反的修订版本胜出，
//! 之后的版本忽略；都不满足时取最后一个并记录为问题回复（仍然发出）。
//! 只在生成本身失败时重试（温度依次 0.5、1.0、0.1）。

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::EngineError;
use crate::engine::{InteractionSnapshot, PartitionedPropositions, PromptBuilder};
use crate::llm::{GenerationError, GenerationHints, SchematicGenerator};
use crate::sessions::MessageGenerationInspection;

const RETRY_TEMPERATURES: [f32; 3] = [0.5, 1.0, 0.1];

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Revision {
    pub revision_number: u32,
    pub content: String,
    #[serde(default)]
    pub guidelines_followed: Vec<String>,
    #[serde(default)]
    pub guidelines_broken: Vec<String>,
    #[serde(default)]
    pub followed_all_guidelines: Option<bool>,
    #[serde(default)]
    pub guidelines_broken_due_to_missing_data: Option<bool>,
    #[serde(default)]
    pub missing_data_rationale: Option<String>,
    #[serde(default)]
    pub guidelines_broken_only_due_to_prioritization: Option<bool>,
    #[serde(default)]
    pub prioritization_rationale: Option<String>,
}

impl Revision {
    /// 全部遵守，或违反有正当理由
    fn is_acceptable(&self) -> bool {
        self.followed_all_guidelines == Some(true)
            || self.guidelines_broken_only_due_to_prioritization == Some(true)
            || self.guidelines_broken_due_to_missing_data == Some(true)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MessageSchema {
    /// false 表示 agent 决定本轮不回复
    #[serde(default = "default_true")]
    pub produced_reply: bool,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub revisions: Vec<Revision>,
}

#[derive(Debug, Clone, Default)]
pub struct MessageGenerationOutcome {
    pub message: Option<String>,
    pub inspection: Option<MessageGenerationInspection>,
}

pub struct MessageGenerator {
    generator: Arc<dyn SchematicGenerator<MessageSchema>>,
    max_revisions: usize,
}

impl MessageGenerator {
    pub fn new(generator: Arc<dyn SchematicGenerator<MessageSchema>>, max_revisions: usize) -> Self {
        Self {
            generator,
            max_revisions: max_revisions.max(1),
        }
    }

    pub async fn generate(
        &self,
        snapshot: &InteractionSnapshot<'_>,
        propositions: &PartitionedPropositions,
    ) -> Result<MessageGenerationOutcome, EngineError> {
        if snapshot.history.is_empty() && propositions.is_empty() {
            tracing::info!("no interaction history and no applicable guidelines; not replying");
            return Ok(MessageGenerationOutcome::default());
        }

        let prompt = build_prompt(snapshot, propositions, self.max_revisions);

        let mut last_error: Option<GenerationError> = None;
        for (attempt, temperature) in RETRY_TEMPERATURES.iter().enumerate() {
            match self
                .generator
                .generate(&prompt, &GenerationHints::with_temperature(*temperature))
                .await
            {
                Ok(result) => {
                    let message = self.select_revision(result.content);
                    return Ok(MessageGenerationOutcome {
                        inspection: Some(MessageGenerationInspection {
                            generation: result.info,
                            messages: vec![message.clone()],
                        }),
                        message,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        temperature,
                        error = %e,
                        "message generation attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(EngineError::Generation(last_error.unwrap_or_else(|| {
            GenerationError::Backend("message generation exhausted retries".to_string())
        })))
    }

    fn select_revision(&self, schema: MessageSchema) -> Option<String> {
        if !schema.produced_reply {
            tracing::info!(rationale = %schema.rationale, "agent chose not to reply");
            return None;
        }

        let revisions: Vec<Revision> = schema.revisions.into_iter().take(self.max_revisions).collect();
        if let Some(revision) = revisions.iter().find(|r| r.is_acceptable()) {
            return Some(revision.content.clone());
        }

        let last = revisions.last()?;
        tracing::warn!(
            revision = last.revision_number,
            broken = ?last.guidelines_broken,
            "problematic response: no revision followed or justified all guidelines"
        );
        Some(last.content.clone())
    }
}

fn build_prompt(
    snapshot: &InteractionSnapshot<'_>,
    propositions: &PartitionedPropositions,
    max_revisions: usize,
) -> String {
    let guidelines: Vec<_> = propositions.all().cloned().collect();
    PromptBuilder::new()
        .add_section(
            "TASK",
            format!(
                "Write the agent's next reply to the customer. Draft it, then critique and revise \
                 it up to {} times. For each revision list the guidelines it followed and broke, \
                 and whether any broken guideline was broken only due to prioritization or due \
                 to missing data. Higher priority guidelines take precedence. Set produced_reply \
                 to false if the agent should not reply at all.",
                max_revisions
            ),
        )
        .add_agent_identity(snapshot.agent)
        .add_interaction_history(snapshot.history)
        .add_context_variables(snapshot.context_variables)
        .add_glossary(snapshot.terms)
        .add_staged_events(snapshot.staged_events)
        .add_guideline_propositions("GUIDELINES", &guidelines)
        .build()
}
