//! Guideline 适用性评估（直接打分）
//!
//! 1. 按条件文本分组，相同条件只评估一次
//! 2. 按分组数量决定批大小（≤10 → 1，≤20 → 2，≤30 → 3，其余 5），各批并发调用后端
//! 3. 每个条件得到 1..=10 的分数与 hard_to_ascertain 标记；分数 ≥ 7，或 ≥ 5 且难以客观判断时激活
//!
//! 任意一批失败都会中止评估，不做部分结果回退。

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::try_join_all;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::EngineError;
use crate::engine::{InteractionSnapshot, PromptBuilder};
use crate::guidelines::Guideline;
use crate::llm::{GenerationHints, GenerationInfo, SchematicGenerator};
use crate::sessions::PropositionRecord;

pub const ACTIVATION_THRESHOLD: u8 = 7;
pub const HARD_TO_ASCERTAIN_THRESHOLD: u8 = 5;

/// 后端对单个条件的判断
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GuidelineCheck {
    /// 条件在本批中的编号（从 1 开始）
    pub condition_number: usize,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub rationale: String,
    /// 1 到 10
    pub applies_score: i64,
    /// 条件是否主观、难以客观判断（如情绪）
    #[serde(default)]
    pub hard_to_ascertain: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GuidelinePropositionsSchema {
    #[serde(default)]
    pub checks: Vec<GuidelineCheck>,
}

/// 被判定适用的 guideline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidelineProposition {
    pub guideline: Guideline,
    pub score: u8,
    pub rationale: String,
}

impl GuidelineProposition {
    pub fn record(&self) -> PropositionRecord {
        PropositionRecord {
            guideline_id: self.guideline.id.clone(),
            condition: self.guideline.condition.clone(),
            action: self.guideline.action.clone(),
            score: self.score,
            rationale: self.rationale.clone(),
        }
    }
}

/// 一次评估的结果
#[derive(Debug, Clone, Default)]
pub struct PropositionResult {
    pub propositions: Vec<GuidelineProposition>,
    /// 每批一条
    pub batch_generations: Vec<GenerationInfo>,
}

pub fn is_active(score: u8, hard_to_ascertain: bool) -> bool {
    score >= ACTIVATION_THRESHOLD || (hard_to_ascertain && score >= HARD_TO_ASCERTAIN_THRESHOLD)
}

pub fn batch_size(unique_conditions: usize) -> usize {
    match unique_conditions {
        0..=10 => 1,
        11..=20 => 2,
        21..=30 => 3,
        _ => 5,
    }
}

/// 条件文本 -> 共享该条件的 guideline；保持首次出现的顺序
fn group_by_condition(guidelines: &[Guideline]) -> Vec<(String, Vec<Guideline>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<Guideline>)> = Vec::new();
    for g in guidelines {
        match index.get(g.condition.as_str()) {
            Some(&i) => groups[i].1.push(g.clone()),
            None => {
                index.insert(g.condition.as_str(), groups.len());
                groups.push((g.condition.clone(), vec![g.clone()]));
            }
        }
    }
    groups
}

pub struct GuidelineProposer {
    generator: Arc<dyn SchematicGenerator<GuidelinePropositionsSchema>>,
}

impl GuidelineProposer {
    pub fn new(generator: Arc<dyn SchematicGenerator<GuidelinePropositionsSchema>>) -> Self {
        Self { generator }
    }

    pub async fn propose(
        &self,
        snapshot: &InteractionSnapshot<'_>,
        guidelines: &[Guideline],
    ) -> Result<PropositionResult, EngineError> {
        if guidelines.is_empty() {
            return Ok(PropositionResult::default());
        }

        let groups = group_by_condition(guidelines);
        let size = batch_size(groups.len());
        tracing::debug!(
            guidelines = guidelines.len(),
            conditions = groups.len(),
            batch_size = size,
            "evaluating guideline conditions"
        );

        let batches = groups
            .chunks(size)
            .map(|batch| self.evaluate_batch(snapshot, batch));
        let results = try_join_all(batches).await?;

        let mut propositions = Vec::new();
        let mut batch_generations = Vec::new();
        for (batch_propositions, info) in results {
            propositions.extend(batch_propositions);
            batch_generations.push(info);
        }
        Ok(PropositionResult {
            propositions,
            batch_generations,
        })
    }

    async fn evaluate_batch(
        &self,
        snapshot: &InteractionSnapshot<'_>,
        batch: &[(String, Vec<Guideline>)],
    ) -> Result<(Vec<GuidelineProposition>, GenerationInfo), EngineError> {
        let prompt = build_prompt(snapshot, batch);
        let result = self
            .generator
            .generate(&prompt, &GenerationHints::with_temperature(0.15))
            .await?;

        let propositions = interpret_checks(batch, result.content.checks)?;
        Ok((propositions, result.info))
    }
}

fn build_prompt(snapshot: &InteractionSnapshot<'_>, batch: &[(String, Vec<Guideline>)]) -> String {
    let conditions = batch
        .iter()
        .enumerate()
        .map(|(i, (condition, _))| format!("{}) {}", i + 1, condition))
        .collect::<Vec<_>>()
        .join("\n");

    PromptBuilder::new()
        .add_section(
            "TASK",
            "Evaluate whether each of the numbered conditions below currently applies to the \
             latest state of the interaction. For every condition return its condition_number, \
             a short rationale, an applies_score from 1 (clearly not applicable) to 10 (clearly \
             applicable), and whether the condition is hard to ascertain objectively \
             (for example the customer's emotional state).",
        )
        .add_agent_identity(snapshot.agent)
        .add_interaction_history(snapshot.history)
        .add_context_variables(snapshot.context_variables)
        .add_glossary(snapshot.terms)
        .add_staged_events(snapshot.staged_events)
        .add_section("CONDITIONS", conditions)
        .build()
}

/// 把后端输出映射回本批条件；引用不存在的编号视为无法解释的输出
fn interpret_checks(
    batch: &[(String, Vec<Guideline>)],
    checks: Vec<GuidelineCheck>,
) -> Result<Vec<GuidelineProposition>, EngineError> {
    let mut by_number: HashMap<usize, GuidelineCheck> = HashMap::new();
    for check in checks {
        if check.condition_number == 0 || check.condition_number > batch.len() {
            return Err(EngineError::AmbiguousOutput(format!(
                "condition number {} outside batch of {}",
                check.condition_number,
                batch.len()
            )));
        }
        by_number.entry(check.condition_number).or_insert(check);
    }

    let mut propositions = Vec::new();
    for (i, (condition, guidelines)) in batch.iter().enumerate() {
        let Some(check) = by_number.remove(&(i + 1)) else {
            tracing::warn!(condition = %condition, "backend skipped condition; treating as not applicable");
            continue;
        };

        let score = check.applies_score.clamp(1, 10) as u8;
        if !is_active(score, check.hard_to_ascertain) {
            continue;
        }
        for guideline in guidelines {
            propositions.push(GuidelineProposition {
                guideline: guideline.clone(),
                score,
                rationale: check.rationale.clone(),
            });
        }
    }
    Ok(propositions)
}
