//! Prompt 拼装：按段落组织 agent 身份、交互历史、上下文变量、术语、暂存工具结果与 guideline
//!
//! 空段落不输出；历史中每条消息格式为 `- [offset] source: text`。

use crate::agents::Agent;
use crate::context_variables::{ContextVariable, ContextVariableValue};
use crate::engine::{EmittedEvent, GuidelineProposition};
use crate::glossary::Term;
use crate::sessions::{Event, EventKind};

#[derive(Debug, Default)]
pub struct PromptBuilder {
    sections: Vec<(String, String)>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_section(mut self, title: impl Into<String>, body: impl Into<String>) -> Self {
        let body = body.into();
        if !body.trim().is_empty() {
            self.sections.push((title.into(), body));
        }
        self
    }

    pub fn add_agent_identity(self, agent: &Agent) -> Self {
        let mut body = format!("You are an AI agent named {}.", agent.name);
        if let Some(description) = &agent.description {
            body.push_str(&format!(" {}", description));
        }
        self.add_section("AGENT IDENTITY", body)
    }

    pub fn add_interaction_history(self, history: &[Event]) -> Self {
        let lines: Vec<String> = history
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::Message => e
                    .message()
                    .map(|m| format!("- [{}] {}: {}", e.offset, e.source, m)),
                EventKind::Tool => Some(format!("- [{}] tool: {}", e.offset, e.data)),
                _ => None,
            })
            .collect();
        let body = if lines.is_empty() {
            "(the interaction has not started yet)".to_string()
        } else {
            lines.join("\n")
        };
        self.add_section("INTERACTION HISTORY", body)
    }

    pub fn add_context_variables(
        self,
        variables: &[(ContextVariable, ContextVariableValue)],
    ) -> Self {
        let body = variables
            .iter()
            .map(|(var, value)| match &var.description {
                Some(d) => format!("- {} ({}): {}", var.name, d, value.data),
                None => format!("- {}: {}", var.name, value.data),
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.add_section("CONTEXT VARIABLES", body)
    }

    pub fn add_glossary(self, terms: &[Term]) -> Self {
        let body = terms
            .iter()
            .map(|t| {
                if t.synonyms.is_empty() {
                    format!("- {}: {}", t.name, t.description)
                } else {
                    format!("- {} (also: {}): {}", t.name, t.synonyms.join(", "), t.description)
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.add_section("GLOSSARY", body)
    }

    pub fn add_staged_events(self, events: &[EmittedEvent]) -> Self {
        let body = events
            .iter()
            .filter(|e| e.kind == EventKind::Tool)
            .map(|e| format!("- {}", e.data))
            .collect::<Vec<_>>()
            .join("\n");
        self.add_section("TOOL RESULTS (THIS TURN)", body)
    }

    /// 编号的 guideline 列表：`N) When <condition>, then <action>`
    pub fn add_guideline_propositions(
        self,
        title: &str,
        propositions: &[GuidelineProposition],
    ) -> Self {
        let body = propositions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                format!(
                    "{}) When {}, then {} [priority {}/10]",
                    i + 1,
                    p.guideline.condition,
                    p.guideline.action,
                    p.score
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.add_section(title, body)
    }

    pub fn build(self) -> String {
        self.sections
            .into_iter()
            .map(|(title, body)| format!("### {}\n{}", title, body))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::sessions::EventSource;

    fn message_event(offset: u64, source: EventSource, text: &str) -> Event {
        Event {
            id: format!("e{}", offset),
            session_id: "s".into(),
            offset,
            source,
            kind: EventKind::Message,
            correlation_id: "c".into(),
            data: serde_json::json!({ "message": text }),
            creation_utc: Utc::now(),
            deleted: false,
        }
    }

    #[test]
    fn test_history_format() {
        let prompt = PromptBuilder::new()
            .add_interaction_history(&[
                message_event(0, EventSource::Customer, "hi"),
                message_event(1, EventSource::AiAgent, "hello"),
            ])
            .build();
        assert!(prompt.contains("- [0] customer: hi"));
        assert!(prompt.contains("- [1] ai_agent: hello"));
    }

    #[test]
    fn test_empty_sections_skipped() {
        let prompt = PromptBuilder::new()
            .add_glossary(&[])
            .add_section("TASK", "do it")
            .build();
        assert_eq!(prompt, "### TASK\ndo it");
    }
}
