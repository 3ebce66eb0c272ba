//! 单次准备迭代可见的交互快照

use crate::agents::Agent;
use crate::context_variables::{ContextVariable, ContextVariableValue};
use crate::engine::EmittedEvent;
use crate::glossary::Term;
use crate::sessions::{Event, EventKind, Session, ToolCallRecord};

/// 流水线各阶段共享的只读视图；history 在一次运行开始时读取一次
#[derive(Debug, Clone, Copy)]
pub struct InteractionSnapshot<'a> {
    pub agent: &'a Agent,
    pub session: &'a Session,
    pub history: &'a [Event],
    pub context_variables: &'a [(ContextVariable, ContextVariableValue)],
    pub terms: &'a [Term],
    /// 本次运行已产生的 tool 事件
    pub staged_events: &'a [EmittedEvent],
}

impl<'a> InteractionSnapshot<'a> {
    /// 已暂存的全部工具调用（按发生顺序）
    pub fn staged_tool_calls(&self) -> Vec<ToolCallRecord> {
        self.staged_events
            .iter()
            .filter(|e| e.kind == EventKind::Tool)
            .filter_map(|e| e.data.get("tool_calls"))
            .filter_map(|calls| serde_json::from_value::<Vec<ToolCallRecord>>(calls.clone()).ok())
            .flatten()
            .collect()
    }

    /// 交互中的消息文本与暂存工具数据，用于检索术语
    pub fn searchable_text(&self) -> String {
        let mut parts: Vec<String> = self
            .history
            .iter()
            .filter_map(|e| e.message().map(str::to_string))
            .collect();
        parts.extend(self.staged_events.iter().map(|e| e.data.to_string()));
        parts.join("\n")
    }
}
