//! 转人工工具：返回 control.mode = manual，使会话停止自动回复

use async_trait::async_trait;
use serde_json::Value;

use crate::sessions::SessionMode;
use crate::tools::{Tool, ToolContext, ToolResult};

pub struct HandoffTool;

#[async_trait]
impl Tool for HandoffTool {
    fn name(&self) -> &str {
        "handoff_to_human"
    }

    fn description(&self) -> &str {
        "Transfer the conversation to a human operator"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "reason": { "type": "string", "description": "Why a human is needed" }
            },
            "required": []
        })
    }

    async fn call(&self, context: &ToolContext, args: Value) -> Result<ToolResult, String> {
        let reason = args
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("unspecified");
        tracing::info!(session_id = %context.session_id, reason, "handoff requested");
        Ok(ToolResult::new(serde_json::json!({ "handed_off": true })).with_mode(SessionMode::Manual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handoff_switches_to_manual() {
        let ctx = ToolContext {
            agent_id: "a".into(),
            session_id: "s".into(),
            end_user_id: "u".into(),
        };
        let result = HandoffTool.call(&ctx, serde_json::json!({})).await.unwrap();
        assert_eq!(result.control.mode, Some(SessionMode::Manual));
    }
}
