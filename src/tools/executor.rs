//! 工具执行器
//!
//! 持有 ServiceRegistry 与全局超时，execute(tool_id, context, args) 在超时内调用对应服务，
//! 超时或失败时转为 ToolError（Timeout / ExecutionFailed）；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::tools::{ServiceRegistry, ToolContext, ToolError, ToolId, ToolResult};

/// 工具执行器：对每次调用施加超时
pub struct ToolExecutor {
    registry: Arc<ServiceRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ServiceRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// 执行指定工具；输出 JSON 审计日志
    pub async fn execute(
        &self,
        tool_id: &ToolId,
        context: &ToolContext,
        args: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);

        let result = match self.registry.read_tool_service(&tool_id.service_name) {
            Ok(service) => {
                match timeout(
                    self.timeout,
                    service.call_tool(&tool_id.tool_name, context, args),
                )
                .await
                {
                    Ok(r) => r,
                    Err(_) => Err(ToolError::Timeout(tool_id.to_string())),
                }
            }
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ToolError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_id.to_string(),
            "session_id": context.session_id,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::tools::{LocalToolService, Tool};

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn call(
            &self,
            _context: &ToolContext,
            _args: serde_json::Value,
        ) -> Result<ToolResult, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolResult::new(serde_json::Value::Null))
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            agent_id: "a".into(),
            session_id: "s".into(),
            end_user_id: "u".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_tool_timeout() {
        let mut service = LocalToolService::new();
        service.register(SlowTool);
        let mut registry = ServiceRegistry::new();
        registry.register_service("local", Arc::new(service));

        let executor = ToolExecutor::new(Arc::new(registry), 1);
        let err = executor
            .execute(&ToolId::new("local", "slow"), &ctx(), serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_unknown_service() {
        let executor = ToolExecutor::new(Arc::new(ServiceRegistry::new()), 1);
        let err = executor
            .execute(&ToolId::new("missing", "x"), &ctx(), serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::ServiceNotFound("missing".into()));
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = serde_json::json!({ "text": "x".repeat(500) });
        assert!(args_preview(&long).ends_with("..."));
    }
}
