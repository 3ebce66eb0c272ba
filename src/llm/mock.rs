//! Mock 后端（用于本地运行与测试，无需 API）
//!
//! - MockLlmClient：按 schema 名返回合法的空结果；回复类 schema 回显最后一条客户消息。
//! - FnGenerator：由闭包驱动的 SchematicGenerator，测试中按 prompt 内容编排后端行为。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{
    Completion, GenerationError, GenerationHints, GenerationInfo, LlmClient,
    SchematicGenerationResult, SchematicGenerator, UsageInfo,
};

/// Mock 客户端：不做任何推理，只保证输出能通过 schema 校验
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        prompt: &str,
        hints: &GenerationHints,
    ) -> Result<Completion, GenerationError> {
        let content = match hints.schema_name.as_deref() {
            Some("GuidelinePropositionsSchema") => serde_json::json!({ "checks": [] }),
            Some("ToolCallInferenceSchema") => serde_json::json!({ "tool_calls": [] }),
            Some("MessageSchema") => {
                let last_customer = prompt
                    .lines()
                    .rev()
                    .find_map(|l| l.split_once("] customer: ").map(|(_, t)| t))
                    .unwrap_or("(no input)");
                serde_json::json!({
                    "produced_reply": true,
                    "rationale": "mock",
                    "revisions": [{
                        "revision_number": 1,
                        "content": format!("Echo from Mock: {}", last_customer),
                        "followed_all_guidelines": true,
                    }]
                })
            }
            _ => serde_json::json!({}),
        };

        Ok(Completion {
            content: content.to_string(),
            model: "mock".to_string(),
            usage: UsageInfo::default(),
        })
    }
}

type GenerateFn<T> = dyn Fn(&str, &GenerationHints) -> Result<T, GenerationError> + Send + Sync;

/// 闭包驱动的结构化生成器；记录调用次数与每次的 prompt
pub struct FnGenerator<T> {
    f: Box<GenerateFn<T>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl<T> FnGenerator<T> {
    pub fn new(
        f: impl Fn(&str, &GenerationHints) -> Result<T, GenerationError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            f: Box::new(f),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl<T: Send + 'static> SchematicGenerator<T> for FnGenerator<T> {
    async fn generate(
        &self,
        prompt: &str,
        hints: &GenerationHints,
    ) -> Result<SchematicGenerationResult<T>, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let content = (self.f)(prompt, hints)?;
        Ok(SchematicGenerationResult {
            content,
            info: GenerationInfo {
                schema_name: std::any::type_name::<T>().to_string(),
                model: "fn".to_string(),
                duration_ms: 0,
                usage: UsageInfo::default(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_echoes_last_customer_message() {
        let hints = GenerationHints {
            temperature: None,
            schema_name: Some("MessageSchema".to_string()),
        };
        let prompt = "- [0] customer: hi\n- [1] ai_agent: hello\n- [2] customer: bye";
        let out = MockLlmClient.complete(prompt, &hints).await.unwrap();
        assert!(out.content.contains("Echo from Mock: bye"));
    }

    #[tokio::test]
    async fn test_fn_generator_counts_calls() {
        let gen = FnGenerator::new(|prompt, _| Ok(prompt.len()));
        let r = gen.generate("abc", &GenerationHints::default()).await.unwrap();
        assert_eq!(r.content, 3);
        assert_eq!(gen.calls(), 1);
        assert_eq!(gen.prompts(), vec!["abc".to_string()]);
    }
}
