//! Schematic 生成器：prompt + hints -> 经 schema 校验的结构化结果
//!
//! JsonSchematicGenerator 用 schemars 生成目标类型的 JSON Schema 拼入 prompt，
//! 从回复中提取 JSON 对象并反序列化；任何一步失败都返回 GenerationError。

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use super::{GenerationError, GenerationHints, LlmClient, UsageInfo};

/// 单次生成的元数据（写入 inspection）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationInfo {
    pub schema_name: String,
    pub model: String,
    pub duration_ms: u64,
    pub usage: UsageInfo,
}

/// 结构化生成结果
#[derive(Debug, Clone)]
pub struct SchematicGenerationResult<T> {
    pub content: T,
    pub info: GenerationInfo,
}

/// 结构化生成器：所有流水线阶段只依赖这个接口
#[async_trait]
pub trait SchematicGenerator<T: Send + 'static>: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        hints: &GenerationHints,
    ) -> Result<SchematicGenerationResult<T>, GenerationError>;
}

/// 基于 LlmClient 的 JSON 生成器
pub struct JsonSchematicGenerator<T> {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
    _schema: PhantomData<fn() -> T>,
}

impl<T> JsonSchematicGenerator<T>
where
    T: DeserializeOwned + JsonSchema,
{
    pub fn new(llm: Arc<dyn LlmClient>, timeout_secs: u64) -> Self {
        Self {
            llm,
            timeout: Duration::from_secs(timeout_secs.max(1)),
            _schema: PhantomData,
        }
    }

    /// 目标类型的 JSON Schema 字符串
    pub fn schema_json() -> String {
        let schema = schema_for!(T);
        serde_json::to_string_pretty(&schema).unwrap_or_default()
    }

    fn build_prompt(prompt: &str) -> String {
        format!(
            "{}\n\nRespond with ONLY one JSON object that validates against this JSON Schema. \
             No markdown, no commentary.\n{}",
            prompt,
            Self::schema_json()
        )
    }
}

#[async_trait]
impl<T> SchematicGenerator<T> for JsonSchematicGenerator<T>
where
    T: DeserializeOwned + JsonSchema + Send + 'static,
{
    async fn generate(
        &self,
        prompt: &str,
        hints: &GenerationHints,
    ) -> Result<SchematicGenerationResult<T>, GenerationError> {
        let schema_name = T::schema_name();
        let hints = GenerationHints {
            schema_name: Some(schema_name.clone()),
            ..hints.clone()
        };
        let full_prompt = Self::build_prompt(prompt);

        let start = Instant::now();
        let completion = timeout(self.timeout, self.llm.complete(&full_prompt, &hints))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout.as_secs()))??;

        let json = extract_json_object(&completion.content).ok_or_else(|| {
            GenerationError::InvalidOutput {
                schema: schema_name.clone(),
                reason: "no JSON object in output".to_string(),
            }
        })?;
        let content: T =
            serde_json::from_str(json).map_err(|e| GenerationError::InvalidOutput {
                schema: schema_name.clone(),
                reason: e.to_string(),
            })?;

        Ok(SchematicGenerationResult {
            content,
            info: GenerationInfo {
                schema_name,
                model: completion.model,
                duration_ms: start.elapsed().as_millis() as u64,
                usage: completion.usage,
            },
        })
    }
}

/// 从 LLM 输出中提取 JSON 对象（```json ... ``` 代码块或首个 `{` 到末个 `}`）
pub fn extract_json_object(output: &str) -> Option<&str> {
    let trimmed = output.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let block = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        return Some(block.trim());
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&trimmed[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Completion;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Probe {
        value: u8,
    }

    struct FixedClient(&'static str);

    #[async_trait]
    impl LlmClient for FixedClient {
        async fn complete(
            &self,
            _prompt: &str,
            hints: &GenerationHints,
        ) -> Result<Completion, GenerationError> {
            assert_eq!(hints.schema_name.as_deref(), Some("Probe"));
            Ok(Completion {
                content: self.0.to_string(),
                model: "fixed".to_string(),
                usage: UsageInfo {
                    input_tokens: 3,
                    output_tokens: 2,
                },
            })
        }
    }

    #[test]
    fn test_extract_json_code_block() {
        let out = "Sure:\n```json\n{\"value\": 1}\n```\nbye";
        assert_eq!(extract_json_object(out), Some("{\"value\": 1}"));
    }

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(extract_json_object("xx {\"a\": {\"b\": 1}} yy"), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[tokio::test]
    async fn test_generate_parses_schema_type() {
        let gen = JsonSchematicGenerator::<Probe>::new(Arc::new(FixedClient("{\"value\": 7}")), 5);
        let result = gen.generate("p", &GenerationHints::default()).await.unwrap();
        assert_eq!(result.content.value, 7);
        assert_eq!(result.info.schema_name, "Probe");
        assert_eq!(result.info.model, "fixed");
        assert_eq!(result.info.usage.input_tokens, 3);
    }

    #[tokio::test]
    async fn test_generate_rejects_invalid_output() {
        let gen = JsonSchematicGenerator::<Probe>::new(Arc::new(FixedClient("{\"value\": \"x\"}")), 5);
        let err = gen.generate("p", &GenerationHints::default()).await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidOutput { .. }));
    }

    #[test]
    fn test_schema_json_mentions_fields() {
        let schema = JsonSchematicGenerator::<Probe>::schema_json();
        assert!(schema.contains("value"));
    }
}
