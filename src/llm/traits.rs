//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：complete(prompt, hints) 返回原始文本与用量。
//! 结构化输出由 schematic::JsonSchematicGenerator 在其之上完成。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 生成提示：温度与目标 schema 名称
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationHints {
    pub temperature: Option<f32>,
    /// 由 JsonSchematicGenerator 填入，供后端（或 Mock）识别期望的输出结构
    pub schema_name: Option<String>,
}

impl GenerationHints {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            schema_name: None,
        }
    }
}

/// 后端不可达或输出未通过 schema 校验
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Backend timeout after {0}s")]
    Timeout(u64),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Invalid output for {schema}: {reason}")]
    InvalidOutput { schema: String, reason: String },
}

/// 单次调用的 token 用量
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageInfo {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// 原始完成结果
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub usage: UsageInfo,
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        hints: &GenerationHints,
    ) -> Result<Completion, GenerationError>;
}
