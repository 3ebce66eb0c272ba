//! 引擎错误类型
//!
//! 与 Processor 配合：存储错误、生成错误、工具服务错误统一汇总为 EngineError；
//! 取消不是错误，由 RunOutcome::Cancelled 表示（见 engine::processor）。

use thiserror::Error;

use crate::llm::GenerationError;
use crate::tools::ToolError;

/// 外部存储（guideline / session / event 等）返回的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// 单次处理（process）过程中可能出现的错误
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Tool service error: {0}")]
    Tool(#[from] ToolError),

    /// 后端输出在语义上无法解释（如引用了不存在的条件编号）
    #[error("Ambiguous generation output: {0}")]
    AmbiguousOutput(String),
    /// 处理过程中 panic（如工具实现的编程错误）
    #[error("Processing panicked: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::not_found("Session", "s1");
        assert_eq!(err.to_string(), "Session not found: s1");
    }

    #[test]
    fn test_engine_error_from_store() {
        let err: EngineError = StoreError::Unavailable("down".into()).into();
        assert!(matches!(err, EngineError::Store(_)));
        assert!(err.to_string().contains("down"));
    }
}
