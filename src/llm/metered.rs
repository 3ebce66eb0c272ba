//! 计量装饰器：包装任意 SchematicGenerator，在委托前后记录调用次数、失败数、耗时与 token

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::llm::{GenerationError, GenerationHints, SchematicGenerationResult, SchematicGenerator};

/// 生成调用计数（可在多个生成器间共享）
#[derive(Debug, Default)]
pub struct GenerationMetrics {
    calls: AtomicU64,
    failures: AtomicU64,
    total_duration_ms: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

/// 某一时刻的计量快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub calls: u64,
    pub failures: u64,
    pub total_duration_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl GenerationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            total_duration_ms: self.total_duration_ms.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
        }
    }
}

/// 计量型生成器
pub struct MeteredGenerator<T: Send + 'static> {
    inner: Arc<dyn SchematicGenerator<T>>,
    metrics: Arc<GenerationMetrics>,
    label: String,
}

impl<T: Send + 'static> MeteredGenerator<T> {
    pub fn new(
        label: impl Into<String>,
        inner: Arc<dyn SchematicGenerator<T>>,
        metrics: Arc<GenerationMetrics>,
    ) -> Self {
        Self {
            inner,
            metrics,
            label: label.into(),
        }
    }
}

#[async_trait]
impl<T: Send + 'static> SchematicGenerator<T> for MeteredGenerator<T> {
    async fn generate(
        &self,
        prompt: &str,
        hints: &GenerationHints,
    ) -> Result<SchematicGenerationResult<T>, GenerationError> {
        self.metrics.calls.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        let result = self.inner.generate(prompt, hints).await;

        let elapsed = start.elapsed().as_millis() as u64;
        self.metrics
            .total_duration_ms
            .fetch_add(elapsed, Ordering::Relaxed);
        match &result {
            Ok(r) => {
                self.metrics
                    .input_tokens
                    .fetch_add(r.info.usage.input_tokens, Ordering::Relaxed);
                self.metrics
                    .output_tokens
                    .fetch_add(r.info.usage.output_tokens, Ordering::Relaxed);
                tracing::debug!(generator = %self.label, duration_ms = elapsed, "generation ok");
            }
            Err(e) => {
                self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(generator = %self.label, duration_ms = elapsed, error = %e, "generation failed");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FnGenerator;

    #[tokio::test]
    async fn test_metered_counts_success_and_failure() {
        let metrics = Arc::new(GenerationMetrics::new());
        let ok: Arc<dyn SchematicGenerator<u8>> = Arc::new(FnGenerator::new(|_, _| Ok(1u8)));
        let bad: Arc<dyn SchematicGenerator<u8>> = Arc::new(FnGenerator::new(|_, _| {
            Err(GenerationError::Backend("down".into()))
        }));

        let ok = MeteredGenerator::new("ok", ok, metrics.clone());
        let bad = MeteredGenerator::new("bad", bad, metrics.clone());

        ok.generate("p", &GenerationHints::default()).await.unwrap();
        assert!(bad.generate("p", &GenerationHints::default()).await.is_err());

        let snap = metrics.snapshot();
        assert_eq!(snap.calls, 2);
        assert_eq!(snap.failures, 1);
    }
}
