//! LLM 层：客户端抽象、结构化生成器与实现（OpenAI 兼容 / Mock）

pub mod metered;
pub mod mock;
pub mod openai;
pub mod schematic;
pub mod traits;

pub use metered::{GenerationMetrics, MeteredGenerator, MetricsSnapshot};
pub use mock::{FnGenerator, MockLlmClient};
pub use openai::OpenAiClient;
pub use schematic::{
    extract_json_object, GenerationInfo, JsonSchematicGenerator, SchematicGenerationResult,
    SchematicGenerator,
};
pub use traits::{Completion, GenerationError, GenerationHints, LlmClient, UsageInfo};
