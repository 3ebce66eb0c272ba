//! 会话处理引擎：guideline 评估与推理、工具调用循环、回复生成

pub mod context;
pub mod emission;
pub mod inference;
pub mod message_generator;
pub mod processor;
pub mod prompt;
pub mod proposer;
pub mod tool_caller;

pub use context::InteractionSnapshot;
pub use emission::{EmittedEvent, EventBuffer, EventEmitter, SessionEventEmitter};
pub use inference::{
    infer_connected_propositions, partition_by_tool_association, resolve_connections,
    PartitionedPropositions,
};
pub use message_generator::{MessageGenerationOutcome, MessageGenerator, MessageSchema, Revision};
pub use processor::{Context, Engine, EngineStores, RunOutcome};
pub use prompt::PromptBuilder;
pub use proposer::{
    batch_size, is_active, GuidelineCheck, GuidelineProposer, GuidelineProposition,
    GuidelinePropositionsSchema, PropositionResult,
};
pub use tool_caller::{
    ToolCall, ToolCallEvaluation, ToolCallInference, ToolCallInferenceSchema, ToolCallResult,
    ToolCaller,
};
