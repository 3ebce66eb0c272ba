pub mod echo;
pub mod executor;
pub mod handoff;
pub mod registry;

pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use handoff::HandoffTool;
pub use registry::{
    LocalToolService, ServiceRegistry, Tool, ToolContext, ToolDescriptor, ToolError, ToolId,
    ToolResult, ToolResultControl, ToolService,
};
