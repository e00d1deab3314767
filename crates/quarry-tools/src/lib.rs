//! LLM-agnostic tool-call contract.

pub mod executor;
pub mod registry;

pub use executor::{
    MAX_TOOL_OUTPUT_CHARS, ToolCall, ToolError, ToolExecutor, ToolOutput, deserialize_params,
    truncate_tool_output,
};
pub use registry::{ToolDef, ToolRegistry};
