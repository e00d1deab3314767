use std::collections::HashMap;
use std::fmt;

/// Structured tool invocation from an LLM.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub tool_id: String,
    pub params: HashMap<String, serde_json::Value>,
}

/// Structured result from tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub tool_name: String,
    pub summary: String,
    /// Whether `summary` was cut down to [`MAX_TOOL_OUTPUT_CHARS`].
    pub truncated: bool,
}

impl ToolOutput {
    /// Build an output, applying [`truncate_tool_output`] to `summary`.
    #[must_use]
    pub fn new(tool_name: impl Into<String>, summary: &str) -> Self {
        let truncated = summary.len() > MAX_TOOL_OUTPUT_CHARS;
        Self {
            tool_name: tool_name.into(),
            summary: truncate_tool_output(summary),
            truncated,
        }
    }
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary)
    }
}

pub const MAX_TOOL_OUTPUT_CHARS: usize = 30_000;

/// Truncate tool output that exceeds `MAX_TOOL_OUTPUT_CHARS` using head+tail split.
#[must_use]
pub fn truncate_tool_output(output: &str) -> String {
    if output.len() <= MAX_TOOL_OUTPUT_CHARS {
        return output.to_string();
    }

    let half = MAX_TOOL_OUTPUT_CHARS / 2;
    let head_end = boundary_at_or_before(output, half);
    let tail_start = boundary_at_or_after(output, output.len() - half);
    let head = &output[..head_end];
    let tail = &output[tail_start..];
    let truncated = tail_start - head_end;

    format!(
        "{head}\n\n... [truncated {truncated} chars, showing first and last ~{half} chars] ...\n\n{tail}"
    )
}

fn boundary_at_or_before(s: &str, mut idx: usize) -> usize {
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn boundary_at_or_after(s: &str, mut idx: usize) -> usize {
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Errors that can occur during tool execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid tool parameters: {message}")]
    InvalidParams { message: String },

    #[error("execution failed: {0}")]
    Execution(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ToolError {
    #[must_use]
    pub fn execution(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Execution(Box::new(err))
    }
}

/// Deserialize tool call params from a `HashMap<String, Value>` into a typed struct.
///
/// # Errors
///
/// Returns `ToolError::InvalidParams` when deserialization fails.
pub fn deserialize_params<T: serde::de::DeserializeOwned, S: std::hash::BuildHasher>(
    params: &HashMap<String, serde_json::Value, S>,
) -> Result<T, ToolError> {
    let obj =
        serde_json::Value::Object(params.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    serde_json::from_value(obj).map_err(|e| ToolError::InvalidParams {
        message: e.to_string(),
    })
}

/// Async trait for tool backends.
pub trait ToolExecutor: Send + Sync {
    /// Return tool definitions this executor can handle.
    fn tool_definitions(&self) -> Vec<crate::registry::ToolDef>;

    /// Execute a structured tool call. Returns `None` if `tool_id` is not handled.
    fn execute_tool_call(
        &self,
        call: &ToolCall,
    ) -> impl Future<Output = Result<Option<ToolOutput>, ToolError>> + Send;
}
