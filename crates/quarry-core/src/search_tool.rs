//! The `search_codebase` tool over a [`HybridQueryEngine`].

use std::fmt::Write;

use quarry_index::{HybridQueryEngine, Index, IndexError, Query, RetrievalResult};
use quarry_tools::executor::deserialize_params;
use quarry_tools::{ToolCall, ToolDef, ToolError, ToolExecutor, ToolOutput};
use schemars::JsonSchema;
use serde::Deserialize;

pub const SEARCH_CODEBASE_TOOL_ID: &str = "search_codebase";

const NO_RESULTS: &str = "No results found.";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchCodebaseParams {
    /// What to look for: a natural-language description or identifier names
    pub query: String,
    /// How many results to return
    #[serde(default = "default_n_results")]
    pub n_results: usize,
}

fn default_n_results() -> usize {
    5
}

pub struct SearchCodebaseExecutor {
    engine: HybridQueryEngine,
}

impl SearchCodebaseExecutor {
    #[must_use]
    pub fn new(engine: HybridQueryEngine) -> Self {
        Self { engine }
    }

    #[must_use]
    pub fn engine(&self) -> &HybridQueryEngine {
        &self.engine
    }

    async fn search(&self, params: SearchCodebaseParams) -> Result<String, ToolError> {
        let query = Query::new(params.query, params.n_results);
        let (index, report) = self.engine.query_snapshot(&query).await.map_err(|e| match e {
            IndexError::InvalidQuery(message) => ToolError::InvalidParams { message },
            other => ToolError::execution(other),
        })?;
        tracing::debug!(
            hits = report.results.len(),
            degraded = report.unavailable.len(),
            "search_codebase"
        );
        Ok(format_results(&index, &report.results))
    }
}

impl ToolExecutor for SearchCodebaseExecutor {
    fn tool_definitions(&self) -> Vec<ToolDef> {
        vec![ToolDef {
            id: SEARCH_CODEBASE_TOOL_ID,
            description: "Search the indexed codebase for functions, methods, classes and structs relevant to a query. Returns source snippets with file paths and line ranges.",
            schema: schemars::schema_for!(SearchCodebaseParams),
        }]
    }

    async fn execute_tool_call(&self, call: &ToolCall) -> Result<Option<ToolOutput>, ToolError> {
        if call.tool_id != SEARCH_CODEBASE_TOOL_ID {
            return Ok(None);
        }
        let params: SearchCodebaseParams = deserialize_params(&call.params)?;
        let summary = self.search(params).await?;
        Ok(Some(ToolOutput::new(SEARCH_CODEBASE_TOOL_ID, &summary)))
    }
}

/// Render hits with 1-based line numbers. Ids missing from `index` are skipped.
#[must_use]
pub fn format_results(index: &Index, results: &[RetrievalResult]) -> String {
    let mut out = String::new();
    let mut shown = 0usize;
    for result in results {
        let Some(symbol) = index.symbol(&result.symbol_id) else {
            continue;
        };
        shown += 1;
        if shown > 1 {
            out.push_str("\n\n");
        }
        let _ = write!(
            out,
            "--- Result {shown} ({}:{}-{}) ---\nKind: {}, Name: {}\n{}",
            symbol.file_path,
            symbol.start_line + 1,
            symbol.end_line + 1,
            symbol.kind,
            symbol.name,
            symbol.content.trim_end()
        );
    }
    if shown == 0 {
        return NO_RESULTS.to_owned();
    }
    out
}
