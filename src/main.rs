mod cli;

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, bail};
use clap::Parser;
use quarry_core::bootstrap::{App, resolve_config_path};
use quarry_core::config::Config;
use quarry_core::search_tool::SearchCodebaseExecutor;
use quarry_index::context::pack_context;
use quarry_index::{BuildProgress, BuildReport, Index, Query, RetrievalResult};
use quarry_tools::{ToolCall, ToolExecutor, ToolRegistry};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    init_subscriber(&config.log.level);
    let app = App::new(config).context("invalid configuration")?;

    match cli.command {
        Commands::Build { root, incremental } => run_build(&app, &root, incremental).await,
        Commands::Ask {
            query,
            top_k,
            kind,
            language,
            json,
            context,
            max_chars,
        } => {
            let mut query = Query::new(
                query.join(" "),
                top_k.unwrap_or(app.config().retrieval.top_k),
            );
            if let Some(kind) = kind {
                query = query.with_kind(kind);
            }
            if let Some(lang) = language {
                query = query.with_language(lang);
            }
            let output = if context {
                AskOutput::Context { max_chars }
            } else if json {
                AskOutput::Json
            } else {
                AskOutput::List
            };
            run_ask(&app, &query, output).await
        }
        Commands::Map {
            max_files,
            max_symbols,
        } => {
            let index = app.load_index().context("failed to load index")?;
            println!("{}", index.repo_map().render(max_files, max_symbols));
            Ok(())
        }
        Commands::Tool { list, call } => run_tool(&app, list, call).await,
    }
}

/// `RUST_LOG` wins over `[log] level`. Logs go to stderr so stdout carries
/// only command output.
fn init_subscriber(config_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(config_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_build(app: &App, root: &Path, incremental: bool) -> anyhow::Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<BuildProgress>();
    let progress = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            if p.files_processed == p.files_total || p.files_processed % 100 == 0 {
                tracing::info!(
                    files = format_args!("{}/{}", p.files_processed, p.files_total),
                    symbols = p.symbols_emitted,
                    "indexing"
                );
            }
        }
    });

    let indexer = app.indexer(Some(tx));
    let report = if incremental {
        let outcome = indexer
            .index_incremental(root)
            .await
            .with_context(|| format!("incremental build of {} failed", root.display()))?;
        if let Some(changes) = &outcome.changes {
            println!(
                "changes: {} added, {} updated, {} removed, {} unchanged",
                changes.added.len(),
                changes.updated.len(),
                changes.removed.len(),
                changes.unchanged.len()
            );
        }
        outcome.report
    } else {
        indexer
            .index_project(root)
            .await
            .with_context(|| format!("build of {} failed", root.display()))?
            .1
    };
    drop(indexer);
    let _ = progress.await;

    print_report(&report, &app.config().index.dir);
    Ok(())
}

fn print_report(report: &BuildReport, dir: &Path) {
    println!(
        "indexed {} files ({} reused) of {} scanned: {} symbols, {} vectors embedded, {} reused in {}ms -> {}",
        report.files_indexed,
        report.files_reused,
        report.files_scanned,
        report.symbols,
        report.vectors_embedded,
        report.vectors_reused,
        report.duration_ms,
        dir.display()
    );
    if !report.skipped.is_empty() {
        println!("skipped {} files:", report.skipped.len());
        for skipped in &report.skipped {
            println!("  {} [{}] {}", skipped.file_path, skipped.reason, skipped.detail);
        }
    }
}

#[derive(Clone, Copy)]
enum AskOutput {
    List,
    Json,
    Context { max_chars: usize },
}

async fn run_ask(app: &App, query: &Query, output: AskOutput) -> anyhow::Result<()> {
    let index = app.load_index().context("failed to load index")?;
    let engine = app.query_engine(index);
    let (index, report) = engine.query_snapshot(query).await?;

    for (kind, reason) in &report.unavailable {
        tracing::warn!(retriever = %kind, "answered without {kind}: {reason}");
    }

    if let AskOutput::Context { max_chars } = output {
        if report.results.is_empty() {
            println!("no results");
            return Ok(());
        }
        let repo_map = app
            .store()
            .read_repo_map()
            .context("failed to read repository map")?;
        println!("{}", pack_context(&repo_map, &index, &report.results, max_chars));
        return Ok(());
    }

    if matches!(output, AskOutput::Json) {
        let out: Vec<_> = report
            .results
            .iter()
            .filter_map(|r| result_json(&index, r))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if report.results.is_empty() {
        println!("no results");
        return Ok(());
    }
    for (i, result) in report.results.iter().enumerate() {
        let Some(symbol) = index.symbol(&result.symbol_id) else {
            continue;
        };
        println!(
            "{:>2}. {}:{}-{}  {} {}  ({:.4})",
            i + 1,
            symbol.file_path,
            symbol.start_line + 1,
            symbol.end_line + 1,
            symbol.kind,
            if symbol.name.is_empty() { "(anonymous)" } else { symbol.name.as_str() },
            result.score
        );
        if !symbol.signature.is_empty() {
            println!("    {}", symbol.signature);
        }
    }
    Ok(())
}

fn result_json(index: &Index, result: &RetrievalResult) -> Option<serde_json::Value> {
    let symbol = index.symbol(&result.symbol_id)?;
    Some(serde_json::json!({
        "id": symbol.id,
        "file_path": symbol.file_path,
        "kind": symbol.kind,
        "name": symbol.name,
        "signature": symbol.signature,
        "start_line": symbol.start_line,
        "end_line": symbol.end_line,
        "score": result.score,
        "contributions": result.contributions,
    }))
}

async fn run_tool(app: &App, list: bool, call: Option<String>) -> anyhow::Result<()> {
    let index = app.load_index().context("failed to load index")?;
    let executor = SearchCodebaseExecutor::new(app.query_engine(index));

    if list {
        let registry = ToolRegistry::from_definitions(executor.tool_definitions());
        println!("{}", serde_json::to_string_pretty(&registry.to_json())?);
        return Ok(());
    }

    let raw = match call {
        Some(raw) => raw,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read tool call from stdin")?;
            buf
        }
    };
    let call = parse_tool_call(&raw)?;
    match executor.execute_tool_call(&call).await? {
        Some(output) => println!("{output}"),
        None => bail!("unknown tool: {}", call.tool_id),
    }
    Ok(())
}

fn parse_tool_call(raw: &str) -> anyhow::Result<ToolCall> {
    let value: serde_json::Value = serde_json::from_str(raw).context("tool call is not valid JSON")?;
    let tool_id = value
        .get("tool_id")
        .and_then(serde_json::Value::as_str)
        .context("tool call needs a string `tool_id`")?
        .to_owned();
    let params: HashMap<String, serde_json::Value> = match value.get("params") {
        Some(serde_json::Value::Object(map)) => {
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        }
        None | Some(serde_json::Value::Null) => HashMap::new(),
        Some(_) => bail!("tool call `params` must be an object"),
    };
    Ok(ToolCall { tool_id, params })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tool_call_reads_params() {
        let call =
            parse_tool_call(r#"{"tool_id": "search_codebase", "params": {"query": "add"}}"#)
                .unwrap();
        assert_eq!(call.tool_id, "search_codebase");
        assert_eq!(call.params["query"], "add");
    }

    #[test]
    fn parse_tool_call_without_params() {
        let call = parse_tool_call(r#"{"tool_id": "search_codebase"}"#).unwrap();
        assert!(call.params.is_empty());
    }

    #[test]
    fn parse_tool_call_rejects_bad_shapes() {
        assert!(parse_tool_call("not json").is_err());
        assert!(parse_tool_call(r#"{"params": {}}"#).is_err());
        assert!(parse_tool_call(r#"{"tool_id": "x", "params": [1]}"#).is_err());
    }
}
