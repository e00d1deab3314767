//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use quarry_index::context::DEFAULT_CONTEXT_CHARS;
use quarry_index::{Lang, SymbolKind};

/// quarry - symbol-level hybrid code search
///
/// Indexes Python, C and C++ definitions with tree-sitter and answers
/// queries by fusing symbol, BM25 and embedding rankings.
#[derive(Parser, Debug)]
#[command(name = "quarry", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML config file (default: $QUARRY_CONFIG or ./quarry.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Index a repository
    Build {
        /// Repository root
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Re-parse only files changed since the last build
        #[arg(long)]
        incremental: bool,
    },

    /// Query the index
    Ask {
        /// Natural-language or identifier query
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Maximum number of results (default from config)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Only return symbols of this kind
        #[arg(long, value_parser = parse_kind)]
        kind: Option<SymbolKind>,

        /// Only return symbols in this language
        #[arg(long = "lang", value_parser = parse_lang)]
        language: Option<Lang>,

        /// Print results as JSON
        #[arg(long, conflicts_with = "context")]
        json: bool,

        /// Print the repository map and retrieved code packed into one prompt context
        #[arg(long)]
        context: bool,

        /// Character budget of the packed context
        #[arg(long, default_value_t = DEFAULT_CONTEXT_CHARS, requires = "context")]
        max_chars: usize,
    },

    /// Print the repository map of the current index
    Map {
        /// Maximum number of files to list
        #[arg(long, default_value_t = 50)]
        max_files: usize,

        /// Maximum number of symbols per file
        #[arg(long, default_value_t = 20)]
        max_symbols: usize,
    },

    /// Run or describe the search_codebase tool
    Tool {
        /// Print the tool definitions as JSON and exit
        #[arg(long)]
        list: bool,

        /// Tool call JSON `{"tool_id": .., "params": {..}}`; read from stdin when omitted
        call: Option<String>,
    },
}

fn parse_kind(s: &str) -> Result<SymbolKind, String> {
    SymbolKind::from_id(&s.to_lowercase())
        .ok_or_else(|| format!("unknown kind `{s}` (expected function, method, class or struct)"))
}

fn parse_lang(s: &str) -> Result<Lang, String> {
    Lang::from_id(&s.to_lowercase())
        .ok_or_else(|| format!("unknown language `{s}` (expected python, c or cpp)"))
}
