use std::path::PathBuf;
use std::time::Duration;

use quarry_index::hybrid::DEFAULT_RANK_CONSTANT;
use quarry_index::retriever::DEFAULT_OVERFETCH;
use quarry_index::retriever::bm25::{DEFAULT_B, DEFAULT_K1};
use quarry_index::{HybridConfig, ScanConfig};
use serde::{Deserialize, Serialize};

use crate::secret::Secret;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

/// Embedding backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Lexical retrieval only.
    #[default]
    None,
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    Hash,
}

impl EmbeddingProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Hash => "hash",
        }
    }

    /// Model used when `[embedding] model` is left empty.
    #[must_use]
    pub fn default_model(self) -> &'static str {
        match self {
            Self::None | Self::Hash => "",
            Self::Ollama => "nomic-embed-text",
            Self::OpenAi => "text-embedding-3-small",
            Self::Gemini => "text-embedding-004",
        }
    }

    /// Endpoint used when `[embedding] base_url` is unset.
    #[must_use]
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::None | Self::Hash => "",
            Self::Ollama => "http://localhost:11434",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Gemini => quarry_llm::gemini::DEFAULT_GEMINI_BASE_URL,
        }
    }
}

impl std::fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_embedding_timeout_secs() -> u64 {
    10
}

impl EmbeddingConfig {
    #[must_use]
    pub fn model_or_default(&self) -> &str {
        if self.model.is_empty() {
            self.provider.default_model()
        } else {
            &self.model
        }
    }

    #[must_use]
    pub fn base_url_or_default(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::None,
            model: String::new(),
            base_url: None,
            dimensions: None,
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_parse_workers")]
    pub parse_workers: usize,
    #[serde(default = "default_true")]
    pub strict_parse: bool,
    #[serde(default)]
    pub respect_gitignore: bool,
    #[serde(default)]
    pub extra_excluded_dirs: Vec<String>,
}

fn default_index_dir() -> PathBuf {
    PathBuf::from(".quarry")
}

fn default_parse_workers() -> usize {
    ScanConfig::default().parse_workers
}

fn default_true() -> bool {
    true
}

impl IndexConfig {
    #[must_use]
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            parse_workers: self.parse_workers,
            strict_parse: self.strict_parse,
            respect_gitignore: self.respect_gitignore,
            extra_excluded_dirs: self.extra_excluded_dirs.clone(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
            parse_workers: default_parse_workers(),
            strict_parse: true,
            respect_gitignore: false,
            extra_excluded_dirs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_overfetch_factor")]
    pub overfetch_factor: usize,
    #[serde(default = "default_rank_constant")]
    pub rank_constant: u32,
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f64,
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f64,
    #[serde(default = "default_true")]
    pub symbol_enabled: bool,
    #[serde(default = "default_true")]
    pub bm25_enabled: bool,
    #[serde(default = "default_true")]
    pub vector_enabled: bool,
}

fn default_top_k() -> usize {
    10
}

fn default_overfetch_factor() -> usize {
    DEFAULT_OVERFETCH
}

fn default_rank_constant() -> u32 {
    DEFAULT_RANK_CONSTANT
}

fn default_bm25_k1() -> f64 {
    DEFAULT_K1
}

fn default_bm25_b() -> f64 {
    DEFAULT_B
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            overfetch_factor: default_overfetch_factor(),
            rank_constant: default_rank_constant(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
            symbol_enabled: true,
            bm25_enabled: true,
            vector_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Credentials resolved from the environment; never read from the TOML file.
#[derive(Debug, Default)]
pub struct ResolvedSecrets {
    pub openai_api_key: Option<Secret>,
    pub gemini_api_key: Option<Secret>,
}

impl Config {
    /// Retrieval settings for [`quarry_index::HybridQueryEngine::new`].
    #[must_use]
    pub fn hybrid_config(&self) -> HybridConfig {
        let r = &self.retrieval;
        HybridConfig {
            overfetch_factor: r.overfetch_factor,
            rank_constant: r.rank_constant,
            bm25_k1: r.bm25_k1,
            bm25_b: r.bm25_b,
            symbol_enabled: r.symbol_enabled,
            bm25_enabled: r.bm25_enabled,
            vector_enabled: r.vector_enabled,
            embedding_timeout: self.embedding.timeout(),
        }
    }
}
