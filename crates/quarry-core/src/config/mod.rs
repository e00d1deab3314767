mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};

/// Configuration errors, naming the offending field.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("missing credential: set {field}")]
    MissingCredential { field: &'static str },

    #[error("embedding provider setup failed: {0}")]
    Provider(#[from] quarry_llm::LlmError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str::<Self>(&content)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.resolve_secrets();
        Ok(config)
    }

    /// Check cross-field invariants before any index or query operation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for out-of-range values and
    /// [`ConfigError::MissingCredential`] when the selected provider needs an
    /// API key that was not found.
    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        if r.top_k == 0 {
            return Err(invalid("retrieval.top_k", "must be at least 1"));
        }
        if r.overfetch_factor < 3 {
            return Err(invalid("retrieval.overfetch_factor", "must be at least 3"));
        }
        if r.rank_constant == 0 {
            return Err(invalid("retrieval.rank_constant", "must be positive"));
        }
        if !r.bm25_k1.is_finite() || r.bm25_k1 < 0.0 {
            return Err(invalid("retrieval.bm25_k1", "must be a non-negative number"));
        }
        if !(0.0..=1.0).contains(&r.bm25_b) {
            return Err(invalid("retrieval.bm25_b", "must be between 0 and 1"));
        }
        if !(r.symbol_enabled || r.bm25_enabled || r.vector_enabled) {
            return Err(invalid("retrieval", "at least one retriever must be enabled"));
        }
        if self.index.parse_workers == 0 {
            return Err(invalid("index.parse_workers", "must be at least 1"));
        }
        if self.index.dir.as_os_str().is_empty() {
            return Err(invalid("index.dir", "must not be empty"));
        }

        let e = &self.embedding;
        if e.timeout_secs == 0 {
            return Err(invalid("embedding.timeout_secs", "must be at least 1"));
        }
        if e.dimensions == Some(0) {
            return Err(invalid("embedding.dimensions", "must be at least 1"));
        }
        match e.provider {
            EmbeddingProviderKind::OpenAi if self.secrets.openai_api_key.is_none() => {
                return Err(ConfigError::MissingCredential {
                    field: "QUARRY_OPENAI_API_KEY",
                });
            }
            EmbeddingProviderKind::Gemini if self.secrets.gemini_api_key.is_none() => {
                return Err(ConfigError::MissingCredential {
                    field: "QUARRY_GEMINI_API_KEY",
                });
            }
            _ => {}
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_owned(),
    }
}
