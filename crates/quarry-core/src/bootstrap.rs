//! Application bootstrap: config resolution and embedder/index construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use quarry_index::indexer::CodeIndexer;
use quarry_index::{BuildProgress, HybridQueryEngine, Index, IndexStore, RepoMapBuilder, SharedIndex};
use quarry_llm::AnyEmbedder;
use quarry_llm::gemini::GeminiEmbedder;
use quarry_llm::hashing::{DEFAULT_HASH_DIMENSIONS, HashingEmbedder};
use quarry_llm::ollama::OllamaEmbedder;
use quarry_llm::openai::OpenAiEmbedder;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::{Config, ConfigError, EmbeddingProviderKind, Result};

pub const DEFAULT_CONFIG_PATH: &str = "quarry.toml";

/// Validated configuration plus the collaborators built from it.
pub struct App {
    config: Config,
    embedder: Option<Arc<AnyEmbedder>>,
}

impl App {
    /// Validate `config` and construct the configured embedder.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or the embedder cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let embedder = create_embedder(&config)?.map(Arc::new);
        Ok(Self { config, embedder })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn embedder(&self) -> Option<&Arc<AnyEmbedder>> {
        self.embedder.as_ref()
    }

    #[must_use]
    pub fn store(&self) -> IndexStore {
        IndexStore::new(&self.config.index.dir)
    }

    #[must_use]
    pub fn indexer(&self, progress: Option<UnboundedSender<BuildProgress>>) -> CodeIndexer {
        let mut builder = RepoMapBuilder::new(self.config.index.scan_config());
        if let Some(tx) = progress {
            builder = builder.with_progress(tx);
        }
        CodeIndexer::new(builder, self.store(), self.embedder.clone())
    }

    /// Load the committed index, checking it against the configured embedder.
    ///
    /// # Errors
    ///
    /// Returns [`quarry_index::IndexError::IndexMissing`] or
    /// [`quarry_index::IndexError::IndexCorrupt`].
    pub fn load_index(&self) -> quarry_index::Result<Index> {
        let fingerprint = quarry_index::Fingerprint::of(self.embedder.as_deref());
        self.store().load(Some(&fingerprint))
    }

    #[must_use]
    pub fn query_engine(&self, index: Index) -> HybridQueryEngine {
        HybridQueryEngine::new(
            &self.config.hybrid_config(),
            SharedIndex::new(index),
            self.embedder.clone(),
        )
    }
}

/// Priority: CLI `--config` > `QUARRY_CONFIG` env > `quarry.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("QUARRY_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// Build the embedder selected by `[embedding] provider`, or `None` for
/// lexical-only operation.
///
/// # Errors
///
/// Returns [`ConfigError::MissingCredential`] when an API key is required but
/// absent and [`ConfigError::Provider`] if the HTTP client cannot be built.
pub fn create_embedder(config: &Config) -> Result<Option<AnyEmbedder>> {
    let e = &config.embedding;
    let embedder = match e.provider {
        EmbeddingProviderKind::None => return Ok(None),
        EmbeddingProviderKind::Ollama => AnyEmbedder::Ollama(OllamaEmbedder::new(
            e.base_url_or_default(),
            e.model_or_default().to_owned(),
            e.timeout(),
        )),
        EmbeddingProviderKind::OpenAi => {
            let key = config
                .secrets
                .openai_api_key
                .as_ref()
                .ok_or(ConfigError::MissingCredential {
                    field: "QUARRY_OPENAI_API_KEY",
                })?;
            AnyEmbedder::OpenAi(OpenAiEmbedder::new(
                key.expose().to_owned(),
                e.base_url_or_default().to_owned(),
                e.model_or_default().to_owned(),
                e.dimensions,
                e.timeout(),
            )?)
        }
        EmbeddingProviderKind::Gemini => {
            let key = config
                .secrets
                .gemini_api_key
                .as_ref()
                .ok_or(ConfigError::MissingCredential {
                    field: "QUARRY_GEMINI_API_KEY",
                })?;
            AnyEmbedder::Gemini(GeminiEmbedder::new(
                key.expose().to_owned(),
                e.base_url_or_default().to_owned(),
                e.model_or_default().to_owned(),
                e.timeout(),
            )?)
        }
        EmbeddingProviderKind::Hash => AnyEmbedder::Hash(HashingEmbedder::new(
            e.dimensions.unwrap_or(DEFAULT_HASH_DIMENSIONS),
        )),
    };
    tracing::info!(
        provider = %e.provider,
        model = e.model_or_default(),
        "embedding provider configured"
    );
    Ok(Some(embedder))
}

#[cfg(test)]
mod tests {
    use quarry_llm::EmbeddingFunction;

    use super::*;
    use crate::secret::Secret;

    #[test]
    fn no_provider_means_no_embedder() {
        let config = Config::default();
        assert!(create_embedder(&config).unwrap().is_none());
    }

    #[test]
    fn hash_provider_uses_configured_dimensions() {
        let mut config = Config::default();
        config.embedding.provider = EmbeddingProviderKind::Hash;
        config.embedding.dimensions = Some(32);
        let embedder = create_embedder(&config).unwrap().unwrap();
        assert!(matches!(embedder, AnyEmbedder::Hash(_)));
        assert_eq!(embedder.provider_name(), "hash");
        assert_eq!(embedder.model_name(), "feature-hash-32");
    }

    #[test]
    fn ollama_provider_uses_default_model() {
        let mut config = Config::default();
        config.embedding.provider = EmbeddingProviderKind::Ollama;
        let embedder = create_embedder(&config).unwrap().unwrap();
        assert_eq!(embedder.provider_name(), "ollama");
        assert_eq!(embedder.model_name(), "nomic-embed-text");
    }

    #[test]
    fn openai_requires_key() {
        let mut config = Config::default();
        config.embedding.provider = EmbeddingProviderKind::OpenAi;
        assert!(matches!(
            create_embedder(&config).unwrap_err(),
            ConfigError::MissingCredential { .. }
        ));

        config.secrets.openai_api_key = Some(Secret::new("sk-test"));
        let embedder = create_embedder(&config).unwrap().unwrap();
        assert_eq!(embedder.provider_name(), "openai");
        assert!(!format!("{embedder:?}").contains("sk-test"));
    }

    #[test]
    fn gemini_with_key_builds() {
        let mut config = Config::default();
        config.embedding.provider = EmbeddingProviderKind::Gemini;
        config.secrets.gemini_api_key = Some(Secret::new("g-test"));
        let embedder = create_embedder(&config).unwrap().unwrap();
        assert_eq!(embedder.provider_name(), "gemini");
        assert_eq!(embedder.model_name(), "text-embedding-004");
    }

    #[test]
    fn app_rejects_invalid_config() {
        let mut config = Config::default();
        config.retrieval.top_k = 0;
        assert!(matches!(
            App::new(config),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn cli_path_wins() {
        let path = resolve_config_path(Some(Path::new("/etc/quarry.toml")));
        assert_eq!(path, PathBuf::from("/etc/quarry.toml"));
    }

    #[tokio::test]
    async fn app_builds_and_loads_index() {
        let repo = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(repo.path().join("a.py"), "def add(a, b): return a + b\n").unwrap();

        let mut config = Config::default();
        config.index.dir = out.path().to_path_buf();
        config.embedding.provider = EmbeddingProviderKind::Hash;
        let app = App::new(config).unwrap();

        let (_, report) = app.indexer(None).index_project(repo.path()).await.unwrap();
        assert_eq!(report.symbols, 1);

        let index = app.load_index().unwrap();
        let engine = app.query_engine(index);
        let results = engine
            .query(&quarry_index::Query::new("add", 3))
            .await
            .unwrap();
        assert_eq!(results[0].symbol_id, "a.py:add:0");
    }
}
