use super::Config;
use crate::secret::Secret;

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("QUARRY_EMBEDDING_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.embedding.provider = kind;
            } else {
                tracing::warn!("ignoring invalid QUARRY_EMBEDDING_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("QUARRY_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("QUARRY_EMBEDDING_BASE_URL") {
            self.embedding.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("QUARRY_EMBEDDING_TIMEOUT") {
            if let Ok(secs) = v.parse::<u64>() {
                self.embedding.timeout_secs = secs;
            } else {
                tracing::warn!("ignoring invalid QUARRY_EMBEDDING_TIMEOUT value: {v}");
            }
        }
        if let Ok(v) = std::env::var("QUARRY_INDEX_DIR") {
            self.index.dir = v.into();
        }
        if let Ok(v) = std::env::var("QUARRY_INDEX_WORKERS") {
            if let Ok(n) = v.parse::<usize>() {
                self.index.parse_workers = n;
            } else {
                tracing::warn!("ignoring invalid QUARRY_INDEX_WORKERS value: {v}");
            }
        }
        if let Ok(v) = std::env::var("QUARRY_RETRIEVAL_TOP_K") {
            if let Ok(n) = v.parse::<usize>() {
                self.retrieval.top_k = n;
            } else {
                tracing::warn!("ignoring invalid QUARRY_RETRIEVAL_TOP_K value: {v}");
            }
        }
        if let Ok(v) = std::env::var("QUARRY_LOG") {
            self.log.level = v;
        }
    }

    /// The `QUARRY_`-prefixed variable wins over the provider's conventional one.
    pub(crate) fn resolve_secrets(&mut self) {
        if let Some(key) = first_env(&["QUARRY_OPENAI_API_KEY", "OPENAI_API_KEY"]) {
            self.secrets.openai_api_key = Some(Secret::new(key));
        }
        if let Some(key) = first_env(&["QUARRY_GEMINI_API_KEY", "GEMINI_API_KEY"]) {
            self.secrets.gemini_api_key = Some(Secret::new(key));
        }
    }
}

fn first_env(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| std::env::var(k).ok())
        .find(|v| !v.trim().is_empty())
}
