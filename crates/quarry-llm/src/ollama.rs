use std::time::Duration;

use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};

use crate::error::LlmError;
use crate::provider::EmbeddingFunction;

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Ollama,
    model: String,
    timeout: Duration,
}

impl OllamaEmbedder {
    #[must_use]
    pub fn new(base_url: &str, model: String, timeout: Duration) -> Self {
        let (host, port) = parse_host_port(base_url);
        Self {
            client: Ollama::new(host, port),
            model,
            timeout,
        }
    }
}

impl EmbeddingFunction for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let request =
            GenerateEmbeddingsRequest::new(self.model.clone(), EmbeddingsInput::from(text));

        let response = tokio::time::timeout(self.timeout, self.client.generate_embeddings(request))
            .await
            .map_err(|_| LlmError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })?
            .map_err(|e| LlmError::Other(format!("Ollama embedding request failed: {e}")))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse {
                provider: "ollama".into(),
            })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':') {
        let port_str = &url[colon_pos + 1..];
        if let Ok(port) = port_str.parse::<u16>() {
            let host = url[..colon_pos].to_string();
            return (host, port);
        }
    }
    (url.to_string(), 11434)
}
