use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::http::{client_with_timeout, trim_base_url};
use crate::provider::EmbeddingFunction;

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone)]
pub struct GeminiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl fmt::Debug for GeminiEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiEmbedder")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiEmbedder {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: client_with_timeout(timeout)?,
            api_key,
            base_url: trim_base_url(base_url),
            model,
        })
    }

    fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }
}

#[derive(Serialize)]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

impl EmbeddingFunction for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let model = self.model_path();
        let url = format!("{}/{model}:embedContent", self.base_url);
        let body = EmbedContentRequest {
            model,
            content: Content {
                parts: [Part { text }],
            },
        };

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;

        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            tracing::error!("Gemini embedding API error {status}: {text}");
            return Err(LlmError::Status {
                provider: "gemini".into(),
                status: status.as_u16(),
            });
        }

        let resp: EmbedContentResponse = serde_json::from_str(&text)?;
        resp.embedding
            .map(|e| e.values)
            .filter(|v| !v.is_empty())
            .ok_or(LlmError::EmptyResponse {
                provider: "gemini".into(),
            })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn provider_name(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn embedder(base_url: String, model: &str) -> GeminiEmbedder {
        GeminiEmbedder::new("g-key".into(), base_url, model.into(), Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn model_path_prefixes_once() {
        assert_eq!(
            embedder(DEFAULT_GEMINI_BASE_URL.into(), "text-embedding-004").model_path(),
            "models/text-embedding-004"
        );
        assert_eq!(
            embedder(DEFAULT_GEMINI_BASE_URL.into(), "models/text-embedding-004").model_path(),
            "models/text-embedding-004"
        );
    }

    #[tokio::test]
    async fn embed_reads_values() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/text-embedding-004:embedContent"))
            .and(header("x-goog-api-key", "g-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embedding": {"values": [0.5, -0.5]}
            })))
            .mount(&server)
            .await;

        let vector = embedder(server.uri(), "text-embedding-004")
            .embed("hi")
            .await
            .unwrap();
        assert_eq!(vector, vec![0.5, -0.5]);
    }

    #[tokio::test]
    async fn embed_missing_embedding_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/text-embedding-004:embedContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let err = embedder(server.uri(), "text-embedding-004")
            .embed("hi")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { .. }));
    }
}
