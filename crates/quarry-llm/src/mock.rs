//! Test-only mock embedder.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::LlmError;
use crate::provider::EmbeddingFunction;

#[derive(Debug, Clone)]
pub struct MockEmbedder {
    pub embedding: Vec<f32>,
    /// Exact-text overrides consulted before `embedding`.
    pub overrides: HashMap<String, Vec<f32>>,
    pub fail: bool,
    /// Milliseconds to sleep before returning.
    pub delay_ms: u64,
    pub model: String,
    calls: Arc<AtomicUsize>,
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self {
            embedding: vec![0.0; 8],
            overrides: HashMap::new(),
            fail: false,
            delay_ms: 0,
            model: "mock-embedding".into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl MockEmbedder {
    #[must_use]
    pub fn with_embedding(embedding: Vec<f32>) -> Self {
        Self {
            embedding,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn with_override(mut self, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        self.overrides.insert(text.into(), embedding);
        self
    }

    /// Number of `embed` calls observed so far, shared across clones.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EmbeddingFunction for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail {
            return Err(LlmError::Other("mock embedding error".into()));
        }
        Ok(self
            .overrides
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.embedding.clone()))
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
