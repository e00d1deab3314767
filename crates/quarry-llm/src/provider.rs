use std::sync::Arc;

use crate::error::LlmError;

/// Text to fixed-length vector, the only model capability the index consumes.
///
/// Implementations must return vectors of the same dimension for every call
/// made with the same model.
pub trait EmbeddingFunction: Send + Sync {
    /// Embed a single piece of text.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response is invalid.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send;

    /// Stable provider identifier recorded in the index fingerprint.
    fn provider_name(&self) -> &str;

    /// Model identifier recorded in the index fingerprint.
    fn model_name(&self) -> &str;
}

impl<E: EmbeddingFunction> EmbeddingFunction for Arc<E> {
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LlmError>> + Send {
        (**self).embed(text)
    }

    fn provider_name(&self) -> &str {
        (**self).provider_name()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}
