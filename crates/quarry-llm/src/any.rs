use crate::error::LlmError;
use crate::gemini::GeminiEmbedder;
use crate::hashing::HashingEmbedder;
#[cfg(feature = "mock")]
use crate::mock::MockEmbedder;
use crate::ollama::OllamaEmbedder;
use crate::openai::OpenAiEmbedder;
use crate::provider::EmbeddingFunction;

/// Generates a match over all `AnyEmbedder` variants, binding the inner embedder
/// and evaluating the given closure for each arm.
macro_rules! delegate_embedder {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyEmbedder::Ollama($p) => $expr,
            AnyEmbedder::OpenAi($p) => $expr,
            AnyEmbedder::Gemini($p) => $expr,
            AnyEmbedder::Hash($p) => $expr,
            #[cfg(feature = "mock")]
            AnyEmbedder::Mock($p) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyEmbedder {
    Ollama(OllamaEmbedder),
    OpenAi(OpenAiEmbedder),
    Gemini(GeminiEmbedder),
    Hash(HashingEmbedder),
    #[cfg(feature = "mock")]
    Mock(MockEmbedder),
}

impl EmbeddingFunction for AnyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        delegate_embedder!(self, |p| p.embed(text).await)
    }

    fn provider_name(&self) -> &str {
        delegate_embedder!(self, |p| p.provider_name())
    }

    fn model_name(&self) -> &str {
        delegate_embedder!(self, |p| p.model_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_variant_delegates() {
        let any = AnyEmbedder::Hash(HashingEmbedder::new(16));
        assert_eq!(any.provider_name(), "hash");
        assert_eq!(any.model_name(), "feature-hash-16");
        assert_eq!(any.embed("add").await.unwrap().len(), 16);
    }
}
