use std::sync::Arc;
use std::time::Duration;

use quarry_llm::{AnyEmbedder, EmbeddingFunction};

use crate::error::{IndexError, Result};
use crate::retriever::{
    DEFAULT_OVERFETCH, Query, RetrievalResult, Retriever, RetrieverKind, sort_by_score,
};
use crate::store::Index;

pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(10);

/// Cosine similarity between the embedded query and every stored vector.
#[derive(Debug, Clone)]
pub struct VectorRetriever {
    embedder: Arc<AnyEmbedder>,
    timeout: Duration,
    overfetch_factor: usize,
}

impl VectorRetriever {
    #[must_use]
    pub fn new(embedder: Arc<AnyEmbedder>, timeout: Duration, overfetch_factor: usize) -> Self {
        Self {
            embedder,
            timeout,
            overfetch_factor,
        }
    }

    #[must_use]
    pub fn with_defaults(embedder: Arc<AnyEmbedder>) -> Self {
        Self::new(embedder, DEFAULT_EMBED_TIMEOUT, DEFAULT_OVERFETCH)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        match tokio::time::timeout(self.timeout, self.embedder.embed(text)).await {
            Ok(Ok(vector)) => Ok(vector),
            Ok(Err(e)) => Err(IndexError::ProviderUnavailable(e.to_string())),
            Err(_) => Err(IndexError::ProviderUnavailable(format!(
                "{} embedding timed out after {}ms",
                self.embedder.provider_name(),
                self.timeout.as_millis()
            ))),
        }
    }
}

impl Retriever for VectorRetriever {
    fn kind(&self) -> RetrieverKind {
        RetrieverKind::Vector
    }

    async fn retrieve(&self, query: &Query, index: &Index) -> Result<Vec<RetrievalResult>> {
        let Some(dense) = index.dense() else {
            tracing::debug!(status = ?index.dense_status(), "no usable dense vectors");
            return Ok(Vec::new());
        };
        if dense.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embed_query(&query.text).await?;
        if query_vector.len() != dense.dimension as usize {
            tracing::warn!(
                query_dimension = query_vector.len(),
                index_dimension = dense.dimension,
                "embedding dimension mismatch, vector search disabled for this query"
            );
            return Err(IndexError::ProviderUnavailable(format!(
                "query embedding has {} dimensions, index has {}",
                query_vector.len(),
                dense.dimension
            )));
        }

        let mut results: Vec<RetrievalResult> = dense
            .vectors
            .iter()
            .zip(index.symbols())
            .map(|(vector, symbol)| {
                RetrievalResult::local(
                    symbol.id.clone(),
                    cosine_similarity(&query_vector, vector),
                    RetrieverKind::Vector,
                )
            })
            .collect();

        sort_by_score(&mut results);
        results.truncate(query.candidate_limit(self.overfetch_factor));
        Ok(results)
    }
}

/// Cosine similarity in `f64`; 0 when either vector has zero norm or the
/// lengths differ.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f64::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use quarry_llm::mock::MockEmbedder;

    use super::*;
    use crate::retriever::test_support::symbol;
    use crate::store::{DenseVectors, Fingerprint};
    use crate::symbol::SymbolKind;

    fn index() -> Index {
        Index::from_symbols(
            vec![
                symbol("a.py:x:0", SymbolKind::Function, "x", "def x()", "def x(): pass"),
                symbol("a.py:y:0", SymbolKind::Function, "y", "def y()", "def y(): pass"),
                symbol("a.py:z:0", SymbolKind::Function, "z", "def z()", "def z(): pass"),
            ],
            Some(DenseVectors {
                dimension: 2,
                vectors: vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
            }),
            Fingerprint::none(),
        )
    }

    fn retriever(mock: MockEmbedder) -> VectorRetriever {
        VectorRetriever::with_defaults(Arc::new(AnyEmbedder::Mock(mock)))
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < f64::EPSILON);
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn ranks_by_similarity() {
        let r = retriever(MockEmbedder::with_embedding(vec![1.0, 0.1]));
        let results = r.retrieve(&Query::new("q", 5), &index()).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.symbol_id.as_str()).collect();
        assert_eq!(ids, vec!["a.py:x:0", "a.py:z:0", "a.py:y:0"]);
    }

    #[tokio::test]
    async fn no_dense_structure_is_empty() {
        let plain = Index::from_symbols(index().symbols().to_vec(), None, Fingerprint::none());
        let r = retriever(MockEmbedder::with_embedding(vec![1.0, 0.0]));
        assert!(r.retrieve(&Query::new("q", 5), &plain).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_error_is_unavailable() {
        let r = retriever(MockEmbedder::failing());
        let err = r.retrieve(&Query::new("q", 5), &index()).await.unwrap_err();
        assert!(matches!(err, IndexError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn timeout_is_unavailable() {
        let r = VectorRetriever::new(
            Arc::new(AnyEmbedder::Mock(
                MockEmbedder::with_embedding(vec![1.0, 0.0]).with_delay(500),
            )),
            Duration::from_millis(20),
            3,
        );
        let err = r.retrieve(&Query::new("q", 5), &index()).await.unwrap_err();
        assert!(matches!(err, IndexError::ProviderUnavailable(ref m) if m.contains("timed out")));
    }

    #[tokio::test]
    async fn mismatched_dimension_is_unavailable() {
        let r = retriever(MockEmbedder::with_embedding(vec![1.0, 0.0, 0.0]));
        let err = r.retrieve(&Query::new("q", 5), &index()).await.unwrap_err();
        assert!(
            matches!(err, IndexError::ProviderUnavailable(ref m) if m.contains("3 dimensions, index has 2"))
        );
    }
}
