//! Fan-out to the configured retrievers and reciprocal-rank fusion.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use quarry_llm::AnyEmbedder;

use crate::error::{IndexError, Result};
use crate::retriever::bm25::{DEFAULT_B, DEFAULT_K1};
use crate::retriever::vector::DEFAULT_EMBED_TIMEOUT;
use crate::retriever::{
    Bm25Retriever, Contribution, DEFAULT_OVERFETCH, Query, RetrievalResult, Retriever,
    RetrieverKind, SymbolRetriever, VectorRetriever, sort_by_score,
};
use crate::shared::SharedIndex;
use crate::store::{DenseStatus, Index};

pub const DEFAULT_RANK_CONSTANT: u32 = 60;

/// Retrieval settings, passed explicitly to [`HybridQueryEngine::new`].
#[derive(Debug, Clone)]
pub struct HybridConfig {
    pub overfetch_factor: usize,
    pub rank_constant: u32,
    pub bm25_k1: f64,
    pub bm25_b: f64,
    pub symbol_enabled: bool,
    pub bm25_enabled: bool,
    pub vector_enabled: bool,
    pub embedding_timeout: Duration,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            overfetch_factor: DEFAULT_OVERFETCH,
            rank_constant: DEFAULT_RANK_CONSTANT,
            bm25_k1: DEFAULT_K1,
            bm25_b: DEFAULT_B,
            symbol_enabled: true,
            bm25_enabled: true,
            vector_enabled: true,
            embedding_timeout: DEFAULT_EMBED_TIMEOUT,
        }
    }
}

/// Fused results plus what went missing on the way.
#[derive(Debug, Clone, Default)]
pub struct QueryReport {
    pub results: Vec<RetrievalResult>,
    /// Retrievers that failed for this query, with the reason.
    pub unavailable: Vec<(RetrieverKind, String)>,
    /// The index's dense vectors belong to a different embedder.
    pub stale_embedding: bool,
}

pub struct HybridQueryEngine {
    index: SharedIndex,
    symbol: Option<SymbolRetriever>,
    bm25: Option<Bm25Retriever>,
    vector: Option<VectorRetriever>,
    rank_constant: u32,
}

impl HybridQueryEngine {
    /// The vector retriever is configured only when enabled and an embedder
    /// is supplied.
    #[must_use]
    pub fn new(config: &HybridConfig, index: SharedIndex, embedder: Option<Arc<AnyEmbedder>>) -> Self {
        let overfetch = config.overfetch_factor;
        Self {
            index,
            symbol: config
                .symbol_enabled
                .then(|| SymbolRetriever::new(overfetch)),
            bm25: config
                .bm25_enabled
                .then(|| Bm25Retriever::new(config.bm25_k1, config.bm25_b, overfetch)),
            vector: embedder
                .filter(|_| config.vector_enabled)
                .map(|e| VectorRetriever::new(e, config.embedding_timeout, overfetch)),
            rank_constant: config.rank_constant,
        }
    }

    #[must_use]
    pub fn index(&self) -> &SharedIndex {
        &self.index
    }

    /// Retrievers that will be consulted, in fusion order.
    #[must_use]
    pub fn configured(&self) -> Vec<RetrieverKind> {
        let mut kinds = Vec::new();
        if self.symbol.is_some() {
            kinds.push(RetrieverKind::Symbol);
        }
        if self.bm25.is_some() {
            kinds.push(RetrieverKind::Bm25);
        }
        if self.vector.is_some() {
            kinds.push(RetrieverKind::Vector);
        }
        kinds
    }

    /// Fused results, at most `query.top_k`. An empty list is a valid answer.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidQuery`] for a malformed query and
    /// [`IndexError::NoRetrieverAvailable`] if no retriever is configured or
    /// every configured retriever failed.
    pub async fn query(&self, query: &Query) -> Result<Vec<RetrievalResult>> {
        Ok(self.query_with_report(query).await?.results)
    }

    /// Like [`HybridQueryEngine::query`], also reporting degraded retrievers.
    ///
    /// # Errors
    ///
    /// See [`HybridQueryEngine::query`].
    pub async fn query_with_report(&self, query: &Query) -> Result<QueryReport> {
        Ok(self.query_snapshot(query).await?.1)
    }

    /// Like [`HybridQueryEngine::query_with_report`], also returning the
    /// snapshot the query ran against so result ids can be resolved.
    ///
    /// # Errors
    ///
    /// See [`HybridQueryEngine::query`].
    pub async fn query_snapshot(&self, query: &Query) -> Result<(Arc<Index>, QueryReport)> {
        query.validate()?;
        let snapshot = self.index.snapshot();
        let report = self.fuse(query, &snapshot).await?;
        Ok((snapshot, report))
    }

    async fn fuse(&self, query: &Query, index: &Index) -> Result<QueryReport> {
        let (symbol, bm25, vector) = tokio::join!(
            run(self.symbol.as_ref(), query, index),
            run(self.bm25.as_ref(), query, index),
            run(self.vector.as_ref(), query, index),
        );

        let mut report = QueryReport {
            stale_embedding: self.vector.is_some() && index.dense_status() == DenseStatus::Stale,
            ..QueryReport::default()
        };
        let mut lists = Vec::new();
        let mut attempted = 0usize;

        for (kind, outcome) in [
            (RetrieverKind::Symbol, symbol),
            (RetrieverKind::Bm25, bm25),
            (RetrieverKind::Vector, vector),
        ] {
            let Some(outcome) = outcome else {
                continue;
            };
            attempted += 1;
            match outcome {
                Ok(results) => {
                    tracing::debug!(retriever = %kind, candidates = results.len());
                    lists.push((kind, results));
                }
                Err(e) => {
                    tracing::warn!(retriever = %kind, "retriever unavailable: {e}");
                    report.unavailable.push((kind, e.to_string()));
                }
            }
        }

        if attempted == 0 || lists.is_empty() {
            return Err(IndexError::NoRetrieverAvailable);
        }

        let mut fused = reciprocal_rank_fusion(&lists, self.rank_constant);
        fused.retain(|r| index.symbol(&r.symbol_id).is_some_and(|s| query.accepts(s)));
        fused.truncate(query.top_k);
        report.results = fused;
        Ok(report)
    }
}

async fn run<R: Retriever>(
    retriever: Option<&R>,
    query: &Query,
    index: &Index,
) -> Option<Result<Vec<RetrievalResult>>> {
    match retriever {
        Some(r) => Some(r.retrieve(query, index).await),
        None => None,
    }
}

/// Merge ranked lists: each candidate gets `1 / (rank_constant + rank)` per
/// list it appears in (1-based rank), summed. Ordered by fused score
/// descending, ties by id ascending.
#[must_use]
pub fn reciprocal_rank_fusion(
    lists: &[(RetrieverKind, Vec<RetrievalResult>)],
    rank_constant: u32,
) -> Vec<RetrievalResult> {
    let mut merged: BTreeMap<&str, (f64, Vec<Contribution>)> = BTreeMap::new();

    for (kind, results) in lists {
        for (i, result) in results.iter().enumerate() {
            let rank = i + 1;
            #[allow(clippy::cast_precision_loss)]
            let fused_score = 1.0 / (f64::from(rank_constant) + rank as f64);
            let entry = merged.entry(result.symbol_id.as_str()).or_default();
            entry.0 += fused_score;
            entry.1.push(Contribution {
                retriever: *kind,
                rank,
                raw_score: result.score,
                fused_score,
            });
        }
    }

    let mut out: Vec<RetrievalResult> = merged
        .into_iter()
        .map(|(id, (score, contributions))| RetrievalResult {
            symbol_id: id.to_owned(),
            score,
            source_retriever: match contributions.as_slice() {
                [only] => only.retriever,
                _ => RetrieverKind::Hybrid,
            },
            contributions,
        })
        .collect();
    sort_by_score(&mut out);
    out
}
