use std::collections::BTreeMap;

use crate::error::Result;
use crate::retriever::{
    DEFAULT_OVERFETCH, Query, RetrievalResult, Retriever, RetrieverKind, sort_by_score,
};
use crate::store::Index;
use crate::tokenizer::query_tokens;

pub const DEFAULT_K1: f64 = 1.2;
pub const DEFAULT_B: f64 = 0.75;

/// Okapi BM25 over the persisted postings table.
///
/// Only documents with a positive score are returned.
#[derive(Debug, Clone)]
pub struct Bm25Retriever {
    k1: f64,
    b: f64,
    overfetch_factor: usize,
}

impl Bm25Retriever {
    #[must_use]
    pub fn new(k1: f64, b: f64, overfetch_factor: usize) -> Self {
        Self {
            k1,
            b,
            overfetch_factor,
        }
    }

    #[must_use]
    pub fn rank(&self, query: &Query, index: &Index) -> Vec<RetrievalResult> {
        if index.is_empty() {
            return Vec::new();
        }

        #[allow(clippy::cast_precision_loss)]
        let n = index.len() as f64;
        let avg_len = index.avg_doc_length().max(f64::MIN_POSITIVE);
        let mut scores: BTreeMap<u32, f64> = BTreeMap::new();

        for token in query_tokens(&query.text) {
            let postings = index.postings(&token);
            if postings.is_empty() {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let df = postings.len() as f64;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();

            for &(ordinal, tf) in postings {
                let tf = f64::from(tf);
                let dl = f64::from(index.doc_length(ordinal as usize));
                let norm = self.k1 * (1.0 - self.b + self.b * dl / avg_len);
                *scores.entry(ordinal).or_insert(0.0) += idf * tf * (self.k1 + 1.0) / (tf + norm);
            }
        }

        let mut results: Vec<RetrievalResult> = scores
            .into_iter()
            .filter(|&(_, score)| score > 0.0)
            .filter_map(|(ordinal, score)| {
                index
                    .symbol_at(ordinal as usize)
                    .map(|s| RetrievalResult::local(s.id.clone(), score, RetrieverKind::Bm25))
            })
            .collect();
        sort_by_score(&mut results);
        results.truncate(query.candidate_limit(self.overfetch_factor));
        results
    }
}

impl Default for Bm25Retriever {
    fn default() -> Self {
        Self::new(DEFAULT_K1, DEFAULT_B, DEFAULT_OVERFETCH)
    }
}

impl Retriever for Bm25Retriever {
    fn kind(&self) -> RetrieverKind {
        RetrieverKind::Bm25
    }

    async fn retrieve(&self, query: &Query, index: &Index) -> Result<Vec<RetrievalResult>> {
        Ok(self.rank(query, index))
    }
}
