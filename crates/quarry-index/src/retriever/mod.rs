//! Retrieval strategies over a loaded [`Index`].
//!
//! Every retriever is a pure function of the index content and the query.
//! Filters on the query are ignored here; they apply after fusion.

pub mod bm25;
pub mod symbol;
pub mod vector;

use std::fmt;

use serde::Serialize;

pub use bm25::Bm25Retriever;
pub use symbol::SymbolRetriever;
pub use vector::{VectorRetriever, cosine_similarity};

use crate::error::{IndexError, Result};
use crate::languages::Lang;
use crate::store::Index;
use crate::symbol::SymbolKind;

/// Default number of candidates per retriever is `top_k * DEFAULT_OVERFETCH`.
pub const DEFAULT_OVERFETCH: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    pub top_k: usize,
    pub kind_filter: Option<SymbolKind>,
    pub language_filter: Option<Lang>,
}

impl Query {
    #[must_use]
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            top_k,
            kind_filter: None,
            language_filter: None,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: SymbolKind) -> Self {
        self.kind_filter = Some(kind);
        self
    }

    #[must_use]
    pub fn with_language(mut self, lang: Lang) -> Self {
        self.language_filter = Some(lang);
        self
    }

    /// # Errors
    ///
    /// Returns [`IndexError::InvalidQuery`] for blank text or `top_k == 0`.
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(IndexError::InvalidQuery("query text is empty".into()));
        }
        if self.top_k == 0 {
            return Err(IndexError::InvalidQuery("top_k must be at least 1".into()));
        }
        Ok(())
    }

    pub(crate) fn candidate_limit(&self, overfetch_factor: usize) -> usize {
        self.top_k.saturating_mul(overfetch_factor.max(1))
    }

    /// Whether `symbol` passes the kind and language filters.
    #[must_use]
    pub fn accepts(&self, symbol: &crate::symbol::Symbol) -> bool {
        self.kind_filter.is_none_or(|k| symbol.kind == k)
            && self.language_filter.is_none_or(|l| symbol.language == l)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrieverKind {
    Symbol,
    Bm25,
    Vector,
    /// Fused from more than one retriever.
    Hybrid,
}

impl fmt::Display for RetrieverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Symbol => "symbol",
            Self::Bm25 => "bm25",
            Self::Vector => "vector",
            Self::Hybrid => "hybrid",
        })
    }
}

/// One retriever's share of a fused score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub retriever: RetrieverKind,
    /// 1-based rank within that retriever's list.
    pub rank: usize,
    pub raw_score: f64,
    pub fused_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub symbol_id: String,
    /// Retriever-local until fused, then the fused score.
    pub score: f64,
    pub source_retriever: RetrieverKind,
    /// Empty before fusion.
    pub contributions: Vec<Contribution>,
}

impl RetrievalResult {
    pub(crate) fn local(symbol_id: String, score: f64, source: RetrieverKind) -> Self {
        Self {
            symbol_id,
            score,
            source_retriever: source,
            contributions: Vec::new(),
        }
    }
}

/// A ranking strategy.
pub trait Retriever: Send + Sync {
    fn kind(&self) -> RetrieverKind;

    /// Ranked candidates for `query`, best first.
    ///
    /// An empty list means the strategy had nothing to offer; an error means
    /// the strategy could not run at all.
    fn retrieve(
        &self,
        query: &Query,
        index: &Index,
    ) -> impl Future<Output = Result<Vec<RetrievalResult>>> + Send;
}

/// Sort by score descending, then id ascending.
pub(crate) fn sort_by_score(results: &mut [RetrievalResult]) {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.symbol_id.cmp(&b.symbol_id))
    });
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::languages::Lang;
    use crate::symbol::{Symbol, SymbolKind};

    pub fn symbol(id: &str, kind: SymbolKind, name: &str, signature: &str, content: &str) -> Symbol {
        let file_path = id.split(':').next().unwrap_or_default().to_owned();
        let language = if file_path.ends_with(".py") {
            Lang::Python
        } else {
            Lang::C
        };
        Symbol {
            id: id.into(),
            file_path,
            kind,
            name: name.into(),
            signature: signature.into(),
            start_line: 0,
            end_line: 0,
            content: content.into(),
            language,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_blank_and_zero() {
        assert!(matches!(
            Query::new("  ", 5).validate(),
            Err(IndexError::InvalidQuery(_))
        ));
        assert!(matches!(
            Query::new("add", 0).validate(),
            Err(IndexError::InvalidQuery(_))
        ));
        assert!(Query::new("add", 1).validate().is_ok());
    }

    #[test]
    fn candidate_limit_saturates() {
        assert_eq!(Query::new("x", 5).candidate_limit(3), 15);
        assert_eq!(Query::new("x", 5).candidate_limit(0), 5);
        assert_eq!(Query::new("x", usize::MAX).candidate_limit(3), usize::MAX);
    }

    #[test]
    fn sort_breaks_ties_by_id() {
        let mut results = vec![
            RetrievalResult::local("b".into(), 1.0, RetrieverKind::Bm25),
            RetrievalResult::local("a".into(), 1.0, RetrieverKind::Bm25),
            RetrievalResult::local("c".into(), 2.0, RetrieverKind::Bm25),
        ];
        sort_by_score(&mut results);
        let ids: Vec<&str> = results.iter().map(|r| r.symbol_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }
}
