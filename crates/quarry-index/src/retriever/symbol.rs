use crate::error::Result;
use crate::retriever::{Query, RetrievalResult, Retriever, RetrieverKind, DEFAULT_OVERFETCH};
use crate::store::Index;
use crate::tokenizer::query_tokens;

/// Names below this length are not matched as substrings of query tokens.
const MIN_REVERSE_MATCH_LEN: usize = 3;

/// Matches query tokens against symbol names and signatures.
///
/// Score is the fraction of query tokens matched. Ties go to the shorter
/// name, then the smaller id.
#[derive(Debug, Clone)]
pub struct SymbolRetriever {
    overfetch_factor: usize,
}

impl SymbolRetriever {
    #[must_use]
    pub fn new(overfetch_factor: usize) -> Self {
        Self { overfetch_factor }
    }

    #[must_use]
    pub fn rank(&self, query: &Query, index: &Index) -> Vec<RetrievalResult> {
        let tokens = query_tokens(&query.text);
        if tokens.is_empty() {
            return Vec::new();
        }
        #[allow(clippy::cast_precision_loss)]
        let total = tokens.len() as f64;

        let mut scored: Vec<(f64, usize, &str)> = index
            .symbols()
            .iter()
            .filter_map(|symbol| {
                let name = symbol.name.to_lowercase();
                let signature = symbol.signature.to_lowercase();
                let matched = tokens
                    .iter()
                    .filter(|t| {
                        name.contains(t.as_str())
                            || signature.contains(t.as_str())
                            || (name.len() >= MIN_REVERSE_MATCH_LEN && t.contains(&name))
                    })
                    .count();
                #[allow(clippy::cast_precision_loss)]
                let score = matched as f64 / total;
                (matched > 0).then_some((score, symbol.name.len(), symbol.id.as_str()))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(b.2))
        });
        scored.truncate(query.candidate_limit(self.overfetch_factor));
        scored
            .into_iter()
            .map(|(score, _, id)| RetrievalResult::local(id.to_owned(), score, RetrieverKind::Symbol))
            .collect()
    }
}

impl Default for SymbolRetriever {
    fn default() -> Self {
        Self::new(DEFAULT_OVERFETCH)
    }
}

impl Retriever for SymbolRetriever {
    fn kind(&self) -> RetrieverKind {
        RetrieverKind::Symbol
    }

    async fn retrieve(&self, query: &Query, index: &Index) -> Result<Vec<RetrievalResult>> {
        Ok(self.rank(query, index))
    }
}
