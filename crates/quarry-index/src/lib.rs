//! Symbol-level code indexing and hybrid retrieval.
//!
//! A build walks a repository, extracts function/method/class/struct
//! definitions with tree-sitter, and commits them to an on-disk index holding
//! BM25 postings and optional dense vectors. Queries fan out to the symbol,
//! BM25 and vector retrievers and are merged with reciprocal-rank fusion.

pub mod changeset;
pub mod context;
pub mod error;
pub mod extractor;
pub mod hybrid;
pub mod indexer;
pub mod languages;
pub mod repo_map;
pub mod retriever;
pub mod shared;
pub mod store;
pub mod symbol;
pub mod tokenizer;

pub use error::{IndexError, Result};
pub use hybrid::{HybridConfig, HybridQueryEngine, QueryReport};
pub use languages::Lang;
pub use repo_map::{BuildProgress, RepoMap, RepoMapBuilder, ScanConfig, SkipReason, SkippedFile};
pub use retriever::{Query, RetrievalResult, RetrieverKind};
pub use shared::SharedIndex;
pub use store::{BuildReport, DenseStatus, Fingerprint, Index, IndexStore};
pub use symbol::{Symbol, SymbolKind, SymbolSummary};
