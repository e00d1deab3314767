use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The grammar rejected the file or no grammar is compiled in.
    #[error("parse failed: {0}")]
    Parse(String),

    /// A required artifact is absent from the index directory.
    #[error("index missing in {}: {artifact} not found", dir.display())]
    IndexMissing { dir: PathBuf, artifact: String },

    /// An artifact exists but cannot be trusted.
    #[error("index corrupt ({artifact}): {reason}")]
    IndexCorrupt { artifact: String, reason: String },

    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// No retriever is configured, or every configured retriever failed.
    #[error("no retriever available")]
    NoRetrieverAvailable,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("directory walk failed: {0}")]
    Walk(#[from] ignore::Error),

    /// Another build holds the advisory lock on the index directory.
    #[error("index directory {} is locked by another build", .0.display())]
    Locked(PathBuf),
}

impl IndexError {
    pub(crate) fn corrupt(artifact: &str, reason: impl Into<String>) -> Self {
        Self::IndexCorrupt {
            artifact: artifact.to_owned(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
