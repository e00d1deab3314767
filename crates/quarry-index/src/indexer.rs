//! Build orchestration: walk → extract → embed → commit, full or incremental.

use std::path::Path;
use std::sync::Arc;

use quarry_llm::AnyEmbedder;

use crate::changeset::ChangeSet;
use crate::error::{IndexError, Result};
use crate::repo_map::RepoMapBuilder;
use crate::store::{BuildReport, Fingerprint, Index, IndexStore};

/// Drives one build against one index directory.
pub struct CodeIndexer {
    builder: RepoMapBuilder,
    store: IndexStore,
    embedder: Option<Arc<AnyEmbedder>>,
}

/// Outcome of an incremental build.
#[derive(Debug)]
pub struct IncrementalOutcome {
    pub index: Index,
    pub report: BuildReport,
    /// `None` when no compatible previous index existed and a full build ran.
    pub changes: Option<ChangeSet>,
}

impl CodeIndexer {
    #[must_use]
    pub fn new(
        builder: RepoMapBuilder,
        store: IndexStore,
        embedder: Option<Arc<AnyEmbedder>>,
    ) -> Self {
        Self {
            builder,
            store,
            embedder,
        }
    }

    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self.embedder.as_deref())
    }

    /// Re-parse every file and replace the index.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` cannot be walked, the index directory is
    /// locked, or an artifact cannot be written. Per-file failures are
    /// reported in [`BuildReport::skipped`] instead.
    pub async fn index_project(&self, root: &Path) -> Result<(Index, BuildReport)> {
        let stream = self.builder.build(root)?;
        self.store
            .commit(stream, self.embedder.as_deref(), None)
            .await
    }

    /// Re-parse only added and updated files, reusing symbols and vectors of
    /// unchanged ones. Falls back to a full build when the previous index is
    /// missing, unreadable or was built with another embedder.
    ///
    /// # Errors
    ///
    /// Same as [`CodeIndexer::index_project`].
    pub async fn index_incremental(&self, root: &Path) -> Result<IncrementalOutcome> {
        let fingerprint = self.fingerprint();
        let previous = match self.store.load(Some(&fingerprint)) {
            Ok(prev) if prev.fingerprint() == fingerprint => Some(prev),
            Ok(prev) => {
                let stored = prev.fingerprint();
                tracing::warn!(
                    stored_provider = %stored.embedding_provider,
                    stored_model = %stored.embedding_model,
                    "embedder changed since last build, running full rebuild"
                );
                None
            }
            Err(IndexError::IndexMissing { artifact, .. }) => {
                tracing::info!(%artifact, "no previous index, running full build");
                None
            }
            Err(e) => {
                tracing::warn!("previous index unusable, running full rebuild: {e}");
                None
            }
        };

        let Some(previous) = previous else {
            let (index, report) = self.index_project(root).await?;
            return Ok(IncrementalOutcome {
                index,
                report,
                changes: None,
            });
        };

        let current = self.builder.hash_files(root).await?;
        let changes = ChangeSet::compute(&previous.meta().file_hashes, &current);
        tracing::info!(
            added = changes.added.len(),
            updated = changes.updated.len(),
            removed = changes.removed.len(),
            unchanged = changes.unchanged.len(),
            "change set computed"
        );

        let reuse = changes.reuse_from(&previous, &current);
        let stream = self.builder.build_with_reuse(root, reuse)?;
        let (index, report) = self
            .store
            .commit(stream, self.embedder.as_deref(), Some(&previous))
            .await?;
        Ok(IncrementalOutcome {
            index,
            report,
            changes: Some(changes),
        })
    }
}
