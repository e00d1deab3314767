//! File-level diff between a previous index and the current tree.

use std::collections::{BTreeMap, HashMap};

use crate::repo_map::ReusedFile;
use crate::store::Index;
use crate::symbol::Symbol;

/// Relative paths grouped by how they changed since the previous build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
}

impl ChangeSet {
    /// Compare two `path → content hash` maps. Output lists are sorted.
    #[must_use]
    pub fn compute(previous: &BTreeMap<String, String>, current: &BTreeMap<String, String>) -> Self {
        let mut set = Self::default();
        for (path, hash) in current {
            match previous.get(path) {
                None => set.added.push(path.clone()),
                Some(old) if old == hash => set.unchanged.push(path.clone()),
                Some(_) => set.updated.push(path.clone()),
            }
        }
        set.removed = previous
            .keys()
            .filter(|p| !current.contains_key(*p))
            .cloned()
            .collect();
        set
    }

    /// `true` when nothing was added, removed or updated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }

    /// Symbols of unchanged files taken from `previous`, ready for
    /// [`crate::repo_map::RepoMapBuilder::build_with_reuse`].
    #[must_use]
    pub fn reuse_from(
        &self,
        previous: &Index,
        current: &BTreeMap<String, String>,
    ) -> HashMap<String, ReusedFile> {
        let mut by_file: HashMap<&str, Vec<Symbol>> = HashMap::new();
        for symbol in previous.symbols() {
            by_file
                .entry(symbol.file_path.as_str())
                .or_default()
                .push(symbol.clone());
        }

        self.unchanged
            .iter()
            .filter_map(|path| {
                let hash = current.get(path)?;
                Some((
                    path.clone(),
                    ReusedFile {
                        content_hash: hash.clone(),
                        symbols: by_file.remove(path.as_str()).unwrap_or_default(),
                    },
                ))
            })
            .collect()
    }
}
