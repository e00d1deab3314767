use std::sync::{Arc, PoisonError, RwLock};

use crate::store::Index;

/// Atomically swappable index snapshot.
///
/// Readers take an `Arc` and keep it for the whole query, so a concurrent
/// [`SharedIndex::replace`] never exposes a half-updated index.
#[derive(Debug, Clone)]
pub struct SharedIndex {
    inner: Arc<RwLock<Arc<Index>>>,
}

impl SharedIndex {
    #[must_use]
    pub fn new(index: Index) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(index))),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<Index> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Install `index` and return the previous snapshot.
    pub fn replace(&self, index: Index) -> Arc<Index> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(index))
    }
}

impl Default for SharedIndex {
    fn default() -> Self {
        Self::new(Index::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retriever::test_support::symbol;
    use crate::store::Fingerprint;
    use crate::symbol::SymbolKind;

    #[test]
    fn snapshot_survives_replace() {
        let shared = SharedIndex::default();
        let before = shared.snapshot();

        let next = Index::from_symbols(
            vec![symbol("a.py:f:0", SymbolKind::Function, "f", "def f()", "def f(): pass")],
            None,
            Fingerprint::none(),
        );
        let old = shared.replace(next);

        assert!(before.is_empty());
        assert!(Arc::ptr_eq(&before, &old));
        assert_eq!(shared.snapshot().len(), 1);
    }

    #[test]
    fn clones_share_state() {
        let a = SharedIndex::default();
        let b = a.clone();
        b.replace(Index::from_symbols(
            vec![symbol("a.py:g:0", SymbolKind::Function, "g", "def g()", "def g(): pass")],
            None,
            Fingerprint::none(),
        ));
        assert_eq!(a.snapshot().len(), 1);
    }
}
