//! Process-wide memoized knowledge index

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use super::index::KnowledgeIndex;
use super::source::SourceChain;
use super::KnowledgeError;
use crate::config::KnowledgeConfig;

/// Holds the current knowledge index and reloads it on demand
///
/// The index is never mutated after it is built. A refresh builds a new
/// index and swaps the reference, so readers holding the old `Arc` keep
/// a consistent snapshot.
pub struct KnowledgeStore {
    sources: Option<SourceChain>,
    current: RwLock<Option<Arc<KnowledgeIndex>>>,
    /// Serializes loads so concurrent first callers share one
    loading: Mutex<()>,
}

impl KnowledgeStore {
    pub fn new(config: KnowledgeConfig) -> Result<Self, KnowledgeError> {
        Ok(Self::with_sources(SourceChain::from_config(&config)?))
    }

    pub fn with_sources(sources: SourceChain) -> Self {
        Self {
            sources: Some(sources),
            current: RwLock::new(None),
            loading: Mutex::new(()),
        }
    }

    /// Store serving a fixed, already-built index
    pub fn from_index(index: KnowledgeIndex) -> Self {
        Self {
            sources: None,
            current: RwLock::new(Some(Arc::new(index))),
            loading: Mutex::new(()),
        }
    }

    /// Current index, loading it on first use
    pub async fn index(&self) -> Result<Arc<KnowledgeIndex>, KnowledgeError> {
        if let Some(index) = self.cached().await {
            return Ok(index);
        }

        let _guard = self.loading.lock().await;
        // another caller may have finished loading while we waited
        if let Some(index) = self.cached().await {
            return Ok(index);
        }

        let index = Arc::new(self.load().await?);
        *self.current.write().await = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Rebuild the index from its source and swap it in
    ///
    /// On failure the previous index stays in place.
    pub async fn refresh(&self) -> Result<Arc<KnowledgeIndex>, KnowledgeError> {
        let _guard = self.loading.lock().await;
        if self.sources.is_none() {
            return self.cached().await.ok_or(KnowledgeError::NoSource);
        }

        let index = Arc::new(self.load().await?);
        *self.current.write().await = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Index if already loaded
    pub async fn cached(&self) -> Option<Arc<KnowledgeIndex>> {
        self.current.read().await.clone()
    }

    async fn load(&self) -> Result<KnowledgeIndex, KnowledgeError> {
        let sources = self.sources.as_ref().ok_or(KnowledgeError::NoSource)?;
        let started = Instant::now();

        let source_text = sources.read().await?;
        let index = KnowledgeIndex::parse(&source_text.text, source_text.source);

        info!(
            "Loaded {} knowledge entries from {} in {:?} ({} lines skipped)",
            index.len(),
            index.metadata.source,
            started.elapsed(),
            index.metadata.skipped_lines
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::SourceProvider;
    use std::time::Duration;

    fn file_store(path: std::path::PathBuf) -> KnowledgeStore {
        let chain =
            SourceChain::new(vec![SourceProvider::File(path)], Duration::from_secs(5)).unwrap();
        KnowledgeStore::with_sources(chain)
    }

    fn lines(registers: &[&str]) -> String {
        registers
            .iter()
            .map(|r| format!(r#"{{"register_number":"{}"}}"#, r))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn test_load_is_memoized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.jsonl");
        std::fs::write(&path, lines(&["1", "2"])).unwrap();

        let store = file_store(path.clone());
        assert!(store.cached().await.is_none());

        let first = store.index().await.unwrap();
        assert_eq!(first.len(), 2);

        // later file changes are not seen until refresh
        std::fs::write(&path, lines(&["1", "2", "3"])).unwrap();
        let second = store.index().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_refresh_swaps_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.jsonl");
        std::fs::write(&path, lines(&["1"])).unwrap();

        let store = file_store(path.clone());
        let old = store.index().await.unwrap();

        std::fs::write(&path, lines(&["1", "2", "3"])).unwrap();
        let new = store.refresh().await.unwrap();

        assert_eq!(old.len(), 1);
        assert_eq!(new.len(), 3);
        assert_eq!(store.index().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.jsonl");
        std::fs::write(&path, lines(&["1"])).unwrap();

        let store = file_store(path.clone());
        store.index().await.unwrap();

        std::fs::remove_file(&path).unwrap();
        assert!(store.refresh().await.is_err());
        assert_eq!(store.index().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.jsonl");

        let store = file_store(path.clone());
        assert!(store.index().await.is_err());

        std::fs::write(&path, lines(&["1"])).unwrap();
        assert_eq!(store.index().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_load_shares_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k.jsonl");
        std::fs::write(&path, lines(&["1", "2"])).unwrap();

        let store = Arc::new(file_store(path));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.index().await.unwrap() })
            })
            .collect();

        let mut indexes = Vec::new();
        for handle in handles {
            indexes.push(handle.await.unwrap());
        }
        assert!(indexes.iter().all(|i| Arc::ptr_eq(i, &indexes[0])));
    }

    #[tokio::test]
    async fn test_from_index() {
        let store = KnowledgeStore::from_index(KnowledgeIndex::parse(&lines(&["7"]), "fixed"));
        assert_eq!(store.index().await.unwrap().metadata.source, "fixed");
        assert_eq!(store.refresh().await.unwrap().len(), 1);
    }
}
