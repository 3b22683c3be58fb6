//! Shared change-detection state.
//!
//! The [`ChangeCache`] owns the three maps the incremental pipeline
//! coordinates through: the committed content-hash map, the busy set
//! enforcing one in-flight reindex per path, and the pending set the
//! debounce timer promotes from. It is constructed once per process and
//! shared by `Arc` between the watcher loops and the orchestrator —
//! there is no ambient global state.
//!
//! None of this state is persisted. On restart the hash map is rebuilt
//! by rehashing indexed files, so every file is re-validated on first
//! touch but the store is never corrupted.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

/// Compute the content hash used for incremental-reprocessing checks.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Shared cache for change detection.
///
/// Hash lookups vastly outnumber writes, hence the read/write locks.
#[derive(Debug, Default)]
pub struct ChangeCache {
    /// Last successfully committed content hash per absolute path
    hashes: RwLock<HashMap<PathBuf, String>>,
    /// Paths with a reindex currently in flight
    busy: RwLock<HashSet<PathBuf>>,
    /// Paths with recent events, keyed to their last event time
    pending: RwLock<HashMap<PathBuf, Instant>>,
}

impl ChangeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a filesystem event for a path.
    ///
    /// Repeated events push the timestamp forward, which is what makes
    /// the debounce window coalesce editor write bursts.
    pub async fn note_event(&self, path: impl Into<PathBuf>) {
        self.pending.write().await.insert(path.into(), Instant::now());
    }

    /// Promote pending paths whose last event is older than the debounce
    /// window, removing them from the pending set.
    pub async fn take_ready(&self, debounce: Duration) -> Vec<PathBuf> {
        let now = Instant::now();
        let mut pending = self.pending.write().await;
        let ready: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, last)| now.duration_since(**last) >= debounce)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &ready {
            pending.remove(path);
        }
        ready
    }

    /// Number of paths awaiting promotion.
    pub async fn pending_len(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Try to mark a path busy. Returns `false` when a reindex for the
    /// path is already in flight; the caller must drop the event.
    pub async fn try_begin(&self, path: &Path) -> bool {
        self.busy.write().await.insert(path.to_path_buf())
    }

    /// Clear the busy flag for a path.
    pub async fn finish(&self, path: &Path) {
        self.busy.write().await.remove(path);
    }

    /// Whether the committed hash for a path matches `hash`.
    pub async fn is_unchanged(&self, path: &Path, hash: &str) -> bool {
        self.hashes
            .read()
            .await
            .get(path)
            .map(|h| h == hash)
            .unwrap_or(false)
    }

    /// Record the hash of a successfully committed index pass.
    ///
    /// Must only be called after the store upsert succeeded; a failed
    /// pass leaves the stale hash in place so the next event retries.
    pub async fn commit(&self, path: impl Into<PathBuf>, hash: impl Into<String>) {
        self.hashes.write().await.insert(path.into(), hash.into());
    }

    /// Drop the hash entry for a deleted path, so a later re-creation
    /// with identical bytes is not skipped.
    pub async fn forget(&self, path: &Path) {
        self.hashes.write().await.remove(path);
    }

    /// Seed the hash map after a full index pass, so the live watcher
    /// does not immediately treat every file as changed.
    pub async fn seed(&self, hashes: impl IntoIterator<Item = (PathBuf, String)>) {
        let mut map = self.hashes.write().await;
        for (path, hash) in hashes {
            map.insert(path, hash);
        }
    }

    /// Drop all committed hashes (used by rebuild).
    pub async fn clear_hashes(&self) {
        self.hashes.write().await.clear();
    }

    /// Number of committed hash entries.
    pub async fn tracked_files(&self) -> usize {
        self.hashes.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_stable() {
        let a = content_hash(b"configure database");
        let b = content_hash(b"configure database");
        let c = content_hash(b"configure databases");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_debounce_promotion() {
        let cache = ChangeCache::new();
        let path = PathBuf::from("/space/a.md");

        cache.note_event(&path).await;
        // Inside the quiet window: not promoted
        assert!(cache.take_ready(Duration::from_secs(60)).await.is_empty());
        assert_eq!(cache.pending_len().await, 1);

        // Window elapsed: promoted exactly once
        let ready = cache.take_ready(Duration::ZERO).await;
        assert_eq!(ready, vec![path]);
        assert_eq!(cache.pending_len().await, 0);
        assert!(cache.take_ready(Duration::ZERO).await.is_empty());
    }

    #[tokio::test]
    async fn test_rapid_events_coalesce() {
        let cache = ChangeCache::new();
        let path = PathBuf::from("/space/a.md");

        for _ in 0..10 {
            cache.note_event(&path).await;
        }
        let ready = cache.take_ready(Duration::ZERO).await;
        assert_eq!(ready.len(), 1);
    }

    #[tokio::test]
    async fn test_busy_set_mutual_exclusion() {
        let cache = ChangeCache::new();
        let path = PathBuf::from("/space/a.md");

        assert!(cache.try_begin(&path).await);
        assert!(!cache.try_begin(&path).await);
        cache.finish(&path).await;
        assert!(cache.try_begin(&path).await);
    }

    #[tokio::test]
    async fn test_hash_commit_and_forget() {
        let cache = ChangeCache::new();
        let path = PathBuf::from("/space/a.md");

        assert!(!cache.is_unchanged(&path, "h1").await);
        cache.commit(&path, "h1").await;
        assert!(cache.is_unchanged(&path, "h1").await);
        assert!(!cache.is_unchanged(&path, "h2").await);

        cache.forget(&path).await;
        assert!(!cache.is_unchanged(&path, "h1").await);
    }

    #[tokio::test]
    async fn test_seed_and_clear() {
        let cache = ChangeCache::new();
        cache
            .seed(vec![
                (PathBuf::from("/space/a.md"), "ha".to_string()),
                (PathBuf::from("/space/b.md"), "hb".to_string()),
            ])
            .await;

        assert_eq!(cache.tracked_files().await, 2);
        assert!(cache.is_unchanged(Path::new("/space/b.md"), "hb").await);

        cache.clear_hashes().await;
        assert_eq!(cache.tracked_files().await, 0);
    }
}
