//! File watcher for automatic re-indexing.
//!
//! Filesystem notifications are consumed by two cooperating loops that
//! communicate through the shared [`ChangeCache`] rather than calling
//! into each other:
//!
//! - the **consumer loop** reads raw notify events from a bounded
//!   channel and records per-path timestamps into the pending set
//! - the **promotion loop** ticks every 100ms and promotes paths whose
//!   last event is older than the debounce window (default 500ms),
//!   coalescing editor write bursts into a single reprocessing
//!
//! Ready paths go through the orchestrator's hash-gated refresh: a busy
//! path drops the event (the hash comparison on a later pass recovers
//! any lost update), an unchanged hash skips processing entirely.
//!
//! Both loops exit promptly when the cancellation token fires; in-flight
//! reindex tasks are allowed to complete.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cache::ChangeCache;
use crate::indexer::{Indexer, RefreshOutcome};
use crate::parser::is_markdown;

/// Errors that can occur in the file watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Failed to create watcher: {0}")]
    CreateError(String),

    #[error("Failed to watch path: {0}")]
    WatchError(String),
}

/// A filtered filesystem event for one markdown file.
///
/// Create, write, and remove all funnel into one variant: the refresh
/// path decides deletion by looking at the filesystem, so a stale event
/// kind cannot misclassify a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceEvent {
    pub path: PathBuf,
}

/// Configuration for the file watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Quiet period after the last event before a path is promoted
    pub debounce: Duration,

    /// Interval at which pending paths are checked for promotion
    pub tick: Duration,

    /// Path substrings excluded from watching (transient artifacts)
    pub exclude_patterns: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(crate::DEFAULT_DEBOUNCE_MS),
            tick: Duration::from_millis(crate::PROMOTE_TICK_MS),
            exclude_patterns: Vec::new(),
        }
    }
}

/// File watcher that monitors a space recursively.
///
/// The recursive watch covers directories created after watch start;
/// hidden directories are filtered out of every event.
pub struct SpaceWatcher {
    config: WatcherConfig,
    root: PathBuf,
    // The watcher needs to be kept alive
    pub(crate) _watcher: Option<RecommendedWatcher>,
}

impl SpaceWatcher {
    /// Create a new watcher for the space root.
    pub fn new(root: PathBuf, config: WatcherConfig) -> Self {
        Self {
            config,
            root,
            _watcher: None,
        }
    }

    /// Start watching and return the raw event channel.
    ///
    /// Events are already filtered to markdown files outside hidden
    /// directories and exclude patterns; debouncing happens downstream
    /// in the promotion loop.
    pub fn start(&mut self) -> Result<mpsc::Receiver<SpaceEvent>, WatcherError> {
        let (tx, rx) = mpsc::channel::<SpaceEvent>(256);
        let root = self.root.clone();
        let exclude = self.config.exclude_patterns.clone();

        let watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                for space_event in Self::convert_event(event, &root, &exclude) {
                    // Best effort send
                    let _ = tx.blocking_send(space_event);
                }
            }
        })
        .map_err(|e| WatcherError::CreateError(e.to_string()))?;

        self._watcher = Some(watcher);

        if let Some(ref mut watcher) = self._watcher {
            watcher
                .watch(&self.root, RecursiveMode::Recursive)
                .map_err(|e| WatcherError::WatchError(e.to_string()))?;
        }

        info!(
            "Watching {} with {:?} debounce",
            self.root.display(),
            self.config.debounce
        );
        Ok(rx)
    }

    /// Stop watching.
    pub fn stop(&mut self) {
        self._watcher = None;
        info!("Stopped watching {}", self.root.display());
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Convert a notify event into filtered space events.
    fn convert_event(event: Event, root: &Path, exclude: &[String]) -> Vec<SpaceEvent> {
        let relevant = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_) | notify::EventKind::Remove(_)
        );
        if !relevant {
            return Vec::new();
        }

        event
            .paths
            .into_iter()
            .filter(|path| Self::should_watch(path, root, exclude))
            .map(|path| SpaceEvent { path })
            .collect()
    }

    /// Whether a path is watchable: a markdown file, not under a hidden
    /// directory, not matching an exclude pattern.
    pub fn should_watch(path: &Path, root: &Path, exclude: &[String]) -> bool {
        if !is_markdown(path) {
            return false;
        }
        if is_hidden(path, root) {
            return false;
        }
        let text = path.to_string_lossy();
        !exclude.iter().any(|pattern| text.contains(pattern.as_str()))
    }
}

/// Whether any component of `path` below `root` is hidden.
fn is_hidden(path: &Path, root: &Path) -> bool {
    let below = path.strip_prefix(root).unwrap_or(path);
    below.components().any(|component| {
        component
            .as_os_str()
            .to_string_lossy()
            .starts_with('.')
    })
}

/// Background service tying the watcher loops to the orchestrator.
pub struct WatchService {
    watcher: SpaceWatcher,
    indexer: Arc<Indexer>,
    cache: Arc<ChangeCache>,
    cancel: CancellationToken,
}

impl WatchService {
    pub fn new(watcher: SpaceWatcher, indexer: Arc<Indexer>, cancel: CancellationToken) -> Self {
        let cache = indexer.cache().clone();
        Self {
            watcher,
            indexer,
            cache,
            cancel,
        }
    }

    /// Run the consumer and promotion loops until cancellation.
    pub async fn run(mut self) -> Result<(), WatcherError> {
        let mut rx = self.watcher.start()?;
        let config = self.watcher.config().clone();

        let consumer_cache = self.cache.clone();
        let consumer_cancel = self.cancel.clone();
        let consumer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = consumer_cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(SpaceEvent { path }) => {
                            debug!("Event for {}", path.display());
                            consumer_cache.note_event(path).await;
                        }
                        None => break,
                    },
                }
            }
        });

        let mut tick = tokio::time::interval(config.tick);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tick.tick() => {
                    for path in self.cache.take_ready(config.debounce).await {
                        self.dispatch(path);
                    }
                }
            }
        }

        consumer.await.ok();
        self.watcher.stop();
        Ok(())
    }

    /// Refresh one ready path on its own task; distinct paths reindex in
    /// parallel, the busy set serializes same-path work.
    fn dispatch(&self, path: PathBuf) {
        let indexer = self.indexer.clone();
        tokio::spawn(async move {
            match indexer.refresh_path(&path).await {
                Ok(RefreshOutcome::Indexed(count)) => {
                    info!("Reindexed {} into {} chunks", path.display(), count);
                }
                Ok(RefreshOutcome::Removed) => {
                    info!("Removed {} from the index", path.display());
                }
                Ok(RefreshOutcome::Unchanged) | Ok(RefreshOutcome::Busy) => {}
                Err(e) => {
                    // Retried on the next detected event; the stale hash
                    // stays in place
                    error!("Failed to refresh {}: {:#}", path.display(), e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watcher_config_default() {
        let config = WatcherConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.tick, Duration::from_millis(100));
        assert!(config.exclude_patterns.is_empty());
    }

    #[test]
    fn test_should_watch_filters() {
        let root = Path::new("/space");
        let exclude = vec!["_proposals".to_string()];

        assert!(SpaceWatcher::should_watch(
            Path::new("/space/Notes/A.md"),
            root,
            &exclude
        ));
        // Non-markdown
        assert!(!SpaceWatcher::should_watch(
            Path::new("/space/Notes/a.txt"),
            root,
            &exclude
        ));
        // Hidden directory
        assert!(!SpaceWatcher::should_watch(
            Path::new("/space/.git/a.md"),
            root,
            &exclude
        ));
        // Excluded pattern
        assert!(!SpaceWatcher::should_watch(
            Path::new("/space/_proposals/a.md"),
            root,
            &exclude
        ));
    }

    #[test]
    fn test_hidden_check_ignores_hidden_root() {
        // A hidden ancestor of the root itself does not disqualify paths
        let root = Path::new("/home/user/.spaces/main");
        assert!(!is_hidden(Path::new("/home/user/.spaces/main/A.md"), root));
        assert!(is_hidden(
            Path::new("/home/user/.spaces/main/.trash/A.md"),
            root
        ));
    }

    #[test]
    fn test_convert_event_filters_paths() {
        let root = PathBuf::from("/space");
        let event = Event {
            kind: notify::EventKind::Modify(notify::event::ModifyKind::Any),
            paths: vec![
                PathBuf::from("/space/A.md"),
                PathBuf::from("/space/skip.txt"),
                PathBuf::from("/space/.hidden/B.md"),
            ],
            attrs: Default::default(),
        };

        let events = SpaceWatcher::convert_event(event, &root, &[]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path, PathBuf::from("/space/A.md"));
    }

    #[test]
    fn test_convert_event_drops_access_events() {
        let root = PathBuf::from("/space");
        let event = Event {
            kind: notify::EventKind::Access(notify::event::AccessKind::Any),
            paths: vec![PathBuf::from("/space/A.md")],
            attrs: Default::default(),
        };

        assert!(SpaceWatcher::convert_event(event, &root, &[]).is_empty());
    }

    #[tokio::test]
    async fn test_watcher_start_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = SpaceWatcher::new(dir.path().to_path_buf(), WatcherConfig::default());

        let _rx = watcher.start().unwrap();
        assert!(watcher._watcher.is_some());

        watcher.stop();
        assert!(watcher._watcher.is_none());
    }
}
