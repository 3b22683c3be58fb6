//! End-to-end tests over a real on-disk space.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notegraph_index::{
    IndexerConfig, MemoryStore, MockEmbeddings, RefreshOutcome, SpaceIndex,
};

fn write_file(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

fn space_at(root: &Path) -> (SpaceIndex, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let space = SpaceIndex::new(
        IndexerConfig {
            root: root.to_path_buf(),
            ..Default::default()
        },
        store.clone(),
        Arc::new(MockEmbeddings::default()),
    );
    (space, store)
}

/// The full lifecycle: a tagged section is indexed, found by keyword
/// search, and disappears from results once its file is deleted and the
/// deletion event is processed.
#[tokio::test]
async fn test_index_search_delete_lifecycle() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    let path = write_file(
        &root,
        "Notes/A.md",
        "## Setup\nconfigure database #config\n",
    );
    let (space, store) = space_at(&root);

    space.initial_index(false).await.unwrap();

    let results = space.keyword_search("configure", None, 10).await.unwrap();
    assert_eq!(results.len(), 1);
    let chunk = &results[0].chunk;
    assert_eq!(chunk.id, "Notes/A.md#Setup");
    assert_eq!(chunk.header, "Setup");
    assert!(chunk.tags.contains(&"config".to_string()));

    fs::remove_file(&path).unwrap();
    let outcome = space.reindex_on_write(&path).await.unwrap();
    assert_eq!(outcome, RefreshOutcome::Removed);

    let results = space.keyword_search("configure", None, 10).await.unwrap();
    assert!(results.is_empty());
    assert!(store.chunk_ids().await.is_empty());
}

/// Editing a file replaces its chunk set wholesale; stale section ids
/// never linger in the store.
#[tokio::test]
async fn test_edit_replaces_chunk_set() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    let path = write_file(&root, "A.md", "## Old Section\nfirst draft words\n");
    let (space, store) = space_at(&root);
    space.initial_index(false).await.unwrap();
    assert_eq!(store.chunk_ids().await, vec!["A.md#Old Section"]);

    write_file(&root, "A.md", "## New Section\nsecond draft words\n");
    space.reindex_on_write(&path).await.unwrap();

    assert_eq!(store.chunk_ids().await, vec!["A.md#New Section"]);
    assert!(space
        .keyword_search("first", None, 10)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        space.keyword_search("second", None, 10).await.unwrap().len(),
        1
    );
}

/// The live watcher picks up a write, debounces it, and reindexes.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_watch_reindexes_on_write() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().canonicalize().unwrap();
    let (space, store) = space_at(&root);
    space.initial_index(false).await.unwrap();

    let cancel = tokio_util::sync::CancellationToken::new();
    let handle = space.watch(cancel.clone()).await.unwrap();

    // Give the watcher a moment to arm before writing
    tokio::time::sleep(Duration::from_millis(300)).await;
    write_file(&root, "Live.md", "## Fresh\nwatched content here\n");

    let mut indexed = false;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if !store.chunk_ids().await.is_empty() {
            indexed = true;
            break;
        }
    }
    assert!(indexed, "watcher did not index the new file in time");
    assert_eq!(store.chunk_ids().await, vec!["Live.md#Fresh"]);

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
}
