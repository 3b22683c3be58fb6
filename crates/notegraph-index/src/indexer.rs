//! Indexing orchestrator.
//!
//! Coordinates parse → embed → store-upsert → hash-commit as a single
//! logical unit per file, and owns initial/full-rebuild indexing. The
//! steps are not wrapped in a storage transaction; a crash between the
//! delete and the upsert leaves a file temporarily un-indexed, which the
//! next reindex of that file corrects (idempotent delete+reinsert).

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{content_hash, ChangeCache};
use crate::embeddings::EmbeddingProvider;
use crate::parser::{Chunk, MarkdownParser, SpaceConfig};
use crate::search::Bm25Index;
use crate::storage::GraphStore;

/// Configuration for the indexing orchestrator.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Space root directory
    pub root: PathBuf,
    /// Root-relative path of the space configuration document
    pub config_page: String,
    /// Path substrings excluded from indexing
    pub exclude_patterns: Vec<String>,
    /// Whether to request embeddings during indexing
    pub embeddings_enabled: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            config_page: crate::DEFAULT_CONFIG_PAGE.to_string(),
            exclude_patterns: Vec::new(),
            embeddings_enabled: true,
        }
    }
}

/// Statistics about an indexing operation.
#[derive(Debug, Default, Clone)]
pub struct IndexStats {
    /// Number of files processed
    pub files_processed: usize,
    /// Number of files skipped (parse failures, config document)
    pub files_skipped: usize,
    /// Number of chunks created
    pub chunks_created: usize,
    /// Number of embedding batches requested
    pub embedding_batches: usize,
    /// Total time in milliseconds
    pub duration_ms: u64,
}

/// Result of a hash-gated refresh of one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// File was (re)indexed into this many chunks
    Indexed(usize),
    /// File was missing; its chunks were removed
    Removed,
    /// Content hash matched the last committed index; nothing done
    Unchanged,
    /// Another reindex of the same path is in flight; event dropped
    Busy,
}

/// Orchestrates indexing of a markdown space into the store.
pub struct Indexer {
    config: IndexerConfig,
    store: Arc<dyn GraphStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    bm25: Arc<RwLock<Bm25Index>>,
    cache: Arc<ChangeCache>,
    space_config: Arc<RwLock<SpaceConfig>>,
}

impl Indexer {
    pub fn new(
        config: IndexerConfig,
        store: Arc<dyn GraphStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            config,
            store,
            embeddings,
            bm25: Arc::new(RwLock::new(Bm25Index::new())),
            cache: Arc::new(ChangeCache::new()),
            space_config: Arc::new(RwLock::new(SpaceConfig::default())),
        }
    }

    /// The shared change-detection cache.
    pub fn cache(&self) -> &Arc<ChangeCache> {
        &self.cache
    }

    /// The shared BM25 index.
    pub fn bm25(&self) -> &Arc<RwLock<Bm25Index>> {
        &self.bm25
    }

    /// The current space configuration.
    pub fn space_config(&self) -> &Arc<RwLock<SpaceConfig>> {
        &self.space_config
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Exclude patterns from static config plus the space configuration.
    pub async fn effective_excludes(&self) -> Vec<String> {
        let mut patterns = self.config.exclude_patterns.clone();
        patterns.extend(self.space_config.read().await.ignore_patterns.clone());
        patterns
    }

    async fn embeddings_enabled(&self) -> bool {
        self.space_config
            .read()
            .await
            .embeddings
            .unwrap_or(self.config.embeddings_enabled)
    }

    async fn parser(&self) -> MarkdownParser {
        MarkdownParser::new(self.config.root.clone(), self.effective_excludes().await)
    }

    /// Resolve a path and reject anything outside the space root.
    pub fn ensure_in_root(&self, path: &Path) -> Result<PathBuf> {
        let absolute = if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.config.root.join(path))
        };
        anyhow::ensure!(
            absolute.starts_with(&self.config.root),
            "path {} is outside the space root",
            path.display()
        );
        Ok(absolute)
    }

    fn is_config_page(&self, path: &Path) -> bool {
        path == self.config.root.join(&self.config.config_page)
    }

    /// Reindex one file: delete-then-reinsert its chunks.
    ///
    /// A missing file realizes deletion. A parse failure skips the pass
    /// and leaves previously indexed chunks in place until a successful
    /// reparse supersedes them. Returns the new chunk count.
    pub async fn reindex_file(&self, path: &Path) -> Result<usize> {
        let path = self.ensure_in_root(path)?;

        if self.is_config_page(&path) {
            return self.reload_space_config(&path).await.map(|_| 0);
        }

        if !path.exists() {
            self.remove_file(&path).await?;
            return Ok(0);
        }

        let parser = self.parser().await;
        let mut chunks = parser
            .parse_file(&path)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        let file_path = path.to_string_lossy().into_owned();
        self.store
            .delete_chunks_by_file(&file_path)
            .await
            .context("failed to delete existing chunks")?;
        self.bm25.write().await.remove_file(&file_path);

        self.embed_chunks(&mut chunks).await;

        self.store
            .upsert_chunks(&chunks)
            .await
            .context("failed to upsert chunks")?;

        let mut bm25 = self.bm25.write().await;
        for chunk in &chunks {
            bm25.add_chunk(chunk.clone());
        }
        drop(bm25);

        debug!("Indexed {} into {} chunks", path.display(), chunks.len());
        Ok(chunks.len())
    }

    /// Hash-gated refresh of a path, with per-path mutual exclusion.
    ///
    /// This is the entry point both the change detector and external
    /// write notifications go through. The content hash is committed
    /// only after a successful index pass; failures leave the stale hash
    /// in place so the next event retries.
    pub async fn refresh_path(&self, path: &Path) -> Result<RefreshOutcome> {
        let path = self.ensure_in_root(path)?;

        if !self.cache.try_begin(&path).await {
            debug!("Dropping event for busy path {}", path.display());
            return Ok(RefreshOutcome::Busy);
        }
        let outcome = self.refresh_inner(&path).await;
        self.cache.finish(&path).await;
        outcome
    }

    async fn refresh_inner(&self, path: &Path) -> Result<RefreshOutcome> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.remove_file(path).await?;
                return Ok(RefreshOutcome::Removed);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()))
            }
        };

        let hash = content_hash(&bytes);
        if self.cache.is_unchanged(path, &hash).await {
            debug!("Skipping unchanged {}", path.display());
            return Ok(RefreshOutcome::Unchanged);
        }

        let count = self.reindex_file(path).await?;
        self.cache.commit(path, hash).await;
        Ok(RefreshOutcome::Indexed(count))
    }

    /// Index the whole space.
    ///
    /// With `rebuild` the store is cleared first. Folders are upserted
    /// before any chunk so `IN_FOLDER`/`CONTAINS` edges resolve, and the
    /// hash cache is seeded afterwards so the live watcher does not
    /// immediately reprocess every file.
    pub async fn initial_index(&self, rebuild: bool) -> Result<IndexStats> {
        let start = Instant::now();
        info!(
            "Starting {} index of {}",
            if rebuild { "rebuild" } else { "initial" },
            self.config.root.display()
        );
        let mut stats = IndexStats::default();

        if rebuild {
            self.store.clear().await.context("failed to clear store")?;
            self.bm25.write().await.clear();
            self.cache.clear_hashes().await;
        }

        // Space configuration first: it may widen the exclude set
        let config_path = self.config.root.join(&self.config.config_page);
        if config_path.is_file() {
            self.reload_space_config(&config_path).await?;
        }

        let parser = self.parser().await;
        let folders = parser.folder_paths().context("failed to walk folders")?;
        let index_pages = parser
            .folder_index_pages()
            .context("failed to resolve folder index pages")?;
        self.store
            .index_folders(&folders, &index_pages)
            .await
            .context("failed to index folders")?;

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut hashes: Vec<(PathBuf, String)> = Vec::new();

        for file in parser.markdown_files().context("failed to walk space")? {
            if self.is_config_page(&file) {
                stats.files_skipped += 1;
                continue;
            }
            let bytes = match std::fs::read(&file) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!("Skipping unreadable {}: {}", file.display(), e);
                    stats.files_skipped += 1;
                    continue;
                }
            };
            match parser.parse_file(&file) {
                Ok(mut parsed) => {
                    stats.files_processed += 1;
                    hashes.push((file.clone(), content_hash(&bytes)));
                    chunks.append(&mut parsed);
                }
                Err(e) => {
                    debug!("Skipping {}: {}", file.display(), e);
                    stats.files_skipped += 1;
                }
            }
        }

        stats.embedding_batches = self.embed_chunks(&mut chunks).await;
        stats.chunks_created = chunks.len();

        self.store
            .upsert_chunks(&chunks)
            .await
            .context("failed to upsert chunks")?;

        let mut bm25 = self.bm25.write().await;
        for chunk in &chunks {
            bm25.add_chunk(chunk.clone());
        }
        drop(bm25);

        self.cache.seed(hashes).await;

        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!("Indexing complete: {:?}", stats);
        Ok(stats)
    }

    /// Remove a deleted file's chunks from the store and ranker.
    pub async fn remove_file(&self, path: &Path) -> Result<()> {
        let file_path = path.to_string_lossy().into_owned();
        debug!("Removing chunks for {}", file_path);

        // Idempotent: deleting zero chunks is success
        self.store
            .delete_chunks_by_file(&file_path)
            .await
            .context("failed to delete chunks")?;
        self.bm25.write().await.remove_file(&file_path);
        self.cache.forget(path).await;
        Ok(())
    }

    /// Batch-embed chunk contents and attach vectors by position.
    ///
    /// Provider failures are logged and leave the affected chunks
    /// un-embedded; indexing proceeds (keyword search stays fully
    /// functional). Returns the number of successful batches.
    async fn embed_chunks(&self, chunks: &mut [Chunk]) -> usize {
        if chunks.is_empty() || !self.embeddings_enabled().await {
            return 0;
        }

        let batch_size = self.embeddings.max_batch_size().max(1);
        let mut batches = 0;

        for batch in chunks.chunks_mut(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            match self.embeddings.embed_batch(&texts, true).await {
                Ok(vectors) => {
                    for (chunk, vector) in batch.iter_mut().zip(vectors) {
                        chunk.embedding = Some(vector);
                    }
                    batches += 1;
                }
                Err(e) => {
                    warn!(
                        "Embedding batch failed ({} chunks), indexing without vectors: {}",
                        batch.len(),
                        e
                    );
                }
            }
        }
        batches
    }

    async fn reload_space_config(&self, path: &Path) -> Result<()> {
        let parser = MarkdownParser::new(self.config.root.clone(), Vec::new());
        let parsed = parser
            .parse_space_config(path)
            .with_context(|| format!("failed to parse space config {}", path.display()))?;
        info!("Reloaded space configuration from {}", path.display());
        *self.space_config.write().await = parsed;
        Ok(())
    }
}

/// Lexical path normalization: resolves `.` and `..` without touching
/// the filesystem, so missing files can still be validated.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other),
        }
    }
    normalized
}
