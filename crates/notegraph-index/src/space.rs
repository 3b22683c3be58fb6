//! Unified index over one markdown space.
//!
//! [`SpaceIndex`] ties the orchestrator, the BM25 ranker, the store, and
//! the embedding provider together behind the surface the protocol
//! servers call: reindex-on-write, keyword / semantic / hybrid search,
//! the raw pattern-query passthrough, and the watch loops.
//!
//! Query input is validated before anything reaches the store: scopes
//! may not traverse outside the space, weights must be finite and
//! non-negative, limits positive. All store access is parameterized.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::embeddings::EmbeddingProvider;
use crate::fusion::{fuse, FusionMethod};
use crate::graph::{BacklinkRow, FolderEntryRow, TagMemberRow};
use crate::indexer::{IndexStats, Indexer, IndexerConfig, RefreshOutcome};
use crate::search::{SearchConfig, SearchResult};
use crate::storage::{GraphStore, VectorFilter};
use crate::watcher::{SpaceWatcher, WatchService, WatcherConfig};
use crate::{DEFAULT_KEYWORD_WEIGHT, DEFAULT_SEMANTIC_WEIGHT};

/// Parameters for a hybrid search request.
#[derive(Debug, Clone)]
pub struct HybridParams {
    pub query: String,
    pub scope: Option<String>,
    pub limit: usize,
    pub method: FusionMethod,
    pub semantic_weight: f32,
    pub keyword_weight: f32,
}

impl HybridParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            scope: None,
            limit: 10,
            method: FusionMethod::Rrf,
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_method(mut self, method: FusionMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_weights(mut self, semantic: f32, keyword: f32) -> Self {
        self.semantic_weight = semantic;
        self.keyword_weight = keyword;
        self
    }
}

/// Unified index API for one space.
pub struct SpaceIndex {
    indexer: Arc<Indexer>,
    store: Arc<dyn GraphStore>,
    embeddings: Arc<dyn EmbeddingProvider>,
    search_config: SearchConfig,
}

impl SpaceIndex {
    pub fn new(
        config: IndexerConfig,
        store: Arc<dyn GraphStore>,
        embeddings: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let indexer = Arc::new(Indexer::new(config, store.clone(), embeddings.clone()));
        Self {
            indexer,
            store,
            embeddings,
            search_config: SearchConfig::default(),
        }
    }

    pub fn with_search_config(mut self, search_config: SearchConfig) -> Self {
        self.search_config = search_config;
        self
    }

    pub fn indexer(&self) -> &Arc<Indexer> {
        &self.indexer
    }

    /// Index the whole space, optionally clearing the store first.
    pub async fn initial_index(&self, rebuild: bool) -> Result<IndexStats> {
        self.indexer.initial_index(rebuild).await
    }

    /// Entry point for external write notifications (editor saves).
    pub async fn reindex_on_write(&self, path: &Path) -> Result<RefreshOutcome> {
        self.indexer.refresh_path(path).await
    }

    /// BM25 keyword search with structural boosts.
    pub async fn keyword_search(
        &self,
        query: &str,
        scope: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        validate_limit(limit)?;
        let scope = validate_scope(scope)?;

        Ok(self
            .indexer
            .bm25()
            .read()
            .await
            .search(query, scope, limit, &self.search_config))
    }

    /// Vector similarity search, delegated to the store's ANN index.
    pub async fn semantic_search(
        &self,
        query: &str,
        limit: usize,
        tag: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        validate_limit(limit)?;

        let vector = self
            .embeddings
            .embed(query)
            .await
            .context("failed to embed query")?;
        let filter = VectorFilter {
            tag: tag.map(str::to_string),
            folder_prefix: None,
        };

        let hits = self
            .store
            .vector_search(&vector, limit, filter)
            .await
            .context("vector search failed")?;
        Ok(hits
            .into_iter()
            .map(|(chunk, score)| SearchResult::from_semantic(chunk, score))
            .collect())
    }

    /// Hybrid search: keyword and vector rankings fused into one list.
    ///
    /// The two searches run independently, each producing its own top-K
    /// on its own score scale. A failing embedding provider degrades to
    /// keyword-only results rather than failing the request.
    pub async fn hybrid_search(&self, params: HybridParams) -> Result<Vec<SearchResult>> {
        validate_limit(params.limit)?;
        validate_weight("semantic_weight", params.semantic_weight)?;
        validate_weight("keyword_weight", params.keyword_weight)?;
        let scope = validate_scope(params.scope.as_deref())?;

        let keyword = self
            .indexer
            .bm25()
            .read()
            .await
            .search(&params.query, scope, params.limit, &self.search_config);

        let semantic = match self.embeddings.embed(&params.query).await {
            Ok(vector) => {
                let filter = VectorFilter {
                    tag: None,
                    folder_prefix: scope.map(str::to_string),
                };
                self.store
                    .vector_search(&vector, params.limit, filter)
                    .await
                    .context("vector search failed")?
                    .into_iter()
                    .map(|(chunk, score)| SearchResult::from_semantic(chunk, score))
                    .collect()
            }
            Err(e) => {
                warn!("Query embedding failed, degrading to keyword only: {}", e);
                Vec::new()
            }
        };

        Ok(fuse(
            params.method,
            keyword,
            semantic,
            params.semantic_weight,
            params.keyword_weight,
            params.limit,
        ))
    }

    /// Raw parameterized pattern-query passthrough.
    pub async fn pattern_query(
        &self,
        query: &str,
        params: serde_json::Map<String, Value>,
    ) -> Result<Vec<Value>> {
        self.store
            .pattern_query(query, params)
            .await
            .context("pattern query failed")
    }

    /// Chunks linking to a page.
    pub async fn backlinks(&self, page: &str) -> Result<Vec<BacklinkRow>> {
        self.store
            .backlinks(page)
            .await
            .context("backlinks query failed")
    }

    /// Chunks carrying a tag.
    pub async fn tag_members(&self, tag: &str) -> Result<Vec<TagMemberRow>> {
        self.store
            .tag_members(tag)
            .await
            .context("tag query failed")
    }

    /// Sub-folders and pages directly inside a folder.
    pub async fn folder_entries(&self, folder: &str) -> Result<Vec<FolderEntryRow>> {
        self.store
            .folder_entries(folder)
            .await
            .context("folder query failed")
    }

    /// Spawn the watch loops; they run until the token is cancelled.
    pub async fn watch(
        &self,
        cancel: CancellationToken,
    ) -> Result<tokio::task::JoinHandle<()>> {
        let config = WatcherConfig {
            exclude_patterns: self.indexer.effective_excludes().await,
            ..Default::default()
        };
        let watcher = SpaceWatcher::new(self.indexer.config().root.clone(), config);
        let service = WatchService::new(watcher, self.indexer.clone(), cancel);

        Ok(tokio::spawn(async move {
            if let Err(e) = service.run().await {
                warn!("Watch service stopped: {}", e);
            }
        }))
    }
}

fn validate_limit(limit: usize) -> Result<()> {
    anyhow::ensure!(limit > 0, "limit must be positive");
    Ok(())
}

fn validate_weight(name: &str, weight: f32) -> Result<()> {
    anyhow::ensure!(
        weight.is_finite() && weight >= 0.0,
        "{name} must be a finite non-negative number, got {weight}"
    );
    Ok(())
}

/// Scopes are folder paths relative to the space root; anything that
/// could traverse outside it is rejected before reaching the store.
fn validate_scope(scope: Option<&str>) -> Result<Option<&str>> {
    let Some(scope) = scope else {
        return Ok(None);
    };
    anyhow::ensure!(
        !scope.starts_with('/') && !scope.contains("..") && !scope.contains('\\'),
        "malformed scope {scope:?}: must be a relative folder path"
    );
    Ok(Some(scope))
}
