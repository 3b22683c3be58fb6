//! Space indexing and hybrid retrieval for notegraph.
//!
//! This crate provides:
//! - Markdown parsing into section chunks with wikilink/tag/folder metadata
//! - Incremental change detection (debounced file watching, content hashing)
//! - Indexing orchestration into a graph+vector store
//! - BM25 keyword search with tag and header boosting
//! - Hybrid search (vector + BM25) via rank fusion
//! - Graph schema glue for pages, chunks, tags, and folders

pub mod cache;
pub mod embeddings;
pub mod fusion;
pub mod graph;
pub mod indexer;
pub mod parser;
pub mod search;
pub mod space;
pub mod storage;
pub mod watcher;

// Re-exports
pub use cache::{content_hash, ChangeCache};
pub use embeddings::{EmbeddingProvider, HttpEmbeddings, HttpEmbeddingsConfig, MockEmbeddings};
pub use fusion::{reciprocal_rank_fusion, weighted_fusion, FusionMethod};
pub use graph::{BacklinkRow, EdgeKind, FolderEntryRow, NodeLabel, TagMemberRow};
pub use indexer::{Indexer, IndexerConfig, IndexStats, RefreshOutcome};
pub use parser::{Chunk, DataBlock, MarkdownParser, ParseError, SpaceConfig};
pub use search::{Bm25Index, SearchConfig, SearchResult};
pub use space::{HybridParams, SpaceIndex};
pub use storage::{CypherConfig, CypherStore, GraphStore, MemoryStore, StorageError, VectorFilter};
pub use watcher::{SpaceEvent, SpaceWatcher, WatchService, WatcherConfig, WatcherError};

/// Default debounce quiet window before a changed file is reprocessed.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Interval at which pending paths are checked for promotion.
pub const PROMOTE_TICK_MS: u64 = 100;

/// Default rank-dampening constant for Reciprocal Rank Fusion.
pub const DEFAULT_RRF_K: usize = 60;

/// Default fusion weight for the semantic (vector) ranking.
pub const DEFAULT_SEMANTIC_WEIGHT: f32 = 0.7;

/// Default fusion weight for the keyword (BM25) ranking.
pub const DEFAULT_KEYWORD_WEIGHT: f32 = 0.3;

/// Page that holds space-level configuration instead of indexable content.
pub const DEFAULT_CONFIG_PAGE: &str = "SETTINGS.md";
