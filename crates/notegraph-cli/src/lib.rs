//! CLI interface for notegraph.
//!
//! Thin surface over [`notegraph_index::SpaceIndex`]: argument parsing,
//! logging setup, store/provider wiring, and plain-text rendering of
//! results. The `RUST_LOG` environment variable controls log filtering.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;

use notegraph_index::{
    CypherConfig, CypherStore, EmbeddingProvider, FusionMethod, GraphStore, HttpEmbeddings,
    HttpEmbeddingsConfig, HybridParams, IndexerConfig, MemoryStore, MockEmbeddings, SearchResult,
    SpaceIndex,
};

/// How long in-flight work may run after a shutdown signal.
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "notegraph", about = "Knowledge-graph indexing and hybrid search for markdown spaces")]
struct Cli {
    /// Space root directory
    #[arg(long, default_value = ".")]
    space: PathBuf,

    /// Storage backend
    #[arg(long, value_enum, default_value_t = StoreKind::Memory)]
    store: StoreKind,

    /// Cypher endpoint URL (with --store cypher)
    #[arg(long, default_value = "http://localhost:7474")]
    store_url: String,

    /// Database name (with --store cypher)
    #[arg(long, default_value = "neo4j")]
    database: String,

    /// OpenAI-compatible embeddings endpoint; omitted = offline provider
    #[arg(long)]
    embeddings_url: Option<String>,

    /// Embedding model name
    #[arg(long, default_value = "text-embedding-3-small")]
    embeddings_model: String,

    /// Embedding vector dimensions
    #[arg(long, default_value_t = 1536)]
    embeddings_dimensions: usize,

    /// Skip embedding generation entirely
    #[arg(long)]
    no_embeddings: bool,

    /// Paths containing these substrings are never indexed
    #[arg(long = "exclude")]
    exclude_patterns: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// In-process store, state lives for the process only
    Memory,
    /// Cypher-speaking graph+vector engine
    Cypher,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SearchMode {
    Keyword,
    Semantic,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FusionKind {
    Rrf,
    Weighted,
}

#[derive(Subcommand)]
enum Command {
    /// Index the whole space
    Index {
        /// Clear the store before indexing
        #[arg(long)]
        rebuild: bool,
    },
    /// Search the space
    Search {
        query: String,

        /// Restrict candidates to a folder subtree
        #[arg(long)]
        scope: Option<String>,

        #[arg(long, default_value_t = 10)]
        limit: usize,

        #[arg(long, value_enum, default_value_t = SearchMode::Hybrid)]
        mode: SearchMode,

        #[arg(long, value_enum, default_value_t = FusionKind::Rrf)]
        fusion: FusionKind,

        #[arg(long, default_value_t = notegraph_index::DEFAULT_SEMANTIC_WEIGHT)]
        semantic_weight: f32,

        #[arg(long, default_value_t = notegraph_index::DEFAULT_KEYWORD_WEIGHT)]
        keyword_weight: f32,
    },
    /// Watch the space and reindex on change
    Watch,
    /// Run a raw parameterized pattern query
    Query {
        cypher: String,

        /// Query parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,
    },
}

/// CLI entry point.
pub async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let space = build_space(&cli)?;

    match cli.command {
        Command::Index { rebuild } => {
            let stats = space.initial_index(rebuild).await?;
            println!(
                "Indexed {} files into {} chunks ({} skipped, {} embedding batches, {}ms)",
                stats.files_processed,
                stats.chunks_created,
                stats.files_skipped,
                stats.embedding_batches,
                stats.duration_ms
            );
        }
        Command::Search {
            ref query,
            ref scope,
            limit,
            mode,
            fusion,
            semantic_weight,
            keyword_weight,
        } => {
            // Keyword statistics are process-local; build them first
            space.initial_index(false).await?;

            let results = match mode {
                SearchMode::Keyword => {
                    space
                        .keyword_search(query, scope.as_deref(), limit)
                        .await?
                }
                SearchMode::Semantic => space.semantic_search(query, limit, None).await?,
                SearchMode::Hybrid => {
                    let mut params = HybridParams::new(query.clone())
                        .with_limit(limit)
                        .with_method(match fusion {
                            FusionKind::Rrf => FusionMethod::Rrf,
                            FusionKind::Weighted => FusionMethod::Weighted,
                        })
                        .with_weights(semantic_weight, keyword_weight);
                    if let Some(scope) = scope.clone() {
                        params = params.with_scope(scope);
                    }
                    space.hybrid_search(params).await?
                }
            };
            print_results(&results, mode);
        }
        Command::Watch => {
            space.initial_index(false).await?;

            let cancel = CancellationToken::new();
            let handle = space.watch(cancel.clone()).await?;
            info!("Watching for changes, Ctrl-C to stop");

            tokio::signal::ctrl_c().await.context("signal handler failed")?;
            cancel.cancel();
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, handle).await;
        }
        Command::Query { ref cypher, ref params } => {
            let params: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(params).context("--params must be a JSON object")?;
            let rows = space.pattern_query(cypher, params).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
    }

    Ok(())
}

fn build_space(cli: &Cli) -> Result<SpaceIndex> {
    let root = cli
        .space
        .canonicalize()
        .with_context(|| format!("space root {} not found", cli.space.display()))?;

    let store: Arc<dyn GraphStore> = match cli.store {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Cypher => Arc::new(CypherStore::new(CypherConfig {
            url: cli.store_url.clone(),
            database: cli.database.clone(),
            username: std::env::var("NOTEGRAPH_STORE_USER").ok(),
            password: std::env::var("NOTEGRAPH_STORE_PASSWORD").ok(),
            ..Default::default()
        })),
    };

    let embeddings: Arc<dyn EmbeddingProvider> = match cli.embeddings_url {
        Some(ref base_url) => Arc::new(HttpEmbeddings::new(HttpEmbeddingsConfig {
            base_url: base_url.clone(),
            api_key: std::env::var("NOTEGRAPH_EMBEDDINGS_API_KEY").ok(),
            model: cli.embeddings_model.clone(),
            dimensions: cli.embeddings_dimensions,
        })),
        None => Arc::new(MockEmbeddings::default()),
    };

    Ok(SpaceIndex::new(
        IndexerConfig {
            root,
            exclude_patterns: cli.exclude_patterns.clone(),
            embeddings_enabled: !cli.no_embeddings,
            ..Default::default()
        },
        store,
        embeddings,
    ))
}

fn print_results(results: &[SearchResult], mode: SearchMode) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for (rank, result) in results.iter().enumerate() {
        let score = match mode {
            SearchMode::Keyword => result.keyword_score,
            SearchMode::Semantic => result.semantic_score,
            SearchMode::Hybrid => result.hybrid_score,
        };
        let snippet: String = result.chunk.content.chars().take(96).collect();
        println!(
            "{:>2}. [{score:.4}] {}  {}",
            rank + 1,
            result.chunk.id,
            snippet.replace('\n', " ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        Cli::try_parse_from(["notegraph", "index", "--rebuild"]).unwrap();
        Cli::try_parse_from([
            "notegraph",
            "--space",
            "/tmp/space",
            "search",
            "configure database",
            "--scope",
            "Notes",
            "--mode",
            "hybrid",
            "--fusion",
            "weighted",
            "--semantic-weight",
            "0.6",
        ])
        .unwrap();
        Cli::try_parse_from(["notegraph", "watch"]).unwrap();
        Cli::try_parse_from([
            "notegraph",
            "query",
            "MATCH (n:Tag) RETURN n.name",
            "--params",
            "{}",
        ])
        .unwrap();
    }

    #[test]
    fn test_cli_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["notegraph", "search", "q", "--mode", "psychic"]).is_err());
    }

    #[test]
    fn test_memory_store_is_default() {
        let cli = Cli::try_parse_from(["notegraph", "index"]).unwrap();
        assert_eq!(cli.store, StoreKind::Memory);
        assert!(!cli.no_embeddings);
    }
}
