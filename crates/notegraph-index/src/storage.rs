//! Storage adapter for the graph+vector engine.
//!
//! The store is an external collaborator behind the narrow [`GraphStore`]
//! interface: chunk upsert/delete by file, folder indexing, parameterized
//! pattern queries, and nearest-neighbor vector search. Two
//! implementations:
//!
//! - [`CypherStore`] speaks a Cypher-over-HTTP transaction endpoint.
//!   Statements are always parameterized; no caller value is ever
//!   concatenated into statement text.
//! - [`MemoryStore`] is an in-process implementation used by tests and
//!   embedded runs, with cosine-similarity vector search.
//!
//! The store is the sole owner of persisted graph state and the indexing
//! orchestrator is its only writer.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::graph::{
    backlinks_statement, delete_chunks_statement, folder_entries_statement, folder_statements,
    tag_members_statement, upsert_chunk_statements, BacklinkRow, FolderEntryRow, NodeLabel,
    Statement, TagMemberRow,
};
use crate::parser::Chunk;

/// Errors from the storage adapter.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("HTTP error talking to the store: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store rejected the operation: {code}: {message}")]
    Engine { code: String, message: String },

    #[error("Failed to decode store response: {0}")]
    Decode(String),

    #[error("Operation not supported by this store: {0}")]
    Unsupported(&'static str),
}

/// Restriction applied to vector search candidates.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    /// Only chunks carrying this tag
    pub tag: Option<String>,
    /// Only chunks whose folder equals or nests under this path
    pub folder_prefix: Option<String>,
}

impl VectorFilter {
    pub fn none() -> Self {
        Self::default()
    }

    fn matches(&self, chunk: &Chunk) -> bool {
        if let Some(ref tag) = self.tag {
            if !chunk.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        if let Some(ref prefix) = self.folder_prefix {
            if !folder_in_scope(&chunk.folder, prefix) {
                return false;
            }
        }
        true
    }
}

/// Whether `folder` equals `scope` or nests under it.
pub fn folder_in_scope(folder: &str, scope: &str) -> bool {
    let scope = scope.trim_matches('/');
    if scope.is_empty() {
        return true;
    }
    folder == scope || folder.starts_with(&format!("{scope}/"))
}

/// Graph+vector persistence consumed by the indexing and query paths.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Upsert chunks and their edges. Referenced Tag/Folder/Page nodes
    /// are created lazily.
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<(), StorageError>;

    /// Delete every chunk of a file along with its edges. Deleting zero
    /// chunks is success.
    async fn delete_chunks_by_file(&self, file_path: &str) -> Result<(), StorageError>;

    /// Upsert the folder hierarchy and per-folder index pages. Must run
    /// before chunk upserts so `IN_FOLDER`/`CONTAINS` edges resolve.
    async fn index_folders(
        &self,
        folders: &[String],
        index_pages: &HashMap<String, String>,
    ) -> Result<(), StorageError>;

    /// Drop all graph state.
    async fn clear(&self) -> Result<(), StorageError>;

    /// Run a raw parameterized pattern query; rows come back as JSON
    /// objects keyed by column name.
    async fn pattern_query(
        &self,
        query: &str,
        params: serde_json::Map<String, Value>,
    ) -> Result<Vec<Value>, StorageError>;

    /// Nearest-neighbor search over chunk embeddings. Graph edges are
    /// not rehydrated on result chunks.
    async fn vector_search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: VectorFilter,
    ) -> Result<Vec<(Chunk, f32)>, StorageError>;

    /// Chunks linking to a page.
    async fn backlinks(&self, page: &str) -> Result<Vec<BacklinkRow>, StorageError>;

    /// Chunks carrying a tag.
    async fn tag_members(&self, tag: &str) -> Result<Vec<TagMemberRow>, StorageError>;

    /// Sub-folders and pages directly inside a folder.
    async fn folder_entries(&self, folder: &str) -> Result<Vec<FolderEntryRow>, StorageError>;
}

/// Configuration for the Cypher HTTP endpoint.
#[derive(Debug, Clone)]
pub struct CypherConfig {
    /// Engine base URL, e.g. "http://localhost:7474"
    pub url: String,
    /// Database name
    pub database: String,
    /// Basic-auth credentials (optional for unsecured local engines)
    pub username: Option<String>,
    pub password: Option<String>,
    /// Name of the vector index over chunk embeddings
    pub vector_index: String,
}

impl Default for CypherConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7474".to_string(),
            database: "neo4j".to_string(),
            username: None,
            password: None,
            vector_index: "chunk_embeddings".to_string(),
        }
    }
}

#[derive(serde::Serialize)]
struct TxRequest {
    statements: Vec<Statement>,
}

#[derive(Deserialize)]
struct TxResponse {
    #[serde(default)]
    results: Vec<TxResult>,
    #[serde(default)]
    errors: Vec<TxError>,
}

#[derive(Deserialize)]
struct TxResult {
    columns: Vec<String>,
    data: Vec<TxRow>,
}

#[derive(Deserialize)]
struct TxRow {
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct TxError {
    code: String,
    message: String,
}

/// Store client for a Cypher-speaking graph+vector engine.
pub struct CypherStore {
    client: reqwest::Client,
    config: CypherConfig,
}

impl CypherStore {
    pub fn new(config: CypherConfig) -> Self {
        info!("Using Cypher store at {}", config.url);
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn run(&self, statements: Vec<Statement>) -> Result<Vec<TxResult>, StorageError> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Running {} statements", statements.len());

        let url = format!(
            "{}/db/{}/tx/commit",
            self.config.url.trim_end_matches('/'),
            self.config.database
        );
        let mut request = self.client.post(&url).json(&TxRequest { statements });
        if let Some(ref user) = self.config.username {
            request = request.basic_auth(user, self.config.password.as_deref());
        }

        let response: TxResponse = request.send().await?.json().await?;
        if let Some(error) = response.errors.into_iter().next() {
            return Err(StorageError::Engine {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.results)
    }

    fn row_chunk(row: &[Value]) -> Result<(Chunk, f32), StorageError> {
        let get_str = |i: usize| -> String {
            row.get(i)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let tags = row
            .get(6)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let score = row
            .get(7)
            .and_then(Value::as_f64)
            .ok_or_else(|| StorageError::Decode("missing similarity score".to_string()))?
            as f32;

        Ok((
            Chunk {
                id: get_str(0),
                file_path: get_str(1),
                page: get_str(2),
                header: get_str(3),
                content: get_str(4),
                links: Vec::new(),
                embeds: Vec::new(),
                tags,
                folder: get_str(5),
                frontmatter: HashMap::new(),
                attributes: HashMap::new(),
                data_blocks: Vec::new(),
                embedding: None,
            },
            score,
        ))
    }
}

#[async_trait]
impl GraphStore for CypherStore {
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<(), StorageError> {
        let statements: Vec<Statement> =
            chunks.iter().flat_map(upsert_chunk_statements).collect();
        self.run(statements).await?;
        Ok(())
    }

    async fn delete_chunks_by_file(&self, file_path: &str) -> Result<(), StorageError> {
        self.run(vec![delete_chunks_statement(file_path)]).await?;
        Ok(())
    }

    async fn index_folders(
        &self,
        folders: &[String],
        index_pages: &HashMap<String, String>,
    ) -> Result<(), StorageError> {
        self.run(folder_statements(folders, index_pages)).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.run(vec![Statement::new("MATCH (n) DETACH DELETE n")])
            .await?;
        Ok(())
    }

    async fn pattern_query(
        &self,
        query: &str,
        params: serde_json::Map<String, Value>,
    ) -> Result<Vec<Value>, StorageError> {
        let statement = Statement {
            statement: query.to_string(),
            parameters: params,
        };
        let results = self.run(vec![statement]).await?;

        let mut rows = Vec::new();
        for result in results {
            for data in result.data {
                let mut object = serde_json::Map::new();
                for (column, value) in result.columns.iter().zip(data.row.into_iter()) {
                    object.insert(column.clone(), value);
                }
                rows.push(Value::Object(object));
            }
        }
        Ok(rows)
    }

    async fn vector_search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: VectorFilter,
    ) -> Result<Vec<(Chunk, f32)>, StorageError> {
        // Engines guarantee MERGE atomicity per logical node; the filter
        // parameters are null when unrestricted.
        let statement = Statement::new(
            "CALL db.index.vector.queryNodes($index, $limit, $vector) \
             YIELD node, score \
             WHERE ($tag IS NULL OR $tag IN node.tags) \
               AND ($folder IS NULL OR node.folder = $folder \
                    OR node.folder STARTS WITH $folder_slash) \
             RETURN node.id, node.file_path, node.page, node.header, \
                    node.content, node.folder, node.tags, score \
             ORDER BY score DESC",
        )
        .param("index", self.config.vector_index.clone())
        .param("limit", limit as u64)
        .param("vector", serde_json::to_value(vector).unwrap_or_default())
        .param("tag", filter.tag.clone().map(Value::from).unwrap_or(Value::Null))
        .param(
            "folder",
            filter
                .folder_prefix
                .clone()
                .map(|f| Value::from(f.trim_matches('/').to_string()))
                .unwrap_or(Value::Null),
        )
        .param(
            "folder_slash",
            filter
                .folder_prefix
                .map(|f| Value::from(format!("{}/", f.trim_matches('/'))))
                .unwrap_or(Value::Null),
        );

        let results = self.run(vec![statement]).await?;
        let mut hits = Vec::new();
        for result in results {
            for data in result.data {
                hits.push(Self::row_chunk(&data.row)?);
            }
        }
        Ok(hits)
    }

    async fn backlinks(&self, page: &str) -> Result<Vec<BacklinkRow>, StorageError> {
        let results = self.run(vec![backlinks_statement(page)]).await?;
        let mut rows = Vec::new();
        for result in results {
            for data in result.data {
                let get = |i: usize| {
                    data.row
                        .get(i)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                rows.push(BacklinkRow {
                    chunk_id: get(0),
                    page: get(1),
                    header: get(2),
                });
            }
        }
        Ok(rows)
    }

    async fn tag_members(&self, tag: &str) -> Result<Vec<TagMemberRow>, StorageError> {
        let results = self.run(vec![tag_members_statement(tag)]).await?;
        let mut rows = Vec::new();
        for result in results {
            for data in result.data {
                let get = |i: usize| {
                    data.row
                        .get(i)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                rows.push(TagMemberRow {
                    chunk_id: get(0),
                    page: get(1),
                });
            }
        }
        Ok(rows)
    }

    async fn folder_entries(&self, folder: &str) -> Result<Vec<FolderEntryRow>, StorageError> {
        let results = self.run(vec![folder_entries_statement(folder)]).await?;
        let mut rows = Vec::new();
        for result in results {
            for data in result.data {
                for sub in data
                    .row
                    .first()
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_str)
                {
                    rows.push(FolderEntryRow {
                        name: sub.to_string(),
                        label: NodeLabel::Folder,
                    });
                }
                for page in data
                    .row
                    .get(1)
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_str)
                {
                    rows.push(FolderEntryRow {
                        name: page.to_string(),
                        label: NodeLabel::Page,
                    });
                }
            }
        }
        Ok(rows)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    /// Chunks by id
    chunks: HashMap<String, Chunk>,
    /// Lazily created Tag nodes; never pruned (allowed staleness)
    tags: HashSet<String>,
    /// Lazily created Folder nodes; never pruned (allowed staleness)
    folders: HashSet<String>,
    index_pages: HashMap<String, String>,
}

/// In-process store for tests and embedded runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: tokio::sync::RwLock<MemoryInner>,
    write_ops: AtomicUsize,
    ops: std::sync::Mutex<Vec<&'static str>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of upsert/delete calls issued, for idempotence assertions.
    pub fn write_ops(&self) -> usize {
        self.write_ops.load(Ordering::SeqCst)
    }

    /// Ordered log of operations, for sequencing assertions.
    pub fn op_log(&self) -> Vec<&'static str> {
        self.ops.lock().unwrap().clone()
    }

    /// All chunk ids currently stored.
    pub async fn chunk_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.read().await.chunks.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Whether a Tag node exists.
    pub async fn has_tag(&self, tag: &str) -> bool {
        self.inner.read().await.tags.contains(tag)
    }

    /// Whether a Folder node exists.
    pub async fn has_folder(&self, folder: &str) -> bool {
        self.inner.read().await.folders.contains(folder)
    }

    fn log(&self, op: &'static str) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> Result<(), StorageError> {
        self.write_ops.fetch_add(1, Ordering::SeqCst);
        self.log("upsert_chunks");

        let mut inner = self.inner.write().await;
        for chunk in chunks {
            for tag in &chunk.tags {
                inner.tags.insert(tag.clone());
            }
            if !chunk.folder.is_empty() {
                inner.folders.insert(chunk.folder.clone());
            }
            inner.chunks.insert(chunk.id.clone(), chunk.clone());
        }
        Ok(())
    }

    async fn delete_chunks_by_file(&self, file_path: &str) -> Result<(), StorageError> {
        self.write_ops.fetch_add(1, Ordering::SeqCst);
        self.log("delete_chunks_by_file");

        let mut inner = self.inner.write().await;
        // Tag and Folder nodes are deliberately left behind
        inner.chunks.retain(|_, chunk| chunk.file_path != file_path);
        Ok(())
    }

    async fn index_folders(
        &self,
        folders: &[String],
        index_pages: &HashMap<String, String>,
    ) -> Result<(), StorageError> {
        self.write_ops.fetch_add(1, Ordering::SeqCst);
        self.log("index_folders");

        let mut inner = self.inner.write().await;
        for folder in folders {
            inner.folders.insert(folder.clone());
        }
        for (folder, page) in index_pages {
            inner.index_pages.insert(folder.clone(), page.clone());
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.log("clear");
        let mut inner = self.inner.write().await;
        *inner = MemoryInner::default();
        Ok(())
    }

    async fn pattern_query(
        &self,
        _query: &str,
        _params: serde_json::Map<String, Value>,
    ) -> Result<Vec<Value>, StorageError> {
        Err(StorageError::Unsupported(
            "pattern queries require the Cypher engine",
        ))
    }

    async fn vector_search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: VectorFilter,
    ) -> Result<Vec<(Chunk, f32)>, StorageError> {
        let inner = self.inner.read().await;
        let mut hits: Vec<(Chunk, f32)> = inner
            .chunks
            .values()
            .filter(|chunk| filter.matches(chunk))
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_ref()?;
                Some((chunk.clone(), cosine(vector, embedding)))
            })
            .collect();

        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn backlinks(&self, page: &str) -> Result<Vec<BacklinkRow>, StorageError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<BacklinkRow> = inner
            .chunks
            .values()
            .filter(|chunk| chunk.links.iter().any(|l| l == page))
            .map(|chunk| BacklinkRow {
                chunk_id: chunk.id.clone(),
                page: chunk.page.clone(),
                header: chunk.header.clone(),
            })
            .collect();
        rows.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        Ok(rows)
    }

    async fn tag_members(&self, tag: &str) -> Result<Vec<TagMemberRow>, StorageError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<TagMemberRow> = inner
            .chunks
            .values()
            .filter(|chunk| chunk.tags.iter().any(|t| t == tag))
            .map(|chunk| TagMemberRow {
                chunk_id: chunk.id.clone(),
                page: chunk.page.clone(),
            })
            .collect();
        rows.sort_by(|a, b| a.chunk_id.cmp(&b.chunk_id));
        Ok(rows)
    }

    async fn folder_entries(&self, folder: &str) -> Result<Vec<FolderEntryRow>, StorageError> {
        let inner = self.inner.read().await;
        let folder = folder.trim_matches('/');
        let mut rows = Vec::new();

        for sub in &inner.folders {
            if let Some((parent, _)) = sub.rsplit_once('/') {
                if parent == folder {
                    rows.push(FolderEntryRow {
                        name: sub.clone(),
                        label: NodeLabel::Folder,
                    });
                }
            } else if folder.is_empty() {
                rows.push(FolderEntryRow {
                    name: sub.clone(),
                    label: NodeLabel::Folder,
                });
            }
        }

        let mut pages: Vec<String> = inner
            .chunks
            .values()
            .filter(|chunk| chunk.folder == folder)
            .map(|chunk| chunk.page.clone())
            .collect();
        pages.sort();
        pages.dedup();
        for page in pages {
            rows.push(FolderEntryRow {
                name: page,
                label: NodeLabel::Page,
            });
        }

        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, file: &str, folder: &str, tags: &[&str], embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            id: id.to_string(),
            file_path: file.to_string(),
            page: "A".to_string(),
            header: "H".to_string(),
            content: "text".to_string(),
            links: vec![],
            embeds: vec![],
            tags: tags.iter().map(|t| t.to_string()).collect(),
            folder: folder.to_string(),
            frontmatter: HashMap::new(),
            attributes: HashMap::new(),
            data_blocks: vec![],
            embedding,
        }
    }

    #[test]
    fn test_folder_in_scope() {
        assert!(folder_in_scope("Notes", "Notes"));
        assert!(folder_in_scope("Notes/Sub", "Notes"));
        assert!(folder_in_scope("Notes/Sub", "Notes/Sub"));
        assert!(!folder_in_scope("Notebook", "Notes"));
        assert!(!folder_in_scope("Other", "Notes"));
        assert!(folder_in_scope("Anything", ""));
    }

    #[tokio::test]
    async fn test_upsert_and_delete_by_file() {
        let store = MemoryStore::new();
        store
            .upsert_chunks(&[
                chunk("a#1", "/s/a.md", "Notes", &["config"], None),
                chunk("a#2", "/s/a.md", "Notes", &[], None),
                chunk("b#1", "/s/b.md", "Notes", &[], None),
            ])
            .await
            .unwrap();

        store.delete_chunks_by_file("/s/a.md").await.unwrap();
        assert_eq!(store.chunk_ids().await, vec!["b#1"]);

        // Deleting a file with zero chunks is success
        store.delete_chunks_by_file("/s/none.md").await.unwrap();
    }

    #[tokio::test]
    async fn test_tag_and_folder_nodes_survive_deletion() {
        // Allowed staleness: Tag/Folder nodes are never pruned when the
        // last referencing chunk disappears.
        let store = MemoryStore::new();
        store
            .upsert_chunks(&[chunk("a#1", "/s/a.md", "Notes", &["config"], None)])
            .await
            .unwrap();
        store.delete_chunks_by_file("/s/a.md").await.unwrap();

        assert!(store.chunk_ids().await.is_empty());
        assert!(store.has_tag("config").await);
        assert!(store.has_folder("Notes").await);
    }

    #[tokio::test]
    async fn test_vector_search_orders_by_cosine() {
        let store = MemoryStore::new();
        store
            .upsert_chunks(&[
                chunk("a", "/s/a.md", "", &[], Some(vec![1.0, 0.0])),
                chunk("b", "/s/b.md", "", &[], Some(vec![0.7, 0.7])),
                chunk("c", "/s/c.md", "", &[], Some(vec![0.0, 1.0])),
                chunk("d", "/s/d.md", "", &[], None),
            ])
            .await
            .unwrap();

        let hits = store
            .vector_search(&[1.0, 0.0], 2, VectorFilter::none())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.id, "a");
        assert_eq!(hits[1].0.id, "b");
        assert!(hits[0].1 > hits[1].1);
    }

    #[tokio::test]
    async fn test_vector_search_filters() {
        let store = MemoryStore::new();
        store
            .upsert_chunks(&[
                chunk("a", "/s/a.md", "Notes", &["config"], Some(vec![1.0, 0.0])),
                chunk("b", "/s/b.md", "Other", &[], Some(vec![1.0, 0.0])),
            ])
            .await
            .unwrap();

        let by_tag = store
            .vector_search(
                &[1.0, 0.0],
                10,
                VectorFilter {
                    tag: Some("config".to_string()),
                    folder_prefix: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].0.id, "a");

        let by_folder = store
            .vector_search(
                &[1.0, 0.0],
                10,
                VectorFilter {
                    tag: None,
                    folder_prefix: Some("Other".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(by_folder.len(), 1);
        assert_eq!(by_folder[0].0.id, "b");
    }

    #[tokio::test]
    async fn test_typed_rows() {
        let store = MemoryStore::new();
        let mut linked = chunk("a#1", "/s/a.md", "Notes", &["config"], None);
        linked.links = vec!["Beta".to_string()];
        store.upsert_chunks(&[linked]).await.unwrap();

        let backlinks = store.backlinks("Beta").await.unwrap();
        assert_eq!(backlinks.len(), 1);
        assert_eq!(backlinks[0].chunk_id, "a#1");

        let members = store.tag_members("config").await.unwrap();
        assert_eq!(members.len(), 1);

        let entries = store.folder_entries("Notes").await.unwrap();
        assert!(entries
            .iter()
            .any(|e| e.label == NodeLabel::Page && e.name == "A"));
    }

    #[tokio::test]
    async fn test_pattern_query_unsupported_in_memory() {
        let store = MemoryStore::new();
        let err = store
            .pattern_query("MATCH (n) RETURN n", serde_json::Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unsupported(_)));
    }

    #[test]
    fn test_cosine() {
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
