//! Graph schema glue for the markdown knowledge graph.
//!
//! # Architecture
//!
//! - **Page nodes**: one per markdown document, identity = document name
//! - **Chunk nodes**: one per section, regenerated on every reparse
//! - **Tag / Folder nodes**: created lazily on first reference and never
//!   garbage-collected when the last reference disappears
//! - **Edges**: `LINKS_TO`, `EMBEDS`, `TAGGED`, `IN_FOLDER`, `CONTAINS`,
//!   `HAS_INDEX_PAGE`
//!
//! This module also builds the parameterized Cypher statements the
//! [`CypherStore`](crate::storage::CypherStore) issues — values always
//! travel as parameters, never concatenated into statement text — and
//! defines one tagged row type per canned query kind instead of
//! untyped maps.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::parser::Chunk;

/// Node labels used in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeLabel {
    Page,
    Chunk,
    Tag,
    Folder,
}

impl NodeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Page => "Page",
            NodeLabel::Chunk => "Chunk",
            NodeLabel::Tag => "Tag",
            NodeLabel::Folder => "Folder",
        }
    }
}

/// Edge types between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Chunk or page links to another page
    LinksTo,
    /// Chunk transcludes another page
    Embeds,
    /// Chunk or page carries a tag
    Tagged,
    /// Chunk belongs to a folder
    InFolder,
    /// Folder contains a sub-folder or page
    Contains,
    /// Folder has an index page
    HasIndexPage,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::LinksTo => "LINKS_TO",
            EdgeKind::Embeds => "EMBEDS",
            EdgeKind::Tagged => "TAGGED",
            EdgeKind::InFolder => "IN_FOLDER",
            EdgeKind::Contains => "CONTAINS",
            EdgeKind::HasIndexPage => "HAS_INDEX_PAGE",
        }
    }
}

/// One parameterized Cypher statement.
#[derive(Debug, Clone, Serialize)]
pub struct Statement {
    pub statement: String,
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl Statement {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            parameters: serde_json::Map::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }
}

/// Row of a backlinks query: chunks linking to a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklinkRow {
    pub chunk_id: String,
    pub page: String,
    pub header: String,
}

/// Row of a tag-membership query: chunks carrying a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagMemberRow {
    pub chunk_id: String,
    pub page: String,
}

/// Row of a folder-contents query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderEntryRow {
    pub name: String,
    pub label: NodeLabel,
}

/// Statements that replace a file's chunks: a delete followed by one
/// upsert per chunk. `MERGE` keeps concurrent creation of the same
/// logical Tag/Folder node safe on engines with atomic merge.
pub fn upsert_chunk_statements(chunk: &Chunk) -> Vec<Statement> {
    let mut statements = Vec::new();

    statements.push(
        Statement::new(
            "MERGE (p:Page {name: $page}) \
             MERGE (c:Chunk {id: $id}) \
             SET c.file_path = $file_path, c.page = $page, c.header = $header, \
                 c.content = $content, c.folder = $folder, c.tags = $tags, \
                 c.frontmatter = $frontmatter, c.embedding = $embedding \
             MERGE (c)-[:PART_OF]->(p)",
        )
        .param("id", chunk.id.clone())
        .param("file_path", chunk.file_path.clone())
        .param("page", chunk.page.clone())
        .param("header", chunk.header.clone())
        .param("content", chunk.content.clone())
        .param("folder", chunk.folder.clone())
        .param("tags", chunk.tags.clone())
        .param(
            "frontmatter",
            serde_json::to_string(&chunk.frontmatter).unwrap_or_default(),
        )
        .param(
            "embedding",
            match &chunk.embedding {
                Some(vector) => serde_json::to_value(vector).unwrap_or_default(),
                None => serde_json::Value::Null,
            },
        ),
    );

    for target in &chunk.links {
        statements.push(
            Statement::new(
                "MATCH (c:Chunk {id: $id}) MERGE (t:Page {name: $target}) \
                 MERGE (c)-[:LINKS_TO]->(t)",
            )
            .param("id", chunk.id.clone())
            .param("target", target.clone()),
        );
    }

    for target in &chunk.embeds {
        statements.push(
            Statement::new(
                "MATCH (c:Chunk {id: $id}) MERGE (t:Page {name: $target}) \
                 MERGE (c)-[:EMBEDS]->(t)",
            )
            .param("id", chunk.id.clone())
            .param("target", target.clone()),
        );
    }

    for tag in &chunk.tags {
        statements.push(
            Statement::new(
                "MATCH (c:Chunk {id: $id}) MERGE (t:Tag {name: $tag}) \
                 MERGE (c)-[:TAGGED]->(t)",
            )
            .param("id", chunk.id.clone())
            .param("tag", tag.clone()),
        );
    }

    if !chunk.folder.is_empty() {
        statements.push(
            Statement::new(
                "MATCH (c:Chunk {id: $id}) MERGE (f:Folder {path: $folder}) \
                 MERGE (c)-[:IN_FOLDER]->(f)",
            )
            .param("id", chunk.id.clone())
            .param("folder", chunk.folder.clone()),
        );
    }

    statements
}

/// Statement deleting every chunk of a file along with its edges.
pub fn delete_chunks_statement(file_path: &str) -> Statement {
    Statement::new("MATCH (c:Chunk {file_path: $file_path}) DETACH DELETE c")
        .param("file_path", file_path.to_string())
}

/// Statements creating the folder hierarchy.
///
/// Folders are upserted before any chunk so `IN_FOLDER`/`CONTAINS`
/// edges resolve.
pub fn folder_statements(
    folders: &[String],
    index_pages: &HashMap<String, String>,
) -> Vec<Statement> {
    let mut statements = Vec::new();

    for folder in folders {
        statements.push(
            Statement::new("MERGE (f:Folder {path: $path})").param("path", folder.clone()),
        );
        if let Some((parent, _)) = folder.rsplit_once('/') {
            statements.push(
                Statement::new(
                    "MATCH (p:Folder {path: $parent}) MATCH (f:Folder {path: $path}) \
                     MERGE (p)-[:CONTAINS]->(f)",
                )
                .param("parent", parent.to_string())
                .param("path", folder.clone()),
            );
        }
        if let Some(index_page) = index_pages.get(folder) {
            statements.push(
                Statement::new(
                    "MATCH (f:Folder {path: $path}) MERGE (p:Page {name: $page}) \
                     MERGE (f)-[:HAS_INDEX_PAGE]->(p)",
                )
                .param("path", folder.clone())
                .param("page", index_page.clone()),
            );
        }
    }

    statements
}

/// Backlinks query: chunks whose `LINKS_TO` edge targets a page.
pub fn backlinks_statement(page: &str) -> Statement {
    Statement::new(
        "MATCH (c:Chunk)-[:LINKS_TO]->(p:Page {name: $page}) \
         RETURN c.id, c.page, c.header ORDER BY c.id",
    )
    .param("page", page.to_string())
}

/// Tag-membership query.
pub fn tag_members_statement(tag: &str) -> Statement {
    Statement::new(
        "MATCH (c:Chunk)-[:TAGGED]->(t:Tag {name: $tag}) \
         RETURN c.id, c.page ORDER BY c.id",
    )
    .param("tag", tag.to_string())
}

/// Folder-contents query: sub-folders and pages directly inside a folder.
pub fn folder_entries_statement(folder: &str) -> Statement {
    Statement::new(
        "MATCH (f:Folder {path: $folder}) \
         OPTIONAL MATCH (f)-[:CONTAINS]->(sub:Folder) \
         OPTIONAL MATCH (c:Chunk {folder: $folder}) \
         RETURN collect(DISTINCT sub.path), collect(DISTINCT c.page)",
    )
    .param("folder", folder.to_string())
}
