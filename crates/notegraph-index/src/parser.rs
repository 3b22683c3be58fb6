//! Markdown parsing into section chunks.
//!
//! This module turns one markdown file into an ordered sequence of
//! [`Chunk`] records plus the space-level metadata the graph schema
//! needs: folder hierarchy, per-folder index pages, and the space
//! configuration document.
//!
//! A chunk corresponds to one ATX-header section. Text before the first
//! header becomes a preamble chunk with an empty header. Chunk ids are
//! derived from the root-relative file path and the header text, so a
//! reparse of the same file regenerates the same ids.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while parsing markdown or walking the space.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid frontmatter in {path}: {source}")]
    Frontmatter {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Path {0} is outside the space root")]
    OutsideRoot(PathBuf),
}

/// A tagged fenced data block embedded in a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBlock {
    /// Tag naming the block kind (the fence info string without `#`)
    pub tag: String,
    /// Raw block body
    pub body: String,
}

/// The atomic retrievable unit: one section of one markdown document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier, unique within the store: `"{rel_path}#{header}"`,
    /// uniquified with `@{n}` when a file repeats a header
    pub id: String,

    /// Absolute path of the source file
    pub file_path: String,

    /// Document name (file stem)
    pub page: String,

    /// Section header text; empty for the preamble chunk
    pub header: String,

    /// Section body text
    pub content: String,

    /// Ordered outbound wikilink targets
    pub links: Vec<String>,

    /// Transclusion targets (`![[...]]`)
    pub embeds: Vec<String>,

    /// Tags from hashtags and frontmatter, deduplicated, sorted
    pub tags: Vec<String>,

    /// Folder path relative to the space root; empty at the root
    pub folder: String,

    /// Parsed frontmatter key/value map
    pub frontmatter: HashMap<String, serde_json::Value>,

    /// Inline `[key:: value]` attributes
    pub attributes: HashMap<String, String>,

    /// Tagged fenced data blocks
    pub data_blocks: Vec<DataBlock>,

    /// Embedding vector, attached by the orchestrator when enabled
    pub embedding: Option<Vec<f32>>,
}

/// Space-level configuration parsed from the configuration document.
///
/// The configuration document never becomes chunks; it is routed to this
/// parsing path instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceConfig {
    /// Path substrings excluded from watching and indexing
    pub ignore_patterns: Vec<String>,

    /// Overrides whether embeddings are generated during indexing
    pub embeddings: Option<bool>,
}

static WIKILINK_RE: Lazy<Regex> = Lazy::new(|| {
    // `[[Target]]`, `[[Target|alias]]`, `[[Target#Section]]`; a leading `!`
    // marks a transclusion.
    Regex::new(r"(!)?\[\[([^\]\|#]+)(?:#[^\]\|]*)?(?:\|[^\]]*)?\]\]").unwrap()
});

static HASHTAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[\s(])#([A-Za-z][\w/-]*)").unwrap());

static ATTRIBUTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\w[\w-]*)::\s*([^\]]+)\]").unwrap());

static HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*$").unwrap());

/// Parses markdown files into chunks and extracts space metadata.
#[derive(Debug, Clone)]
pub struct MarkdownParser {
    root: PathBuf,
    exclude_patterns: Vec<String>,
}

impl MarkdownParser {
    /// Create a parser rooted at the space directory.
    pub fn new(root: impl Into<PathBuf>, exclude_patterns: Vec<String>) -> Self {
        Self {
            root: root.into(),
            exclude_patterns,
        }
    }

    /// The space root this parser is bound to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parse one markdown file into its ordered chunk sequence.
    pub fn parse_file(&self, path: &Path) -> Result<Vec<Chunk>, ParseError> {
        let text = fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let rel = self.relative(path)?;

        Ok(self.parse_text(path, &rel, &text))
    }

    /// Parse every markdown file under the root.
    ///
    /// Files matching an exclude pattern are skipped, as is anything under
    /// a hidden directory. Unreadable or malformed files are skipped with a
    /// debug log so one bad file cannot fail a full index pass.
    pub fn parse_space(&self) -> Result<Vec<Chunk>, ParseError> {
        let mut chunks = Vec::new();
        for path in self.markdown_files()? {
            match self.parse_file(&path) {
                Ok(mut parsed) => chunks.append(&mut parsed),
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }
        Ok(chunks)
    }

    /// All markdown files under the root, excludes applied.
    pub fn markdown_files(&self) -> Result<Vec<PathBuf>, ParseError> {
        let mut files = Vec::new();
        let walker = space_walker(&self.root);

        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() || !is_markdown(path) {
                continue;
            }
            let text = path.to_string_lossy();
            if self.exclude_patterns.iter().any(|p| text.contains(p.as_str())) {
                continue;
            }
            files.push(path.to_path_buf());
        }

        files.sort();
        Ok(files)
    }

    /// Folder paths (relative, `/`-separated) under the root, hidden
    /// directories skipped. The root itself is not included.
    pub fn folder_paths(&self) -> Result<Vec<String>, ParseError> {
        let mut folders = Vec::new();
        let walker = space_walker(&self.root);

        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_dir() || path == self.root {
                continue;
            }
            folders.push(self.relative(path)?);
        }

        folders.sort();
        Ok(folders)
    }

    /// Map of folder path to its index page, for folders that have one.
    ///
    /// A folder's index page is a page named after the folder itself
    /// (`Projects/Projects.md`) or, failing that, `index.md`.
    pub fn folder_index_pages(&self) -> Result<HashMap<String, String>, ParseError> {
        let mut pages = HashMap::new();

        for folder in self.folder_paths()? {
            let name = folder.rsplit('/').next().unwrap_or(&folder);
            let by_name = self.root.join(&folder).join(format!("{name}.md"));
            let by_index = self.root.join(&folder).join("index.md");

            if by_name.is_file() {
                pages.insert(folder.clone(), format!("{folder}/{name}"));
            } else if by_index.is_file() {
                pages.insert(folder.clone(), format!("{folder}/index"));
            }
        }

        Ok(pages)
    }

    /// Parse the space configuration document.
    ///
    /// Configuration lives in the document's frontmatter; a document with
    /// no frontmatter yields the default configuration.
    pub fn parse_space_config(&self, path: &Path) -> Result<SpaceConfig, ParseError> {
        let text = fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let (frontmatter, _) = split_frontmatter(&text);
        match frontmatter {
            Some(raw) => {
                serde_yaml::from_str(raw).map_err(|source| ParseError::Frontmatter {
                    path: path.to_path_buf(),
                    source,
                })
            }
            None => Ok(SpaceConfig::default()),
        }
    }

    /// Root-relative, `/`-separated form of a path.
    pub fn relative(&self, path: &Path) -> Result<String, ParseError> {
        let rel = path
            .strip_prefix(&self.root)
            .map_err(|_| ParseError::OutsideRoot(path.to_path_buf()))?;
        Ok(rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"))
    }

    fn parse_text(&self, path: &Path, rel: &str, text: &str) -> Vec<Chunk> {
        let (frontmatter_raw, body) = split_frontmatter(text);
        let frontmatter = frontmatter_raw
            .and_then(|raw| serde_yaml::from_str::<serde_yaml::Value>(raw).ok())
            .and_then(yaml_to_map)
            .unwrap_or_default();

        let file_tags = frontmatter_tags(&frontmatter);

        let page = Path::new(rel)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let folder = match rel.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => String::new(),
        };

        let mut chunks = Vec::new();
        let mut seen_ids: HashMap<String, usize> = HashMap::new();

        for (header, section) in split_sections(body) {
            if header.is_empty() && section.trim().is_empty() {
                continue;
            }

            let base_id = if header.is_empty() {
                rel.to_string()
            } else {
                format!("{rel}#{header}")
            };
            let ordinal = seen_ids.entry(base_id.clone()).or_insert(0);
            *ordinal += 1;
            let id = if *ordinal == 1 {
                base_id
            } else {
                format!("{base_id}@{ordinal}")
            };

            let (links, embeds) = extract_links(&section);
            let mut tags = extract_hashtags(&section);
            tags.extend(file_tags.iter().cloned());
            tags.sort();
            tags.dedup();

            chunks.push(Chunk {
                id,
                file_path: path.to_string_lossy().into_owned(),
                page: page.clone(),
                header,
                content: section.trim().to_string(),
                links,
                embeds,
                tags,
                folder: folder.clone(),
                frontmatter: frontmatter.clone(),
                attributes: extract_attributes(&section),
                data_blocks: extract_data_blocks(&section),
                embedding: None,
            });
        }

        chunks
    }
}

/// Walker over a space: hidden directories are skipped, but gitignore
/// semantics are not applied — a space living inside a git repository
/// still indexes every markdown file.
fn space_walker(root: &Path) -> ignore::Walk {
    WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build()
}

/// Whether a path names a markdown file.
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}

/// Split `---`-delimited YAML frontmatter from the document body.
fn split_frontmatter(text: &str) -> (Option<&str>, &str) {
    let rest = match text.strip_prefix("---\n") {
        Some(rest) => rest,
        None => return (None, text),
    };
    match rest.split_once("\n---") {
        Some((fm, body)) => {
            let body = body.strip_prefix('\n').unwrap_or(body);
            (Some(fm), body)
        }
        None => (None, text),
    }
}

/// Split a body into `(header, section)` pairs on ATX headers.
fn split_sections(body: &str) -> Vec<(String, String)> {
    let mut sections = Vec::new();
    let mut header = String::new();
    let mut current = String::new();
    let mut in_fence = false;

    for line in body.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        if !in_fence {
            if let Some(caps) = HEADER_RE.captures(line) {
                sections.push((header, current));
                header = caps[2].to_string();
                current = String::new();
                continue;
            }
        }
        current.push_str(line);
        current.push('\n');
    }
    sections.push((header, current));
    sections
}

/// Extract wikilink and transclusion targets in document order.
fn extract_links(section: &str) -> (Vec<String>, Vec<String>) {
    let mut links = Vec::new();
    let mut embeds = Vec::new();
    for caps in WIKILINK_RE.captures_iter(section) {
        let target = caps[2].trim().to_string();
        if caps.get(1).is_some() {
            embeds.push(target);
        } else {
            links.push(target);
        }
    }
    (links, embeds)
}

fn extract_hashtags(section: &str) -> Vec<String> {
    HASHTAG_RE
        .captures_iter(section)
        .map(|c| c[1].to_string())
        .collect()
}

fn extract_attributes(section: &str) -> HashMap<String, String> {
    ATTRIBUTE_RE
        .captures_iter(section)
        .map(|c| (c[1].to_string(), c[2].trim().to_string()))
        .collect()
}

/// Fenced blocks whose info string starts with `#` are tagged data blocks.
fn extract_data_blocks(section: &str) -> Vec<DataBlock> {
    let mut blocks = Vec::new();
    let mut tag: Option<String> = None;
    let mut body = String::new();

    for line in section.lines() {
        let trimmed = line.trim_start();
        if let Some(info) = trimmed.strip_prefix("```") {
            match tag.take() {
                Some(t) => {
                    blocks.push(DataBlock {
                        tag: t,
                        body: body.trim_end().to_string(),
                    });
                    body.clear();
                }
                None => {
                    if let Some(name) = info.trim().strip_prefix('#') {
                        tag = Some(name.to_string());
                    }
                }
            }
            continue;
        }
        if tag.is_some() {
            body.push_str(line);
            body.push('\n');
        }
    }
    blocks
}

fn yaml_to_map(value: serde_yaml::Value) -> Option<HashMap<String, serde_json::Value>> {
    let json = serde_json::to_value(&value).ok()?;
    match json {
        serde_json::Value::Object(map) => Some(map.into_iter().collect()),
        _ => None,
    }
}

fn frontmatter_tags(frontmatter: &HashMap<String, serde_json::Value>) -> Vec<String> {
    match frontmatter.get("tags") {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim_start_matches('#').to_string())
            .collect(),
        Some(serde_json::Value::String(s)) => s
            .split(',')
            .map(|t| t.trim().trim_start_matches('#').to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_sections_and_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let parser = MarkdownParser::new(tmp.path(), vec![]);
        let path = write_file(
            tmp.path(),
            "Notes/A.md",
            "intro text\n\n## Setup\nconfigure database\n\n## Usage\nrun it\n",
        );

        let chunks = parser.parse_file(&path).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].id, "Notes/A.md");
        assert_eq!(chunks[0].header, "");
        assert_eq!(chunks[1].id, "Notes/A.md#Setup");
        assert_eq!(chunks[1].content, "configure database");
        assert_eq!(chunks[2].id, "Notes/A.md#Usage");
        assert_eq!(chunks[2].page, "A");
        assert_eq!(chunks[2].folder, "Notes");
    }

    #[test]
    fn test_duplicate_headers_get_ordinals() {
        let tmp = tempfile::tempdir().unwrap();
        let parser = MarkdownParser::new(tmp.path(), vec![]);
        let path = write_file(tmp.path(), "B.md", "## Log\none\n\n## Log\ntwo\n");

        let chunks = parser.parse_file(&path).unwrap();
        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["B.md#Log", "B.md#Log@2"]);
    }

    #[test]
    fn test_wikilinks_and_embeds_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let parser = MarkdownParser::new(tmp.path(), vec![]);
        let path = write_file(
            tmp.path(),
            "C.md",
            "see [[Beta|the beta page]] and [[Alpha#Intro]], also ![[Diagram]]\n",
        );

        let chunks = parser.parse_file(&path).unwrap();
        assert_eq!(chunks[0].links, vec!["Beta", "Alpha"]);
        assert_eq!(chunks[0].embeds, vec!["Diagram"]);
    }

    #[test]
    fn test_tags_from_hashtags_and_frontmatter() {
        let tmp = tempfile::tempdir().unwrap();
        let parser = MarkdownParser::new(tmp.path(), vec![]);
        let path = write_file(
            tmp.path(),
            "D.md",
            "---\ntags:\n  - project\n  - config\n---\nbody with #urgent marker\n",
        );

        let chunks = parser.parse_file(&path).unwrap();
        assert_eq!(chunks[0].tags, vec!["config", "project", "urgent"]);
        assert!(chunks[0].frontmatter.contains_key("tags"));
    }

    #[test]
    fn test_inline_attributes_and_data_blocks() {
        let tmp = tempfile::tempdir().unwrap();
        let parser = MarkdownParser::new(tmp.path(), vec![]);
        let path = write_file(
            tmp.path(),
            "E.md",
            "## Data\n[status:: active]\n```#inventory\nitem: bolt\n```\n",
        );

        let chunks = parser.parse_file(&path).unwrap();
        assert_eq!(chunks[0].attributes.get("status").unwrap(), "active");
        assert_eq!(chunks[0].data_blocks.len(), 1);
        assert_eq!(chunks[0].data_blocks[0].tag, "inventory");
        assert_eq!(chunks[0].data_blocks[0].body, "item: bolt");
    }

    #[test]
    fn test_headers_inside_fences_do_not_split() {
        let tmp = tempfile::tempdir().unwrap();
        let parser = MarkdownParser::new(tmp.path(), vec![]);
        let path = write_file(
            tmp.path(),
            "F.md",
            "## Only\n```\n# not a header\n```\ntail\n",
        );

        let chunks = parser.parse_file(&path).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].header, "Only");
    }

    #[test]
    fn test_space_walk_skips_hidden_and_excluded() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(tmp.path(), "keep.md", "# K\nx\n");
        write_file(tmp.path(), ".hidden/skip.md", "# S\nx\n");
        write_file(tmp.path(), "_proposals/draft.md", "# D\nx\n");
        write_file(tmp.path(), "note.txt", "not markdown\n");

        let parser = MarkdownParser::new(tmp.path(), vec!["_proposals".to_string()]);
        let files = parser.markdown_files().unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("keep.md"));
    }

    #[test]
    fn test_folder_paths_and_index_pages() {
        let tmp = tempfile::tempdir().unwrap();
        write_file(tmp.path(), "Projects/Projects.md", "# P\n");
        write_file(tmp.path(), "Projects/Sub/index.md", "# I\n");
        write_file(tmp.path(), "Loose/note.md", "# N\n");

        let parser = MarkdownParser::new(tmp.path(), vec![]);
        let folders = parser.folder_paths().unwrap();
        assert_eq!(folders, vec!["Loose", "Projects", "Projects/Sub"]);

        let pages = parser.folder_index_pages().unwrap();
        assert_eq!(pages.get("Projects").unwrap(), "Projects/Projects");
        assert_eq!(pages.get("Projects/Sub").unwrap(), "Projects/Sub/index");
        assert!(!pages.contains_key("Loose"));
    }

    #[test]
    fn test_space_config_parsing() {
        let tmp = tempfile::tempdir().unwrap();
        let parser = MarkdownParser::new(tmp.path(), vec![]);
        let path = write_file(
            tmp.path(),
            "SETTINGS.md",
            "---\nignore_patterns:\n  - _review\nembeddings: false\n---\nSpace settings.\n",
        );

        let config = parser.parse_space_config(&path).unwrap();
        assert_eq!(config.ignore_patterns, vec!["_review"]);
        assert_eq!(config.embeddings, Some(false));
    }

    #[test]
    fn test_empty_preamble_is_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let parser = MarkdownParser::new(tmp.path(), vec![]);
        let path = write_file(tmp.path(), "G.md", "\n\n## Start\ncontent\n");

        let chunks = parser.parse_file(&path).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].header, "Start");
    }
}
