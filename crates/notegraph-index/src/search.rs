//! BM25 keyword ranking with structural boosting.
//!
//! The index keeps its own term statistics: postings (term → chunk →
//! term frequency), per-chunk token counts, and per-chunk tag/header/
//! folder metadata. Chunks are scored with the standard BM25 formula
//! (k1 = 1.2, b = 0.75) plus two deterministic boosts:
//!
//! - a multiplicative boost when a query term exactly matches one of the
//!   chunk's tags
//! - a multiplicative boost when a query term appears in the chunk's
//!   header text, since headers carry more relevance signal than body
//!
//! Ties break by chunk id so result ordering is stable across runs.
//! Scope filtering restricts the candidate set before scoring, so
//! `limit` results are still returned when enough in-scope matches
//! exist.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::parser::Chunk;
use crate::storage::folder_in_scope;

/// Scoring parameters for keyword search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// BM25 term-frequency saturation
    pub k1: f32,
    /// BM25 length normalization
    pub b: f32,
    /// Multiplier applied on exact tag match
    pub tag_boost: f32,
    /// Multiplier applied on header term match
    pub header_boost: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            tag_boost: 2.0,
            header_boost: 1.5,
        }
    }
}

/// Query-time projection pairing a chunk with its ranking scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    /// BM25 score with boosts; 0 when the chunk came from vector search only
    pub keyword_score: f32,
    /// Vector similarity; 0 when the chunk came from keyword search only
    pub semantic_score: f32,
    /// Fused score; 0 until a fusion policy has run
    pub hybrid_score: f32,
}

impl SearchResult {
    pub fn from_keyword(chunk: Chunk, score: f32) -> Self {
        Self {
            chunk,
            keyword_score: score,
            semantic_score: 0.0,
            hybrid_score: 0.0,
        }
    }

    pub fn from_semantic(chunk: Chunk, score: f32) -> Self {
        Self {
            chunk,
            keyword_score: 0.0,
            semantic_score: score,
            hybrid_score: 0.0,
        }
    }
}

#[derive(Debug)]
struct DocEntry {
    chunk: Chunk,
    /// Term frequencies over content + header tokens
    term_freq: HashMap<String, u32>,
    /// Total token count
    length: u32,
    /// Lowercased header tokens, for the header boost
    header_terms: Vec<String>,
    /// Lowercased tags, for the exact-tag boost
    tags: Vec<String>,
}

/// In-memory BM25 index over chunks.
///
/// Maintained by the indexing orchestrator in lockstep with the store
/// and rebuilt from scratch on process restart by the initial index
/// pass. Not thread-safe on its own; the orchestrator wraps it in a
/// `tokio::sync::RwLock`.
#[derive(Debug, Default)]
pub struct Bm25Index {
    docs: HashMap<String, DocEntry>,
    /// Document frequency per term
    doc_freq: HashMap<String, u32>,
    total_length: u64,
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a chunk in the index.
    pub fn add_chunk(&mut self, chunk: Chunk) {
        self.remove_chunk(&chunk.id.clone());

        let mut term_freq: HashMap<String, u32> = HashMap::new();
        let mut length = 0u32;
        for token in tokenize(&chunk.content).chain(tokenize(&chunk.header)) {
            *term_freq.entry(token).or_insert(0) += 1;
            length += 1;
        }

        for term in term_freq.keys() {
            *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
        }
        self.total_length += u64::from(length);

        let entry = DocEntry {
            header_terms: tokenize(&chunk.header).collect(),
            tags: chunk.tags.iter().map(|t| t.to_lowercase()).collect(),
            chunk,
            term_freq,
            length,
        };
        self.docs.insert(entry.chunk.id.clone(), entry);
    }

    /// Remove every chunk of a file.
    pub fn remove_file(&mut self, file_path: &str) {
        let ids: Vec<String> = self
            .docs
            .values()
            .filter(|entry| entry.chunk.file_path == file_path)
            .map(|entry| entry.chunk.id.clone())
            .collect();
        for id in ids {
            self.remove_chunk(&id);
        }
    }

    fn remove_chunk(&mut self, id: &str) {
        if let Some(entry) = self.docs.remove(id) {
            for term in entry.term_freq.keys() {
                if let Some(df) = self.doc_freq.get_mut(term) {
                    *df -= 1;
                    if *df == 0 {
                        self.doc_freq.remove(term);
                    }
                }
            }
            self.total_length -= u64::from(entry.length);
        }
    }

    /// Drop the whole index.
    pub fn clear(&mut self) {
        self.docs.clear();
        self.doc_freq.clear();
        self.total_length = 0;
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Score chunks against a query.
    ///
    /// When `scope` is given, candidates are restricted to chunks whose
    /// folder equals or nests under it before scoring.
    pub fn search(
        &self,
        query: &str,
        scope: Option<&str>,
        limit: usize,
        config: &SearchConfig,
    ) -> Vec<SearchResult> {
        let terms: Vec<String> = tokenize(query).collect();
        if terms.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let n = self.docs.len() as f32;
        let avg_length = (self.total_length as f32 / n).max(1.0);

        let mut scored: Vec<(f32, &DocEntry)> = Vec::new();
        for entry in self.docs.values() {
            if let Some(scope) = scope {
                if !folder_in_scope(&entry.chunk.folder, scope) {
                    continue;
                }
            }

            let mut score = 0.0f32;
            for term in &terms {
                let tf = *entry.term_freq.get(term).unwrap_or(&0) as f32;
                if tf == 0.0 {
                    continue;
                }
                let df = *self.doc_freq.get(term).unwrap_or(&0) as f32;
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                let norm = tf * (config.k1 + 1.0)
                    / (tf + config.k1 * (1.0 - config.b + config.b * entry.length as f32 / avg_length));
                score += idf * norm;
            }
            if score <= 0.0 {
                continue;
            }

            if terms.iter().any(|t| entry.tags.iter().any(|tag| tag == t)) {
                score *= config.tag_boost;
            }
            if terms.iter().any(|t| entry.header_terms.contains(t)) {
                score *= config.header_boost;
            }

            scored.push((score, entry));
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.chunk.id.cmp(&b.1.chunk.id))
        });
        scored.truncate(limit);

        debug!("Keyword search for {:?} matched {} chunks", query, scored.len());
        scored
            .into_iter()
            .map(|(score, entry)| SearchResult::from_keyword(entry.chunk.clone(), score))
            .collect()
    }
}

/// Lowercase alphanumeric tokenization.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| word.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as StdHashMap;

    fn chunk(id: &str, header: &str, content: &str, tags: &[&str], folder: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            file_path: format!("/space/{id}.md"),
            page: id.to_string(),
            header: header.to_string(),
            content: content.to_string(),
            links: vec![],
            embeds: vec![],
            tags: tags.iter().map(|t| t.to_string()).collect(),
            folder: folder.to_string(),
            frontmatter: StdHashMap::new(),
            attributes: StdHashMap::new(),
            data_blocks: vec![],
            embedding: None,
        }
    }

    fn index(chunks: Vec<Chunk>) -> Bm25Index {
        let mut idx = Bm25Index::new();
        for c in chunks {
            idx.add_chunk(c);
        }
        idx
    }

    #[test]
    fn test_term_frequency_raises_score() {
        let idx = index(vec![
            chunk("a", "", "database setup notes", &[], ""),
            chunk("b", "", "database database database setup", &[], ""),
            chunk("c", "", "unrelated content entirely", &[], ""),
        ]);

        let results = idx.search("database", None, 10, &SearchConfig::default());
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "b");
        assert!(results[0].keyword_score > results[1].keyword_score);
    }

    #[test]
    fn test_header_match_scores_strictly_higher() {
        // Identical content; only the header differs
        let idx = index(vec![
            chunk("with", "Setup", "configure the database", &[], ""),
            chunk("without", "Notes", "configure the database", &[], ""),
        ]);

        let results = idx.search("setup", None, 10, &SearchConfig::default());
        // Only the header-matching chunk even contains the term, via
        // header tokens being indexed
        assert_eq!(results[0].chunk.id, "with");

        let results = idx.search("configure", None, 10, &SearchConfig::default());
        assert_eq!(results.len(), 2);
        let with = results.iter().find(|r| r.chunk.id == "with").unwrap();
        let without = results.iter().find(|r| r.chunk.id == "without").unwrap();
        assert_eq!(with.keyword_score, without.keyword_score);

        let results = idx.search("setup configure", None, 10, &SearchConfig::default());
        let with = results.iter().find(|r| r.chunk.id == "with").unwrap();
        let without = results.iter().find(|r| r.chunk.id == "without").unwrap();
        assert!(
            with.keyword_score > without.keyword_score,
            "header match must score strictly higher"
        );
    }

    #[test]
    fn test_exact_tag_match_boosts() {
        let idx = index(vec![
            chunk("tagged", "", "configure things", &["config"], ""),
            chunk("plain", "", "configure things config", &[], ""),
        ]);

        let results = idx.search("config", None, 10, &SearchConfig::default());
        let tagged = results.iter().find(|r| r.chunk.id == "tagged");
        // "tagged" has no "config" token in content/header, so it only
        // scores if some term matches; tag alone does not create a
        // candidate
        assert!(tagged.is_none());

        let idx = index(vec![
            chunk("tagged", "", "config notes here", &["config"], ""),
            chunk("plain", "", "config notes here", &[], ""),
        ]);
        let results = idx.search("config", None, 10, &SearchConfig::default());
        let tagged = results.iter().find(|r| r.chunk.id == "tagged").unwrap();
        let plain = results.iter().find(|r| r.chunk.id == "plain").unwrap();
        assert!(tagged.keyword_score > plain.keyword_score);
    }

    #[test]
    fn test_scope_restricts_candidates() {
        let idx = index(vec![
            chunk("in1", "", "shared term", &[], "Folder/Sub"),
            chunk("in2", "", "shared term", &[], "Folder/Sub/Deep"),
            chunk("out", "", "shared term", &[], "Folder/Other"),
        ]);

        let results = idx.search("shared", Some("Folder/Sub"), 10, &SearchConfig::default());
        let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["in1", "in2"]);
    }

    #[test]
    fn test_scope_filters_before_limit() {
        let mut chunks = vec![];
        for i in 0..5 {
            chunks.push(chunk(&format!("out{i}"), "", "needle", &[], "Other"));
        }
        for i in 0..3 {
            chunks.push(chunk(&format!("in{i}"), "", "needle", &[], "Scope"));
        }
        let idx = index(chunks);

        // limit=3 still returns 3 in-scope results even though out-of-
        // scope chunks would crowd them out under post-filtering
        let results = idx.search("needle", Some("Scope"), 3, &SearchConfig::default());
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.chunk.folder == "Scope"));
    }

    #[test]
    fn test_tie_break_is_deterministic() {
        let idx = index(vec![
            chunk("zeta", "", "needle", &[], ""),
            chunk("alpha", "", "needle", &[], ""),
        ]);

        for _ in 0..5 {
            let results = idx.search("needle", None, 10, &SearchConfig::default());
            let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
            assert_eq!(ids, vec!["alpha", "zeta"]);
        }
    }

    #[test]
    fn test_remove_file_drops_chunks_and_stats() {
        let mut idx = index(vec![
            chunk("a", "", "needle one", &[], ""),
            chunk("b", "", "needle two", &[], ""),
        ]);
        assert_eq!(idx.len(), 2);

        idx.remove_file("/space/a.md");
        assert_eq!(idx.len(), 1);

        let results = idx.search("needle", None, 10, &SearchConfig::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "b");
        assert_eq!(idx.doc_freq.get("needle"), Some(&1));
    }

    #[test]
    fn test_reindex_same_id_replaces() {
        let mut idx = Bm25Index::new();
        idx.add_chunk(chunk("a", "", "old words", &[], ""));
        idx.add_chunk(chunk("a", "", "new words", &[], ""));

        assert_eq!(idx.len(), 1);
        assert!(idx.search("old", None, 10, &SearchConfig::default()).is_empty());
        assert_eq!(
            idx.search("new", None, 10, &SearchConfig::default()).len(),
            1
        );
    }

    #[test]
    fn test_empty_query_and_empty_index() {
        let idx = Bm25Index::new();
        assert!(idx.search("anything", None, 10, &SearchConfig::default()).is_empty());

        let idx = index(vec![chunk("a", "", "text", &[], "")]);
        assert!(idx.search("", None, 10, &SearchConfig::default()).is_empty());
        assert!(idx.search("   ", None, 10, &SearchConfig::default()).is_empty());
    }
}
