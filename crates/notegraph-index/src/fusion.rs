//! Rank fusion for hybrid search.
//!
//! Keyword and vector searches each return a top-K list scored on its
//! own scale. Two fusion policies merge them into one ordering:
//!
//! - **Reciprocal Rank Fusion**: a chunk's fused score is the sum over
//!   the lists containing it of `1 / (k + rank)`, rank 1-indexed. The
//!   constant k (default 60, from the RRF literature) dampens rank-1
//!   dominance. Chunks in both lists accumulate both contributions.
//! - **Weighted fusion**: `semantic_weight * normalized_semantic +
//!   keyword_weight * normalized_keyword`, each list max-normalized to
//!   its own scale, 0 substituted for a missing entry. Weights are
//!   caller-supplied and need not sum to 1.
//!
//! Both return the union of candidates sorted by fused score descending,
//! ties broken by chunk id.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::search::SearchResult;
use crate::DEFAULT_RRF_K;

/// Fusion policy for hybrid search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionMethod {
    Rrf,
    Weighted,
}

impl std::str::FromStr for FusionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rrf" => Ok(FusionMethod::Rrf),
            "weighted" => Ok(FusionMethod::Weighted),
            other => Err(format!("unknown fusion method: {other}")),
        }
    }
}

/// Merge keyword- and vector-ranked lists with Reciprocal Rank Fusion.
pub fn reciprocal_rank_fusion(
    keyword: Vec<SearchResult>,
    semantic: Vec<SearchResult>,
    k: usize,
) -> Vec<SearchResult> {
    let k = k as f32;
    let mut merged: HashMap<String, SearchResult> = HashMap::new();

    for (rank, result) in keyword.into_iter().enumerate() {
        let contribution = 1.0 / (k + (rank + 1) as f32);
        let entry = merged.entry(result.chunk.id.clone()).or_insert(result);
        entry.hybrid_score += contribution;
    }
    for (rank, result) in semantic.into_iter().enumerate() {
        let contribution = 1.0 / (k + (rank + 1) as f32);
        match merged.get_mut(&result.chunk.id) {
            Some(entry) => {
                entry.semantic_score = result.semantic_score;
                entry.hybrid_score += contribution;
            }
            None => {
                let mut entry = result;
                entry.hybrid_score = contribution;
                merged.insert(entry.chunk.id.clone(), entry);
            }
        }
    }

    sort_fused(merged)
}

/// Merge lists with weighted-score fusion.
pub fn weighted_fusion(
    keyword: Vec<SearchResult>,
    semantic: Vec<SearchResult>,
    semantic_weight: f32,
    keyword_weight: f32,
) -> Vec<SearchResult> {
    let keyword_max = keyword
        .iter()
        .map(|r| r.keyword_score)
        .fold(0.0f32, f32::max);
    let semantic_max = semantic
        .iter()
        .map(|r| r.semantic_score)
        .fold(0.0f32, f32::max);

    let mut merged: HashMap<String, SearchResult> = HashMap::new();

    for result in keyword {
        let normalized = if keyword_max > 0.0 {
            result.keyword_score / keyword_max
        } else {
            0.0
        };
        let entry = merged.entry(result.chunk.id.clone()).or_insert(result);
        entry.hybrid_score += keyword_weight * normalized;
    }
    for result in semantic {
        let normalized = if semantic_max > 0.0 {
            result.semantic_score / semantic_max
        } else {
            0.0
        };
        match merged.get_mut(&result.chunk.id) {
            Some(entry) => {
                entry.semantic_score = result.semantic_score;
                entry.hybrid_score += semantic_weight * normalized;
            }
            None => {
                let mut entry = result;
                entry.hybrid_score = semantic_weight * normalized;
                merged.insert(entry.chunk.id.clone(), entry);
            }
        }
    }

    sort_fused(merged)
}

/// Apply a fusion policy and truncate to `limit`.
pub fn fuse(
    method: FusionMethod,
    keyword: Vec<SearchResult>,
    semantic: Vec<SearchResult>,
    semantic_weight: f32,
    keyword_weight: f32,
    limit: usize,
) -> Vec<SearchResult> {
    let mut fused = match method {
        FusionMethod::Rrf => reciprocal_rank_fusion(keyword, semantic, DEFAULT_RRF_K),
        FusionMethod::Weighted => {
            weighted_fusion(keyword, semantic, semantic_weight, keyword_weight)
        }
    };
    fused.truncate(limit);
    fused
}

fn sort_fused(merged: HashMap<String, SearchResult>) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = merged.into_values().collect();
    results.sort_by(|a, b| {
        b.hybrid_score
            .partial_cmp(&a.hybrid_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    results
}
