//! Query ranking against an [`EmbeddingIndex`].
//!
//! Flat (brute-force) scoring: every node is scored, then the list is
//! stably sorted by descending score and truncated to `top_k`. At the graph
//! sizes this engine targets a full sort is cheaper than anything cleverer.

use crate::corpus::EmbeddingIndex;
use crate::Result;
use serde::Serialize;

/// A ranked node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub label: String,
    pub score: f32,
}

/// Rank the nodes of `index` against `query`, best first.
///
/// Returns an empty list for a blank query or `top_k == 0`, and every node
/// when `top_k` exceeds the node count. Equal scores keep index order.
///
/// # Errors
///
/// Propagates the embedder's failure to encode the query.
pub fn rank(query: &str, index: &EmbeddingIndex, top_k: usize) -> Result<Vec<Match>> {
    if query.trim().is_empty() || top_k == 0 || index.is_empty() {
        return Ok(Vec::new());
    }

    let q = index.encode_query(query)?;
    let kind = index.kind();
    let mut scored: Vec<Match> = index
        .nodes()
        .iter()
        .zip(index.vectors())
        .map(|(label, v)| Match {
            label: label.clone(),
            score: kind.similarity(&q, v),
        })
        .collect();

    // `sort_by` is stable: ties stay in index order. NaN scores sort last.
    scored.sort_by(|a, b| match b.score.partial_cmp(&a.score) {
        Some(order) => order,
        None => a.score.is_nan().cmp(&b.score.is_nan()),
    });
    scored.truncate(top_k);
    tracing::debug!(backend = %kind, top_k, returned = scored.len(), "ranked query");
    Ok(scored)
}

// ---------------------------------------------------------------------------
// Math helpers
// ---------------------------------------------------------------------------

/// Euclidean (L2) norm of `v`.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Dot product (linear kernel). Mismatched lengths score `0.0`.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity between `a` and `b`.
///
/// `a_norm` is pre-computed by the caller so a query can be scored against
/// many documents without recomputing it.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` if either vector is zero or
/// the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32], a_norm: f32) -> f32 {
    if a.len() != b.len() || a_norm == 0.0 {
        return 0.0;
    }

    let b_norm = l2_norm(b);
    if b_norm == 0.0 {
        return 0.0;
    }

    dot(a, b) / (a_norm * b_norm)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
