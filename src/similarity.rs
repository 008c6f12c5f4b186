use crate::error::{check_dim, AmemError, Result};
use crate::types::MemoryEntry;

// =============================================================================
// Cosine similarity
// =============================================================================

/// Compute cosine similarity between two vectors
///
/// Zero-magnitude inputs score 0.0 instead of dividing by zero.
pub fn cosine_similarity(vec_a: &[f64], vec_b: &[f64]) -> Result<f64> {
    check_dim(vec_a.len(), vec_b.len())?;

    let dot: f64 = vec_a.iter().zip(vec_b.iter()).map(|(a, b)| a * b).sum();
    let norm_a = norm(vec_a);
    let norm_b = norm(vec_b);

    if norm_a == 0.0 || norm_b == 0.0 {
        Ok(0.0)
    } else {
        // Rounding can push |cos| a hair past 1
        Ok((dot / (norm_a * norm_b)).clamp(-1.0, 1.0))
    }
}

pub fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

pub fn euclidean_distance(vec_a: &[f64], vec_b: &[f64]) -> f64 {
    vec_a
        .iter()
        .zip(vec_b.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt()
}

// =============================================================================
// Ranking
// =============================================================================

/// Score every candidate against `query` and keep the `k` best
///
/// Candidates must be supplied in insertion order: the sort is stable, so
/// equal scores keep that order.
pub fn rank<'a, I>(query: &[f64], candidates: I, k: usize) -> Result<Vec<MemoryEntry>>
where
    I: IntoIterator<Item = &'a MemoryEntry>,
{
    if k == 0 {
        return Err(AmemError::invalid("k must be positive"));
    }
    if query.iter().any(|x| !x.is_finite()) {
        return Err(AmemError::invalid("query contains NaN or infinite values"));
    }

    let mut results = candidates
        .into_iter()
        .map(|entry| Ok(entry.with_similarity(cosine_similarity(query, &entry.key)?)))
        .collect::<Result<Vec<_>>>()?;

    // Sort by score descending
    results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    results.truncate(k);

    Ok(results)
}
