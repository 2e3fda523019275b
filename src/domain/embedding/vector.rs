//! Vector math shared by the index and the similarity decision
//!
//! The L2-to-similarity conversion is only meaningful for unit-length vectors:
//! for `|a| = |b| = 1`, `|a - b|^2 = 2 - 2cos(a, b)`, hence
//! `cos(a, b) = 1 - |a - b|^2 / 2`. The index normalises every vector it
//! stores and every query it answers, so callers never rely on the provider
//! for unit length.

use crate::domain::DomainError;

/// Calculate cosine similarity between two vectors of any length
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Squared Euclidean distance; callers guarantee equal lengths
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Similarity of two unit vectors from their squared L2 distance
pub fn similarity_from_squared_l2(distance: f32) -> f32 {
    1.0 - distance / 2.0
}

/// Return a unit-length copy of `vector`
pub fn normalized(vector: &[f32]) -> Result<Vec<f32>, DomainError> {
    if vector.is_empty() {
        return Err(DomainError::invalid_vector("vector is empty"));
    }

    if vector.iter().any(|x| !x.is_finite()) {
        return Err(DomainError::invalid_vector("vector contains non-finite values"));
    }

    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm == 0.0 {
        return Err(DomainError::invalid_vector("vector has zero norm"));
    }

    Ok(vector.iter().map(|x| x / norm).collect())
}
