//! Cosine similarity and embedding validation

/// Cosine similarity between two vectors.
/// Returns 0.0 for mismatched, empty or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut mag_a, mut mag_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }
    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom < f64::EPSILON {
        0.0
    } else {
        (dot / denom).clamp(-1.0, 1.0)
    }
}

/// Reason an embedding was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingDefect {
    Empty,
    WrongDimension { expected: usize, actual: usize },
    NonFinite,
    ZeroMagnitude,
}

impl std::fmt::Display for EmbeddingDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "embedding is empty"),
            Self::WrongDimension { expected, actual } => {
                write!(f, "embedding has {} dimensions, expected {}", actual, expected)
            }
            Self::NonFinite => write!(f, "embedding contains NaN or infinite values"),
            Self::ZeroMagnitude => write!(f, "embedding has zero magnitude"),
        }
    }
}

/// Check an embedding against the expected dimensionality
pub fn validate_embedding(embedding: &[f32], expected: usize) -> Result<(), EmbeddingDefect> {
    if embedding.is_empty() {
        return Err(EmbeddingDefect::Empty);
    }
    if embedding.len() != expected {
        return Err(EmbeddingDefect::WrongDimension {
            expected,
            actual: embedding.len(),
        });
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(EmbeddingDefect::NonFinite);
    }
    if embedding.iter().all(|v| *v == 0.0) {
        return Err(EmbeddingDefect::ZeroMagnitude);
    }
    Ok(())
}

/// Most common non-empty embedding length; ties go to the smaller length
pub fn dominant_dimension<'a>(embeddings: impl IntoIterator<Item = &'a [f32]>) -> Option<usize> {
    let mut counts: std::collections::BTreeMap<usize, usize> = std::collections::BTreeMap::new();
    for embedding in embeddings {
        if !embedding.is_empty() {
            *counts.entry(embedding.len()).or_insert(0) += 1;
        }
    }
    // BTreeMap iterates ascending, so the first maximum wins ties
    let mut best: Option<(usize, usize)> = None;
    for (dim, count) in counts {
        match best {
            Some((_, best_count)) if best_count >= count => {}
            _ => best = Some((dim, count)),
        }
    }
    best.map(|(dim, _)| dim)
}
