//! Similarity Scorer: embedding cosine similarity as a 0–100 percentage.

use crate::nlp::{Embedder, ModelError};

/// Embeds both texts and returns their similarity as a percentage with two decimals.
/// Blocking: runs model inference.
pub fn compute_match_score(
    embedder: &dyn Embedder,
    resume_text: &str,
    job_text: &str,
) -> Result<f64, ModelError> {
    let resume_embedding = embedder.embed(resume_text)?;
    let job_embedding = embedder.embed(job_text)?;
    Ok(to_percentage(cosine_similarity(
        &resume_embedding,
        &job_embedding,
    )))
}

/// Cosine similarity in [-1, 1]. Zero-length, zero-norm or mismatched vectors give 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a.iter().zip(b).fold(
        (0.0_f64, 0.0_f64, 0.0_f64),
        |(dot, na, nb), (&x, &y)| {
            let (x, y) = (x as f64, y as f64);
            (dot + x * y, na + x * x, nb + y * y)
        },
    );

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator <= f64::EPSILON {
        return 0.0;
    }
    (dot / denominator).clamp(-1.0, 1.0)
}

/// Scales to a percentage rounded to two decimals. Negative similarity is reported as 0.
pub fn to_percentage(similarity: f64) -> f64 {
    let pct = (similarity * 100.0).clamp(0.0, 100.0);
    (pct * 100.0).round() / 100.0
}
