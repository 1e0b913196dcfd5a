use std::cmp::Ordering;

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot_product / (norm_a * norm_b)
}

/// Scores every candidate against `query` and keeps the `top_k` most similar, best first.
pub fn rank_by_similarity<T>(
    query: &[f32],
    candidates: impl IntoIterator<Item = (Vec<f32>, T)>,
    top_k: usize,
) -> Vec<(f32, T)> {
    let mut scored: Vec<(f32, T)> = candidates
        .into_iter()
        .map(|(vector, item)| (cosine_similarity(query, &vector), item))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.truncate(top_k);
    scored
}
