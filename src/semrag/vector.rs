//! Dense-vector math for sentence, entity and summary embeddings.

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Cosine of the angle between two embeddings.
///
/// Embeddings of different dimension, or with zero length, are treated as
/// unrelated and score 0.0, so they never clear a positive threshold.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        return 0.0;
    }
    dot(a, b) / denom
}

/// Scale an embedding to unit length in place; zero vectors stay zero.
pub fn normalize(embedding: &mut [f32]) {
    let length = norm(embedding);
    if length > 0.0 {
        embedding.iter_mut().for_each(|x| *x /= length);
    }
}

/// Centroid of a passage buffer. Vectors whose dimension differs from the
/// first one are skipped; no input gives an empty centroid.
pub fn mean_embedding<V: AsRef<[f32]>>(vectors: &[V]) -> Vec<f32> {
    let Some(dim) = vectors.first().map(|v| v.as_ref().len()) else {
        return Vec::new();
    };

    let mut centroid = vec![0.0f32; dim];
    let mut members = 0usize;
    for v in vectors.iter().map(AsRef::as_ref).filter(|v| v.len() == dim) {
        centroid.iter_mut().zip(v).for_each(|(acc, x)| *acc += x);
        members += 1;
    }

    if members > 1 {
        let n = members as f32;
        centroid.iter_mut().for_each(|acc| *acc /= n);
    }
    centroid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_ignores_magnitude() {
        let a = cosine_similarity(&[0.2, 0.4, 0.0], &[1.0, 2.0, 0.0]);
        assert!((a - 1.0).abs() < 1e-6);

        let b = cosine_similarity(&[1.0, 0.0], &[0.6, 0.8]);
        assert!((b - 0.6).abs() < 1e-6);
    }

    #[test]
    fn unrelated_embeddings_score_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.5, 0.5], &[0.5]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn opposite_embeddings_score_minus_one() {
        let s = cosine_similarity(&[0.3, -0.7], &[-0.3, 0.7]);
        assert!((s + 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_gives_unit_length() {
        let mut v = vec![3.0, 0.0, 4.0];
        normalize(&mut v);
        assert!((norm(&v) - 1.0).abs() < 1e-6);
        assert!((v[2] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0; 4];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0; 4]);
    }

    #[test]
    fn centroid_of_buffer() {
        let centroid = mean_embedding(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![2.0, 2.0]]);
        assert_eq!(centroid, vec![1.0, 1.0]);

        let single = mean_embedding(&[[0.25f32, 0.75]]);
        assert_eq!(single, vec![0.25, 0.75]);
    }

    #[test]
    fn centroid_skips_mismatched_dimensions() {
        let empty: Vec<Vec<f32>> = Vec::new();
        assert!(mean_embedding(&empty).is_empty());

        let centroid = mean_embedding(&[vec![2.0, 4.0], vec![1.0], vec![4.0, 2.0]]);
        assert_eq!(centroid, vec![3.0, 3.0]);
    }
}
