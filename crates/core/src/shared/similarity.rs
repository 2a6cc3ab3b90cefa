//! Vector similarity primitives shared by clustering and search.

/// Scales `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity in `[-1, 1]`.
///
/// Returns 0.0 when either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 {
        (dot / denom).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Mean cosine similarity over every pair drawn from `a` × `b`.
pub fn average_pairwise_similarity(a: &[&[f32]], b: &[&[f32]]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut total = 0.0;
    for x in a {
        for y in b {
            total += cosine_similarity(x, y);
        }
    }
    total / (a.len() * b.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_l2_normalize_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![0.3, -1.2, 4.0];
        assert_relative_eq!(cosine_similarity(&a, &a), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert_relative_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        assert_relative_eq!(
            cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]),
            -1.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_ignores_magnitude() {
        let a = [1.0, 2.0, 3.0];
        let b = [10.0, 20.0, 30.0];
        assert_relative_eq!(cosine_similarity(&a, &b), 1.0, epsilon = 1e-9);
    }

    #[rstest]
    #[case(vec![1.0, 0.5, -0.2], vec![0.1, 0.9, 0.4])]
    #[case(vec![-3.0, 0.0, 7.5], vec![2.0, -1.0, 0.0])]
    #[case(vec![0.25, 0.25, 0.25], vec![0.9, -0.9, 0.1])]
    fn test_cosine_similarity_symmetric_and_bounded(#[case] a: Vec<f32>, #[case] b: Vec<f32>) {
        let ab = cosine_similarity(&a, &b);
        let ba = cosine_similarity(&b, &a);
        assert_relative_eq!(ab, ba);
        assert!((-1.0..=1.0).contains(&ab));
    }

    #[test]
    fn test_average_pairwise_similarity() {
        let x: &[f32] = &[1.0, 0.0];
        let y: &[f32] = &[0.0, 1.0];
        // Pairs: (x,x)=1, (x,y)=0
        assert_relative_eq!(average_pairwise_similarity(&[x], &[x, y]), 0.5);
    }

    #[test]
    fn test_average_pairwise_similarity_empty() {
        let x: &[f32] = &[1.0, 0.0];
        assert_eq!(average_pairwise_similarity(&[], &[x]), 0.0);
    }
}
