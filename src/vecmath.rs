//! Squared-Euclidean distance and exact-duplicate tests for dense vectors.
//!
//! Everything in this crate works in *squared* distance. Square roots are never
//! needed for ordering, and avoiding them keeps the hot loops cheap. Distances
//! accumulate in `f64` so that large dimension counts do not lose precision,
//! then narrow back to `f32` for storage.

/// Squared Euclidean distance between two vectors of equal dimension.
#[inline]
#[must_use]
pub fn distance2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut sum = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let d = (x - y) as f64;
        sum += d * d;
    }
    sum as f32
}

/// Exact element-wise equality test.
///
/// Much faster than computing a distance when vectors differ, because it fails
/// on the first unequal component.
#[inline]
#[must_use]
pub fn vectors_are_dups(a: &[f32], b: &[f32]) -> bool {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance2_basic() {
        assert_eq!(distance2(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(distance2(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn distance2_symmetric() {
        let a = [0.25, -1.5, 3.0, 0.125];
        let b = [2.0, 0.5, -0.75, 1.0];
        assert_eq!(distance2(&a, &b), distance2(&b, &a));
    }

    #[test]
    fn dup_test_exact_only() {
        assert!(vectors_are_dups(&[1.0, 2.0], &[1.0, 2.0]));
        assert!(!vectors_are_dups(&[1.0, 2.0], &[1.0, 2.0000001]));
    }

    #[test]
    fn dup_implies_zero_distance() {
        let a = [0.1, 0.2, 0.3];
        assert!(vectors_are_dups(&a, &a));
        assert_eq!(distance2(&a, &a), 0.0);
    }
}
