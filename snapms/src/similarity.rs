//! Pairwise structure similarity
use std::ops::Index;

use itertools::Itertools;

/// A square, symmetric matrix of pairwise similarity scores
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    size: usize,
    values: Vec<f64>,
}

impl SimilarityMatrix {
    /// Create a matrix of `size` x `size` with `1.0` on the diagonal and `0.0` elsewhere
    pub fn identity(size: usize) -> Self {
        let mut values = vec![0.0; size * size];
        for i in 0..size {
            values[i * size + i] = 1.0;
        }
        Self { size, values }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        if i < self.size && j < self.size {
            Some(self.values[i * self.size + j])
        } else {
            None
        }
    }

    /// Set the score for both `(i, j)` and `(j, i)`
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.values[i * self.size + j] = value;
        self.values[j * self.size + i] = value;
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.size..(i + 1) * self.size]
    }
}

impl Index<(usize, usize)> for SimilarityMatrix {
    type Output = f64;

    fn index(&self, (i, j): (usize, usize)) -> &Self::Output {
        &self.values[i * self.size + j]
    }
}

/// A method for scoring how alike two structure encodings are.
///
/// Scores lie in `[0, 1]` and higher scores mean more similar structures.
pub trait StructureSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64;

    /// Compute the full pairwise matrix for `structures`, in order.
    ///
    /// Implementations that can amortize per-structure work should override this.
    fn similarity_matrix(&self, structures: &[&str]) -> SimilarityMatrix {
        let mut matrix = SimilarityMatrix::identity(structures.len());
        for ((i, a), (j, b)) in structures.iter().enumerate().tuple_combinations() {
            matrix.set(i, j, self.similarity(a, b));
        }
        matrix
    }
}

impl<T: StructureSimilarity + ?Sized> StructureSimilarity for &T {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        (**self).similarity(a, b)
    }

    fn similarity_matrix(&self, structures: &[&str]) -> SimilarityMatrix {
        (**self).similarity_matrix(structures)
    }
}

/// Test double scoring identical encodings `1.0` and everything else `0.0`
#[cfg(test)]
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ExactMatchSimilarity;

#[cfg(test)]
impl StructureSimilarity for ExactMatchSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        if a == b {
            1.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct LengthSimilarity;

    impl StructureSimilarity for LengthSimilarity {
        fn similarity(&self, a: &str, b: &str) -> f64 {
            let (a, b) = (a.len() as f64, b.len() as f64);
            a.min(b) / a.max(b)
        }
    }

    #[test]
    fn test_matrix_symmetric() {
        let matrix = LengthSimilarity.similarity_matrix(&["C", "CC", "CCCC"]);
        assert_eq!(matrix.len(), 3);
        for i in 0..3 {
            assert_eq!(matrix[(i, i)], 1.0);
            for j in 0..3 {
                assert_eq!(matrix[(i, j)], matrix[(j, i)]);
            }
        }
        assert_eq!(matrix[(0, 1)], 0.5);
        assert_eq!(matrix[(1, 2)], 0.5);
        assert_eq!(matrix[(0, 2)], 0.25);
        assert_eq!(matrix.row(0), &[1.0, 0.5, 0.25]);
        assert_eq!(matrix.get(3, 0), None);
    }

    #[test]
    fn test_exact() {
        let matrix = ExactMatchSimilarity.similarity_matrix(&["CCO", "CCO", "CCN"]);
        assert_eq!(matrix[(0, 1)], 1.0);
        assert_eq!(matrix[(0, 2)], 0.0);
        assert!(SimilarityMatrix::identity(0).is_empty());
    }
}
