//! Matmul shape reconciliation for `A[..., M, K] × B[N, K]ᵀ`
//!
//! The weight matrix is stored pre-transposed (`[N, K]`, row-major over output
//! rows), so the shared dimension is the last axis of both operands. Leading
//! dims of A multiply into a flat batch count.

use crate::error::{Error, Result};

/// Reconciled matmul dimensions plus the logical output shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatmulShape {
    pub batch_count: usize,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    /// Output shape: A's leading dims with the last axis replaced by N
    pub output_shape: Vec<usize>,
}

impl MatmulShape {
    /// Reconcile an activation shape against static weight dims `[n, k]`.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if A is not at least 1-D or its last axis differs
    /// from `k`.
    pub fn compute(a_shape: &[usize], n: usize, k: usize) -> Result<Self> {
        if a_shape.is_empty() {
            return Err(Error::ShapeMismatch {
                reason: "activation must be at least 1-D".into(),
            });
        }
        let a_k = a_shape[a_shape.len() - 1];
        if a_k != k {
            return Err(Error::ShapeMismatch {
                reason: format!("activation K={} does not match weight K={}", a_k, k),
            });
        }

        let (m, batch_count) = match a_shape.len() {
            1 => (1, 1),
            len => {
                let m = a_shape[len - 2];
                (m, a_shape[..len - 2].iter().product())
            }
        };

        let mut output_shape = a_shape[..a_shape.len() - 1].to_vec();
        if output_shape.is_empty() {
            output_shape.push(1);
        }
        output_shape.push(n);

        Ok(Self {
            batch_count,
            m,
            n,
            k,
            output_shape,
        })
    }

    /// Total number of output elements
    pub fn output_numel(&self) -> usize {
        self.batch_count * self.m * self.n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank2() {
        let s = MatmulShape::compute(&[7, 32], 5, 32).unwrap();
        assert_eq!((s.batch_count, s.m, s.n, s.k), (1, 7, 5, 32));
        assert_eq!(s.output_shape, vec![7, 5]);
    }

    #[test]
    fn test_batched() {
        let s = MatmulShape::compute(&[2, 3, 4, 64], 10, 64).unwrap();
        assert_eq!((s.batch_count, s.m, s.n, s.k), (6, 4, 10, 64));
        assert_eq!(s.output_shape, vec![2, 3, 4, 10]);
        assert_eq!(s.output_numel(), 240);
    }

    #[test]
    fn test_vector_activation() {
        let s = MatmulShape::compute(&[32], 5, 32).unwrap();
        assert_eq!((s.batch_count, s.m, s.n), (1, 1, 5));
        assert_eq!(s.output_shape, vec![1, 5]);
    }

    #[test]
    fn test_k_mismatch() {
        assert!(MatmulShape::compute(&[4, 33], 5, 32).is_err());
        assert!(MatmulShape::compute(&[], 5, 32).is_err());
    }

    #[test]
    fn test_zero_rows() {
        let s = MatmulShape::compute(&[0, 32], 5, 32).unwrap();
        assert_eq!(s.output_numel(), 0);
    }
}
