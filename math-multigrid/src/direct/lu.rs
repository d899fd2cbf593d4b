//! Dense LU factorization with partial pivoting
//!
//! Used as the coarsest-level solver when the coarse operator has at most
//! `LevelManager::max_direct_size` rows. Setup can end above
//! `max_coarse_size` (level count exhausted, stalled coarsening), so that
//! bound is checked before factoring.

use crate::error::{MultigridError, Result};
use crate::sparse::CsrMatrix;
use crate::traits::ComplexField;
use ndarray::{Array1, Array2};
use num_traits::Zero;

/// Pivots below this magnitude are treated as zero
const PIVOT_TOLERANCE: f64 = 1e-30;

/// LU factors of a square matrix, `P A = L U`
#[derive(Debug, Clone)]
pub struct DenseLu<T: ComplexField> {
    /// Unit lower triangle (below the diagonal) and upper triangle, packed
    factors: Array2<T>,
    /// `perm[k]` is the original row placed at position `k`
    perm: Vec<usize>,
}

impl<T: ComplexField> DenseLu<T> {
    /// Factor a dense square matrix
    pub fn factorize(a: &Array2<T>) -> Result<Self> {
        let n = a.nrows();
        if n != a.ncols() {
            return Err(MultigridError::PreconditionViolation(format!(
                "LU factorization needs a square matrix, got {}x{}",
                n,
                a.ncols()
            )));
        }

        let tol = T::real(PIVOT_TOLERANCE);
        let mut factors = a.clone();
        let mut perm: Vec<usize> = (0..n).collect();

        for k in 0..n {
            let (pivot_row, pivot_norm) = (k..n)
                .map(|i| (i, factors[[i, k]].norm()))
                .fold((k, T::Real::zero()), |best, cand| {
                    if cand.1 > best.1 { cand } else { best }
                });
            if pivot_norm < tol {
                return Err(MultigridError::SingularOperator { pivot: k });
            }

            if pivot_row != k {
                for j in 0..n {
                    factors.swap([k, j], [pivot_row, j]);
                }
                perm.swap(k, pivot_row);
            }

            let pivot_inv = factors[[k, k]].inv();
            for i in (k + 1)..n {
                let multiplier = factors[[i, k]] * pivot_inv;
                factors[[i, k]] = multiplier;
                if multiplier == T::zero() {
                    continue;
                }
                for j in (k + 1)..n {
                    let ukj = factors[[k, j]];
                    factors[[i, j]] -= multiplier * ukj;
                }
            }
        }

        Ok(Self { factors, perm })
    }

    /// Factor a sparse matrix through its dense copy
    pub fn from_csr(a: &CsrMatrix<T>) -> Result<Self> {
        Self::factorize(&a.to_dense())
    }

    /// Dimension of the factored matrix
    pub fn dim(&self) -> usize {
        self.perm.len()
    }

    /// Solve `A x = b`
    pub fn solve(&self, b: &Array1<T>) -> Result<Array1<T>> {
        let n = self.dim();
        if b.len() != n {
            return Err(MultigridError::IncompatibleOperands(format!(
                "right-hand side has {} entries, LU factors have dimension {}",
                b.len(),
                n
            )));
        }

        let mut x = Array1::from_iter(self.perm.iter().map(|&p| b[p]));

        for i in 0..n {
            let mut sum = x[i];
            for j in 0..i {
                sum -= self.factors[[i, j]] * x[j];
            }
            x[i] = sum;
        }

        for i in (0..n).rev() {
            let mut sum = x[i];
            for j in (i + 1)..n {
                sum -= self.factors[[i, j]] * x[j];
            }
            x[i] = sum * self.factors[[i, i]].inv();
        }

        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use num_complex::Complex64;

    #[test]
    fn test_solve_real_with_pivoting() {
        let a = array![[0.0, 2.0, 1.0], [1.0, 1.0, 0.0], [3.0, 0.0, 1.0]];
        let b = array![5.0, 3.0, 6.0];

        let lu = DenseLu::factorize(&a).unwrap();
        let x = lu.solve(&b).unwrap();

        let ax = a.dot(&x);
        for i in 0..3 {
            assert_relative_eq!(ax[i], b[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_solve_complex() {
        let a = array![
            [Complex64::new(4.0, 1.0), Complex64::new(1.0, 0.0)],
            [Complex64::new(1.0, 0.0), Complex64::new(3.0, -1.0)],
        ];
        let b = array![Complex64::new(1.0, 1.0), Complex64::new(2.0, -1.0)];

        let x = DenseLu::factorize(&a).unwrap().solve(&b).unwrap();
        let ax = a.dot(&x);
        for i in 0..2 {
            assert_relative_eq!((ax[i] - b[i]).norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_singular_matrix() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        let err = DenseLu::factorize(&a).unwrap_err();
        assert!(matches!(err, MultigridError::SingularOperator { pivot: 1 }));
    }

    #[test]
    fn test_dimension_mismatch() {
        let lu = DenseLu::from_csr(&CsrMatrix::<f64>::identity(3)).unwrap();
        assert!(lu.solve(&array![1.0, 2.0]).is_err());
    }
}
