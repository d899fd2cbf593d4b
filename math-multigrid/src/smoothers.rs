//! Level smoothers and the coarsest-level solver
//!
//! A [`LevelSmoother`] is the artifact stored under `PreSmoother` /
//! `PostSmoother`. Relaxation methods improve an existing guess; the direct
//! solver replaces it with the exact solution.

use crate::direct::DenseLu;
use crate::error::{MultigridError, Result};
use crate::parallel::parallel_map_indexed;
use crate::sparse::CsrMatrix;
use crate::traits::ComplexField;
use crate::vector::Vector;
use ndarray::Array1;
use num_traits::{ToPrimitive, Zero};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Relaxation method
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SmootherKind {
    /// Damped Jacobi, x += ω D^{-1} (b - A x)
    Jacobi {
        /// Damping factor (2/3 is optimal for Poisson)
        omega: f64,
    },
    /// Jacobi scaled by the l1 norm of each row, no damping needed
    L1Jacobi,
    /// Forward then backward Gauss-Seidel sweep
    SymmetricGaussSeidel,
}

impl Default for SmootherKind {
    fn default() -> Self {
        SmootherKind::Jacobi { omega: 0.6667 }
    }
}

/// Relaxation method plus number of sweeps per application
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmootherConfig {
    /// Relaxation method
    pub kind: SmootherKind,
    /// Sweeps per application
    pub sweeps: usize,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            kind: SmootherKind::default(),
            sweeps: 1,
        }
    }
}

/// How the coarsest level is solved
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CoarseSolverKind {
    /// Dense LU factorization, exact solve
    Direct,
    /// A few relaxation sweeps
    Smoother(SmootherConfig),
}

#[derive(Debug, Clone)]
enum Method<T: ComplexField> {
    Jacobi { omega: T, diag_inv: Array1<T> },
    L1Jacobi { l1_inv: Array1<T> },
    SymmetricGaussSeidel,
    Direct(DenseLu<T>),
}

/// Smoother bound to the operator of one level
#[derive(Debug, Clone)]
pub struct LevelSmoother<T: ComplexField> {
    matrix: Arc<CsrMatrix<T>>,
    method: Method<T>,
    sweeps: usize,
}

impl<T: ComplexField> LevelSmoother<T> {
    /// Set up a relaxation smoother for `matrix`
    pub fn relaxation(matrix: Arc<CsrMatrix<T>>, config: &SmootherConfig) -> Self {
        let tol = T::real(1e-15);
        let method = match config.kind {
            SmootherKind::Jacobi { omega } => {
                let diag_inv = matrix.diagonal().mapv(|d| {
                    if d.norm() > tol { d.inv() } else { T::one() }
                });
                Method::Jacobi {
                    omega: T::from_real(T::real(omega)),
                    diag_inv,
                }
            }
            SmootherKind::L1Jacobi => {
                let l1_inv = Array1::from(parallel_map_indexed(matrix.num_rows, |i| {
                    let sum = matrix
                        .row_entries(i)
                        .fold(T::Real::zero(), |acc, (_, v)| acc + v.norm());
                    if sum > tol {
                        T::from_real(sum).inv()
                    } else {
                        T::one()
                    }
                }));
                Method::L1Jacobi { l1_inv }
            }
            SmootherKind::SymmetricGaussSeidel => Method::SymmetricGaussSeidel,
        };

        Self {
            matrix,
            method,
            sweeps: config.sweeps,
        }
    }

    /// Factor `matrix` for an exact coarse solve
    pub fn direct(matrix: Arc<CsrMatrix<T>>) -> Result<Self> {
        let lu = DenseLu::from_csr(&matrix)?;
        Ok(Self {
            matrix,
            method: Method::Direct(lu),
            sweeps: 1,
        })
    }

    /// Coarsest-level solver of the requested kind
    pub fn coarse_solver(matrix: Arc<CsrMatrix<T>>, kind: &CoarseSolverKind) -> Result<Self> {
        match kind {
            CoarseSolverKind::Direct => Self::direct(matrix),
            CoarseSolverKind::Smoother(config) => Ok(Self::relaxation(matrix, config)),
        }
    }

    /// Operator this smoother was built for
    pub fn matrix(&self) -> &Arc<CsrMatrix<T>> {
        &self.matrix
    }

    /// Whether this smoother solves exactly
    pub fn is_direct(&self) -> bool {
        matches!(self.method, Method::Direct(_))
    }

    /// Human readable summary
    pub fn description(&self) -> String {
        match &self.method {
            Method::Jacobi { omega, .. } => format!(
                "Jacobi {{omega = {:.4}, sweeps = {}}}",
                omega.re().to_f64().unwrap_or(f64::NAN),
                self.sweeps
            ),
            Method::L1Jacobi { .. } => format!("L1Jacobi {{sweeps = {}}}", self.sweeps),
            Method::SymmetricGaussSeidel => {
                format!("SymmetricGaussSeidel {{sweeps = {}}}", self.sweeps)
            }
            Method::Direct(lu) => format!("DenseLU {{dim = {}}}", lu.dim()),
        }
    }

    /// Improve `x` towards the solution of `A x = b`.
    ///
    /// With `zero_guess` the current content of `x` is ignored.
    pub fn apply(&self, x: &mut Vector<T>, b: &Vector<T>, zero_guess: bool) -> Result<()> {
        let n = self.matrix.num_rows;
        if x.len() != n || b.len() != n {
            return Err(MultigridError::IncompatibleOperands(format!(
                "smoother for {} rows applied to x with {} and b with {} entries",
                n,
                x.len(),
                b.len()
            )));
        }

        if let Method::Direct(lu) = &self.method {
            *x.values_mut() = lu.solve(b.values())?;
            return Ok(());
        }

        if zero_guess {
            x.put_scalar(T::zero());
        }

        let b = b.values();
        for _ in 0..self.sweeps {
            match &self.method {
                Method::Jacobi { omega, diag_inv } => {
                    self.jacobi_sweep(x.values_mut(), b, diag_inv, *omega)
                }
                Method::L1Jacobi { l1_inv } => {
                    self.jacobi_sweep(x.values_mut(), b, l1_inv, T::one())
                }
                Method::SymmetricGaussSeidel => self.gauss_seidel_sweep(x.values_mut(), b),
                Method::Direct(_) => {}
            }
        }
        Ok(())
    }

    /// x += scale * D^{-1} (b - A x)
    fn jacobi_sweep(&self, x: &mut Array1<T>, b: &Array1<T>, d_inv: &Array1<T>, scale: T) {
        let r = b - &self.matrix.matvec(x);
        let updates = parallel_map_indexed(x.len(), |i| scale * d_inv[i] * r[i]);
        for (xi, delta) in x.iter_mut().zip(updates) {
            *xi += delta;
        }
    }

    fn gauss_seidel_sweep(&self, x: &mut Array1<T>, b: &Array1<T>) {
        let n = x.len();
        for i in (0..n).chain((0..n).rev()) {
            self.relax_row(x, b, i);
        }
    }

    fn relax_row(&self, x: &mut Array1<T>, b: &Array1<T>, i: usize) {
        let tol = T::real(1e-15);
        let mut sum = b[i];
        let mut diag = T::zero();
        for (j, val) in self.matrix.row_entries(i) {
            if j == i {
                diag = val;
            } else {
                sum -= val * x[j];
            }
        }
        if diag.norm() > tol {
            x[i] = sum * diag.inv();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producers::coarsening::tests::create_1d_laplacian;
    use crate::traits::LinearOperator;
    use approx::assert_relative_eq;

    fn residual_norm(a: &CsrMatrix<f64>, x: &Vector<f64>, b: &Vector<f64>) -> f64 {
        a.residual(x, b).unwrap().norm2()
    }

    #[test]
    fn test_relaxation_reduces_residual() {
        let a = Arc::new(create_1d_laplacian(32));
        let b = Vector::from_values(Array1::from_elem(32, 1.0));

        for kind in [
            SmootherKind::Jacobi { omega: 0.6667 },
            SmootherKind::L1Jacobi,
            SmootherKind::SymmetricGaussSeidel,
        ] {
            let smoother = LevelSmoother::relaxation(a.clone(), &SmootherConfig { kind, sweeps: 3 });
            let mut x = Vector::zeros(a.domain_map());
            let before = residual_norm(&a, &x, &b);
            smoother.apply(&mut x, &b, true).unwrap();
            assert!(
                residual_norm(&a, &x, &b) < before,
                "{} did not reduce the residual",
                smoother.description()
            );
        }
    }

    #[test]
    fn test_zero_guess_ignores_content() {
        let a = Arc::new(create_1d_laplacian(8));
        let b = Vector::from_values(Array1::from_elem(8, 1.0));
        let smoother = LevelSmoother::relaxation(a.clone(), &SmootherConfig::default());

        let mut from_zero = Vector::zeros(a.domain_map());
        smoother.apply(&mut from_zero, &b, true).unwrap();

        let mut from_garbage = Vector::from_values(Array1::from_elem(8, 1e6));
        smoother.apply(&mut from_garbage, &b, true).unwrap();

        assert_eq!(from_zero, from_garbage);
    }

    #[test]
    fn test_direct_solves_exactly() {
        let a = Arc::new(create_1d_laplacian(10));
        let b = Vector::from_values(Array1::from_iter((0..10).map(|i| i as f64)));
        let solver = LevelSmoother::coarse_solver(a.clone(), &CoarseSolverKind::Direct).unwrap();
        assert!(solver.is_direct());

        let mut x = Vector::zeros(a.domain_map());
        solver.apply(&mut x, &b, false).unwrap();
        assert_relative_eq!(residual_norm(&a, &x, &b), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_size_mismatch() {
        let a = Arc::new(CsrMatrix::<f64>::identity(3));
        let smoother = LevelSmoother::relaxation(a, &SmootherConfig::default());
        let mut x = Vector::zeros(crate::map::Map::contiguous(2));
        let b = Vector::zeros(crate::map::Map::contiguous(3));
        assert!(matches!(
            smoother.apply(&mut x, &b, true),
            Err(MultigridError::IncompatibleOperands(_))
        ));
    }

    #[test]
    fn test_description() {
        let a = Arc::new(CsrMatrix::<f64>::identity(2));
        let jacobi = LevelSmoother::relaxation(a.clone(), &SmootherConfig::default());
        assert_eq!(jacobi.description(), "Jacobi {omega = 0.6667, sweeps = 1}");
        let lu = LevelSmoother::direct(a).unwrap();
        assert_eq!(lu.description(), "DenseLU {dim = 2}");
    }
}
