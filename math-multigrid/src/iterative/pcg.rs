//! Preconditioned Conjugate Gradient
//!
//! Only correct for symmetric positive definite operators and preconditioners.
//! A multigrid V-cycle with symmetric smoothing qualifies.

use crate::traits::{ComplexField, LinearOperator, Preconditioner};
use ndarray::Array1;
use num_traits::{Float, ToPrimitive, Zero};

/// PCG configuration
#[derive(Debug, Clone)]
pub struct CgConfig<R> {
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Relative tolerance on the unpreconditioned residual
    pub tolerance: R,
    /// Log progress every N iterations (0 = no output)
    pub print_interval: usize,
}

impl Default for CgConfig<f64> {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-6,
            print_interval: 0,
        }
    }
}

/// PCG result
#[derive(Debug)]
pub struct CgSolution<T: ComplexField> {
    /// Solution vector
    pub x: Array1<T>,
    /// Number of iterations
    pub iterations: usize,
    /// Final relative residual
    pub residual: T::Real,
    /// Whether convergence was achieved
    pub converged: bool,
}

/// Solve `A x = b` with Conjugate Gradient preconditioned by `precond`
pub fn pcg<T, A, P>(
    operator: &A,
    precond: &P,
    b: &Array1<T>,
    config: &CgConfig<T::Real>,
) -> CgSolution<T>
where
    T: ComplexField,
    A: LinearOperator<T>,
    P: Preconditioner<T>,
{
    let n = b.len();
    let mut x = Array1::from_elem(n, T::zero());

    let b_norm = vector_norm(b);
    if b_norm < T::real(1e-15) {
        return CgSolution {
            x,
            iterations: 0,
            residual: T::Real::zero(),
            converged: true,
        };
    }

    let breakdown = T::real(1e-30);
    let mut r = b.clone();
    let mut z = precond.apply(&r);
    let mut p = z.clone();
    let mut rho = inner_product(&r, &z);

    for iter in 0..config.max_iterations {
        let q = operator.apply(&p);

        let pq = inner_product(&p, &q);
        if pq.norm() < breakdown {
            return CgSolution {
                x,
                iterations: iter,
                residual: vector_norm(&r) / b_norm,
                converged: false,
            };
        }
        let alpha = rho / pq;

        x.scaled_add(alpha, &p);
        r.scaled_add(-alpha, &q);

        let rel_residual = vector_norm(&r) / b_norm;
        if config.print_interval > 0 && (iter + 1) % config.print_interval == 0 {
            log::info!(
                "PCG iteration {}: relative residual = {:.6e}",
                iter + 1,
                rel_residual.to_f64().unwrap_or(0.0)
            );
        }
        if rel_residual < config.tolerance {
            return CgSolution {
                x,
                iterations: iter + 1,
                residual: rel_residual,
                converged: true,
            };
        }

        z = precond.apply(&r);
        let rho_new = inner_product(&r, &z);
        if rho.norm() < breakdown {
            return CgSolution {
                x,
                iterations: iter + 1,
                residual: rel_residual,
                converged: false,
            };
        }
        let beta = rho_new / rho;
        rho = rho_new;

        p = &z + &p.mapv(|pi| pi * beta);
    }

    let rel_residual = vector_norm(&r) / b_norm;
    log::warn!(
        "PCG did not converge in {} iterations (relative residual {:.3e})",
        config.max_iterations,
        rel_residual.to_f64().unwrap_or(0.0)
    );
    CgSolution {
        x,
        iterations: config.max_iterations,
        residual: rel_residual,
        converged: false,
    }
}

#[inline]
fn inner_product<T: ComplexField>(x: &Array1<T>, y: &Array1<T>) -> T {
    x.iter()
        .zip(y.iter())
        .fold(T::zero(), |acc, (&xi, &yi)| acc + xi.conj() * yi)
}

#[inline]
fn vector_norm<T: ComplexField>(x: &Array1<T>) -> T::Real {
    x.iter()
        .map(|xi| xi.norm_sqr())
        .fold(T::Real::zero(), |acc, v| acc + v)
        .sqrt()
}
