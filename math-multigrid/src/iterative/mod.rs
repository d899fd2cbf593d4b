//! Krylov solvers driven by a multigrid preconditioner
//!
//! - [`pcg`]: preconditioned Conjugate Gradient, for symmetric positive definite systems

mod pcg;

pub use pcg::{CgConfig, CgSolution, pcg};
