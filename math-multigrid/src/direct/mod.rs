//! Direct solvers
//!
//! Dense LU used as coarsest-level solver.

mod lu;

pub use lu::DenseLu;
