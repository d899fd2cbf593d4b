//! Multigrid hierarchy as a Krylov preconditioner

use crate::hierarchy::{CycleType, Hierarchy};
use crate::traits::{ComplexField, Preconditioner};
use crate::vector::Vector;
use ndarray::Array1;

/// One multigrid cycle per application, from a zero initial guess
#[derive(Debug, Clone)]
pub struct MultigridPreconditioner<T: ComplexField> {
    hierarchy: Hierarchy<T>,
    cycle: CycleType,
    cycles: usize,
}

impl<T: ComplexField> MultigridPreconditioner<T> {
    /// Wrap a built hierarchy. Residual reporting is switched off.
    pub fn new(mut hierarchy: Hierarchy<T>, cycle: CycleType) -> Self {
        hierarchy.set_is_preconditioner(true);
        Self {
            hierarchy,
            cycle,
            cycles: 1,
        }
    }

    /// Apply `cycles` cycles per application instead of one
    pub fn with_cycles(mut self, cycles: usize) -> Self {
        self.cycles = cycles.max(1);
        self
    }

    /// The wrapped hierarchy
    pub fn hierarchy(&self) -> &Hierarchy<T> {
        &self.hierarchy
    }

    /// Cycle shape
    pub fn cycle(&self) -> CycleType {
        self.cycle
    }

    /// Give the hierarchy back
    pub fn into_hierarchy(self) -> Hierarchy<T> {
        self.hierarchy
    }
}

impl<T: ComplexField> Preconditioner<T> for MultigridPreconditioner<T> {
    fn apply(&self, r: &Array1<T>) -> Array1<T> {
        let b = Vector::from_values(r.clone());
        let mut z = Vector::from_values(Array1::from_elem(r.len(), T::zero()));

        match self
            .hierarchy
            .iterate(&b, self.cycles, &mut z, true, self.cycle, 0)
        {
            Ok(()) => z.into_values(),
            Err(err) => {
                log::error!("Multigrid cycle failed, falling back to identity: {err}");
                r.clone()
            }
        }
    }
}
