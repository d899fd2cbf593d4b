//! Multigrid hierarchy
//!
//! Owns the level chain and drives its construction (`setup`) and use
//! (`iterate`). Construction is lazy: the hierarchy requests the final
//! artifacts it needs on each level, producers declare and consume their
//! inputs, and intermediate data is dropped as soon as nobody needs it.
//!
//! # Example
//!
//! ```
//! use math_audio_multigrid::{CsrMatrix, CycleType, Hierarchy, LevelManager, Vector};
//! use ndarray::Array1;
//!
//! let n = 100;
//! let mut triplets = Vec::new();
//! for i in 0..n {
//!     triplets.push((i, i, 2.0));
//!     if i > 0 {
//!         triplets.push((i, i - 1, -1.0));
//!     }
//!     if i + 1 < n {
//!         triplets.push((i, i + 1, -1.0));
//!     }
//! }
//! let a = CsrMatrix::from_triplets(n, n, triplets);
//!
//! let mut hierarchy = Hierarchy::from_operator(a);
//! hierarchy.set_max_coarse_size(10);
//! hierarchy.setup(&LevelManager::default(), 0, 10).unwrap();
//! assert!(hierarchy.num_levels() > 1);
//!
//! let b = Vector::from_values(Array1::from_elem(n, 1.0));
//! let mut x = Vector::from_values(Array1::zeros(n));
//! hierarchy.iterate(&b, 5, &mut x, true, CycleType::V, 0).unwrap();
//! ```

mod chain;
mod iterate;
mod protocol;
mod report;
mod setup;

pub use chain::LevelChain;
pub use iterate::CycleType;
pub use report::{HierarchySummary, LevelSummary};

use crate::error::Result;
use crate::level::{ArtifactValue, KeepFlags, Level};
use crate::producers::{OPERATOR, ProducerId};
use crate::traits::ComplexField;
use std::path::{Path, PathBuf};

/// Default row count below which no further coarsening happens
pub const DEFAULT_MAX_COARSE_SIZE: usize = 50;

/// Multigrid hierarchy over scalar type `T`
#[derive(Debug, Clone)]
pub struct Hierarchy<T: ComplexField> {
    chain: LevelChain<T>,
    max_coarse_size: usize,
    implicit_transpose: bool,
    is_preconditioner: bool,
    dump_level: Option<usize>,
    dump_file: PathBuf,
}

impl<T: ComplexField> Default for Hierarchy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ComplexField> Hierarchy<T> {
    /// Hierarchy with an empty finest level
    pub fn new() -> Self {
        Self::with_finest_level(Level::new())
    }

    /// Hierarchy whose finest level is `level`
    pub fn with_finest_level(level: Level<T>) -> Self {
        Self {
            chain: LevelChain::new(level),
            max_coarse_size: DEFAULT_MAX_COARSE_SIZE,
            implicit_transpose: false,
            is_preconditioner: true,
            dump_level: None,
            dump_file: PathBuf::from("dep_graph.dot"),
        }
    }

    /// Hierarchy whose finest level holds the operator `a`
    pub fn from_operator(a: impl Into<ArtifactValue<T>>) -> Self {
        let mut level = Level::new();
        level.set(OPERATOR, a);
        Self::with_finest_level(level)
    }

    /// Row count at or below which a level becomes the coarsest
    pub fn max_coarse_size(&self) -> usize {
        self.max_coarse_size
    }

    /// Set the coarse-enough threshold
    pub fn set_max_coarse_size(&mut self, size: usize) {
        self.max_coarse_size = size;
    }

    /// Whether restriction uses P^T instead of a stored R
    pub fn implicit_transpose(&self) -> bool {
        self.implicit_transpose
    }

    /// Restrict with P^T instead of building R
    pub fn set_implicit_transpose(&mut self, implicit: bool) {
        self.implicit_transpose = implicit;
    }

    /// Whether the hierarchy is used inside a Krylov method
    pub fn is_preconditioner(&self) -> bool {
        self.is_preconditioner
    }

    /// As a preconditioner, the cycle does not report residuals
    pub fn set_is_preconditioner(&mut self, flag: bool) {
        self.is_preconditioner = flag;
    }

    /// Write the dependency graph of `level` and its coarse neighbour to `file`
    /// while `setup` runs
    pub fn enable_graph_dump(&mut self, level: usize, file: impl AsRef<Path>) {
        self.dump_level = Some(level);
        self.dump_file = file.as_ref().to_path_buf();
    }

    /// Stop writing the dependency graph
    pub fn disable_graph_dump(&mut self) {
        self.dump_level = None;
    }

    /// Number of levels
    pub fn num_levels(&self) -> usize {
        self.chain.len()
    }

    /// The level chain
    pub fn levels(&self) -> &LevelChain<T> {
        &self.chain
    }

    /// Level `id`, `PreconditionViolation` if it does not exist
    pub fn get_level(&self, id: usize) -> Result<&Level<T>> {
        self.chain.get(id)
    }

    /// Mutable level `id`
    pub fn get_level_mut(&mut self, id: usize) -> Result<&mut Level<T>> {
        self.chain.get_mut(id)
    }

    /// Append `level`, numbering it and linking it to the current coarsest level
    pub fn add_level(&mut self, level: Level<T>) -> usize {
        self.chain.add_level(level)
    }

    /// Append a level derived from the current coarsest one
    pub fn add_new_level(&mut self) -> usize {
        self.chain.add_new_level()
    }

    /// Keep `name` generated by `producer` on every level
    pub fn keep(&mut self, name: &str, producer: ProducerId) {
        for level in self.chain.iter_mut() {
            level.keep(name, producer);
        }
    }

    /// Drop every keep flag of `name` on every level
    pub fn delete(&mut self, name: &str, producer: ProducerId) {
        for level in self.chain.iter_mut() {
            level.delete(name, producer);
        }
    }

    /// Add keep flags on every level
    pub fn add_keep_flag(&mut self, name: &str, producer: ProducerId, flags: KeepFlags) {
        for level in self.chain.iter_mut() {
            level.add_keep_flag(name, producer, flags);
        }
    }

    /// Remove keep flags on every level
    pub fn remove_keep_flag(&mut self, name: &str, producer: ProducerId, flags: KeepFlags) {
        for level in self.chain.iter_mut() {
            level.remove_keep_flag(name, producer, flags);
        }
    }

    /// Short description, `Hierarchy{numLevels = N}`
    pub fn description(&self) -> String {
        format!("Hierarchy{{numLevels = {}}}", self.num_levels())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::CsrMatrix;

    #[test]
    fn test_defaults() {
        let h = Hierarchy::<f64>::new();
        assert_eq!(h.num_levels(), 1);
        assert_eq!(h.max_coarse_size(), 50);
        assert!(!h.implicit_transpose());
        assert!(h.is_preconditioner());
        assert_eq!(h.description(), "Hierarchy{numLevels = 1}");
    }

    #[test]
    fn test_keep_fans_out() {
        let mut h = Hierarchy::from_operator(CsrMatrix::<f64>::identity(4));
        h.add_new_level();
        h.keep("P", ProducerId::Prolongator);
        for level in h.levels().iter() {
            assert!(
                level
                    .keep_flags("P", ProducerId::Prolongator)
                    .contains(KeepFlags::KEEP)
            );
        }
        h.delete("P", ProducerId::Prolongator);
        for level in h.levels().iter() {
            assert!(level.keep_flags("P", ProducerId::Prolongator).is_empty());
        }
    }
}
