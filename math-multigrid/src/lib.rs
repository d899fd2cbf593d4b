//! Algebraic multigrid hierarchies with lazy, staged level construction
//!
//! A [`Hierarchy`] owns a chain of [`Level`]s, finest first. Each level is a
//! store of named artifacts (`A`, `P`, `R`, smoothers, intermediate data)
//! governed by explicit request counts: the hierarchy requests what the cycle
//! will need, producers declare and consume their inputs, and everything
//! nobody asked to keep is dropped as soon as its last consumer ran.
//!
//! # Features
//!
//! - **Setup**: level-by-level construction that stops when the coarse
//!   operator is small enough, unavailable, or no longer shrinks
//! - **Iterate**: recursive V- and W-cycles with map-checked operands
//! - **Producers**: Ruge-Stüben and PMIS coarsening, direct/standard/extended
//!   interpolation, Galerkin RAP, Jacobi, l1-Jacobi and symmetric Gauss-Seidel
//!   smoothing, dense LU coarse solves
//! - **Krylov**: the hierarchy as a [`Preconditioner`] for [`pcg`]
//! - **Generic Scalar Types**: Works with Complex64, Complex32, f64, f32
//!
//! # Example
//!
//! ```
//! use math_audio_multigrid::{CsrMatrix, HierarchyConfig, MultigridPreconditioner, CgConfig, pcg};
//! use ndarray::Array1;
//!
//! let n = 200;
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
//! let config = HierarchyConfig { max_coarse_size: 20, ..Default::default() };
//! let hierarchy = config.build_hierarchy(a.clone()).unwrap();
//! println!("{}", hierarchy.summary().unwrap());
//!
//! let precond = MultigridPreconditioner::new(hierarchy, config.cycle);
//! let b = Array1::from_elem(n, 1.0);
//! let solution = pcg(&a, &precond, &b, &CgConfig::default());
//! assert!(solution.converged);
//! ```

pub mod config;
pub mod direct;
pub mod error;
pub mod hierarchy;
pub mod iterative;
pub mod level;
pub mod map;
pub mod parallel;
pub mod preconditioner;
pub mod producers;
pub mod smoothers;
pub mod sparse;
pub mod traits;
pub mod vector;

// Re-export main types
pub use config::HierarchyConfig;
pub use error::{MultigridError, Result};
pub use hierarchy::{CycleType, Hierarchy, HierarchySummary, LevelChain, LevelSummary};
pub use level::{ArtifactValue, KeepFlags, Level};
pub use map::Map;
pub use preconditioner::MultigridPreconditioner;
pub use sparse::CsrMatrix;
pub use traits::{ComplexField, IdentityPreconditioner, LinearOperator, Preconditioner, Transpose};
pub use vector::Vector;

// Producers and their strategies
pub use producers::{
    COARSE_SOLVER, CoarseningKind, InterpolationKind, LevelManager, OPERATOR, POST_SMOOTHER,
    PRE_SMOOTHER, PROLONGATOR, ProducerId, RESTRICTOR, SMOOTHER, SPLITTING,
};
pub use smoothers::{CoarseSolverKind, LevelSmoother, SmootherConfig, SmootherKind};

// Krylov driver
pub use iterative::{CgConfig, CgSolution, pcg};
