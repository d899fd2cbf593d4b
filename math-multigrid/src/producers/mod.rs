//! Artifact producers
//!
//! A producer computes one or more named artifacts for a level. The set of
//! producers is closed: [`ProducerId`] enumerates them, and the strategy each
//! one follows is picked by the [`LevelManager`] attached to the level it runs
//! on.
//!
//! Producers never call each other. Their inputs are declared statically by
//! [`ProducerId::inputs`] and resolved by the hierarchy's request/build
//! protocol, which builds missing inputs first and releases them afterwards.
//!
//! | producer          | runs on | outputs                       |
//! |-------------------|---------|-------------------------------|
//! | `Coarsening`      | fine    | `Splitting`                   |
//! | `Prolongator`     | coarse  | `P`                           |
//! | `Restrictor`      | coarse  | `R`                           |
//! | `Rap`             | coarse  | `A`                           |
//! | `Smoother`        | level   | `PreSmoother`, `PostSmoother` |
//! | `CoarseSolver`    | level   | `PreSmoother`                 |
//! | `TopRap`          | coarse  | final `A`, `P`, `R`           |
//! | `TopSmoother`     | level   | final smoothers               |
//! | `TopCoarseSolver` | level   | final `PreSmoother`           |

pub mod coarsening;
pub mod interpolation;
pub mod rap;

pub use coarsening::{CoarseSplitting, CoarseningKind, PointType};
pub use interpolation::{InterpolationKind, InterpolationSettings};

use crate::error::{MultigridError, Result};
use crate::smoothers::{CoarseSolverKind, SmootherConfig, SmootherKind};
use serde::{Deserialize, Serialize};

/// System operator
pub const OPERATOR: &str = "A";
/// Prolongator, coarse to fine
pub const PROLONGATOR: &str = "P";
/// Restrictor, fine to coarse
pub const RESTRICTOR: &str = "R";
/// Smoother applied before the coarse-grid correction
pub const PRE_SMOOTHER: &str = "PreSmoother";
/// Smoother applied after the coarse-grid correction
pub const POST_SMOOTHER: &str = "PostSmoother";
/// C/F splitting of a level
pub const SPLITTING: &str = "Splitting";
/// Request handle of [`ProducerId::TopSmoother`]
pub const SMOOTHER: &str = "Smoother";
/// Request handle of [`ProducerId::TopCoarseSolver`]
pub const COARSE_SOLVER: &str = "CoarseSolver";

/// Identifies who generated an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProducerId {
    /// User data and final artifacts published for the cycle
    NoFactory,
    /// C/F splitting of the fine operator
    Coarsening,
    /// Interpolation from the splitting
    Prolongator,
    /// Transpose of the prolongator
    Restrictor,
    /// Galerkin product R A P
    Rap,
    /// Relaxation smoother on intermediate levels
    Smoother,
    /// Solver on the coarsest level
    CoarseSolver,
    /// Publishes the coarse operator and transfer operators
    TopRap,
    /// Publishes the level smoothers
    TopSmoother,
    /// Publishes the coarsest-level solver
    TopCoarseSolver,
}

/// Where an input lives relative to the level a producer runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLevel {
    /// The level itself
    Same,
    /// Its finer neighbour
    Fine,
}

/// One artifact a producer consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Input {
    /// Level holding the artifact
    pub at: InputLevel,
    /// Artifact name
    pub name: &'static str,
    /// Producer expected to generate it
    pub producer: ProducerId,
}

impl Input {
    const fn same(name: &'static str, producer: ProducerId) -> Self {
        Self {
            at: InputLevel::Same,
            name,
            producer,
        }
    }

    const fn fine(name: &'static str, producer: ProducerId) -> Self {
        Self {
            at: InputLevel::Fine,
            name,
            producer,
        }
    }
}

impl ProducerId {
    /// Short label used in logs and graph dumps
    pub fn label(&self) -> &'static str {
        match self {
            ProducerId::NoFactory => "NoFactory",
            ProducerId::Coarsening => "CoarseningFactory",
            ProducerId::Prolongator => "ProlongatorFactory",
            ProducerId::Restrictor => "RestrictorFactory",
            ProducerId::Rap => "RAPFactory",
            ProducerId::Smoother => "SmootherFactory",
            ProducerId::CoarseSolver => "CoarseSolverFactory",
            ProducerId::TopRap => "TopRAPFactory",
            ProducerId::TopSmoother => "TopSmootherFactory",
            ProducerId::TopCoarseSolver => "TopCoarseSolverFactory",
        }
    }

    /// Name under which the hierarchy requests a top producer
    pub fn handle(&self) -> Option<&'static str> {
        match self {
            ProducerId::TopRap => Some(OPERATOR),
            ProducerId::TopSmoother => Some(SMOOTHER),
            ProducerId::TopCoarseSolver => Some(COARSE_SOLVER),
            _ => None,
        }
    }

    /// Artifacts this producer needs before it can run
    pub fn inputs(&self, implicit_transpose: bool) -> Vec<Input> {
        use ProducerId::*;
        match self {
            NoFactory => Vec::new(),
            Coarsening => vec![Input::same(OPERATOR, NoFactory)],
            Prolongator => vec![
                Input::fine(OPERATOR, NoFactory),
                Input::fine(SPLITTING, Coarsening),
            ],
            Restrictor => vec![Input::same(PROLONGATOR, Prolongator)],
            Rap => {
                let mut inputs = vec![
                    Input::fine(OPERATOR, NoFactory),
                    Input::same(PROLONGATOR, Prolongator),
                ];
                if !implicit_transpose {
                    inputs.push(Input::same(RESTRICTOR, Restrictor));
                }
                inputs
            }
            Smoother | CoarseSolver => vec![Input::same(OPERATOR, NoFactory)],
            TopRap => {
                let mut inputs = vec![
                    Input::same(OPERATOR, Rap),
                    Input::same(PROLONGATOR, Prolongator),
                ];
                if !implicit_transpose {
                    inputs.push(Input::same(RESTRICTOR, Restrictor));
                }
                inputs
            }
            TopSmoother => vec![
                Input::same(PRE_SMOOTHER, Smoother),
                Input::same(POST_SMOOTHER, Smoother),
            ],
            TopCoarseSolver => vec![Input::same(PRE_SMOOTHER, CoarseSolver)],
        }
    }
}

/// Strategy choices for the producers of one level
///
/// # Example
///
/// ```
/// use math_audio_multigrid::LevelManager;
///
/// let manager = LevelManager::for_fem();
/// assert!(manager.smoother.is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelManager {
    /// C/F splitting algorithm
    pub coarsening: CoarseningKind,

    /// Strong connection threshold θ.
    /// Connections with |a_ij| >= θ * max_k |a_ik| are considered strong
    pub strong_threshold: f64,

    /// Interpolation operator type
    pub interpolation: InterpolationKind,

    /// Truncation factor for interpolation (drop small weights)
    pub trunc_factor: f64,

    /// Maximum interpolation stencil size per row
    pub max_interp_elements: usize,

    /// Smoother for intermediate levels; `None` leaves them unsmoothed
    pub smoother: Option<SmootherConfig>,

    /// Solver for the coarsest level; `None` leaves it without solver
    pub coarse_solver: Option<CoarseSolverKind>,

    /// Largest coarse operator factored densely. Bigger ones are relaxed
    /// instead, which happens when the level count runs out or coarsening stalls
    pub max_direct_size: usize,
}

/// Default bound on dense coarse factorizations
pub const DEFAULT_MAX_DIRECT_SIZE: usize = 2000;

impl Default for LevelManager {
    fn default() -> Self {
        Self {
            coarsening: CoarseningKind::default(),
            strong_threshold: 0.25,
            interpolation: InterpolationKind::default(),
            trunc_factor: 0.0,
            max_interp_elements: 4,
            smoother: Some(SmootherConfig::default()),
            coarse_solver: Some(CoarseSolverKind::Direct),
            max_direct_size: DEFAULT_MAX_DIRECT_SIZE,
        }
    }
}

impl LevelManager {
    /// Denser operators, as produced by boundary element discretizations
    pub fn for_bem() -> Self {
        Self {
            strong_threshold: 0.5,
            coarsening: CoarseningKind::Pmis,
            smoother: Some(SmootherConfig {
                kind: SmootherKind::L1Jacobi,
                sweeps: 1,
            }),
            max_interp_elements: 6,
            ..Default::default()
        }
    }

    /// Sparse finite element operators
    pub fn for_fem() -> Self {
        Self {
            coarsening: CoarseningKind::RugeStuben,
            smoother: Some(SmootherConfig {
                kind: SmootherKind::SymmetricGaussSeidel,
                sweeps: 1,
            }),
            ..Default::default()
        }
    }

    /// Fully parallel coarsening and relaxation
    pub fn for_parallel() -> Self {
        Self {
            coarsening: CoarseningKind::Pmis,
            smoother: Some(SmootherConfig {
                kind: SmootherKind::Jacobi { omega: 0.8 },
                sweeps: 2,
            }),
            ..Default::default()
        }
    }

    /// Ill-conditioned problems
    pub fn for_difficult_problems() -> Self {
        Self {
            interpolation: InterpolationKind::Extended,
            smoother: Some(SmootherConfig {
                kind: SmootherKind::SymmetricGaussSeidel,
                sweeps: 2,
            }),
            max_interp_elements: 8,
            ..Default::default()
        }
    }

    /// Interpolation part of this manager
    pub fn interpolation_settings(&self) -> InterpolationSettings {
        InterpolationSettings {
            kind: self.interpolation,
            trunc_factor: self.trunc_factor,
            max_elements: self.max_interp_elements,
        }
    }

    /// Reject settings no producer can work with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.strong_threshold) {
            return Err(MultigridError::PreconditionViolation(format!(
                "strong threshold must lie in [0, 1], got {}",
                self.strong_threshold
            )));
        }
        if self.trunc_factor < 0.0 {
            return Err(MultigridError::PreconditionViolation(format!(
                "truncation factor must be non-negative, got {}",
                self.trunc_factor
            )));
        }
        if self.max_interp_elements == 0 {
            return Err(MultigridError::PreconditionViolation(
                "interpolation stencil must keep at least one element".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rap_inputs_follow_transpose_mode() {
        let explicit = ProducerId::Rap.inputs(false);
        assert_eq!(explicit.len(), 3);
        assert!(explicit.iter().any(|i| i.name == RESTRICTOR));

        let implicit = ProducerId::Rap.inputs(true);
        assert_eq!(implicit.len(), 2);
        assert!(implicit.iter().all(|i| i.name != RESTRICTOR));
    }

    #[test]
    fn test_prolongator_reads_fine_level() {
        let inputs = ProducerId::Prolongator.inputs(false);
        assert!(inputs.iter().all(|i| i.at == InputLevel::Fine));
    }

    #[test]
    fn test_handles() {
        assert_eq!(ProducerId::TopRap.handle(), Some(OPERATOR));
        assert_eq!(ProducerId::TopSmoother.handle(), Some(SMOOTHER));
        assert_eq!(ProducerId::Rap.handle(), None);
        assert_eq!(ProducerId::TopCoarseSolver.handle(), Some(COARSE_SOLVER));
        assert_eq!(ProducerId::CoarseSolver.handle(), None);
    }

    #[test]
    fn test_smoother_kind_serialization() {
        let manager = LevelManager::for_parallel();
        let json = serde_json::to_string(&manager).unwrap();
        assert!(json.contains(r#""Jacobi":{"omega":0.8}"#));
        let loaded: LevelManager = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, manager);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let manager: LevelManager =
            serde_json::from_str(r#"{ "coarsening": "Pmis", "smoother": null }"#).unwrap();
        assert_eq!(manager.coarsening, CoarseningKind::Pmis);
        assert!(manager.smoother.is_none());
        assert_eq!(manager.coarse_solver, Some(CoarseSolverKind::Direct));
    }

    #[test]
    fn test_validate() {
        let manager = LevelManager {
            strong_threshold: 1.5,
            ..Default::default()
        };
        assert!(manager.validate().is_err());
        assert!(LevelManager::default().validate().is_ok());
    }
}
