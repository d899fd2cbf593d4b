//! Error types for hierarchy construction and cycling
//!
//! Every failure is surfaced synchronously to the caller. Nothing is retried
//! internally; soft anomalies (a level without smoother, a hierarchy without
//! coarse solver) are logged as warnings instead of being reported here.

use crate::producers::ProducerId;
use thiserror::Error;

/// Result type alias using [`MultigridError`]
pub type Result<T> = std::result::Result<T, MultigridError>;

/// Errors raised by the level store, the setup protocol and the cycle
#[derive(Error, Debug)]
pub enum MultigridError {
    /// A caller-supplied argument or a required input is invalid
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    /// The level chain or the request bookkeeping lost its invariants
    #[error("Structural inconsistency: {0}")]
    StructuralInconsistency(String),

    /// Operator and vector maps do not match
    #[error("Incompatible operands: {0}")]
    IncompatibleOperands(String),

    /// An artifact was read before anything produced it
    #[error(
        "Artifact '{name}' generated by {producer:?} is not available on {}",
        level_label(.level)
    )]
    NotAvailable {
        /// Artifact name
        name: String,
        /// Producer that should have generated it
        producer: ProducerId,
        /// Level id, if the level is numbered
        level: Option<usize>,
    },

    /// An artifact exists but holds a different kind of value
    #[error("Artifact '{name}' does not hold a {expected}")]
    ArtifactKind {
        /// Artifact name
        name: String,
        /// Kind requested by the caller
        expected: &'static str,
    },

    /// The coarse operator could not be factored
    #[error("Coarse operator is singular or nearly singular (pivot {pivot})")]
    SingularOperator {
        /// Column at which elimination broke down
        pivot: usize,
    },

    /// Failure while writing diagnostic output
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure while reading or writing a configuration
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

fn level_label(level: &Option<usize>) -> String {
    match level {
        Some(id) => format!("level {id}"),
        None => "an unnumbered level".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_available_message() {
        let err = MultigridError::NotAvailable {
            name: "P".to_string(),
            producer: ProducerId::Prolongator,
            level: Some(2),
        };
        assert_eq!(
            err.to_string(),
            "Artifact 'P' generated by Prolongator is not available on level 2"
        );

        let err = MultigridError::NotAvailable {
            name: "A".to_string(),
            producer: ProducerId::NoFactory,
            level: None,
        };
        assert_eq!(
            err.to_string(),
            "Artifact 'A' generated by NoFactory is not available on an unnumbered level"
        );
    }

    #[test]
    fn test_incompatible_message() {
        let err = MultigridError::IncompatibleOperands(
            "Level 1: level A's domain map is not compatible with X".to_string(),
        );
        assert_eq!(
            err.to_string(),
            "Incompatible operands: Level 1: level A's domain map is not compatible with X"
        );
    }
}
