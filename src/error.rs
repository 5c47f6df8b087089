//! Error type shared by the polytope, the proposal strategies and the chain driver.

use thiserror::Error;

/// Everything that can abort a sampler operation.
///
/// A failing [`step`](crate::metropolis_hastings::ChainDriver::step) leaves the chain untouched
/// and emits no events; retrying (another coordinate, a smaller `sigma`, a new start) is up to
/// the caller.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplerError {
    #[error("starting point is not interior to the polytope (smallest slack {worst_slack})")]
    InfeasibleStart { worst_slack: f64 },

    #[error(
        "degenerate chord along coordinate {coordinate}: [{backward}, {forward}]. \
         Try constraining the polytope with upper and lower bounds."
    )]
    DegenerateBracket {
        coordinate: usize,
        backward: f64,
        forward: f64,
    },

    #[error("Dikin ellipsoid is not positive definite: {reason}")]
    SingularEllipsoid { reason: String },

    #[error("log-density oracle returned an invalid value ({value})")]
    OracleError { value: f64 },

    #[error("invalid polytope: {0}")]
    InvalidPolytope(String),

    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, SamplerError>;
