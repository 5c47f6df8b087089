//! The closed set of proposal strategies and the per-step [`Proposal`] they produce.
//!
//! [`ProposalStrategy`] is an enum rather than a trait object so the driver's accept/reject
//! logic is checked exhaustively against every variant. [`ProposalKind`] is the table of
//! registered variants, used to build a default-configured strategy by name.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use std::fmt;
use std::str::FromStr;

use crate::coordinate_hit_and_run::CoordinateHitAndRun;
use crate::dikin::DikinWalk;
use crate::error::{Result, SamplerError};
use crate::polytope::Polytope;

/// A candidate produced by one step. Dropped once the step is decided, except for what the
/// events carry.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub point: DVector<f64>,
    /// Axis moved by coordinate hit-and-run.
    pub coordinate: Option<usize>,
    /// Proposal covariance at the current state, for metric-based strategies.
    pub metric: Option<DMatrix<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProposalKind {
    CoordinateHitAndRun,
    DikinWalk,
}

impl ProposalKind {
    pub const ALL: [ProposalKind; 2] = [ProposalKind::CoordinateHitAndRun, ProposalKind::DikinWalk];

    pub fn name(&self) -> &'static str {
        match self {
            ProposalKind::CoordinateHitAndRun => "CoordinateHitAndRun",
            ProposalKind::DikinWalk => "DikinWalk",
        }
    }

    /// Whether `q(x' | x) = q(x | x')`, i.e. no Hastings correction is needed.
    pub fn is_symmetric(&self) -> bool {
        matches!(self, ProposalKind::CoordinateHitAndRun)
    }
}

impl fmt::Display for ProposalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProposalKind {
    type Err = SamplerError;

    fn from_str(s: &str) -> Result<Self> {
        ProposalKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                SamplerError::InvalidParameter(format!(
                    "unknown proposal '{s}', expected one of {:?}",
                    ProposalKind::ALL.map(|kind| kind.name())
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProposalStrategy {
    CoordinateHitAndRun(CoordinateHitAndRun),
    DikinWalk(DikinWalk),
}

impl ProposalStrategy {
    pub fn from_kind(kind: ProposalKind) -> Self {
        match kind {
            ProposalKind::CoordinateHitAndRun => CoordinateHitAndRun::new().into(),
            ProposalKind::DikinWalk => DikinWalk::default().into(),
        }
    }

    pub fn kind(&self) -> ProposalKind {
        match self {
            ProposalStrategy::CoordinateHitAndRun(_) => ProposalKind::CoordinateHitAndRun,
            ProposalStrategy::DikinWalk(_) => ProposalKind::DikinWalk,
        }
    }

    /// Loads the constraint system and clears all strategy-local state.
    pub fn reset(&mut self, polytope: &Polytope, state: &DVector<f64>) {
        match self {
            ProposalStrategy::CoordinateHitAndRun(walk) => walk.reset(polytope, state),
            ProposalStrategy::DikinWalk(walk) => walk.reset(polytope, state),
        }
    }

    pub fn propose<R: Rng + ?Sized>(
        &mut self,
        state: &DVector<f64>,
        rng: &mut R,
    ) -> Result<Proposal> {
        match self {
            ProposalStrategy::CoordinateHitAndRun(walk) => walk.propose(state, rng),
            ProposalStrategy::DikinWalk(walk) => walk.propose(state, rng),
        }
    }

    /// `log q(x | x') − log q(x' | x)`. Only called for interior candidates.
    pub fn log_hastings_correction(
        &mut self,
        state: &DVector<f64>,
        proposal: &Proposal,
    ) -> Result<f64> {
        match self {
            ProposalStrategy::CoordinateHitAndRun(_) => Ok(0.0),
            ProposalStrategy::DikinWalk(walk) => walk.log_hastings_correction(state, proposal),
        }
    }

    pub fn accept(&mut self, proposal: &Proposal) {
        match self {
            ProposalStrategy::CoordinateHitAndRun(walk) => walk.accept(proposal),
            ProposalStrategy::DikinWalk(walk) => walk.accept(proposal),
        }
    }
}

impl From<CoordinateHitAndRun> for ProposalStrategy {
    fn from(walk: CoordinateHitAndRun) -> Self {
        ProposalStrategy::CoordinateHitAndRun(walk)
    }
}

impl From<DikinWalk> for ProposalStrategy {
    fn from(walk: DikinWalk) -> Self {
        ProposalStrategy::DikinWalk(walk)
    }
}

impl From<ProposalKind> for ProposalStrategy {
    fn from(kind: ProposalKind) -> Self {
        ProposalStrategy::from_kind(kind)
    }
}
