/*!
# Coordinate Hit-and-Run

Moves along one coordinate axis per step, cycling through the axes in order (`0, 1, …, n-1, 0,
…`). The offset is drawn uniformly from the chord of the polytope through the current point
along that axis, so the proposal is symmetric and needs no Hastings correction.

The chord is bracketed using the slack vector `s = b - Ax`: with `d = A[:, k] ⊘ s`, the largest
feasible forward step is `1 / max(d)` and the largest backward step is `1 / min(d)`. The slack
vector is cached and updated incrementally when a proposal is accepted.
*/

use nalgebra::{DMatrix, DVector};
use rand::distributions::Open01;
use rand::Rng;

use crate::error::{Result, SamplerError};
use crate::polytope::Polytope;
use crate::proposal::Proposal;

/// The feasible offsets `[backward, forward]` along one axis. `backward < 0 < forward`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub backward: f64,
    pub forward: f64,
}

impl Bracket {
    pub fn width(&self) -> f64 {
        self.forward - self.backward
    }

    pub fn contains(&self, t: f64) -> bool {
        self.backward < t && t < self.forward
    }
}

/// Computes the chord through the point with slack vector `slacks` along `coordinate`.
///
/// Fails with [`SamplerError::DegenerateBracket`] if any slack is non-positive or the chord is
/// unbounded in either direction. Unbounded ends are reported as `±∞` in the error.
pub fn chord_bracket(
    a: &DMatrix<f64>,
    slacks: &DVector<f64>,
    coordinate: usize,
) -> Result<Bracket> {
    let degenerate = |backward, forward| SamplerError::DegenerateBracket {
        coordinate,
        backward,
        forward,
    };

    let mut max_inverse = f64::NEG_INFINITY;
    let mut min_inverse = f64::INFINITY;
    for (a_ik, s) in a.column(coordinate).iter().zip(slacks.iter()) {
        if !(*s > 0.0) {
            return Err(degenerate(0.0, 0.0));
        }
        // Infinite slack (an unconstrained row) yields 0 and never binds.
        let inverse_distance = a_ik / s;
        max_inverse = max_inverse.max(inverse_distance);
        min_inverse = min_inverse.min(inverse_distance);
    }

    let forward = if max_inverse > 0.0 {
        1.0 / max_inverse
    } else {
        f64::INFINITY
    };
    let backward = if min_inverse < 0.0 {
        1.0 / min_inverse
    } else {
        f64::NEG_INFINITY
    };
    if !forward.is_finite() || !backward.is_finite() || !(backward < forward) {
        return Err(degenerate(backward, forward));
    }
    Ok(Bracket { backward, forward })
}

/// Round-robin coordinate hit-and-run. Has no tunable parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateHitAndRun {
    /// Axis used by the next step.
    cursor: usize,
    a: DMatrix<f64>,
    b: DVector<f64>,
    slacks: DVector<f64>,
    pending: Option<(usize, f64)>,
}

impl Default for CoordinateHitAndRun {
    fn default() -> Self {
        Self {
            cursor: 0,
            a: DMatrix::zeros(0, 0),
            b: DVector::zeros(0),
            slacks: DVector::zeros(0),
            pending: None,
        }
    }
}

impl CoordinateHitAndRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// The axis the next call to [`propose`](Self::propose) will move along.
    pub fn next_coordinate(&self) -> usize {
        self.cursor
    }

    /// Copies the constraint system, caches the slack at `state` and rewinds to axis 0.
    pub fn reset(&mut self, polytope: &Polytope, state: &DVector<f64>) {
        self.a = polytope.matrix().clone();
        self.b = polytope.vector().clone();
        self.slacks = &self.b - &self.a * state;
        self.cursor = 0;
        self.pending = None;
    }

    /// The chord through the current state along `coordinate`.
    pub fn bracket(&self, coordinate: usize) -> Result<Bracket> {
        chord_bracket(&self.a, &self.slacks, coordinate)
    }

    pub fn propose<R: Rng + ?Sized>(
        &mut self,
        state: &DVector<f64>,
        rng: &mut R,
    ) -> Result<Proposal> {
        let n = self.a.ncols();
        if n == 0 || state.len() != n {
            return Err(SamplerError::DimensionMismatch {
                expected: n,
                found: state.len(),
            });
        }
        let coordinate = self.cursor;
        self.cursor = (self.cursor + 1) % n;
        self.pending = None;

        let bracket = self.bracket(coordinate)?;
        // Open interval: the chord's endpoints lie on a face.
        let u: f64 = rng.sample(Open01);
        let step = bracket.backward + u * bracket.width();
        if !bracket.contains(step) {
            return Err(SamplerError::DegenerateBracket {
                coordinate,
                backward: bracket.backward,
                forward: bracket.forward,
            });
        }

        let mut point = state.clone();
        point[coordinate] += step;
        self.pending = Some((coordinate, point[coordinate] - state[coordinate]));

        Ok(Proposal {
            point,
            coordinate: Some(coordinate),
            metric: None,
        })
    }

    /// Moves the cached slack to the accepted proposal.
    pub fn accept(&mut self, proposal: &Proposal) {
        match self.pending.take() {
            Some((coordinate, delta)) => {
                self.slacks -= self.a.column(coordinate) * delta;
            }
            None => {
                self.slacks = &self.b - &self.a * &proposal.point;
            }
        }
    }
}
