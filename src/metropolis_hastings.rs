/*!
# Metropolis–Hastings Chain Driver

[`ChainDriver`] owns one chain on a polytope and advances it with a [`ProposalStrategy`]. Each
call to [`ChainDriver::step`]:

1. asks the strategy for a candidate `x'`,
2. vetoes it (log acceptance ratio `-∞`) if the interior predicate rejects it, without touching
   the log-density oracle,
3. otherwise evaluates the oracle at the current state and then at the candidate, adds the
   strategy's Hastings correction and accepts iff `log α > ln u` with `u ~ Uniform(0, 1)`,
4. appends the new state (the previous one again on rejection) and pushes a
   [`StepEvent::Proposal`] followed by [`StepEvent::Accept`] or [`StepEvent::Reject`].

A step that fails leaves the chain untouched and emits nothing.

## Example Usage

```rust
use polytope_mcmc::distributions::Uniform;
use polytope_mcmc::events::StepEvent;
use polytope_mcmc::metropolis_hastings::ChainDriver;
use polytope_mcmc::polytope::Polytope;
use polytope_mcmc::proposal::ProposalKind;

let polytope = Polytope::from_bounds(&[-3.5, -1.5], &[3.5, 1.5]).unwrap();
let mut driver = ChainDriver::new(
    polytope,
    ProposalKind::CoordinateHitAndRun,
    Uniform,
    &[-0.1, -0.1],
)
.unwrap()
.set_seed(42);

let mut events: Vec<StepEvent> = Vec::new();
let outcome = driver.step(&mut events).unwrap();
assert!(outcome.accepted);
assert_eq!(driver.chain().len(), 2);
assert_eq!(events.len(), 2);
```
*/

use nalgebra::{DMatrix, DVector};
use ndarray::Array2;
use rand::prelude::*;
use tracing::{debug, info, warn};

use crate::core::MarkovChain;
use crate::distributions::TargetDistribution;
use crate::error::{Result, SamplerError};
use crate::events::{EventSink, StepEvent};
use crate::polytope::{InteriorPredicate, Polytope};
use crate::proposal::{Proposal, ProposalStrategy};
use crate::stats::{ChainStats, ChainTracker};

/// What a completed step decided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub accepted: bool,
    /// `-∞` for candidates outside the interior.
    pub log_accept_ratio: f64,
}

/// The Metropolis–Hastings decision: accept iff `log_accept_ratio > ln u`.
pub fn accept_move(log_accept_ratio: f64, u: f64) -> bool {
    log_accept_ratio > u.ln()
}

/**
A single Markov chain on a polytope.

# Type Parameters
- `D`: The target density. Must implement [`TargetDistribution`].
- `F`: The interior predicate used to veto candidates. Defaults to the polytope itself.
*/
#[derive(Debug, Clone)]
pub struct ChainDriver<D, F = Polytope> {
    /// The log-density oracle.
    pub target: D,
    polytope: Polytope,
    interior: F,
    strategy: ProposalStrategy,
    chain: Vec<DVector<f64>>,
    tracker: ChainTracker,
    /// The seed of `rng`.
    pub seed: u64,
    /// The random number generator for this chain.
    pub rng: SmallRng,
}

impl<D> ChainDriver<D, Polytope>
where
    D: TargetDistribution,
{
    /**
    Creates a driver whose chain is `[initial_state]`, with the polytope as interior predicate.

    Fails with [`SamplerError::InfeasibleStart`] if `initial_state` is not interior, or
    [`SamplerError::DimensionMismatch`] if its length differs from the polytope dimension.
    */
    pub fn new(
        polytope: Polytope,
        strategy: impl Into<ProposalStrategy>,
        target: D,
        initial_state: &[f64],
    ) -> Result<Self> {
        let interior = polytope.clone();
        let seed = thread_rng().gen::<u64>();
        let mut driver = Self {
            target,
            polytope,
            interior,
            strategy: strategy.into(),
            chain: Vec::new(),
            tracker: ChainTracker::new(initial_state),
            seed,
            rng: SmallRng::seed_from_u64(seed),
        };
        driver.reset(initial_state)?;
        Ok(driver)
    }
}

impl<D, F> ChainDriver<D, F>
where
    D: TargetDistribution,
    F: InteriorPredicate,
{
    /// Replaces the interior predicate and restarts the chain at its current state, which must
    /// satisfy the new predicate.
    pub fn with_interior_predicate<G: InteriorPredicate>(
        self,
        interior: G,
    ) -> Result<ChainDriver<D, G>> {
        let start = self.current_state().clone();
        let mut driver = ChainDriver {
            target: self.target,
            polytope: self.polytope,
            interior,
            strategy: self.strategy,
            chain: Vec::new(),
            tracker: self.tracker,
            seed: self.seed,
            rng: self.rng,
        };
        driver.reset(start.as_slice())?;
        Ok(driver)
    }

    /// Reseeds the random number generator.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Discards the history and restarts the chain at `initial_state`.
    ///
    /// On error the driver is left unchanged.
    pub fn reset(&mut self, initial_state: &[f64]) -> Result<()> {
        let dim = self.polytope.dim();
        if initial_state.len() != dim {
            return Err(SamplerError::DimensionMismatch {
                expected: dim,
                found: initial_state.len(),
            });
        }
        if !self.interior.is_interior(initial_state)
            || !self.polytope.is_strictly_interior(initial_state)
        {
            let worst_slack = self.polytope.worst_slack(initial_state)?;
            return Err(SamplerError::InfeasibleStart { worst_slack });
        }

        let start = DVector::from_column_slice(initial_state);
        self.strategy.reset(&self.polytope, &start);
        self.chain.clear();
        self.chain.push(start);
        self.tracker = ChainTracker::new(initial_state);
        info!(
            strategy = %self.strategy.kind(),
            dim,
            constraints = self.polytope.n_constraints(),
            tolerance = self.polytope.tolerance(),
            "chain reset"
        );
        Ok(())
    }

    /// Runs one Metropolis–Hastings step and pushes its two events into `sink`.
    pub fn step<S: EventSink + ?Sized>(&mut self, sink: &mut S) -> Result<StepOutcome> {
        let (proposal, log_accept_ratio) = match self.evaluate() {
            Ok(evaluated) => evaluated,
            Err(e) => {
                warn!(
                    step = self.tracker.n_steps() + 1,
                    strategy = %self.strategy.kind(),
                    error = %e,
                    "step aborted"
                );
                return Err(e);
            }
        };

        let accepted =
            log_accept_ratio > f64::NEG_INFINITY && accept_move(log_accept_ratio, self.rng.gen());
        if accepted {
            self.strategy.accept(&proposal);
        }
        debug!(
            step = self.tracker.n_steps() + 1,
            coordinate = ?proposal.coordinate,
            metric = proposal.metric.is_some(),
            log_accept_ratio,
            accepted,
            "step"
        );

        let Proposal { point, metric, .. } = proposal;
        let next = if accepted {
            point.clone()
        } else {
            self.current_state().clone()
        };
        self.tracker.record(accepted, next.as_slice());
        self.chain.push(next);

        sink.push(StepEvent::Proposal {
            point: point.clone(),
            metric,
        });
        sink.push(if accepted {
            StepEvent::Accept { point }
        } else {
            StepEvent::Reject { point }
        });

        Ok(StepOutcome {
            accepted,
            log_accept_ratio,
        })
    }

    /// Proposes a candidate and computes its log acceptance ratio. Only strategy-local caches
    /// are touched.
    fn evaluate(&mut self) -> Result<(Proposal, f64)> {
        let current = self.current_state().clone();
        let proposal = self.strategy.propose(&current, &mut self.rng)?;
        // A relaxed predicate may admit points on or past a face; the strategies need s > 0.
        let candidate = proposal.point.as_slice();
        if !self.interior.is_interior(candidate) || !self.polytope.is_strictly_interior(candidate)
        {
            return Ok((proposal, f64::NEG_INFINITY));
        }

        let current_lp = checked_log_density(&self.target, current.as_slice())?;
        let proposed_lp = checked_log_density(&self.target, candidate)?;
        let log_q_ratio = if self.strategy.kind().is_symmetric() {
            0.0
        } else {
            self.strategy.log_hastings_correction(&current, &proposal)?
        };

        let log_accept_ratio = if proposed_lp == f64::NEG_INFINITY {
            f64::NEG_INFINITY
        } else {
            proposed_lp - current_lp + log_q_ratio
        };
        Ok((proposal, log_accept_ratio))
    }

    pub fn chain(&self) -> &[DVector<f64>] {
        &self.chain
    }

    pub fn strategy(&self) -> &ProposalStrategy {
        &self.strategy
    }

    /// Mutable access to the strategy, e.g. to retune the Dikin `sigma` between steps.
    pub fn strategy_mut(&mut self) -> &mut ProposalStrategy {
        &mut self.strategy
    }

    pub fn polytope(&self) -> &Polytope {
        &self.polytope
    }

    pub fn stats(&self) -> ChainStats {
        self.tracker.stats()
    }

    /// The chain as a `(steps + 1) × dim` matrix, one state per row.
    pub fn to_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.chain.len(), self.polytope.dim(), |i, j| self.chain[i][j])
    }

    /// The chain as a `(steps + 1) × dim` array, one state per row.
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.chain.len(), self.polytope.dim()), |(i, j)| {
            self.chain[i][j]
        })
    }
}

fn checked_log_density<D: TargetDistribution>(target: &D, x: &[f64]) -> Result<f64> {
    let value = target.unnorm_log_prob(x);
    if value.is_nan() || value == f64::INFINITY {
        return Err(SamplerError::OracleError { value });
    }
    Ok(value)
}

impl<D, F> MarkovChain for ChainDriver<D, F>
where
    D: TargetDistribution,
    F: InteriorPredicate,
{
    /// Steps without recording events.
    fn step(&mut self) -> Result<&DVector<f64>> {
        ChainDriver::step(self, &mut ())?;
        Ok(self.current_state())
    }

    fn current_state(&self) -> &DVector<f64> {
        // The chain always holds at least the initial state.
        &self.chain[self.chain.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate_hit_and_run::CoordinateHitAndRun;
    use crate::dikin::DikinWalk;
    use crate::distributions::Uniform;
    use crate::proposal::ProposalKind;
    use approx::assert_abs_diff_eq;
    use std::cell::Cell;

    fn demo_box() -> Polytope {
        Polytope::from_bounds(&[-3.5, -1.5], &[3.5, 1.5]).unwrap()
    }

    fn box_driver(kind: ProposalKind) -> ChainDriver<Uniform> {
        ChainDriver::new(demo_box(), kind, Uniform, &[-0.1, -0.1])
            .unwrap()
            .set_seed(42)
    }

    #[test]
    fn accept_rule_compares_against_log_uniform() {
        assert!(accept_move(0.0, 0.999));
        assert!(accept_move(-0.1, 0.5));
        assert!(!accept_move(-1.0, 0.5));
        assert!(!accept_move(f64::NEG_INFINITY, 1e-300));
    }

    #[test]
    fn reset_restores_a_single_state_chain() {
        let mut driver = box_driver(ProposalKind::CoordinateHitAndRun);
        for _ in 0..5 {
            driver.step(&mut ()).unwrap();
        }
        driver.reset(&[1.0, 0.5]).unwrap();
        assert_eq!(driver.chain(), &[DVector::from_vec(vec![1.0, 0.5])]);
        assert_eq!(driver.stats().n_steps, 0);
        match driver.strategy() {
            ProposalStrategy::CoordinateHitAndRun(walk) => assert_eq!(walk.next_coordinate(), 0),
            other => panic!("unexpected strategy {other:?}"),
        }
    }

    #[test]
    fn chain_grows_by_one_per_step() {
        for kind in ProposalKind::ALL {
            let mut driver = box_driver(kind);
            for n in 1..=40 {
                driver.step(&mut ()).unwrap();
                assert_eq!(driver.chain().len(), n + 1);
            }
            assert_eq!(driver.to_matrix().nrows(), 41);
            assert_eq!(driver.to_array().dim(), (41, 2));
        }
    }

    #[test]
    fn events_come_in_proposal_decision_pairs() {
        let mut driver = box_driver(ProposalKind::DikinWalk);
        let mut events: Vec<StepEvent> = Vec::new();
        for _ in 0..25 {
            let outcome = driver.step(&mut events).unwrap();
            let decision = events.last().unwrap();
            match (outcome.accepted, decision) {
                (true, StepEvent::Accept { point }) => assert_eq!(point, driver.current_state()),
                (false, StepEvent::Reject { .. }) => {}
                other => panic!("outcome and event disagree: {other:?}"),
            }
        }
        assert_eq!(events.len(), 50);
        for pair in events.chunks(2) {
            match &pair[0] {
                StepEvent::Proposal { point, metric } => {
                    assert_eq!(point, pair[1].point());
                    assert!(metric.is_some());
                }
                other => panic!("expected a proposal, got {other:?}"),
            }
        }
    }

    #[test]
    fn infeasible_start_reports_worst_slack() {
        let err = ChainDriver::new(
            demo_box(),
            CoordinateHitAndRun::new(),
            Uniform,
            &[4.0, 0.0],
        )
        .unwrap_err();
        match err {
            SamplerError::InfeasibleStart { worst_slack } => {
                assert_abs_diff_eq!(worst_slack, -0.5, epsilon = 1e-12)
            }
            other => panic!("expected InfeasibleStart, got {other:?}"),
        }

        let mut driver = box_driver(ProposalKind::CoordinateHitAndRun);
        assert!(driver.reset(&[0.0, 1.5]).is_err());
        assert!(matches!(
            driver.reset(&[0.0]),
            Err(SamplerError::DimensionMismatch {
                expected: 2,
                found: 1
            })
        ));
        assert_eq!(driver.chain().len(), 1);
    }

    #[test]
    fn constant_density_always_accepts_hit_and_run() {
        let mut driver = box_driver(ProposalKind::CoordinateHitAndRun);
        for _ in 0..500 {
            let outcome = driver.step(&mut ()).unwrap();
            assert!(outcome.accepted);
            assert_eq!(outcome.log_accept_ratio, 0.0);
        }
        assert_eq!(driver.stats().acceptance_rate, 1.0);
    }

    #[test]
    fn degenerate_bracket_leaves_chain_and_sink_untouched() {
        // x ≤ 1 alone leaves the chord open towards -inf.
        let polytope = Polytope::new(
            DMatrix::from_row_slice(1, 1, &[1.0]),
            DVector::from_vec(vec![1.0]),
        )
        .unwrap();
        let mut driver =
            ChainDriver::new(polytope, CoordinateHitAndRun::new(), Uniform, &[0.0]).unwrap();
        let mut events: Vec<StepEvent> = Vec::new();
        assert!(matches!(
            driver.step(&mut events),
            Err(SamplerError::DegenerateBracket { coordinate: 0, .. })
        ));
        assert!(events.is_empty());
        assert_eq!(driver.chain().len(), 1);
        assert_eq!(driver.stats().n_steps, 0);
    }

    #[test]
    fn singular_ellipsoid_leaves_chain_and_sink_untouched() {
        // Only x is bounded, so H(x) has no curvature along y.
        let slab = Polytope::from_bounds(&[-1.0, f64::NEG_INFINITY], &[1.0, f64::INFINITY]).unwrap();
        let mut driver = ChainDriver::new(slab, DikinWalk::default(), Uniform, &[0.0, 0.0]).unwrap();
        let mut events: Vec<StepEvent> = Vec::new();
        assert!(matches!(
            driver.step(&mut events),
            Err(SamplerError::SingularEllipsoid { .. })
        ));
        assert!(events.is_empty());
        assert_eq!(driver.chain().len(), 1);
        assert_eq!(driver.stats().n_steps, 0);
    }

    #[test]
    fn relaxed_tolerance_rejects_instead_of_aborting() {
        let relaxed = demo_box().with_tolerance(1.0);
        let walk = DikinWalk::new(2.0).unwrap();
        let mut driver = ChainDriver::new(relaxed, walk, Uniform, &[3.0, 1.0])
            .unwrap()
            .set_seed(1);
        let mut rejected = 0;
        for _ in 0..300 {
            let outcome = driver.step(&mut ()).unwrap();
            if outcome.log_accept_ratio == f64::NEG_INFINITY {
                rejected += 1;
            }
            assert!(demo_box().is_strictly_interior(driver.current_state().as_slice()));
        }
        assert!(rejected > 0);
    }

    #[test]
    fn loose_predicate_rejects_instead_of_aborting() {
        let unit = Polytope::from_bounds(&[-1.0, -1.0], &[1.0, 1.0]).unwrap();
        let walk = DikinWalk::new(1.5).unwrap();
        let mut driver = ChainDriver::new(unit.clone(), walk, Uniform, &[0.0, 0.0])
            .unwrap()
            .set_seed(7)
            .with_interior_predicate(|v: &[f64]| v.iter().all(|c| c.abs() < 1.0 + 1e-3))
            .unwrap();
        for _ in 0..1_000 {
            driver.step(&mut ()).unwrap();
            assert!(unit.is_strictly_interior(driver.current_state().as_slice()));
        }
    }

    #[test]
    fn relaxed_tolerance_still_needs_a_strict_start() {
        let relaxed = demo_box().with_tolerance(1.0);
        match ChainDriver::new(relaxed, ProposalKind::DikinWalk, Uniform, &[3.5, 0.0]) {
            Err(SamplerError::InfeasibleStart { worst_slack }) => {
                assert_abs_diff_eq!(worst_slack, 0.0, epsilon = 1e-12)
            }
            other => panic!("expected InfeasibleStart, got {other:?}"),
        }
    }

    #[test]
    fn nan_density_is_an_oracle_error() {
        let target = |x: &[f64]| if x[0] > 0.0 { f64::NAN } else { 0.0 };
        let mut driver = ChainDriver::new(
            demo_box(),
            ProposalKind::CoordinateHitAndRun,
            target,
            &[-0.1, -0.1],
        )
        .unwrap()
        .set_seed(3);
        let mut events: Vec<StepEvent> = Vec::new();
        let result = (0..100).try_for_each(|_| driver.step(&mut events).map(|_| ()));
        assert!(matches!(result, Err(SamplerError::OracleError { .. })));
        assert_eq!(events.len(), 2 * (driver.chain().len() - 1));
    }

    #[test]
    fn infeasible_candidates_never_reach_the_oracle() {
        let calls = Cell::new(0usize);
        let target = |_: &[f64]| {
            calls.set(calls.get() + 1);
            0.0
        };
        // Veto everything with x > 0 even though the box allows it.
        let mut driver = ChainDriver::new(
            demo_box(),
            ProposalKind::CoordinateHitAndRun,
            target,
            &[-0.1, -0.1],
        )
        .unwrap()
        .set_seed(11)
        .with_interior_predicate(|x: &[f64]| x[0] < 0.0)
        .unwrap();

        let mut vetoed = 0;
        for _ in 0..200 {
            let outcome = driver.step(&mut ()).unwrap();
            if outcome.log_accept_ratio == f64::NEG_INFINITY {
                assert!(!outcome.accepted);
                vetoed += 1;
            }
            assert!(driver.current_state()[0] < 0.0);
        }
        assert!(vetoed > 0);
        assert_eq!(calls.get(), 2 * (200 - vetoed));
    }

    #[test]
    fn dikin_stays_inside_the_box() {
        let walk = DikinWalk::new(1.0).unwrap();
        let mut driver = ChainDriver::new(demo_box(), walk, Uniform, &[-0.1, -0.1])
            .unwrap()
            .set_seed(5);
        for _ in 0..300 {
            let state = MarkovChain::step(&mut driver).unwrap();
            assert!(demo_box().is_interior(state.as_slice()));
        }
        let rate = driver.stats().acceptance_rate;
        assert!(rate > 0.0 && rate < 1.0, "acceptance rate {rate}");
    }
}
