/*!
# Dikin Walk

A Gaussian random walk whose covariance adapts to the local geometry of the polytope. At a
strictly interior point `x` the Dikin ellipsoid is given by

\[
H(x) = A^\top \operatorname{diag}\!\left(\frac{1}{s_i(x)^2}\right) A, \qquad s(x) = b - Ax,
\]

and candidates are drawn from \(\mathcal{N}(x, \sigma^2 H(x)^{-1})\). Because the covariance
depends on the position, the forward and reverse proposal densities differ and the acceptance
ratio carries the Hastings correction

\[
\tfrac12 \log\det H(x') - \tfrac12 \log\det H(x)
- \frac{1}{2\sigma^2}\left(d^\top H(x') d - d^\top H(x) d\right), \qquad d = x - x'.
\]

Both `H` and `Σ = σ² H⁻¹` go through Cholesky factorizations; a failed factorization surfaces
as [`SamplerError::SingularEllipsoid`].
*/

use nalgebra::{Cholesky, DMatrix, DVector};
use rand::Rng;
use std::ops::RangeInclusive;

use crate::distributions::sample_with_factor;
use crate::error::{Result, SamplerError};
use crate::polytope::Polytope;
use crate::proposal::Proposal;

pub const DEFAULT_SIGMA: f64 = 0.5;

/// Values of `sigma` outside this range are accepted but logged as a warning.
pub const RECOMMENDED_SIGMA: RangeInclusive<f64> = 0.05..=2.0;

/// The local metric at one point together with everything the walk needs from it.
#[derive(Debug, Clone, PartialEq)]
pub struct DikinEllipsoid {
    hessian: DMatrix<f64>,
    covariance: DMatrix<f64>,
    covariance_factor: DMatrix<f64>,
    log_det_hessian: f64,
}

impl DikinEllipsoid {
    /// Builds the ellipsoid of `{x : Ax ≤ b}` at `x` for the proposal scale `sigma`.
    pub fn at(a: &DMatrix<f64>, b: &DVector<f64>, x: &DVector<f64>, sigma: f64) -> Result<Self> {
        let slacks = b - a * x;
        if let Some(row) = slacks.iter().position(|s| !(*s > 0.0)) {
            return Err(SamplerError::SingularEllipsoid {
                reason: format!("slack of row {row} is {} (point is not interior)", slacks[row]),
            });
        }

        // Scale each row by 1/sᵢ so that H = (DA)ᵀ(DA) with D = diag(1/s).
        let mut scaled = a.clone();
        for (mut row, s) in scaled.row_iter_mut().zip(slacks.iter()) {
            row /= *s;
        }
        let hessian = scaled.tr_mul(&scaled);
        let hessian = (&hessian + hessian.transpose()) * 0.5;

        let chol = Cholesky::new(hessian.clone()).ok_or_else(|| SamplerError::SingularEllipsoid {
            reason: "constraint rows at this point do not span the space".into(),
        })?;
        let log_det_hessian = 2.0 * chol.l().diagonal().iter().map(|d| d.ln()).sum::<f64>();
        if !log_det_hessian.is_finite() {
            return Err(SamplerError::SingularEllipsoid {
                reason: format!("log det H = {log_det_hessian}"),
            });
        }

        let inverse = chol.inverse();
        let covariance = (&inverse + inverse.transpose()) * (0.5 * sigma * sigma);
        let covariance_factor = Cholesky::new(covariance.clone())
            .ok_or_else(|| SamplerError::SingularEllipsoid {
                reason: "proposal covariance lost positive definiteness".into(),
            })?
            .l();

        Ok(Self {
            hessian,
            covariance,
            covariance_factor,
            log_det_hessian,
        })
    }

    /// `H(x)`.
    pub fn hessian(&self) -> &DMatrix<f64> {
        &self.hessian
    }

    /// `Σ(x) = σ² H(x)⁻¹`.
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    /// Lower Cholesky factor of `Σ(x)`.
    pub fn covariance_factor(&self) -> &DMatrix<f64> {
        &self.covariance_factor
    }

    pub fn log_det_hessian(&self) -> f64 {
        self.log_det_hessian
    }

    /// `dᵀ H(x) d`.
    pub fn quadratic_form(&self, d: &DVector<f64>) -> f64 {
        d.dot(&(&self.hessian * d))
    }
}

/// Log of `q(x | x') / q(x' | x)` for Gaussian proposals centred at `x` and `x'` with the given
/// ellipsoids.
pub fn hastings_correction(
    current: &DikinEllipsoid,
    candidate: &DikinEllipsoid,
    difference: &DVector<f64>,
    sigma: f64,
) -> f64 {
    0.5 * (candidate.log_det_hessian - current.log_det_hessian)
        - (candidate.quadratic_form(difference) - current.quadratic_form(difference))
            / (2.0 * sigma * sigma)
}

/// The Dikin walk with proposal scale `sigma`.
#[derive(Debug, Clone, PartialEq)]
pub struct DikinWalk {
    sigma: f64,
    a: DMatrix<f64>,
    b: DVector<f64>,
    current: Option<DikinEllipsoid>,
    candidate: Option<DikinEllipsoid>,
}

impl Default for DikinWalk {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_SIGMA,
            a: DMatrix::zeros(0, 0),
            b: DVector::zeros(0),
            current: None,
            candidate: None,
        }
    }
}

impl DikinWalk {
    /// Fails with [`SamplerError::InvalidParameter`] unless `sigma` is positive and finite.
    pub fn new(sigma: f64) -> Result<Self> {
        let mut walk = Self::default();
        walk.set_sigma(sigma)?;
        Ok(walk)
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Changes the proposal scale. Cached ellipsoids are dropped and rebuilt on the next step.
    pub fn set_sigma(&mut self, sigma: f64) -> Result<()> {
        if !(sigma > 0.0 && sigma.is_finite()) {
            return Err(SamplerError::InvalidParameter(format!(
                "sigma must be positive and finite, got {sigma}"
            )));
        }
        if !RECOMMENDED_SIGMA.contains(&sigma) {
            tracing::warn!(
                sigma,
                low = RECOMMENDED_SIGMA.start(),
                high = RECOMMENDED_SIGMA.end(),
                "sigma outside the recommended range"
            );
        }
        self.sigma = sigma;
        self.current = None;
        self.candidate = None;
        Ok(())
    }

    /// Copies the constraint system and forgets any cached ellipsoid.
    pub fn reset(&mut self, polytope: &Polytope, _state: &DVector<f64>) {
        self.a = polytope.matrix().clone();
        self.b = polytope.vector().clone();
        self.current = None;
        self.candidate = None;
    }

    pub fn ellipsoid_at(&self, x: &DVector<f64>) -> Result<DikinEllipsoid> {
        if self.a.ncols() == 0 || x.len() != self.a.ncols() {
            return Err(SamplerError::DimensionMismatch {
                expected: self.a.ncols(),
                found: x.len(),
            });
        }
        DikinEllipsoid::at(&self.a, &self.b, x, self.sigma)
    }

    fn current_ellipsoid(&mut self, state: &DVector<f64>) -> Result<&DikinEllipsoid> {
        if self.current.is_none() {
            self.current = Some(self.ellipsoid_at(state)?);
        }
        self.current
            .as_ref()
            .ok_or_else(|| SamplerError::SingularEllipsoid {
                reason: "no ellipsoid at the current state".into(),
            })
    }

    /// Draws `x' ~ N(x, Σ(x))`. The proposal carries `Σ(x)` as its metric.
    pub fn propose<R: Rng + ?Sized>(
        &mut self,
        state: &DVector<f64>,
        rng: &mut R,
    ) -> Result<Proposal> {
        self.candidate = None;
        let ellipsoid = self.current_ellipsoid(state)?;
        let point = sample_with_factor(state, ellipsoid.covariance_factor(), rng);
        Ok(Proposal {
            point,
            coordinate: None,
            metric: Some(ellipsoid.covariance().clone()),
        })
    }

    /// Evaluates the ellipsoid at the (interior) candidate and returns the Hastings term.
    pub fn log_hastings_correction(
        &mut self,
        state: &DVector<f64>,
        proposal: &Proposal,
    ) -> Result<f64> {
        let candidate = self.ellipsoid_at(&proposal.point)?;
        let sigma = self.sigma;
        let current = self.current_ellipsoid(state)?;
        let correction =
            hastings_correction(current, &candidate, &(state - &proposal.point), sigma);
        self.candidate = Some(candidate);
        Ok(correction)
    }

    /// Promotes the candidate's ellipsoid to the current one.
    pub fn accept(&mut self, _proposal: &Proposal) {
        self.current = self.candidate.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn demo_box() -> Polytope {
        Polytope::from_bounds(&[-3.5, -1.5], &[3.5, 1.5]).unwrap()
    }

    fn walk_on(polytope: &Polytope, state: &DVector<f64>, sigma: f64) -> DikinWalk {
        let mut walk = DikinWalk::new(sigma).unwrap();
        walk.reset(polytope, state);
        walk
    }

    #[test]
    fn ellipsoid_at_box_centre_is_diagonal() {
        let polytope = demo_box();
        let centre = DVector::zeros(2);
        let walk = walk_on(&polytope, &centre, 0.5);
        let ellipsoid = walk.ellipsoid_at(&centre).unwrap();

        let h = ellipsoid.hessian();
        assert_abs_diff_eq!(h[(0, 0)], 2.0 / (3.5 * 3.5), epsilon = 1e-12);
        assert_abs_diff_eq!(h[(1, 1)], 2.0 / (1.5 * 1.5), epsilon = 1e-12);
        assert_abs_diff_eq!(h[(0, 1)], 0.0, epsilon = 1e-12);

        let sigma = ellipsoid.covariance();
        assert_abs_diff_eq!(sigma[(0, 0)], 0.25 * 3.5 * 3.5 / 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(sigma[(1, 1)], 0.25 * 1.5 * 1.5 / 2.0, epsilon = 1e-12);

        let expected_log_det = (2.0_f64 / (3.5 * 3.5) * 2.0 / (1.5 * 1.5)).ln();
        assert_abs_diff_eq!(ellipsoid.log_det_hessian(), expected_log_det, epsilon = 1e-12);
    }

    #[test]
    fn ellipsoid_is_symmetric_off_centre() {
        let polytope = Polytope::simplex(3).unwrap();
        let x = DVector::from_vec(vec![0.1, 0.3, 0.2]);
        let walk = walk_on(&polytope, &x, 0.5);
        let ellipsoid = walk.ellipsoid_at(&x).unwrap();
        assert_abs_diff_eq!(ellipsoid.hessian(), &ellipsoid.hessian().transpose());
        assert_abs_diff_eq!(ellipsoid.covariance(), &ellipsoid.covariance().transpose());
        let product = ellipsoid.hessian() * ellipsoid.covariance();
        assert_abs_diff_eq!(product, DMatrix::identity(3, 3) * 0.25, epsilon = 1e-9);
        assert!(Cholesky::new(ellipsoid.covariance().clone()).is_some());
    }

    #[test]
    fn infeasible_point_has_no_ellipsoid() {
        let polytope = demo_box();
        let walk = walk_on(&polytope, &DVector::zeros(2), 0.5);
        assert!(matches!(
            walk.ellipsoid_at(&DVector::from_vec(vec![4.0, 0.0])),
            Err(SamplerError::SingularEllipsoid { .. })
        ));
    }

    #[test]
    fn rank_deficient_rows_are_singular() {
        // Only constrains x; H has a zero row/column for y.
        let slab = Polytope::from_bounds(&[-1.0, f64::NEG_INFINITY], &[1.0, f64::INFINITY]).unwrap();
        let walk = walk_on(&slab, &DVector::zeros(2), 0.5);
        assert!(matches!(
            walk.ellipsoid_at(&DVector::zeros(2)),
            Err(SamplerError::SingularEllipsoid { .. })
        ));
    }

    #[test]
    fn correction_is_antisymmetric() {
        let polytope = Polytope::simplex(2).unwrap();
        let x = DVector::from_vec(vec![0.2, 0.3]);
        let y = DVector::from_vec(vec![0.5, 0.1]);
        let walk = walk_on(&polytope, &x, 0.7);
        let ex = walk.ellipsoid_at(&x).unwrap();
        let ey = walk.ellipsoid_at(&y).unwrap();
        let forward = hastings_correction(&ex, &ey, &(&x - &y), 0.7);
        let backward = hastings_correction(&ey, &ex, &(&y - &x), 0.7);
        assert_abs_diff_eq!(forward, -backward, epsilon = 1e-12);
        assert!(forward.abs() > 1e-6);
    }

    #[test]
    fn correction_vanishes_for_identical_points() {
        let polytope = demo_box();
        let x = DVector::from_vec(vec![1.0, -0.5]);
        let mut walk = walk_on(&polytope, &x, 0.5);
        let proposal = Proposal {
            point: x.clone(),
            coordinate: None,
            metric: None,
        };
        assert_abs_diff_eq!(
            walk.log_hastings_correction(&x, &proposal).unwrap(),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn proposal_carries_current_metric() {
        let polytope = demo_box();
        let x = DVector::from_vec(vec![-0.1, -0.1]);
        let mut walk = walk_on(&polytope, &x, 0.5);
        let mut rng = SmallRng::seed_from_u64(11);
        let proposal = walk.propose(&x, &mut rng).unwrap();
        let expected = walk.ellipsoid_at(&x).unwrap();
        assert_eq!(proposal.metric.as_ref(), Some(expected.covariance()));
        assert_eq!(proposal.coordinate, None);
    }

    #[test]
    fn sigma_must_be_positive() {
        assert!(DikinWalk::new(0.0).is_err());
        assert!(DikinWalk::new(f64::NAN).is_err());
        assert!(DikinWalk::new(-0.5).is_err());
        assert_eq!(DikinWalk::default().sigma(), DEFAULT_SIGMA);
        assert_eq!(DikinWalk::new(3.0).unwrap().sigma(), 3.0);
    }
}
