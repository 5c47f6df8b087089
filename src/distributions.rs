/*!
Target densities for the chain driver and the Gaussian draws used by the Dikin walk.

A target is anything implementing [`TargetDistribution`]: a pure function from a point to an
unnormalized log-density, or `-∞` where the density vanishes. Plain closures qualify, so an
embedder can pass `|x: &[f64]| -x[0].abs()` directly. The driver treats `NaN` and `+∞` as oracle
failures.

# Examples

```rust
use polytope_mcmc::distributions::{Gaussian, Normalized, TargetDistribution, Uniform};
use nalgebra::{DMatrix, DVector};

let flat = Uniform;
assert_eq!(flat.unnorm_log_prob(&[0.3, -2.0]), 0.0);

let gauss = Gaussian::new(DVector::from_vec(vec![0.0, 0.0]), DMatrix::identity(2, 2)).unwrap();
let lp = gauss.log_prob(&[0.0, 0.0]);
assert!((lp + (2.0 * std::f64::consts::PI).ln()).abs() < 1e-12);
```
*/

use nalgebra::{Cholesky, DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;
use std::f64::consts::PI;

use crate::error::{Result, SamplerError};

/// A trait for continuous target distributions from which we want to sample.
pub trait TargetDistribution {
    /// Returns the log of the unnormalized density for state `theta`.
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64;
}

/// A trait for distributions that provide a normalized log-density (e.g., for diagnostics).
pub trait Normalized {
    /// Returns the normalized log-density for state `theta`.
    fn log_prob(&self, theta: &[f64]) -> f64;
}

impl<F> TargetDistribution for F
where
    F: Fn(&[f64]) -> f64,
{
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        self(theta)
    }
}

/// Constant density. Restricted to a polytope it is the uniform distribution on that polytope.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Uniform;

impl TargetDistribution for Uniform {
    fn unnorm_log_prob(&self, _theta: &[f64]) -> f64 {
        0.0
    }
}

/**
A multivariate Gaussian parameterized by a mean vector and a symmetric positive-definite
covariance matrix.

Doubles as a target density and as a source of draws (see [`Gaussian::sample`]).

```rust
use polytope_mcmc::distributions::{Gaussian, TargetDistribution};
use nalgebra::{DMatrix, DVector};

let gauss = Gaussian::new(
    DVector::from_vec(vec![1.0, 0.0]),
    DMatrix::from_row_slice(2, 2, &[4.0, 2.0, 2.0, 3.0]),
).unwrap();
assert_eq!(gauss.unnorm_log_prob(&[1.0, 0.0]), 0.0);
```
*/
#[derive(Debug, Clone, PartialEq)]
pub struct Gaussian {
    pub mean: DVector<f64>,
    pub cov: DMatrix<f64>,
    lower: DMatrix<f64>,
    precision: DMatrix<f64>,
    log_normalizer: f64,
}

impl Gaussian {
    /// Fails with [`SamplerError::InvalidParameter`] if the shapes disagree or `cov` is not
    /// symmetric positive-definite.
    pub fn new(mean: DVector<f64>, cov: DMatrix<f64>) -> Result<Self> {
        if cov.nrows() != mean.len() || cov.ncols() != mean.len() {
            return Err(SamplerError::DimensionMismatch {
                expected: mean.len(),
                found: cov.nrows(),
            });
        }
        if (&cov - cov.transpose()).amax() > 1e-10 * cov.amax().max(1.0) {
            return Err(SamplerError::InvalidParameter(
                "Gaussian covariance is not symmetric".into(),
            ));
        }
        let chol = Cholesky::new(cov.clone()).ok_or_else(|| {
            SamplerError::InvalidParameter("Gaussian covariance is not positive definite".into())
        })?;
        let lower = chol.l();
        let precision = chol.inverse();
        let half_log_det: f64 = lower.diagonal().iter().map(|d| d.ln()).sum();
        let log_normalizer = -(mean.len() as f64) / 2.0 * (2.0 * PI).ln() - half_log_det;
        Ok(Self {
            mean,
            cov,
            lower,
            precision,
            log_normalizer,
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Lower Cholesky factor `L` with `L Lᵗ = cov`.
    pub fn lower(&self) -> &DMatrix<f64> {
        &self.lower
    }

    /// Draws one point from the distribution.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> DVector<f64> {
        sample_with_factor(&self.mean, &self.lower, rng)
    }

    fn quadratic_form(&self, theta: &[f64]) -> f64 {
        let diff = DVector::from_column_slice(theta) - &self.mean;
        diff.dot(&(&self.precision * &diff))
    }
}

impl TargetDistribution for Gaussian {
    /// `NaN` when `theta` has the wrong dimension.
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        if theta.len() != self.dim() {
            return f64::NAN;
        }
        -0.5 * self.quadratic_form(theta)
    }
}

impl Normalized for Gaussian {
    fn log_prob(&self, theta: &[f64]) -> f64 {
        self.log_normalizer + self.unnorm_log_prob(theta)
    }
}

/// Draws `mean + L z` with `z` standard normal, i.e. a Gaussian with covariance `L Lᵗ`.
pub fn sample_with_factor<R: Rng + ?Sized>(
    mean: &DVector<f64>,
    lower: &DMatrix<f64>,
    rng: &mut R,
) -> DVector<f64> {
    let z = DVector::<f64>::from_iterator(
        mean.len(),
        (0..mean.len()).map(|_| rng.sample::<f64, _>(StandardNormal)),
    );
    mean + lower * z
}

/// A scaled, shifted Rosenbrock ("banana") density in `2k` dimensions:
/// `-scale · Σᵢ [100 (x₂ᵢ² − x₂ᵢ₊₁)² + (x₂ᵢ − shiftᵢ)²]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rosenbrock {
    pub scale: f64,
    pub shift: Vec<f64>,
}

impl Rosenbrock {
    pub fn new(scale: f64, shift: Vec<f64>) -> Self {
        Self { scale, shift }
    }

    pub fn dim(&self) -> usize {
        2 * self.shift.len()
    }
}

impl TargetDistribution for Rosenbrock {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        if theta.len() != self.dim() {
            return f64::NAN;
        }
        let energy: f64 = self
            .shift
            .iter()
            .enumerate()
            .map(|(i, shift)| {
                let (x, y) = (theta[2 * i], theta[2 * i + 1]);
                100.0 * (x * x - y).powi(2) + (x - shift).powi(2)
            })
            .sum();
        -self.scale * energy
    }
}
