/*!
# Polytope Constraints

A convex polytope `{x ∈ ℝⁿ : Ax ≤ b}` stored as a dense `m × n` matrix and an `m`-vector.
Rows whose `b` entry is at or above [`UNBOUNDED`] (typically `f64::INFINITY`) impose no
constraint; they are the only rows allowed to be all-zero.

The polytope is immutable once built. The proposal strategies copy `A` and `b` out of it when a
chain is reset, and the chain driver uses it (or any other [`InteriorPredicate`]) to veto
infeasible candidates.

## Example Usage

```rust
use polytope_mcmc::polytope::Polytope;

let polytope = Polytope::from_bounds(&[-3.5, -1.5], &[3.5, 1.5]).unwrap();
assert_eq!(polytope.n_constraints(), 4);
assert!(polytope.is_interior(&[-0.1, -0.1]));
assert!(!polytope.is_interior(&[4.0, 0.0]));
assert_eq!(polytope.vertex_edges().len(), 4);
```
*/

use itertools::Itertools;
use nalgebra::{DMatrix, DVector};

use crate::error::{Result, SamplerError};

/// Right-hand sides at or above this value are treated as "no constraint".
pub const UNBOUNDED: f64 = 1e20;

const VERTEX_TOLERANCE: f64 = 1e-9;
const RANK_TOLERANCE: f64 = 1e-10;

/// Decides whether a point is strictly feasible. Injected into the chain driver so embedders can
/// tighten or replace the polytope's own test.
pub trait InteriorPredicate {
    fn is_interior(&self, x: &[f64]) -> bool;
}

impl<F> InteriorPredicate for F
where
    F: Fn(&[f64]) -> bool,
{
    fn is_interior(&self, x: &[f64]) -> bool {
        self(x)
    }
}

/// A line segment between two adjacent vertices. Only used for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub from: DVector<f64>,
    pub to: DVector<f64>,
}

#[derive(Debug, Clone)]
struct Vertex {
    point: DVector<f64>,
    active: Vec<usize>,
}

/// The feasible region `{x : Ax ≤ b}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Polytope {
    a: DMatrix<f64>,
    b: DVector<f64>,
    tolerance: f64,
}

impl Polytope {
    /// Builds a polytope from `A` (`m × n`) and `b` (length `m`).
    ///
    /// Fails with [`SamplerError::InvalidPolytope`] if the shapes disagree, the system is empty,
    /// `A` has non-finite entries, `b` contains `NaN` or `-∞`, or an all-zero row of `A` is paired
    /// with a finite bound.
    pub fn new(a: DMatrix<f64>, b: DVector<f64>) -> Result<Self> {
        if a.nrows() == 0 || a.ncols() == 0 {
            return Err(SamplerError::InvalidPolytope(format!(
                "expected at least one constraint and one dimension, got {}x{}",
                a.nrows(),
                a.ncols()
            )));
        }
        if a.nrows() != b.len() {
            return Err(SamplerError::InvalidPolytope(format!(
                "A has {} rows but b has {} entries",
                a.nrows(),
                b.len()
            )));
        }
        if a.iter().any(|v| !v.is_finite()) {
            return Err(SamplerError::InvalidPolytope(
                "A contains non-finite entries".into(),
            ));
        }
        if b.iter().any(|v| v.is_nan() || *v == f64::NEG_INFINITY) {
            return Err(SamplerError::InvalidPolytope(
                "b contains NaN or -inf".into(),
            ));
        }
        for (i, row) in a.row_iter().enumerate() {
            if row.iter().all(|v| *v == 0.0) && b[i] < UNBOUNDED {
                return Err(SamplerError::InvalidPolytope(format!(
                    "row {i} of A is zero but b[{i}] = {} is a finite bound",
                    b[i]
                )));
            }
        }
        Ok(Self {
            a,
            b,
            tolerance: 0.0,
        })
    }

    /// Axis-aligned box `lower ≤ x ≤ upper`. Infinite bounds are allowed and become
    /// unconstrained rows.
    pub fn from_bounds(lower: &[f64], upper: &[f64]) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(SamplerError::DimensionMismatch {
                expected: lower.len(),
                found: upper.len(),
            });
        }
        if let Some(i) = (0..lower.len()).find(|&i| !(lower[i] < upper[i])) {
            return Err(SamplerError::InvalidPolytope(format!(
                "empty box along axis {i}: [{}, {}]",
                lower[i], upper[i]
            )));
        }
        let n = lower.len();
        let mut a = DMatrix::<f64>::zeros(2 * n, n);
        let mut b = DVector::<f64>::zeros(2 * n);
        for i in 0..n {
            a[(2 * i, i)] = 1.0;
            b[2 * i] = upper[i];
            a[(2 * i + 1, i)] = -1.0;
            b[2 * i + 1] = -lower[i];
        }
        Self::new(a, b)
    }

    /// The unit simplex `x ≥ 0, Σx ≤ 1`.
    pub fn simplex(n: usize) -> Result<Self> {
        let mut a = DMatrix::<f64>::zeros(n + 1, n);
        for i in 0..n {
            a[(i, i)] = -1.0;
            a[(n, i)] = 1.0;
        }
        let mut b = DVector::<f64>::zeros(n + 1);
        b[n] = 1.0;
        Self::new(a, b)
    }

    /// All of `ℝⁿ`, encoded as a single zero row with an infinite bound.
    pub fn unconstrained(n: usize) -> Result<Self> {
        Self::new(
            DMatrix::<f64>::zeros(1, n),
            DVector::<f64>::from_element(1, f64::INFINITY),
        )
    }

    /// Sets how far a point may violate a row and still count as interior. The default of zero
    /// requires every slack to be strictly positive.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance.max(0.0);
        self
    }

    /// Returns a copy with every constraining row scaled to unit Euclidean norm.
    pub fn normalized(&self) -> Self {
        let mut a = self.a.clone();
        let mut b = self.b.clone();
        for i in 0..a.nrows() {
            let norm = a.row(i).norm();
            if norm > 0.0 && self.is_constraining_row(i) {
                a.row_mut(i).iter_mut().for_each(|v| *v /= norm);
                b[i] /= norm;
            }
        }
        Self {
            a,
            b,
            tolerance: self.tolerance,
        }
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn vector(&self) -> &DVector<f64> {
        &self.b
    }

    /// Row `i` of `A` as a column vector.
    pub fn row(&self, i: usize) -> DVector<f64> {
        self.a.row(i).transpose()
    }

    pub fn column(&self, j: usize) -> DVector<f64> {
        self.a.column(j).into_owned()
    }

    /// Problem dimension `n`.
    pub fn dim(&self) -> usize {
        self.a.ncols()
    }

    /// Number of rows `m`, including unconstrained ones.
    pub fn n_constraints(&self) -> usize {
        self.a.nrows()
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// The slack vector `b - Ax`.
    pub fn slacks(&self, x: &[f64]) -> Result<DVector<f64>> {
        if x.len() != self.dim() {
            return Err(SamplerError::DimensionMismatch {
                expected: self.dim(),
                found: x.len(),
            });
        }
        Ok(&self.b - &self.a * DVector::from_column_slice(x))
    }

    /// Smallest entry of `b - Ax`; negative values mean `x` lies outside.
    pub fn worst_slack(&self, x: &[f64]) -> Result<f64> {
        Ok(self.slacks(x)?.min())
    }

    /// True iff no row is violated by more than the configured tolerance.
    pub fn is_interior(&self, x: &[f64]) -> bool {
        match self.slacks(x) {
            Ok(slacks) => slacks.iter().all(|s| *s > -self.tolerance),
            Err(_) => false,
        }
    }

    /// True iff every slack is strictly positive, whatever the tolerance.
    pub fn is_strictly_interior(&self, x: &[f64]) -> bool {
        match self.slacks(x) {
            Ok(slacks) => slacks.iter().all(|s| *s > 0.0),
            Err(_) => false,
        }
    }

    fn is_constraining_row(&self, i: usize) -> bool {
        self.b[i] < UNBOUNDED && self.a.row(i).iter().any(|v| *v != 0.0)
    }

    fn vertices(&self) -> Vec<Vertex> {
        let n = self.dim();
        let rows: Vec<usize> = (0..self.n_constraints())
            .filter(|&i| self.is_constraining_row(i))
            .collect();
        if rows.len() < n {
            return Vec::new();
        }

        let mut vertices: Vec<Vertex> = Vec::new();
        for subset in rows.iter().copied().combinations(n) {
            let a_sub = self.a.select_rows(subset.iter());
            if a_sub.rank(RANK_TOLERANCE) < n {
                continue;
            }
            let b_sub = DVector::from_iterator(n, subset.iter().map(|&i| self.b[i]));
            let Some(point) = a_sub.lu().solve(&b_sub) else {
                continue;
            };
            if point.iter().any(|v| !v.is_finite()) {
                continue;
            }
            let slacks = &self.b - &self.a * &point;
            if rows.iter().any(|&i| slacks[i] < -VERTEX_TOLERANCE) {
                continue;
            }
            if vertices
                .iter()
                .any(|v| (&v.point - &point).amax() <= VERTEX_TOLERANCE)
            {
                continue;
            }
            let active = rows
                .iter()
                .copied()
                .filter(|&i| slacks[i].abs() <= VERTEX_TOLERANCE)
                .collect();
            vertices.push(Vertex { point, active });
        }
        vertices
    }

    fn spans_edge(&self, shared: &[usize]) -> bool {
        let n = self.dim();
        if n == 1 {
            return true;
        }
        shared.len() >= n - 1 && self.a.select_rows(shared.iter()).rank(RANK_TOLERANCE) == n - 1
    }

    /// Segments between adjacent vertices, for drawing the feasible region.
    ///
    /// Vertices are found by intersecting every `n`-subset of constraining rows, so this is only
    /// meant for the small polytopes a visualiser shows. Returns an empty list when the region
    /// has no vertices (e.g. [`Polytope::unconstrained`]).
    pub fn vertex_edges(&self) -> Vec<Edge> {
        let vertices = self.vertices();
        let mut edges = Vec::new();
        for (i, first) in vertices.iter().enumerate() {
            for second in &vertices[i + 1..] {
                let shared: Vec<usize> = first
                    .active
                    .iter()
                    .copied()
                    .filter(|row| second.active.contains(row))
                    .collect();
                if self.spans_edge(&shared) {
                    edges.push(Edge {
                        from: first.point.clone(),
                        to: second.point.clone(),
                    });
                }
            }
        }
        edges
    }
}

impl InteriorPredicate for Polytope {
    fn is_interior(&self, x: &[f64]) -> bool {
        Polytope::is_interior(self, x)
    }
}
