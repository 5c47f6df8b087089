//! Running statistics for a single chain: acceptance rates and per-coordinate moments.

use ndarray::prelude::*;
use std::collections::VecDeque;

/// Number of most recent steps used for the windowed acceptance rate.
pub const ACCEPTANCE_WINDOW: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct ChainTracker {
    n_params: usize,
    n_steps: u64,
    n_accepted: u64,
    n_samples: u64,
    mean: Array1<f64>,    // n_params
    mean_sq: Array1<f64>, // n_params
    accept_queue: VecDeque<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainStats {
    pub n_steps: u64,
    pub n_accepted: u64,
    pub acceptance_rate: f64,
    pub window_acceptance_rate: f64,
    pub mean: Array1<f64>,     // n_params
    pub variance: Array1<f64>, // n_params
}

impl ChainTracker {
    /// Starts tracking a chain whose first entry is `initial_state`.
    pub fn new(initial_state: &[f64]) -> Self {
        let n_params = initial_state.len();
        let mut tracker = Self {
            n_params,
            n_steps: 0,
            n_accepted: 0,
            n_samples: 0,
            mean: Array1::<f64>::zeros(n_params),
            mean_sq: Array1::<f64>::zeros(n_params),
            accept_queue: VecDeque::with_capacity(ACCEPTANCE_WINDOW + 1),
        };
        tracker.push_sample(initial_state);
        tracker
    }

    fn push_sample(&mut self, x: &[f64]) {
        self.n_samples += 1;
        let n = self.n_samples as f64;
        let x_arr = ArrayView1::from(x);
        self.mean = (&self.mean * (n - 1.0) + &x_arr) / n;
        self.mean_sq = (&self.mean_sq * (n - 1.0) + x_arr.mapv(|v| v * v)) / n;
    }

    /// Records one step that left the chain at `x`.
    pub fn record(&mut self, accepted: bool, x: &[f64]) {
        debug_assert_eq!(x.len(), self.n_params);
        self.n_steps += 1;
        if accepted {
            self.n_accepted += 1;
        }
        self.accept_queue.push_back(accepted);
        if self.accept_queue.len() > ACCEPTANCE_WINDOW {
            self.accept_queue.pop_front();
        }
        self.push_sample(x);
    }

    pub fn n_steps(&self) -> u64 {
        self.n_steps
    }

    /// Fraction of all steps so far that were accepted; `NaN` before the first step.
    pub fn acceptance_rate(&self) -> f64 {
        self.n_accepted as f64 / self.n_steps as f64
    }

    /// Acceptance rate over the last [`ACCEPTANCE_WINDOW`] steps.
    pub fn window_acceptance_rate(&self) -> f64 {
        let accepted = self.accept_queue.iter().filter(|a| **a).count();
        accepted as f64 / self.accept_queue.len() as f64
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Unbiased per-coordinate sample variance over every chain entry.
    pub fn variance(&self) -> Array1<f64> {
        let n = self.n_samples as f64;
        (&self.mean_sq - &self.mean.mapv(|m| m * m)) * n / (n - 1.0)
    }

    pub fn stats(&self) -> ChainStats {
        ChainStats {
            n_steps: self.n_steps,
            n_accepted: self.n_accepted,
            acceptance_rate: self.acceptance_rate(),
            window_acceptance_rate: self.window_acceptance_rate(),
            mean: self.mean.clone(),
            variance: self.variance(),
        }
    }
}
