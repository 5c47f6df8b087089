use indicatif::{ProgressBar, ProgressStyle};
use nalgebra as na;

use crate::error::Result;

pub trait MarkovChain {
    /// Does one iteration of the chain, returning the new current state.
    fn step(&mut self) -> Result<&na::DVector<f64>>;

    /// Get the current state without stepping.
    fn current_state(&self) -> &na::DVector<f64>;
}

/// Runs `n_steps` steps and returns the visited states, one per row. The starting state is not
/// included. Stops at the first failing step.
pub fn run_chain<M: MarkovChain>(chain: &mut M, n_steps: usize) -> Result<na::DMatrix<f64>> {
    let dim = chain.current_state().len();
    let mut out = na::DMatrix::<f64>::zeros(n_steps, dim);

    for i in 0..n_steps {
        let state = chain.step()?;
        out.row_mut(i).copy_from(&state.transpose());
    }

    Ok(out)
}

pub fn run_chain_with_progress<M: MarkovChain>(
    chain: &mut M,
    n_steps: usize,
    pb: &ProgressBar,
) -> Result<na::DMatrix<f64>> {
    let dim = chain.current_state().len();
    let mut out = na::DMatrix::<f64>::zeros(n_steps, dim);

    pb.set_length(n_steps as u64);

    for i in 0..n_steps {
        let state = chain.step()?;
        out.row_mut(i).copy_from(&state.transpose());

        // Update progress bar
        pb.inc(1);
    }

    pb.finish_with_message("Done!");
    Ok(out)
}

/// A progress bar in the crate's house style.
pub fn progress_bar(n_steps: usize, prefix: &str) -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    let pb = ProgressBar::new(n_steps as u64);
    pb.set_prefix(prefix.to_string());
    pb.set_style(style);
    pb
}
