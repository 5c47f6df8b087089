//! Samples the uniform distribution on the box `[-3.5, 3.5] × [-1.5, 1.5]` with each proposal
//! strategy and prints acceptance rates and moments.
//!
//! Usage: `demo [CoordinateHitAndRun|DikinWalk]` (default: both).

use polytope_mcmc::core::{progress_bar, run_chain_with_progress};
use polytope_mcmc::distributions::Uniform;
use polytope_mcmc::metropolis_hastings::ChainDriver;
use polytope_mcmc::polytope::Polytope;
use polytope_mcmc::proposal::ProposalKind;
use std::error::Error;
use tracing_subscriber::fmt::SubscriberBuilder;

fn main() -> Result<(), Box<dyn Error>> {
    const ITERATIONS: usize = 20_000;
    const SEED: u64 = 42;

    SubscriberBuilder::default().with_target(false).init();

    let kinds = match std::env::args().nth(1) {
        Some(name) => vec![name.parse::<ProposalKind>()?],
        None => ProposalKind::ALL.to_vec(),
    };

    let polytope = Polytope::from_bounds(&[-3.5, -1.5], &[3.5, 1.5])?;
    println!(
        "Box with {} edges, {} constraints",
        polytope.vertex_edges().len(),
        polytope.n_constraints()
    );

    for kind in kinds {
        let mut driver =
            ChainDriver::new(polytope.clone(), kind, Uniform, &[-0.1, -0.1])?.set_seed(SEED);
        let pb = progress_bar(ITERATIONS, kind.name());
        let samples = run_chain_with_progress(&mut driver, ITERATIONS, &pb)?;

        let stats = driver.stats();
        println!("{kind}: {} samples", samples.nrows());
        println!(
            "  acceptance rate {:.3} (last window {:.3})",
            stats.acceptance_rate, stats.window_acceptance_rate
        );
        println!(
            "  mean ({:.3}, {:.3}), expected (0, 0)",
            stats.mean[0], stats.mean[1]
        );
        println!(
            "  variance ({:.3}, {:.3}), expected ({:.3}, {:.3})",
            stats.variance[0],
            stats.variance[1],
            7.0_f64.powi(2) / 12.0,
            3.0_f64.powi(2) / 12.0
        );

        #[cfg(feature = "csv")]
        {
            let path = format!("{}.csv", kind.name());
            polytope_mcmc::io::csv::save_csv(&driver.to_array(), &path)?;
            println!("  chain written to {path}");
        }
    }
    Ok(())
}
