//! Markov chain Monte Carlo inside convex polytopes `{x : Ax ≤ b}`.
//!
//! A [`ChainDriver`](metropolis_hastings::ChainDriver) advances one chain with a
//! [`ProposalStrategy`](proposal::ProposalStrategy), either coordinate hit-and-run or the Dikin
//! walk, and reports every step to an [`EventSink`](events::EventSink).

pub mod coordinate_hit_and_run;
pub mod core;
pub mod dikin;
pub mod distributions;
pub mod error;
pub mod events;
pub mod io;
pub mod metropolis_hastings;
pub mod polytope;
pub mod proposal;
pub mod stats;

pub use error::{Result, SamplerError};
