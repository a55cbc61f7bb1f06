//! Absorbing Markov-chain core.
//!
//! - [`classify`]: score / rating / default flag -> starting state
//! - [`source`]: migration-data strategies (live snapshot, static fallback)
//! - [`builder`]: base matrix + LBO and sector adjustments, validated per step
//! - [`forecast`]: closed-form default probabilities and expected time
//! - [`simulation`]: seeded, sharded Monte Carlo trajectories
//! - [`cache`]: caller-owned matrix cache
//! - [`analysis`]: per-company orchestration and batches

pub mod analysis;
pub mod builder;
pub mod cache;
pub mod classify;
pub mod forecast;
pub mod matrix;
pub mod simulation;
pub mod source;

pub use analysis::*;
pub use builder::*;
pub use cache::*;
pub use classify::*;
pub use forecast::*;
pub use matrix::*;
pub use simulation::*;
pub use source::*;
