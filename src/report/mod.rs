//! Reporting: formatted terminal output for forecasts, matrices, and batches.

pub mod format;

pub use format::*;
