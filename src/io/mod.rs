//! Input/output helpers.
//!
//! - snapshot and sector-table JSON loading (`ingest`)
//! - result exports as JSON (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
