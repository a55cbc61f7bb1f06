//! Mathematical utilities: matrix powers and guarded inversion.

pub mod linalg;

pub use linalg::*;
