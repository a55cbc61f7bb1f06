//! Service-layer data: the live migration feed and synthetic portfolios.

pub mod live;
pub mod sample;

pub use live::*;
pub use sample::*;
