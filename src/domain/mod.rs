//! Domain types used throughout the analysis.
//!
//! This module defines:
//!
//! - the chain's state space (`RiskState`) and forecast horizons
//! - the caller's input (`CompanySnapshot`)
//! - analysis outputs (`ForecastResult`, `HorizonForecast`, `ExpectedTime`, etc.)
//! - run configuration (`AnalysisConfig`)

pub mod types;

pub use types::*;
