//! `credit-migration` library crate.
//!
//! The binary (`cmig`) is a thin wrapper around this library so that:
//!
//! - the numeric core (`chain`) is testable without spawning processes
//! - service concerns (live feed, files, CLI) stay out of the core
//! - the analysis can be embedded in other services

pub mod app;
pub mod chain;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod math;
pub mod report;
