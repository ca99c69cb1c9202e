//! # flakes
//!
//! Command-line front end for the Flakes engine: configuration loading and
//! the command implementations behind the `flakes` binary.

pub mod cli;
pub mod config;

pub use config::FlakesConfig;
