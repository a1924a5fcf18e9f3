//! CLI command implementations.

pub mod config;
pub mod formats;
pub mod run;
