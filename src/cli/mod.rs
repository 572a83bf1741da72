//! CLI-specific functionality for the fixture environment tool
//!
//! This module contains argument parsing and environment definition discovery.

pub mod args;
pub mod config;

pub use args::{Args, Commands, EnvironmentInput, ExecutionMode};
pub use config::DefinitionDiscovery;
