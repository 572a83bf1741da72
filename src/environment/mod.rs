//! Environment driver: one container, optional database, and the ordering
//! between them.
//!
//! An [`EnvironmentDefinition`] (usually loaded from TOML) names the
//! container, its ports, any init commands to run inside it, and optionally
//! the database it hosts. [`EnvironmentBuilder`] turns that into a running
//! fixture and back.

mod builder;
mod definition;

pub use builder::{
    ChangeLogRunner, EnvironmentBuilder, PortReport, ProvisionReport, TeardownReport,
};
pub use definition::{ContainerDefinition, DatabaseDefinition, EnvironmentDefinition, InitCommand};
