//! Environment definition discovery
//!
//! When no definition is given on the command line, look in order for:
//! 1. `./fixture-env.toml`
//! 2. `./.fixture-env/environment.toml`

use crate::config::FixtureConfig;
use crate::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Finds the environment definition relative to a base directory.
#[derive(Debug, Clone)]
pub struct DefinitionDiscovery {
    base: PathBuf,
}

impl DefinitionDiscovery {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn from_current_dir() -> Self {
        Self::new(std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// Candidates in priority order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        vec![
            self.base.join(env::DEFINITION_FILE_NAME),
            env::local_definition_file_path(&self.base),
        ]
    }

    pub fn find_definition_file(&self) -> Option<PathBuf> {
        for candidate in self.candidates() {
            debug!("Checking for environment definition: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found environment definition: {:?}", candidate);
                return Some(candidate);
            }
        }
        debug!("No environment definition found under {:?}", self.base);
        None
    }

    /// Discovery status lines followed by the resolved process configuration.
    pub fn discovery_info(&self, config: Result<&FixtureConfig, String>) -> String {
        let mut out = String::from("Environment Definition Discovery:\n\n");

        for (i, candidate) in self.candidates().iter().enumerate() {
            let status = if candidate.exists() {
                if candidate.is_file() {
                    "✓ EXISTS"
                } else {
                    "✗ NOT A FILE"
                }
            } else {
                "✗ NOT FOUND"
            };
            out.push_str(&format!("  {}. {:?} - {}\n", i + 1, candidate, status));
        }

        out.push('\n');
        match self.find_definition_file() {
            Some(found) => out.push_str(&format!("Active definition: {:?}\n", found)),
            None => out.push_str("Active definition: none\n"),
        }

        out.push_str("\nDaemon configuration:\n");
        match config {
            Ok(config) => match serde_json::to_string_pretty(config) {
                Ok(json) => out.push_str(&json),
                Err(e) => out.push_str(&format!("  unprintable: {}", e)),
            },
            Err(e) => out.push_str(&format!("  {}", e)),
        }
        out.push('\n');
        out
    }
}
