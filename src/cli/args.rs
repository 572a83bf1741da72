//! Command line argument parsing
//!
//! Subcommands:
//! - `up`: Provision the environment and print its report as JSON
//! - `down`: Tear the database down, then remove the container (`--skip-database`: container only)
//! - `teardown-db`: Database-only teardown against a running container
//! - `show-config`: Show resolved daemon configuration and definition discovery

use super::config::DefinitionDiscovery;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    Up(EnvironmentInput),
    Down {
        input: EnvironmentInput,
        skip_database: bool,
    },
    TeardownDatabase {
        input: EnvironmentInput,
        host: Option<String>,
    },
    ShowConfig,
}

#[derive(Debug, PartialEq, Eq)]
pub struct EnvironmentInput {
    pub definition: PathBuf,
}

#[derive(Debug, Parser)]
#[command(name = "fixture-env")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Provision disposable service containers and reset database state for tests")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Enable debug logging (ignored when RUST_LOG is set)
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Provision the environment (image, container, readiness, init commands)
    Up {
        /// Environment definition (TOML); discovered when omitted
        definition: Option<PathBuf>,
    },
    /// Tear the database down, then remove the container
    Down {
        /// Environment definition (TOML); discovered when omitted
        definition: Option<PathBuf>,
        /// Remove the container only, leaving database objects alone
        #[arg(long = "skip-database")]
        skip_database: bool,
    },
    /// Drop the database objects the environment created, leaving the container
    TeardownDb {
        /// Environment definition (TOML); discovered when omitted
        definition: Option<PathBuf>,
        /// Database host, defaults to DOCKER_MACHINE_NAME
        #[arg(long = "host")]
        host: Option<String>,
    },
    /// Show daemon configuration and definition discovery information
    ShowConfig,
}

impl Args {
    pub fn parse() -> Self {
        Parser::parse()
    }

    pub fn mode(&self) -> Result<ExecutionMode, String> {
        self.mode_in(&DefinitionDiscovery::from_current_dir())
    }

    /// Resolve the execution mode, discovering definitions through `discovery`.
    pub fn mode_in(&self, discovery: &DefinitionDiscovery) -> Result<ExecutionMode, String> {
        match &self.command {
            Some(Commands::Up { definition }) => Ok(ExecutionMode::Up(Self::input(
                definition.as_deref(),
                discovery,
            )?)),
            Some(Commands::Down {
                definition,
                skip_database,
            }) => Ok(ExecutionMode::Down {
                input: Self::input(definition.as_deref(), discovery)?,
                skip_database: *skip_database,
            }),
            Some(Commands::TeardownDb { definition, host }) => {
                Ok(ExecutionMode::TeardownDatabase {
                    input: Self::input(definition.as_deref(), discovery)?,
                    host: host.clone(),
                })
            }
            Some(Commands::ShowConfig) => Ok(ExecutionMode::ShowConfig),
            None => Err(
                "No command specified. Use 'fixture-env --help' to see available commands."
                    .to_string(),
            ),
        }
    }

    fn input(
        explicit: Option<&Path>,
        discovery: &DefinitionDiscovery,
    ) -> Result<EnvironmentInput, String> {
        if let Some(path) = explicit {
            return Ok(EnvironmentInput {
                definition: path.to_path_buf(),
            });
        }
        discovery
            .find_definition_file()
            .map(|definition| EnvironmentInput { definition })
            .ok_or_else(|| {
                format!(
                    "No environment definition given and none found in: {}",
                    discovery
                        .candidates()
                        .iter()
                        .map(|c| c.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(command: Commands) -> Args {
        Args {
            verbose: false,
            command: Some(command),
        }
    }

    #[test]
    fn test_explicit_definition_wins() {
        let temp_dir = TempDir::new().unwrap();
        let discovery = DefinitionDiscovery::new(temp_dir.path());

        let mode = args(Commands::Up {
            definition: Some(PathBuf::from("env/oracle.toml")),
        })
        .mode_in(&discovery)
        .unwrap();

        assert_eq!(
            mode,
            ExecutionMode::Up(EnvironmentInput {
                definition: PathBuf::from("env/oracle.toml")
            })
        );
    }

    #[test]
    fn test_definition_discovered() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fixture-env.toml");
        std::fs::write(&path, "").unwrap();
        let discovery = DefinitionDiscovery::new(temp_dir.path());

        let mode = args(Commands::TeardownDb {
            definition: None,
            host: Some("db.local".to_string()),
        })
        .mode_in(&discovery)
        .unwrap();

        match mode {
            ExecutionMode::TeardownDatabase { input, host } => {
                assert_eq!(input.definition, path);
                assert_eq!(host.as_deref(), Some("db.local"));
            }
            other => panic!("Expected TeardownDatabase mode, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_definition_lists_candidates() {
        let temp_dir = TempDir::new().unwrap();
        let discovery = DefinitionDiscovery::new(temp_dir.path());

        let err = args(Commands::Down {
            definition: None,
            skip_database: false,
        })
            .mode_in(&discovery)
            .unwrap_err();

        assert!(err.contains("fixture-env.toml"));
        assert!(err.contains("environment.toml"));
    }

    #[test]
    fn test_parse_subcommands() {
        let parsed = Args::try_parse_from(["fixture-env", "-v", "teardown-db", "db.toml", "--host", "h"])
            .unwrap();
        assert!(parsed.verbose);
        assert!(matches!(
            parsed.command,
            Some(Commands::TeardownDb { ref host, .. }) if host.as_deref() == Some("h")
        ));

        let parsed = Args::try_parse_from(["fixture-env", "show-config"]).unwrap();
        assert_eq!(parsed.mode().unwrap(), ExecutionMode::ShowConfig);
    }

    #[test]
    fn test_down_skip_database_flag() {
        let parsed =
            Args::try_parse_from(["fixture-env", "down", "oracle.toml", "--skip-database"]).unwrap();
        let discovery = DefinitionDiscovery::new(TempDir::new().unwrap().path());

        assert_eq!(
            parsed.mode_in(&discovery).unwrap(),
            ExecutionMode::Down {
                input: EnvironmentInput {
                    definition: PathBuf::from("oracle.toml")
                },
                skip_database: true,
            }
        );

        let parsed = Args::try_parse_from(["fixture-env", "down", "oracle.toml"]).unwrap();
        assert!(matches!(
            parsed.mode_in(&discovery).unwrap(),
            ExecutionMode::Down { skip_database: false, .. }
        ));
    }

    #[test]
    fn test_no_command_error() {
        let args = Args {
            verbose: false,
            command: None,
        };
        assert!(args.mode().is_err());
    }
}
