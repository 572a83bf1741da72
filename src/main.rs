use anyhow::{Context, Result};
use fixture_env::cli::{Args, DefinitionDiscovery, EnvironmentInput, ExecutionMode};
use fixture_env::config::FixtureConfig;
use fixture_env::container::{DockerDaemon, PortAllocator};
use fixture_env::database::default_connector;
use fixture_env::environment::{EnvironmentBuilder, EnvironmentDefinition};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "fixture_env=debug"
    } else {
        "fixture_env=info"
    };
    // logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    match mode {
        ExecutionMode::Up(input) => run_up(input).await,
        ExecutionMode::Down {
            input,
            skip_database,
        } => run_down(input, skip_database).await,
        ExecutionMode::TeardownDatabase { input, host } => {
            run_teardown_database(input, host).await
        }
        ExecutionMode::ShowConfig => {
            let config = FixtureConfig::from_env().map_err(|e| e.to_string());
            print!(
                "{}",
                DefinitionDiscovery::from_current_dir().discovery_info(config.as_ref().map_err(Clone::clone))
            );
            Ok(())
        }
    }
}

async fn builder(input: &EnvironmentInput, with_connector: bool) -> Result<EnvironmentBuilder> {
    let definition = EnvironmentDefinition::load(&input.definition)?;
    let config = FixtureConfig::from_env()?;
    info!(
        "Environment '{}' from {}",
        definition.container.name,
        input.definition.display()
    );

    let connector = match (&definition.database, with_connector) {
        (Some(database), true) => Some(default_connector(&database.config)?),
        _ => None,
    };

    let daemon = DockerDaemon::connect(&config.daemon).await?;
    let allocator = PortAllocator::new(config.port_overrides.clone());
    let builder = EnvironmentBuilder::new(
        definition,
        Arc::new(daemon),
        &allocator,
        &config.daemon.probe_host,
    )?;

    Ok(match connector {
        Some(connector) => builder.with_connector(connector),
        None => builder,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    println!("{}", json);
    Ok(())
}

async fn run_up(input: EnvironmentInput) -> Result<()> {
    let mut builder = builder(&input, false).await?;
    let report = builder.set_up().await?;
    print_json(&report)
}

async fn run_down(input: EnvironmentInput, skip_database: bool) -> Result<()> {
    let mut builder = builder(&input, !skip_database).await?;
    let report = if skip_database {
        builder.tear_down_container().await?
    } else {
        builder.tear_down().await?
    };
    print_json(&report)
}

async fn run_teardown_database(input: EnvironmentInput, host: Option<String>) -> Result<()> {
    let builder = builder(&input, true).await?;
    let summary = builder.tear_down_database(host.as_deref()).await?;
    print_json(&summary)
}
