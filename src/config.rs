//! Process-level configuration.
//!
//! [`FixtureConfig::from_env`] is the only place the crate reads the process
//! environment. Everything downstream receives the resulting struct, so
//! components can be constructed in tests from plain values.

use crate::env;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::debug;

static PORT_OVERRIDE_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{}([0-9]+)$", regex::escape(env::DOCKER_PORT_PREFIX)))
        .expect("port override pattern is valid")
});

/// Missing or malformed configuration. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Docker environment variable {0} not set. If using docker-machine run 'eval \"$(docker-machine env dev)\"' where 'dev' is your docker-machine host"
    )]
    MissingVariable(&'static str),

    #[error("Invalid value '{value}' for {variable}: {reason}")]
    InvalidValue {
        variable: String,
        value: String,
        reason: String,
    },
}

/// How to reach the container daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaemonConfig {
    /// Daemon URL as given in `DOCKER_HOST`.
    pub host: String,
    /// Host name used to reach published ports.
    pub probe_host: String,
    pub tls_verify: bool,
    pub cert_path: Option<PathBuf>,
    pub timeout_secs: u64,
}

/// Operator choice for one internal port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PortOverride {
    /// Variable present but empty: pick a free port.
    Allocate,
    /// Variable holds a port number: use it verbatim.
    Fixed(u16),
}

/// Overrides keyed by internal port. Ports without an entry map to themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortOverrides(BTreeMap<u16, PortOverride>);

impl PortOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, internal_port: u16, choice: PortOverride) -> &mut Self {
        self.0.insert(internal_port, choice);
        self
    }

    pub fn get(&self, internal_port: u16) -> Option<PortOverride> {
        self.0.get(&internal_port).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, PortOverride)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// Parse one override variable value.
    pub fn parse_value(variable: &str, value: &str) -> Result<PortOverride, ConfigError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(PortOverride::Allocate);
        }
        match trimmed.parse::<u16>() {
            Ok(0) | Err(_) => Err(ConfigError::InvalidValue {
                variable: variable.to_string(),
                value: value.to_string(),
                reason: "expected a port number between 1 and 65535 or an empty value".to_string(),
            }),
            Ok(port) => Ok(PortOverride::Fixed(port)),
        }
    }

    /// Collect every `ENV_DOCKER_PORT_<n>` pair from `vars`.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut overrides = Self::new();
        for (key, value) in vars {
            let key = key.as_ref();
            let Some(captures) = PORT_OVERRIDE_VAR.captures(key) else {
                continue;
            };
            let internal = captures[1].parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                variable: key.to_string(),
                value: value.as_ref().to_string(),
                reason: "internal port in variable name is out of range".to_string(),
            })?;
            let choice = Self::parse_value(key, value.as_ref())?;
            debug!("Port override {} -> {:?}", internal, choice);
            overrides.insert(internal, choice);
        }
        Ok(overrides)
    }
}

/// Everything read from the process environment, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixtureConfig {
    pub daemon: DaemonConfig,
    pub port_overrides: PortOverrides,
}

impl FixtureConfig {
    /// Read the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVariable`] when `DOCKER_HOST` or
    /// `DOCKER_MACHINE_NAME` is absent or blank.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: BTreeMap<String, String> = std::env::vars().collect();
        Self::from_lookup(|name| vars.get(name).cloned(), vars.iter())
    }

    /// Build from an arbitrary variable source.
    ///
    /// `lookup` answers single-variable queries; `all` enumerates the
    /// variables scanned for port overrides.
    pub fn from_lookup<F, I, K, V>(lookup: F, all: I) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingVariable(name))
        };

        let host = required(env::DOCKER_HOST)?;
        let probe_host = required(env::DOCKER_MACHINE_NAME)?;

        let tls_verify = lookup(env::DOCKER_TLS_VERIFY)
            .map(|v| {
                let v = v.trim();
                !v.is_empty() && v != "0"
            })
            .unwrap_or(false);
        let cert_path = lookup(env::DOCKER_CERT_PATH)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            daemon: DaemonConfig {
                host,
                probe_host,
                tls_verify,
                cert_path,
                timeout_secs: env::DAEMON_TIMEOUT_SECS,
            },
            port_overrides: PortOverrides::from_vars(all)?,
        })
    }
}
