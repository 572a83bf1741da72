//! Environment variable names and fixed service constants.
//!
//! Centralizes every name the crate reads from the process environment and
//! every well-known image, container name, and port so they live in one place.

/// Container daemon URL, e.g. `tcp://192.168.99.100:2376` or `unix:///var/run/docker.sock`.
pub const DOCKER_HOST: &str = "DOCKER_HOST";

/// Host name used to reach published container ports (readiness probes,
/// database connections). Despite the name it does not have to be a
/// docker-machine host: `localhost` is fine for a local daemon.
pub const DOCKER_MACHINE_NAME: &str = "DOCKER_MACHINE_NAME";

/// Non-empty and not `0` when the daemon connection expects TLS.
pub const DOCKER_TLS_VERIFY: &str = "DOCKER_TLS_VERIFY";

/// Directory holding the daemon's TLS material.
pub const DOCKER_CERT_PATH: &str = "DOCKER_CERT_PATH";

/// Prefix of the per-port override variables, followed by the internal port.
pub const DOCKER_PORT_PREFIX: &str = "ENV_DOCKER_PORT_";

/// Seconds to wait for the daemon before a request fails.
pub const DAEMON_TIMEOUT_SECS: u64 = 120;

/// Environment definition looked up in the working directory.
pub const DEFINITION_FILE_NAME: &str = "fixture-env.toml";

/// Directory form of the definition lookup: `.fixture-env/environment.toml`.
pub const LOCAL_DEFINITION_DIR_NAME: &str = ".fixture-env";
pub const LOCAL_DEFINITION_FILE_NAME: &str = "environment.toml";

pub fn local_definition_file_path(dir: &std::path::Path) -> std::path::PathBuf {
    dir.join(LOCAL_DEFINITION_DIR_NAME)
        .join(LOCAL_DEFINITION_FILE_NAME)
}

/// Name of the port override variable for `internal_port`.
pub fn port_override_var(internal_port: u16) -> String {
    format!("{}{}", DOCKER_PORT_PREFIX, internal_port)
}

/// Oracle XE service constants.
pub mod oracle {
    pub const CONTAINER_NAME: &str = "oracle-xe";
    pub const IMAGE: &str = "alexeiled/docker-oracle-xe-11g";
    pub const PORT: u16 = 1521;
    pub const SERVICE: &str = "xe";
    /// Time the listener needs after the port opens before it accepts logins.
    pub const SETTLE_DELAY_SECS: u64 = 10;
    /// Schema-change history table maintained by the change-log runner.
    pub const CHANGE_LOG_TABLE: &str = "DATABASECHANGELOG";
}

/// Couchbase service constants.
pub mod couchbase {
    pub const CONTAINER_NAME: &str = "slinky_couchbase";
    pub const IMAGE: &str = "couchbase:latest";
    pub const PORTS: [u16; 7] = [8091, 8092, 8093, 8094, 11207, 11210, 11211];
    pub const CLI: &str = "/opt/couchbase/bin/couchbase-cli";
    pub const ADMIN_USER: &str = "admin";
    pub const ADMIN_PASSWORD: &str = "password";
    pub const CLUSTER_NAME: &str = "couchbase_cluster";
    pub const CLUSTER_RAMSIZE_MB: u32 = 500;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_override_var() {
        assert_eq!(port_override_var(1521), "ENV_DOCKER_PORT_1521");
        assert_eq!(port_override_var(8091), "ENV_DOCKER_PORT_8091");
    }

    #[test]
    fn test_local_definition_path() {
        let path = local_definition_file_path(std::path::Path::new("/work"));
        assert_eq!(path, std::path::PathBuf::from("/work/.fixture-env/environment.toml"));
    }
}
