//! Internal → external port resolution.
//!
//! Each internal (container-side) port is published on an external host port.
//! Resolution order: an explicit operator-fixed port, then a port already
//! allocated for the same internal port, then a fresh OS-assigned port when
//! the operator asked for one, and finally the internal port itself.
//!
//! Free-port allocation binds an ephemeral listener and drops it straight
//! away. Another process can grab the port between that release and the
//! daemon binding it; this race is accepted, not handled.

use crate::config::{PortOverride, PortOverrides};
use crate::container::{ContainerError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::Mutex;
use tracing::debug;

/// Resolves external ports from operator overrides.
#[derive(Debug, Default)]
pub struct PortAllocator {
    overrides: PortOverrides,
    allocated: Mutex<HashMap<u16, u16>>,
}

impl PortAllocator {
    pub fn new(overrides: PortOverrides) -> Self {
        Self {
            overrides,
            allocated: Mutex::new(HashMap::new()),
        }
    }

    /// Ask the OS for a currently unused TCP port.
    ///
    /// # Errors
    ///
    /// Returns error if no ephemeral listener can be bound.
    pub fn allocate_free_port() -> Result<u16> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        let port = listener.local_addr()?.port();
        drop(listener);
        debug!("Selected free port {}", port);
        Ok(port)
    }

    /// External port for `internal_port`.
    ///
    /// # Errors
    ///
    /// Returns error if a free port was requested but none could be bound.
    pub fn resolve_external_port(&self, internal_port: u16) -> Result<u16> {
        match self.overrides.get(internal_port) {
            Some(PortOverride::Fixed(port)) => Ok(port),
            Some(PortOverride::Allocate) => {
                let mut allocated = self.allocated.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(port) = allocated.get(&internal_port) {
                    return Ok(*port);
                }
                let port = Self::allocate_free_port()?;
                allocated.insert(internal_port, port);
                Ok(port)
            }
            None => Ok(internal_port),
        }
    }
}

/// Ordered internal → external port pairs with unique internal ports.
///
/// Built once when an environment is defined and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    pairs: Vec<(u16, u16)>,
}

impl PortMapping {
    /// Build from explicit pairs.
    ///
    /// # Errors
    ///
    /// Returns error if an internal port appears twice.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u16, u16)>,
    {
        let mut collected: Vec<(u16, u16)> = Vec::new();
        for (internal, external) in pairs {
            if collected.iter().any(|(i, _)| *i == internal) {
                return Err(ContainerError::ConfigError(format!(
                    "Internal port {} declared more than once",
                    internal
                )));
            }
            collected.push((internal, external));
        }
        Ok(Self { pairs: collected })
    }

    /// Resolve every internal port through `allocator`, keeping declaration order.
    ///
    /// # Errors
    ///
    /// Returns error on duplicate internal ports or failed allocation.
    pub fn resolve(internal_ports: &[u16], allocator: &PortAllocator) -> Result<Self> {
        let pairs = internal_ports
            .iter()
            .map(|internal| Ok((*internal, allocator.resolve_external_port(*internal)?)))
            .collect::<Result<Vec<_>>>()?;
        Self::from_pairs(pairs)
    }

    /// Identity mapping for every port.
    ///
    /// # Errors
    ///
    /// Returns error on duplicate internal ports.
    pub fn identity(internal_ports: &[u16]) -> Result<Self> {
        Self::from_pairs(internal_ports.iter().map(|p| (*p, *p)))
    }

    pub fn external_for(&self, internal_port: u16) -> Option<u16> {
        self.pairs
            .iter()
            .find(|(i, _)| *i == internal_port)
            .map(|(_, e)| *e)
    }

    /// First declared pair, used as the readiness probe target.
    pub fn first(&self) -> Option<(u16, u16)> {
        self.pairs.first().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.pairs.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_free_port_returns_distinct_ports() {
        let first = PortAllocator::allocate_free_port().unwrap();
        assert!(first >= 1024);

        // the OS hands out a different ephemeral port while `first` is held
        let held = TcpListener::bind((Ipv4Addr::UNSPECIFIED, first)).unwrap();
        let second = PortAllocator::allocate_free_port().unwrap();
        assert!(second >= 1024);
        assert_ne!(first, second);
        drop(held);
    }

    #[test]
    fn test_identity_without_override() {
        let allocator = PortAllocator::new(PortOverrides::new());
        assert_eq!(allocator.resolve_external_port(1521).unwrap(), 1521);
    }

    #[test]
    fn test_fixed_override_used_verbatim() {
        let mut overrides = PortOverrides::new();
        overrides.insert(1521, PortOverride::Fixed(41521));
        let allocator = PortAllocator::new(overrides);
        assert_eq!(allocator.resolve_external_port(1521).unwrap(), 41521);
        assert_eq!(allocator.resolve_external_port(8091).unwrap(), 8091);
    }

    #[test]
    fn test_allocated_port_is_stable_per_internal_port() {
        let mut overrides = PortOverrides::new();
        overrides.insert(1521, PortOverride::Allocate);
        let allocator = PortAllocator::new(overrides);

        let first = allocator.resolve_external_port(1521).unwrap();
        let again = allocator.resolve_external_port(1521).unwrap();
        assert_eq!(first, again);
        assert!(first >= 1024);
    }

    #[test]
    fn test_mapping_keeps_order() {
        let mut overrides = PortOverrides::new();
        overrides.insert(8092, PortOverride::Fixed(18092));
        let allocator = PortAllocator::new(overrides);

        let mapping = PortMapping::resolve(&[8091, 8092, 8093], &allocator).unwrap();
        assert_eq!(
            mapping.iter().collect::<Vec<_>>(),
            vec![(8091, 8091), (8092, 18092), (8093, 8093)]
        );
        assert_eq!(mapping.first(), Some((8091, 8091)));
        assert_eq!(mapping.external_for(8092), Some(18092));
        assert_eq!(mapping.external_for(9999), None);
        assert_eq!(mapping.len(), 3);
    }

    #[test]
    fn test_duplicate_internal_port_rejected() {
        let result = PortMapping::identity(&[1521, 1521]);
        assert!(matches!(result, Err(ContainerError::ConfigError(_))));
    }
}
