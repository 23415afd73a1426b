//! Bootstrap registry: hands out node identities and tracks known addresses.
//!
//! Ids and ports are allocated sequentially under one exclusive lock. Registration
//! is the only point where otherwise independent nodes synchronize.

use crate::config::NetworkConfig;
use crate::error::ChainError;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Identity handed to a node on registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub id: u64,
    pub port: u16,
    pub address: String,
}

#[derive(Debug)]
struct RegistryInner {
    next_id: u64,
    /// `None` once port 65535 has been handed out.
    next_port: Option<u16>,
    addresses: Vec<String>,
}

/// Thread-safe registry shared by every node in the process.
#[derive(Debug, Clone)]
pub struct Registry {
    host: String,
    inner: Arc<Mutex<RegistryInner>>,
}

impl Registry {
    pub fn new(host: impl Into<String>, first_id: u64, first_port: u16) -> Self {
        Self {
            host: host.into(),
            inner: Arc::new(Mutex::new(RegistryInner {
                next_id: first_id,
                next_port: Some(first_port),
                addresses: Vec::new(),
            })),
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(config.host.clone(), config.first_node_id, config.base_port)
    }

    /// Allocates the next id and port and records the resulting address.
    /// Fails once the port range is used up.
    pub fn allocate(&self) -> Result<Registration, ChainError> {
        let mut inner = self.inner.lock();

        let port = inner
            .next_port
            .ok_or_else(|| ChainError::ConnectionError("registry has no ports left".to_string()))?;
        inner.next_port = port.checked_add(1);

        let id = inner.next_id;
        inner.next_id += 1;

        let address = format!("{}:{}", self.host, port);
        inner.addresses.push(address.clone());

        Ok(Registration { id, port, address })
    }

    pub fn known_addresses(&self) -> Vec<String> {
        self.inner.lock().addresses.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Random subset of at most `max` known addresses, never including `own_address`.
    pub fn select_neighbors(&self, own_address: &str, max: usize) -> Vec<String> {
        let mut candidates: Vec<String> = self
            .known_addresses()
            .into_iter()
            .filter(|addr| addr != own_address)
            .collect();
        candidates.shuffle(&mut rand::thread_rng());
        candidates.truncate(max);
        candidates
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::from_config(&NetworkConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_sequential_allocation() {
        let registry = Registry::default();
        let first = registry.allocate().unwrap();
        let second = registry.allocate().unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(first.port, 6000);
        assert_eq!(first.address, "127.0.0.1:6000");
        assert_eq!(second.id, 2);
        assert_eq!(second.port, 6001);
        assert_eq!(registry.known_addresses(), vec![first.address, second.address]);
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let registry = Registry::new("127.0.0.1", 1, 7000);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || (0..25).map(|_| registry.allocate().unwrap()).collect::<Vec<_>>())
            })
            .collect();

        let all: Vec<Registration> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let ids: HashSet<u64> = all.iter().map(|r| r.id).collect();
        let ports: HashSet<u16> = all.iter().map(|r| r.port).collect();

        assert_eq!(ids.len(), 200);
        assert_eq!(ports.len(), 200);
        assert_eq!(*ids.iter().max().unwrap(), 200);
        assert_eq!(registry.len(), 200);
    }

    #[test]
    fn test_neighbor_selection_excludes_self_and_is_bounded() {
        let registry = Registry::default();
        let regs: Vec<_> = (0..8).map(|_| registry.allocate().unwrap()).collect();

        for reg in &regs {
            let neighbors = registry.select_neighbors(&reg.address, 5);
            assert_eq!(neighbors.len(), 5);
            assert!(!neighbors.contains(&reg.address));
            let unique: HashSet<_> = neighbors.iter().collect();
            assert_eq!(unique.len(), neighbors.len());
        }
    }

    #[test]
    fn test_neighbor_selection_with_few_peers() {
        let registry = Registry::default();
        let only = registry.allocate().unwrap();
        assert!(registry.select_neighbors(&only.address, 5).is_empty());

        let other = registry.allocate().unwrap();
        assert_eq!(registry.select_neighbors(&only.address, 5), vec![other.address]);
    }

    #[test]
    fn test_port_range_exhaustion() {
        let registry = Registry::new("127.0.0.1", 1, 65534);
        assert_eq!(registry.allocate().unwrap().port, 65534);
        assert_eq!(registry.allocate().unwrap().port, 65535);

        assert!(matches!(registry.allocate(), Err(ChainError::ConnectionError(_))));
        assert!(registry.allocate().is_err());
        // Failed allocations consume no id and record no address.
        assert_eq!(registry.len(), 2);
        assert!(!registry.known_addresses().iter().any(|a| a.ends_with(":0")));
    }
}
