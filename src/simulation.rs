//! In-process network driver: registers a set of nodes, wires their neighbor
//! sets, starts their listeners and offers helpers for observing convergence.

use crate::blockchain::Block;
use crate::config::Config;
use crate::error::ChainError;
use crate::node::Node;
use crate::registry::Registry;
use crate::transaction::{batch, Transaction};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::info;

/// Payloads flooded by the reference scenario.
pub const SCENARIO_PAYLOADS: [&str; 4] = ["1500USD Sent", "1600USD Sent", "1700USD Sent", "1800USD Sent"];

pub fn scenario_transactions() -> Vec<Transaction> {
    batch(SCENARIO_PAYLOADS)
}

const POLL_INTERVAL: Duration = Duration::from_millis(25);

pub struct Network {
    genesis: Block,
    registry: Registry,
    nodes: Vec<Arc<Node>>,
    listeners: Vec<JoinHandle<()>>,
}

impl Network {
    /// Registers `size` nodes, then lets each pick neighbors among all of them and start listening.
    pub async fn launch(size: usize, config: &Config) -> Result<Self, ChainError> {
        config.validate()?;
        let genesis = Block::genesis();
        let registry = Registry::from_config(&config.network);

        let registrations = (0..size)
            .map(|_| registry.allocate())
            .collect::<Result<Vec<_>, _>>()?;
        let nodes = registrations
            .into_iter()
            .map(|reg| Node::join(reg, &registry, &genesis, config))
            .collect::<Result<Vec<_>, _>>()?;

        let mut listeners = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let (_, handle) = node.start().await?;
            listeners.push(handle);
        }

        info!("Network of {} nodes is up", nodes.len());
        Ok(Self {
            genesis,
            registry,
            nodes,
            listeners,
        })
    }

    pub fn genesis(&self) -> &Block {
        &self.genesis
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn node(&self, id: u64) -> Option<&Arc<Node>> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    /// Ids of every node a flood starting at `origin` can reach, `origin` included.
    pub fn reachable_from(&self, origin: u64) -> HashSet<u64> {
        let by_address: HashMap<&str, &Arc<Node>> =
            self.nodes.iter().map(|n| (n.address(), n)).collect();

        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        if let Some(start) = self.node(origin) {
            seen.insert(start.id());
            queue.push_back(Arc::clone(start));
        }
        while let Some(node) = queue.pop_front() {
            for neighbor in node.neighbors() {
                if let Some(next) = by_address.get(neighbor.as_str()) {
                    if seen.insert(next.id()) {
                        queue.push_back(Arc::clone(next));
                    }
                }
            }
        }
        seen
    }

    /// Polls `condition` until it holds or `limit` elapses.
    pub async fn wait_until<F>(&self, limit: Duration, mut condition: F) -> bool
    where
        F: FnMut(&Network) -> bool,
    {
        let deadline = Instant::now() + limit;
        loop {
            if condition(self) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub fn shutdown(&mut self) {
        for handle in self.listeners.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        self.shutdown();
    }
}
