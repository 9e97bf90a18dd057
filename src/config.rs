use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::network::AdvertiseScope;
use crate::protocol::{ADDRESS_LENGTH, Address, InterfaceCosts, InterfaceIndex, UpdatePolicy};

fn default_poll_interval_ms() -> u64 {
    10
}

/// Whole-network description: nodes, the links between them, and traffic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Per-direction queue capacity of router interfaces; 0 is unbounded
    #[serde(default)]
    pub queue_capacity: usize,
    #[serde(default)]
    pub update_policy: UpdatePolicy,
    #[serde(default)]
    pub advertise_scope: AdvertiseScope,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    pub routers: Vec<RouterConfig>,
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
    pub links: Vec<LinkConfig>,
    #[serde(default)]
    pub traffic: Vec<TrafficConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub name: Address,
    /// Static adjacency, in the order the routing table will list it
    pub neighbors: Vec<NeighborConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborConfig {
    pub name: Address,
    /// Interface index → link cost
    pub interfaces: InterfaceCosts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub node: Address,
    #[serde(default)]
    pub interface: InterfaceIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub a: Endpoint,
    pub b: Endpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficConfig {
    pub from: Address,
    pub to: Address,
    pub payload: String,
    /// Delay before sending when nodes run as tasks
    #[serde(default)]
    pub delay_ms: u64,
}

impl RouterConfig {
    pub fn cost_table(&self) -> Vec<(Address, InterfaceCosts)> {
        self.neighbors
            .iter()
            .map(|n| (n.name.clone(), n.interfaces.clone()))
            .collect()
    }

    fn interface_indices(&self) -> impl Iterator<Item = InterfaceIndex> + '_ {
        self.neighbors.iter().flat_map(|n| n.interfaces.keys().copied())
    }
}

impl Endpoint {
    pub fn label(&self) -> String {
        format!("{}:{}", self.node, self.interface)
    }
}

impl SimulationConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Checks names, interface numbering and link endpoints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

        // node name -> interface count
        let mut nodes: HashMap<&Address, usize> = HashMap::new();
        let names = self
            .routers
            .iter()
            .map(|r| &r.name)
            .chain(self.hosts.iter().map(|h| &h.address));
        for name in names {
            if name.is_none() || name.as_str().len() > ADDRESS_LENGTH {
                return invalid(format!(
                    "node name {:?} must be 1 to {} characters",
                    name.as_str(),
                    ADDRESS_LENGTH
                ));
            }
            if !name.as_str().is_ascii() {
                return invalid(format!("node name {:?} must be ASCII", name.as_str()));
            }
            if nodes.insert(name, 1).is_some() {
                return invalid(format!("node {} declared twice", name));
            }
        }

        for router in &self.routers {
            if !router.name.is_router() {
                return invalid(format!("router name {} must start with 'R'", router.name));
            }
            let mut seen = BTreeSet::new();
            for index in router.interface_indices() {
                if !seen.insert(index) {
                    return invalid(format!(
                        "router {} uses interface {} for two neighbors",
                        router.name, index
                    ));
                }
            }
            if seen.iter().copied().ne(0..seen.len()) {
                return invalid(format!(
                    "router {} interfaces must be numbered 0..{}",
                    router.name,
                    seen.len()
                ));
            }
            nodes.insert(&router.name, seen.len());
        }

        for host in &self.hosts {
            if host.address.is_router() {
                return invalid(format!("host address {} must not start with 'R'", host.address));
            }
        }

        let mut used = HashSet::new();
        for link in &self.links {
            for end in [&link.a, &link.b] {
                let Some(&count) = nodes.get(&end.node) else {
                    return invalid(format!("link endpoint {} names an unknown node", end.label()));
                };
                if end.interface >= count {
                    return invalid(format!("link endpoint {} has no such interface", end.label()));
                }
                if !used.insert(end) {
                    return invalid(format!("link endpoint {} wired twice", end.label()));
                }
            }
        }

        for traffic in &self.traffic {
            if !self.hosts.iter().any(|h| h.address == traffic.from) {
                return invalid(format!("traffic source {} is not a host", traffic.from));
            }
        }

        Ok(())
    }
}
