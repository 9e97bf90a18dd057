//! Distance-vector routing state for one router.
//!
//! A router keeps its own cost vector (seeded from the static neighbor
//! configuration) and the last vector advertised by each neighbor router.
//! Costs to destinations a neighbor has not advertised are composed through
//! the local vector only: `cost(dest, n) = cost(n, self) + cost(dest, self)`
//! for untracked `n`. This is a two-hop approximation, not a full
//! Bellman-Ford relaxation.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Add;

use super::packet::Address;
use crate::error::FormatError;

pub type InterfaceIndex = usize;

/// Interface index → link cost for one destination.
pub type InterfaceCosts = BTreeMap<InterfaceIndex, u32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cost {
    Unknown,
    Known(u32),
}

impl Cost {
    pub fn known(self) -> Option<u32> {
        match self {
            Cost::Known(value) => Some(value),
            Cost::Unknown => None,
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, Cost::Known(_))
    }

    /// Strict comparison; an unknown cost is never cheaper than anything.
    pub fn is_cheaper_than(self, other: Cost) -> bool {
        match (self, other) {
            (Cost::Known(a), Cost::Known(b)) => a < b,
            (Cost::Known(_), Cost::Unknown) => true,
            (Cost::Unknown, _) => false,
        }
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        match (self, rhs) {
            (Cost::Known(a), Cost::Known(b)) => Cost::Known(a.saturating_add(b)),
            _ => Cost::Unknown,
        }
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cost::Known(value) => f.pad(&value.to_string()),
            Cost::Unknown => f.pad("-"),
        }
    }
}

/// Outgoing interface and metric toward one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostEntry {
    pub interface: InterfaceIndex,
    pub cost: u32,
}

/// Destination → interface costs, kept in insertion order.
///
/// Order matters: distance-vector ties go to the first destination listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CostVector {
    entries: Vec<(Address, InterfaceCosts)>,
}

impl CostVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, destination: &str) -> Option<&InterfaceCosts> {
        self.entries
            .iter()
            .find(|(name, _)| name.as_str() == destination)
            .map(|(_, costs)| costs)
    }

    pub fn contains(&self, destination: &str) -> bool {
        self.get(destination).is_some()
    }

    /// Replaces the interface costs for `destination`, keeping its position.
    pub fn insert(&mut self, destination: Address, costs: InterfaceCosts) {
        match self.entries.iter_mut().find(|(name, _)| *name == destination) {
            Some((_, existing)) => *existing = costs,
            None => self.entries.push((destination, costs)),
        }
    }

    /// Adds one interface cost to `destination`, creating the entry if needed.
    pub fn add_link(&mut self, destination: Address, interface: InterfaceIndex, cost: u32) {
        match self.entries.iter_mut().find(|(name, _)| *name == destination) {
            Some((_, existing)) => {
                existing.insert(interface, cost);
            }
            None => self
                .entries
                .push((destination, InterfaceCosts::from([(interface, cost)]))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &InterfaceCosts)> {
        self.entries.iter().map(|(name, costs)| (name, costs))
    }

    pub fn destinations(&self) -> impl Iterator<Item = &Address> {
        self.entries.iter().map(|(name, _)| name)
    }

    /// Cheapest cost across every interface listed for `destination`.
    pub fn min_cost(&self, destination: &str) -> Cost {
        self.get(destination)
            .and_then(|costs| costs.values().min().copied())
            .map_or(Cost::Unknown, Cost::Known)
    }

    /// Entry on the lowest-numbered interface listed for `destination`.
    pub fn entry(&self, destination: &str) -> Option<CostEntry> {
        self.get(destination)
            .and_then(|costs| costs.iter().next())
            .map(|(&interface, &cost)| CostEntry { interface, cost })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CostTable {
    /// No advertisement received yet
    Unknown,
    Known(CostVector),
}

/// Best next hop toward a destination and the total cost through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub next_hop: Address,
    pub cost: u32,
}

/// What to do with a destination that is already known when an
/// advertisement arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    /// Recompute for logging only; the stored entry is never rewritten.
    #[default]
    Compatible,
    /// Rewrite the stored entry when the recomputed path is strictly cheaper.
    ApplyCheaper,
}

/// A parsed routing-table payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub owner: Address,
    pub table: CostVector,
}

impl Advertisement {
    /// Parses `<owner>;<dest>:<interface>:<cost>;...`. Segments naming the
    /// same destination accumulate into one entry.
    pub fn parse(payload: &str) -> Result<Self, FormatError> {
        let (owner, rest) = payload.split_once(';').ok_or(FormatError::MissingOwner)?;

        let mut table = CostVector::new();
        for segment in rest.split(';').filter(|s| !s.is_empty()) {
            let fields: Vec<&str> = segment.split(':').collect();
            let [destination, interface, cost] = fields.as_slice() else {
                return Err(FormatError::MalformedEntry(segment.to_string()));
            };
            if destination.is_empty() {
                return Err(FormatError::MalformedEntry(segment.to_string()));
            }
            let interface: InterfaceIndex = interface
                .parse()
                .map_err(|_| FormatError::InvalidNumber(segment.to_string()))?;
            let cost: u32 = cost
                .parse()
                .map_err(|_| FormatError::InvalidNumber(segment.to_string()))?;
            table.add_link(Address::from(*destination), interface, cost);
        }

        Ok(Self {
            owner: Address::from(owner),
            table,
        })
    }
}

pub struct RoutingTable {
    name: Address,
    own: CostVector,
    neighbor_tables: HashMap<Address, CostTable>,
    // Fixed at construction: which neighbor sits behind each interface
    links: BTreeMap<InterfaceIndex, Address>,
    known_destinations: Vec<Address>,
    known_routers: Vec<Address>,
    policy: UpdatePolicy,
}

impl RoutingTable {
    /// Builds the table from the static `neighbor → {interface: cost}`
    /// configuration. Neighbor routers start with an unknown table.
    pub fn new<I>(name: impl Into<Address>, neighbors: I) -> Self
    where
        I: IntoIterator<Item = (Address, InterfaceCosts)>,
    {
        let name = name.into();
        let mut own = CostVector::new();
        let mut links = BTreeMap::new();
        let mut neighbor_tables = HashMap::new();
        let mut known_destinations = vec![name.clone()];
        let mut known_routers = vec![name.clone()];

        for (neighbor, costs) in neighbors {
            for &interface in costs.keys() {
                links.entry(interface).or_insert_with(|| neighbor.clone());
            }
            if neighbor.is_router() && !known_routers.contains(&neighbor) {
                known_routers.push(neighbor.clone());
                neighbor_tables.insert(neighbor.clone(), CostTable::Unknown);
            }
            if !known_destinations.contains(&neighbor) {
                known_destinations.push(neighbor.clone());
            }
            own.insert(neighbor, costs);
        }

        Self {
            name,
            own,
            neighbor_tables,
            links,
            known_destinations,
            known_routers,
            policy: UpdatePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: UpdatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn name(&self) -> &Address {
        &self.name
    }

    pub fn policy(&self) -> UpdatePolicy {
        self.policy
    }

    /// This router's own vector.
    pub fn own_vector(&self) -> &CostVector {
        &self.own
    }

    /// Last advertisement stored for `router`, if it is tracked.
    pub fn neighbor_table(&self, router: &str) -> Option<&CostTable> {
        self.neighbor_tables.get(router)
    }

    pub fn known_destinations(&self) -> &[Address] {
        &self.known_destinations
    }

    /// This router followed by its neighbor routers.
    pub fn known_routers(&self) -> &[Address] {
        &self.known_routers
    }

    /// Neighbor attached to `interface`.
    pub fn neighbor_on(&self, interface: InterfaceIndex) -> Option<&Address> {
        self.links.get(&interface)
    }

    pub fn interfaces(&self) -> impl Iterator<Item = InterfaceIndex> + '_ {
        self.links.keys().copied()
    }

    /// Cost from `router` to `dest` as far as this router knows.
    pub fn cost_of(&self, dest: &str, router: &str) -> Cost {
        if dest == router {
            return Cost::Known(0);
        }
        if router == self.name.as_str() {
            return self.own.min_cost(dest);
        }
        match self.neighbor_tables.get(router) {
            Some(CostTable::Known(vector)) => vector.min_cost(dest),
            Some(CostTable::Unknown) => Cost::Unknown,
            None => {
                self.cost_of(router, self.name.as_str()) + self.cost_of(dest, self.name.as_str())
            }
        }
    }

    /// Cheapest `cost(via, from) + cost(dest, via)` over every destination
    /// in `from`'s vector, in table order, then `from` itself. Ties keep the
    /// first candidate, so a listed neighbor beats `from` at equal cost.
    pub fn distance_vector(&self, dest: &str, from: &str) -> Option<RouteDecision> {
        let listed: Vec<&Address> = if from == self.name.as_str() {
            self.own.destinations().collect()
        } else {
            match self.neighbor_tables.get(from) {
                Some(CostTable::Known(vector)) => vector.destinations().collect(),
                _ => Vec::new(),
            }
        };

        let mut best: Option<(&str, u32)> = None;
        let candidates = listed
            .into_iter()
            .map(Address::as_str)
            .chain(std::iter::once(from));
        for via in candidates {
            let Cost::Known(total) = self.cost_of(via, from) + self.cost_of(dest, via) else {
                continue;
            };
            if best.is_none_or(|(_, cost)| total < cost) {
                best = Some((via, total));
            }
        }

        best.map(|(via, cost)| RouteDecision {
            next_hop: Address::from(via),
            cost,
        })
    }

    /// Outgoing interface toward `dest`, or `None` when unreachable.
    pub fn best_route(&self, dest: &str) -> Option<InterfaceIndex> {
        let decision = self.distance_vector(dest, self.name.as_str())?;
        // A next hop of ourselves means the stored entry for `dest` is the route.
        let hop = if decision.next_hop == self.name {
            dest
        } else {
            decision.next_hop.as_str()
        };
        let interface = self.own.entry(hop).map(|entry| entry.interface);
        debug!(
            "{}: best path to {} via {} (cost {}) on interface {:?}",
            self.name, dest, decision.next_hop, decision.cost, interface
        );
        interface
    }

    /// Merges an advertisement received on `in_interface`.
    ///
    /// The sender's stored table is replaced wholesale. Returns `true` when
    /// at least one destination was learned (or, under
    /// `UpdatePolicy::ApplyCheaper`, an entry got cheaper). A malformed
    /// payload leaves the table untouched.
    pub fn update(&mut self, in_interface: InterfaceIndex, payload: &str) -> Result<bool, FormatError> {
        let advertisement = Advertisement::parse(payload)?;

        let Some(neighbor) = self.links.get(&in_interface).cloned() else {
            warn!(
                "{}: advertisement from {} on interface {} with no neighbor, ignored",
                self.name, advertisement.owner, in_interface
            );
            return Ok(false);
        };

        let advertised: Vec<Address> = advertisement.table.destinations().cloned().collect();
        self.neighbor_tables
            .insert(neighbor.clone(), CostTable::Known(advertisement.table));

        let mut changed = false;
        for dest in advertised {
            if dest == self.name {
                continue;
            }

            if !self.known_destinations.contains(&dest) {
                let cost = self.cost_of(neighbor.as_str(), self.name.as_str())
                    + self.cost_of(dest.as_str(), neighbor.as_str());
                let Cost::Known(cost) = cost else {
                    warn!("{}: no cost to {} through {}, skipped", self.name, dest, neighbor);
                    continue;
                };
                info!(
                    "{}: learned {} via {} on interface {} (cost {})",
                    self.name, dest, neighbor, in_interface, cost
                );
                self.own.add_link(dest.clone(), in_interface, cost);
                self.known_destinations.push(dest);
                changed = true;
                continue;
            }

            let Some(decision) = self.distance_vector(dest.as_str(), self.name.as_str()) else {
                continue;
            };
            match self.policy {
                UpdatePolicy::Compatible => {
                    debug!(
                        "{}: {} best via {} at cost {} (stored {})",
                        self.name,
                        dest,
                        decision.next_hop,
                        decision.cost,
                        self.own.min_cost(dest.as_str())
                    );
                }
                UpdatePolicy::ApplyCheaper => {
                    changed |= self.apply_cheaper(&dest, &decision);
                }
            }
        }

        Ok(changed)
    }

    fn apply_cheaper(&mut self, dest: &Address, decision: &RouteDecision) -> bool {
        if decision.next_hop == self.name
            || !Cost::Known(decision.cost).is_cheaper_than(self.own.min_cost(dest.as_str()))
        {
            return false;
        }
        let Some(entry) = self.own.entry(decision.next_hop.as_str()) else {
            return false;
        };
        info!(
            "{}: {} now via {} on interface {} (cost {} -> {})",
            self.name,
            dest,
            decision.next_hop,
            entry.interface,
            self.own.min_cost(dest.as_str()),
            decision.cost
        );
        // Physical links to a direct neighbor stay listed next to the new path.
        let mut costs: InterfaceCosts = self
            .own
            .get(dest.as_str())
            .map(|costs| {
                costs
                    .iter()
                    .filter(|&(interface, _)| self.links.get(interface) == Some(dest))
                    .map(|(&interface, &cost)| (interface, cost))
                    .collect()
            })
            .unwrap_or_default();
        costs.insert(entry.interface, decision.cost);
        self.own.insert(dest.clone(), costs);
        true
    }

    /// `<name>;<dest>:<interface>:<cost>;...` with one segment per
    /// destination and interface.
    pub fn serialize(&self) -> String {
        let mut out = format!("{};", self.name);
        for (dest, costs) in self.own.iter() {
            for (interface, cost) in costs {
                out.push_str(&format!("{}:{}:{};", dest, interface, cost));
            }
        }
        out
    }

    /// Router × destination cost matrix for display.
    pub fn report(&self) -> RouteReport<'_> {
        RouteReport { table: self }
    }
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

/// Matrix of `cost_of(dest, router)` for every known router and destination.
pub struct RouteReport<'a> {
    table: &'a RoutingTable,
}

impl fmt::Display for RouteReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table;
        writeln!(f, "{}:", table.name)?;
        write!(f, "{:<6}", "")?;
        for dest in &table.known_destinations {
            write!(f, "{:>6}", dest)?;
        }
        writeln!(f)?;
        for router in &table.known_routers {
            write!(f, "{:<6}", router)?;
            for dest in &table.known_destinations {
                write!(f, "{:>6}", table.cost_of(dest.as_str(), router.as_str()))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
