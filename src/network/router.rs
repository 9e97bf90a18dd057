use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;

use super::interface::{Interface, WireEnd};
use crate::error::{LinkError, RouterError};
use crate::protocol::{
    Address, InterfaceCosts, InterfaceIndex, Packet, PacketKind, RoutingTable, UpdatePolicy,
};

/// Where a changed table is re-advertised after an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvertiseScope {
    /// Only back out of the interface the update arrived on
    #[default]
    ArrivalInterface,
    /// Every router-facing interface except the arrival one
    AllExceptArrival,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub forwarded: u64,
    pub dropped: u64,
    pub advertisements_sent: u64,
    pub updates_received: u64,
    pub malformed_updates: u64,
}

pub struct Router {
    name: Address,
    interfaces: Vec<Interface>,
    table: RoutingTable,
    scope: AdvertiseScope,
    stats: RouterStats,
}

impl Router {
    /// Creates a router with one interface per configured interface index
    /// (`0..=max`), each holding `capacity` items per direction.
    pub fn new(
        name: impl Into<Address>,
        neighbors: Vec<(Address, InterfaceCosts)>,
        capacity: usize,
    ) -> (Router, Vec<WireEnd>) {
        let name = name.into();
        let count = neighbors
            .iter()
            .flat_map(|(_, costs)| costs.keys())
            .max()
            .map_or(0, |max| max + 1);

        let (interfaces, wires): (Vec<_>, Vec<_>) =
            (0..count).map(|_| Interface::new(capacity)).unzip();
        let table = RoutingTable::new(name.clone(), neighbors);

        info!("{}: initialized with {} interfaces", name, count);
        debug!("{}", table.report());

        (
            Router {
                name,
                interfaces,
                table,
                scope: AdvertiseScope::default(),
                stats: RouterStats::default(),
            },
            wires,
        )
    }

    pub fn with_policy(mut self, policy: UpdatePolicy) -> Self {
        self.table = self.table.with_policy(policy);
        self
    }

    pub fn with_scope(mut self, scope: AdvertiseScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn name(&self) -> &Address {
        &self.name
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    /// One sweep over every interface, handling at most one packet each.
    /// Returns how many packets were handled. A packet that does not decode
    /// is fatal.
    pub fn process_one_cycle(&mut self) -> Result<usize, RouterError> {
        let mut handled = 0;
        for index in 0..self.interfaces.len() {
            let Some(bytes) = self.interfaces[index].receive() else {
                continue;
            };
            let packet = Packet::decode(&bytes).inspect_err(|e| {
                error!("{}: undecodable packet {:?} on interface {}: {}", self.name, bytes, index, e);
            })?;
            match packet.kind {
                PacketKind::Data => self.forward(packet, index),
                PacketKind::Control => self.on_advertisement(&packet, index),
            }
            handled += 1;
        }
        Ok(handled)
    }

    /// Sends a data packet toward its destination. Best effort: unroutable
    /// packets and full queues are dropped and logged.
    pub fn forward(&mut self, packet: Packet, in_interface: InterfaceIndex) {
        let Some(out_interface) = self.table.best_route(packet.dst.as_str()) else {
            warn!(
                "{}: no route for \"{}\" from interface {}, dropped",
                self.name, packet, in_interface
            );
            self.stats.dropped += 1;
            return;
        };

        let bytes = match packet.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("{}: cannot re-encode \"{}\": {}", self.name, packet, e);
                self.stats.dropped += 1;
                return;
            }
        };

        if self.transmit(out_interface, bytes) {
            self.stats.forwarded += 1;
            debug!(
                "{}: forwarding packet \"{}\" from interface {} to {}",
                self.name, packet, in_interface, out_interface
            );
        } else {
            self.stats.dropped += 1;
            warn!(
                "{}: packet \"{}\" lost on interface {}",
                self.name, packet, out_interface
            );
        }
    }

    /// Merges a received table and triggers an update when it taught us
    /// something. Malformed tables are dropped.
    pub fn on_advertisement(&mut self, packet: &Packet, in_interface: InterfaceIndex) {
        self.stats.updates_received += 1;
        match self.table.update(in_interface, &packet.payload) {
            Ok(true) => {
                info!(
                    "{}: routing update on interface {} changed the table",
                    self.name, in_interface
                );
                debug!("{}", self.table.report());
                match self.scope {
                    AdvertiseScope::ArrivalInterface => self.advertise(in_interface),
                    AdvertiseScope::AllExceptArrival => {
                        for index in self.router_interfaces() {
                            if index != in_interface {
                                self.advertise(index);
                            }
                        }
                    }
                }
            }
            Ok(false) => {
                debug!("{}: routing update on interface {} changed nothing", self.name, in_interface);
            }
            Err(e) => {
                self.stats.malformed_updates += 1;
                warn!(
                    "{}: malformed routing update on interface {} dropped: {}",
                    self.name, in_interface, e
                );
            }
        }
    }

    /// Sends the serialized table out of `interface`.
    pub fn advertise(&mut self, interface: InterfaceIndex) {
        let packet = Packet::control(self.table.serialize());
        let bytes = match packet.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("{}: cannot encode routing update: {}", self.name, e);
                return;
            }
        };
        if self.transmit(interface, bytes) {
            self.stats.advertisements_sent += 1;
            debug!(
                "{}: sending routing update \"{}\" from interface {}",
                self.name, packet, interface
            );
        } else {
            warn!("{}: routing update lost on interface {}", self.name, interface);
        }
    }

    /// Advertises on every interface that faces a router.
    pub fn advertise_all(&mut self) {
        for index in self.router_interfaces() {
            self.advertise(index);
        }
    }

    fn router_interfaces(&self) -> Vec<InterfaceIndex> {
        (0..self.interfaces.len())
            .filter(|&index| self.table.neighbor_on(index).is_some_and(Address::is_router))
            .collect()
    }

    fn transmit(&mut self, interface: InterfaceIndex, bytes: String) -> bool {
        let Some(iface) = self.interfaces.get(interface) else {
            warn!("{}: {}", self.name, RouterError::UnknownInterface(interface));
            return false;
        };
        match iface.try_send(bytes) {
            Ok(()) => true,
            Err(LinkError::QueueFull) => false,
            Err(LinkError::Disconnected) => {
                debug!("{}: interface {} is not wired", self.name, interface);
                false
            }
        }
    }

    /// Polls until `shutdown` reads `true`. The flag is checked once per
    /// sweep; an idle sweep waits up to `idle` for the stop signal instead
    /// of spinning. Returns the router so its final state can be inspected.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
        idle: Duration,
    ) -> Result<Self, RouterError> {
        info!("{}: starting", self.name);
        loop {
            if *shutdown.borrow() {
                break;
            }
            if self.process_one_cycle()? > 0 {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(idle) => {}
            }
        }
        info!("{}: ending", self.name);
        Ok(self)
    }
}
