//! Builds a network from a [`SimulationConfig`] and drives it, either in
//! deterministic rounds or as one tokio task per node and link.

use anyhow::Context;
use log::{info, warn};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;

use super::{Host, Link, Router, WireEnd};
use crate::config::SimulationConfig;
use crate::error::{ConfigError, RouterError};
use crate::protocol::Address;

pub struct Simulation {
    routers: Vec<Router>,
    hosts: Vec<Host>,
    links: Vec<Link>,
    poll_interval: Duration,
}

impl Simulation {
    pub fn from_config(config: &SimulationConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut wires: HashMap<(Address, usize), WireEnd> = HashMap::new();
        let mut routers = Vec::with_capacity(config.routers.len());
        for rc in &config.routers {
            let (router, ends) = Router::new(rc.name.clone(), rc.cost_table(), config.queue_capacity);
            let router = router
                .with_policy(config.update_policy)
                .with_scope(config.advertise_scope);
            for (index, end) in ends.into_iter().enumerate() {
                wires.insert((rc.name.clone(), index), end);
            }
            routers.push(router);
        }

        let mut hosts = Vec::with_capacity(config.hosts.len());
        for hc in &config.hosts {
            // Host links are never the bottleneck.
            let (mut host, end) = Host::new(hc.address.clone(), 0);
            for traffic in config.traffic.iter().filter(|t| t.from == hc.address) {
                host.schedule(
                    Duration::from_millis(traffic.delay_ms),
                    traffic.to.clone(),
                    traffic.payload.clone(),
                );
            }
            wires.insert((hc.address.clone(), 0), end);
            hosts.push(host);
        }

        let mut links = Vec::with_capacity(config.links.len());
        for lc in &config.links {
            let a = wires
                .remove(&(lc.a.node.clone(), lc.a.interface))
                .ok_or_else(|| ConfigError::Invalid(format!("endpoint {} unavailable", lc.a.label())))?;
            let b = wires
                .remove(&(lc.b.node.clone(), lc.b.interface))
                .ok_or_else(|| ConfigError::Invalid(format!("endpoint {} unavailable", lc.b.label())))?;
            links.push(Link::connect(lc.a.label(), a, lc.b.label(), b));
        }

        for (node, interface) in wires.keys() {
            warn!("interface {}:{} is not wired", node, interface);
        }

        Ok(Self {
            routers,
            hosts,
            links,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    pub fn routers(&self) -> &[Router] {
        &self.routers
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn router(&self, name: &str) -> Option<&Router> {
        self.routers.iter().find(|r| r.name().as_str() == name)
    }

    pub fn host(&self, address: &str) -> Option<&Host> {
        self.hosts.iter().find(|h| h.address().as_str() == address)
    }

    /// Every router advertises its initial table to its router neighbors.
    pub fn start(&mut self) {
        for router in &mut self.routers {
            router.advertise_all();
        }
    }

    /// Sends a data packet from a host right away.
    pub fn send(&self, from: &str, to: &str, payload: &str) -> anyhow::Result<()> {
        let host = self
            .host(from)
            .with_context(|| format!("no host named {}", from))?;
        host.send(to, payload)
            .with_context(|| format!("{} could not send to {}", from, to))
    }

    /// Sends every host's configured traffic at once, ignoring delays.
    /// Used in step mode after routes have settled.
    pub fn send_scheduled(&mut self) -> usize {
        self.hosts.iter_mut().map(Host::flush_scheduled).sum()
    }

    /// One round: move link traffic, sweep every router once, drain every
    /// host. Returns how much happened; 0 means the network is idle.
    pub fn step(&mut self) -> Result<usize, RouterError> {
        let mut activity = self.pump_links();
        for router in &mut self.routers {
            activity += router.process_one_cycle()?;
        }
        activity += self.pump_links();
        for host in &mut self.hosts {
            loop {
                match host.receive() {
                    Ok(Some(_)) => activity += 1,
                    Ok(None) => break,
                    Err(e) => warn!("{}: undecodable packet skipped: {}", host.address(), e),
                }
            }
        }
        Ok(activity)
    }

    /// Steps until a round does nothing or `max_rounds` is reached.
    /// Returns the number of rounds that saw activity.
    pub fn settle(&mut self, max_rounds: usize) -> Result<usize, RouterError> {
        for round in 0..max_rounds {
            if self.step()? == 0 {
                info!("network idle after {} rounds", round);
                return Ok(round);
            }
        }
        warn!("network still active after {} rounds", max_rounds);
        Ok(max_rounds)
    }

    fn pump_links(&mut self) -> usize {
        self.links.iter_mut().map(Link::pump).sum()
    }

    /// Runs every node and link as its own task for `duration`, then stops
    /// them all and returns the final state. A router that hit a fatal
    /// protocol error fails the whole run.
    pub async fn run_for(self, duration: Duration) -> anyhow::Result<Self> {
        let Self {
            routers,
            hosts,
            links,
            poll_interval,
        } = self;
        let (stop_tx, stop_rx) = watch::channel(false);

        let router_tasks: Vec<_> = routers
            .into_iter()
            .map(|r| tokio::spawn(r.run(stop_rx.clone(), poll_interval)))
            .collect();
        let host_tasks: Vec<_> = hosts
            .into_iter()
            .map(|h| tokio::spawn(h.run(stop_rx.clone(), poll_interval)))
            .collect();
        let link_tasks: Vec<_> = links
            .into_iter()
            .map(|l| tokio::spawn(l.run(stop_rx.clone())))
            .collect();

        tokio::time::sleep(duration).await;
        info!("stopping simulation");
        stop_tx.send(true).context("every node exited before shutdown")?;

        // Join every task before reporting, so nothing outlives the run.
        let mut failure: Option<anyhow::Error> = None;
        let mut routers = Vec::with_capacity(router_tasks.len());
        for task in router_tasks {
            match task.await {
                Ok(Ok(router)) => routers.push(router),
                Ok(Err(e)) => {
                    failure.get_or_insert(e.into());
                }
                Err(e) => {
                    failure.get_or_insert(anyhow::Error::new(e).context("router task panicked"));
                }
            }
        }
        let mut hosts = Vec::with_capacity(host_tasks.len());
        for task in host_tasks {
            match task.await {
                Ok(host) => hosts.push(host),
                Err(e) => {
                    failure.get_or_insert(anyhow::Error::new(e).context("host task panicked"));
                }
            }
        }
        let mut links = Vec::with_capacity(link_tasks.len());
        for task in link_tasks {
            match task.await {
                Ok(link) => links.push(link),
                Err(e) => {
                    failure.get_or_insert(anyhow::Error::new(e).context("link task panicked"));
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        Ok(Self {
            routers,
            hosts,
            links,
            poll_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormatError;
    use crate::protocol::{Cost, InterfaceCosts, Packet};

    const LINE: &str = r#"{
        "routers": [
            { "name": "R1", "neighbors": [
                { "name": "H1", "interfaces": { "0": 1 } },
                { "name": "R2", "interfaces": { "1": 2 } }
            ] },
            { "name": "R2", "neighbors": [
                { "name": "R1", "interfaces": { "0": 2 } },
                { "name": "H2", "interfaces": { "1": 1 } }
            ] }
        ],
        "hosts": [ { "address": "H1" }, { "address": "H2" } ],
        "links": [
            { "a": { "node": "H1" }, "b": { "node": "R1", "interface": 0 } },
            { "a": { "node": "R1", "interface": 1 }, "b": { "node": "R2", "interface": 0 } },
            { "a": { "node": "R2", "interface": 1 }, "b": { "node": "H2" } }
        ],
        "traffic": [ { "from": "H1", "to": "H2", "payload": "hello" } ]
    }"#;

    fn line() -> Simulation {
        Simulation::from_config(&SimulationConfig::from_json(LINE).unwrap()).unwrap()
    }

    #[test]
    fn builds_every_node_and_link() {
        let sim = line();
        assert_eq!(sim.routers().len(), 2);
        assert_eq!(sim.hosts().len(), 2);
        assert_eq!(sim.links().len(), 3);
        assert_eq!(sim.router("R2").unwrap().interface_count(), 2);
        assert!(sim.router("R9").is_none());
        assert!(sim.host("H1").is_some());
    }

    #[test]
    fn settles_and_learns_remote_hosts() {
        let mut sim = line();
        sim.start();
        let rounds = sim.settle(50).unwrap();
        assert!(rounds < 50);

        let r1 = sim.router("R1").unwrap().table();
        assert_eq!(r1.cost_of("H2", "R1"), Cost::Known(3));
        let r2 = sim.router("R2").unwrap().table();
        assert_eq!(r2.cost_of("H1", "R2"), Cost::Known(3));
    }

    #[test]
    fn delivers_scheduled_traffic_and_ack() {
        let mut sim = line();
        sim.start();
        sim.settle(50).unwrap();

        assert_eq!(sim.send_scheduled(), 1);
        sim.settle(50).unwrap();

        let h2 = sim.host("H2").unwrap();
        assert_eq!(h2.received(), [Packet::data("H2", "H1", "hello")]);
        let h1 = sim.host("H1").unwrap();
        assert_eq!(h1.received(), [Packet::data("H1", "H2", "ACK:H1")]);
    }

    #[test]
    fn send_from_unknown_host_fails() {
        let sim = line();
        assert!(sim.send("H9", "H1", "x").is_err());
    }

    #[tokio::test]
    async fn task_mode_converges() {
        let mut config = SimulationConfig::from_json(LINE).unwrap();
        config.poll_interval_ms = 1;
        config.traffic[0].delay_ms = 100;
        let mut sim = Simulation::from_config(&config).unwrap();
        sim.start();
        let sim = sim.run_for(Duration::from_millis(300)).await.unwrap();

        let r1 = sim.router("R1").unwrap().table();
        assert_eq!(r1.cost_of("H2", "R1"), Cost::Known(3));
        assert_eq!(
            sim.host("H2").unwrap().received(),
            [Packet::data("H2", "H1", "hello")]
        );
        assert_eq!(
            sim.host("H1").unwrap().received(),
            [Packet::data("H1", "H2", "ACK:H1")]
        );
    }

    #[tokio::test]
    async fn task_mode_reports_fatal_router_error() {
        let (router, wires) = Router::new(
            "R1",
            vec![(Address::from("H1"), InterfaceCosts::from([(0, 1)]))],
            0,
        );
        let (host, host_wire) = Host::new("H1", 0);
        let router_wire = wires.into_iter().next().unwrap();
        // unknown kind tag
        router_wire.deliver("00001000029junk".to_string()).unwrap();
        let sim = Simulation {
            routers: vec![router],
            hosts: vec![host],
            links: vec![Link::connect("R1:0", router_wire, "H1:0", host_wire)],
            poll_interval: Duration::from_millis(1),
        };

        let err = sim.run_for(Duration::from_millis(50)).await.err().unwrap();
        assert!(matches!(
            err.downcast_ref::<RouterError>(),
            Some(RouterError::Protocol(FormatError::UnknownKind('9')))
        ));
    }
}
