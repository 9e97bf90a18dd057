use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use super::interface::{Interface, WireEnd};
use crate::error::{FormatError, TransmitError};
use crate::protocol::{Address, Packet, PacketKind};

/// Received packets a host keeps unless told otherwise.
pub const DEFAULT_HISTORY: usize = 1024;

/// An end host with a single interface. It sends data packets and answers
/// every non-ACK data packet it receives with `ACK:<src>`.
pub struct Host {
    address: Address,
    interface: Interface,
    received: Vec<Packet>,
    received_total: u64,
    history: usize,
    scheduled: Vec<(Duration, Address, String)>,
}

impl Host {
    pub fn new(address: impl Into<Address>, capacity: usize) -> (Host, WireEnd) {
        let (interface, wire) = Interface::new(capacity);
        (
            Host {
                address: address.into(),
                interface,
                received: Vec::new(),
                received_total: 0,
                history: DEFAULT_HISTORY,
                scheduled: Vec::new(),
            },
            wire,
        )
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Keeps at most `limit` received packets, dropping the oldest.
    pub fn with_history(mut self, limit: usize) -> Self {
        self.history = limit;
        self.trim_history();
        self
    }

    /// Most recent data packets received, acknowledgments included.
    pub fn received(&self) -> &[Packet] {
        &self.received
    }

    /// Data packets received over the host's lifetime.
    pub fn received_total(&self) -> u64 {
        self.received_total
    }

    fn trim_history(&mut self) {
        if self.received.len() > self.history {
            let excess = self.received.len() - self.history;
            self.received.drain(..excess);
        }
    }

    pub fn send(&self, dst: impl Into<Address>, payload: impl Into<String>) -> Result<(), TransmitError> {
        let packet = Packet::data(dst, self.address.clone(), payload);
        info!("{}: sending packet \"{}\"", self.address, packet);
        self.interface.try_send(packet.encode()?)?;
        Ok(())
    }

    /// Queues a send for `run`, `delay` after it starts.
    pub fn schedule(&mut self, delay: Duration, dst: impl Into<Address>, payload: impl Into<String>) {
        self.scheduled.push((delay, dst.into(), payload.into()));
    }

    /// Sends every scheduled packet now, earliest first. Returns how many
    /// left the host.
    pub fn flush_scheduled(&mut self) -> usize {
        self.scheduled.sort_by_key(|(delay, _, _)| *delay);
        let mut sent = 0;
        for (_, dst, payload) in std::mem::take(&mut self.scheduled) {
            match self.send(dst, payload) {
                Ok(()) => sent += 1,
                Err(e) => warn!("{}: scheduled packet lost: {}", self.address, e),
            }
        }
        sent
    }

    /// Handles one queued packet, if any, and returns it.
    pub fn receive(&mut self) -> Result<Option<Packet>, FormatError> {
        let Some(bytes) = self.interface.receive() else {
            return Ok(None);
        };
        let packet = Packet::decode(&bytes)?;

        if packet.kind == PacketKind::Control {
            debug!("{}: ignoring routing update", self.address);
            return Ok(Some(packet));
        }

        info!("{}: received packet \"{}\"", self.address, packet);
        if !packet.is_ack() {
            let ack = packet.ack(&self.address);
            if let Err(e) = self.send(ack.dst, ack.payload) {
                warn!("{}: acknowledgment to {} lost: {}", self.address, packet.src, e);
            }
        }
        self.received_total += 1;
        self.received.push(packet.clone());
        self.trim_history();
        Ok(Some(packet))
    }

    /// Receives until `shutdown` reads `true`, firing scheduled sends as
    /// they come due. Undecodable packets are logged and skipped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>, idle: Duration) -> Self {
        let started = Instant::now();
        self.scheduled.sort_by_key(|(delay, _, _)| *delay);
        self.scheduled.reverse();

        loop {
            if *shutdown.borrow() {
                break;
            }
            while self
                .scheduled
                .last()
                .is_some_and(|(delay, _, _)| started.elapsed() >= *delay)
            {
                if let Some((_, dst, payload)) = self.scheduled.pop() {
                    if let Err(e) = self.send(dst, payload) {
                        warn!("{}: scheduled packet lost: {}", self.address, e);
                    }
                }
            }

            match self.receive() {
                Ok(Some(_)) => {
                    tokio::task::yield_now().await;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("{}: undecodable packet skipped: {}", self.address, e);
                    continue;
                }
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
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_encodes_data_packet() {
        let (host, mut wire) = Host::new("1", 0);
        host.send("2", "hello").unwrap();
        assert_eq!(wire.collect().as_deref(), Some("00002000011hello"));
    }

    #[test]
    fn data_packet_is_acknowledged() {
        let (mut host, mut wire) = Host::new("2", 0);
        wire.deliver(Packet::data("2", "1", "hello").encode().unwrap()).unwrap();

        let packet = host.receive().unwrap().unwrap();
        assert_eq!(packet.payload, "hello");
        assert_eq!(host.received().len(), 1);

        let ack = Packet::decode(&wire.collect().unwrap()).unwrap();
        assert_eq!(ack, Packet::data("1", "2", "ACK:1"));
    }

    #[test]
    fn ack_is_not_acknowledged() {
        let (mut host, mut wire) = Host::new("1", 0);
        wire.deliver(Packet::data("1", "2", "ACK:1").encode().unwrap()).unwrap();

        assert!(host.receive().unwrap().unwrap().is_ack());
        assert_eq!(wire.collect(), None);
    }

    #[test]
    fn control_packets_are_ignored() {
        let (mut host, mut wire) = Host::new("1", 0);
        wire.deliver(Packet::control("R1;").encode().unwrap()).unwrap();

        assert!(host.receive().unwrap().is_some());
        assert!(host.received().is_empty());
        assert_eq!(wire.collect(), None);
    }

    #[test]
    fn flush_sends_in_delay_order() {
        let (mut host, mut wire) = Host::new("1", 0);
        host.schedule(Duration::from_millis(20), "3", "second");
        host.schedule(Duration::from_millis(10), "2", "first");

        assert_eq!(host.flush_scheduled(), 2);
        assert_eq!(host.flush_scheduled(), 0);
        assert_eq!(wire.collect().as_deref(), Some("00002000011first"));
        assert_eq!(wire.collect().as_deref(), Some("00003000011second"));
    }

    #[test]
    fn history_keeps_most_recent_packets() {
        let (host, wire) = Host::new("2", 0);
        let mut host = host.with_history(2);
        for payload in ["ACK:a", "ACK:b", "ACK:c"] {
            wire.deliver(Packet::data("2", "1", payload).encode().unwrap()).unwrap();
            host.receive().unwrap();
        }

        let kept: Vec<&str> = host.received().iter().map(|p| p.payload.as_str()).collect();
        assert_eq!(kept, ["ACK:b", "ACK:c"]);
        assert_eq!(host.received_total(), 3);
    }

    #[test]
    fn empty_queue_yields_nothing() {
        let (mut host, _wire) = Host::new("1", 0);
        assert_eq!(host.receive(), Ok(None));
    }

    #[tokio::test]
    async fn run_fires_scheduled_sends() {
        let (mut host, mut wire) = Host::new("1", 0);
        host.schedule(Duration::from_millis(5), "3", "later");
        host.schedule(Duration::ZERO, "2", "now");
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(host.run(stop_rx, Duration::from_millis(1)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();
        task.await.unwrap();

        let sent: Vec<Packet> = std::iter::from_fn(|| wire.collect())
            .map(|bytes| Packet::decode(&bytes).unwrap())
            .collect();
        assert_eq!(
            sent,
            vec![Packet::data("2", "1", "now"), Packet::data("3", "1", "later")]
        );
    }
}
