use log::{debug, warn};
use tokio::sync::watch;

use super::interface::{QueueRx, QueueTx, WireEnd};
use crate::error::LinkError;

/// One direction of a link: drains an outbound queue into the peer's
/// inbound queue. A full peer queue drops the item.
#[derive(Debug)]
pub struct Pipe {
    from: String,
    to: String,
    source: QueueRx,
    sink: QueueTx,
    delivered: u64,
    dropped: u64,
}

impl Pipe {
    fn new(from: String, to: String, source: QueueRx, sink: QueueTx) -> Self {
        Self {
            from,
            to,
            source,
            sink,
            delivered: 0,
            dropped: 0,
        }
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Moves everything currently queued. Returns the number of items taken.
    pub fn pump(&mut self) -> usize {
        let mut moved = 0;
        while let Some(item) = self.source.try_pop() {
            self.transmit(item);
            moved += 1;
        }
        moved
    }

    fn transmit(&mut self, item: String) {
        match self.sink.try_push(item) {
            Ok(()) => self.delivered += 1,
            Err(LinkError::QueueFull) => {
                self.dropped += 1;
                warn!("link {} -> {}: peer queue full, item dropped", self.from, self.to);
            }
            Err(LinkError::Disconnected) => {
                self.dropped += 1;
                debug!("link {} -> {}: peer gone, item dropped", self.from, self.to);
            }
        }
    }

    /// Forwards items as they arrive until `shutdown` flips or the sender
    /// side goes away.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Self {
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                item = self.source.pop() => match item {
                    Some(item) => self.transmit(item),
                    None => break,
                },
            }
        }
        self
    }
}

/// Bidirectional wire between two interfaces.
#[derive(Debug)]
pub struct Link {
    forward: Pipe,
    backward: Pipe,
}

impl Link {
    /// Joins two wire ends; labels only appear in logs.
    pub fn connect(a_label: impl Into<String>, a: WireEnd, b_label: impl Into<String>, b: WireEnd) -> Self {
        let a_label = a_label.into();
        let b_label = b_label.into();
        Self {
            forward: Pipe::new(a_label.clone(), b_label.clone(), a.outbound, b.inbound),
            backward: Pipe::new(b_label, a_label, b.outbound, a.inbound),
        }
    }

    pub fn label(&self) -> String {
        format!("{} <-> {}", self.forward.from, self.forward.to)
    }

    /// Moves everything queued in both directions.
    pub fn pump(&mut self) -> usize {
        self.forward.pump() + self.backward.pump()
    }

    pub fn delivered(&self) -> u64 {
        self.forward.delivered() + self.backward.delivered()
    }

    pub fn dropped(&self) -> u64 {
        self.forward.dropped() + self.backward.dropped()
    }

    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Self {
        let (forward, backward) = tokio::join!(
            self.forward.run(shutdown.clone()),
            self.backward.run(shutdown)
        );
        Self { forward, backward }
    }
}
