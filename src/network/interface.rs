use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

use crate::error::LinkError;

/// How `Interface::send` behaves when the outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Wait for capacity
    Blocking,
    /// Fail with `LinkError::QueueFull`
    NonBlocking,
}

/// Producer half of one FIFO queue of encoded packets.
#[derive(Debug, Clone)]
pub(crate) enum QueueTx {
    Bounded(mpsc::Sender<String>),
    Unbounded(mpsc::UnboundedSender<String>),
}

/// Consumer half of one FIFO queue of encoded packets.
#[derive(Debug)]
pub(crate) enum QueueRx {
    Bounded(mpsc::Receiver<String>),
    Unbounded(mpsc::UnboundedReceiver<String>),
}

/// Capacity 0 means unbounded.
pub(crate) fn queue(capacity: usize) -> (QueueTx, QueueRx) {
    if capacity == 0 {
        let (tx, rx) = mpsc::unbounded_channel();
        (QueueTx::Unbounded(tx), QueueRx::Unbounded(rx))
    } else {
        let (tx, rx) = mpsc::channel(capacity);
        (QueueTx::Bounded(tx), QueueRx::Bounded(rx))
    }
}

impl QueueTx {
    pub(crate) fn try_push(&self, item: String) -> Result<(), LinkError> {
        match self {
            QueueTx::Bounded(tx) => tx.try_send(item).map_err(|e| match e {
                TrySendError::Full(_) => LinkError::QueueFull,
                TrySendError::Closed(_) => LinkError::Disconnected,
            }),
            QueueTx::Unbounded(tx) => tx.send(item).map_err(|_| LinkError::Disconnected),
        }
    }

    pub(crate) async fn push(&self, item: String) -> Result<(), LinkError> {
        match self {
            QueueTx::Bounded(tx) => tx.send(item).await.map_err(|_| LinkError::Disconnected),
            QueueTx::Unbounded(tx) => tx.send(item).map_err(|_| LinkError::Disconnected),
        }
    }
}

impl QueueRx {
    /// Next queued item, never waits. A disconnected queue reads as empty.
    pub(crate) fn try_pop(&mut self) -> Option<String> {
        let result = match self {
            QueueRx::Bounded(rx) => rx.try_recv(),
            QueueRx::Unbounded(rx) => rx.try_recv(),
        };
        match result {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Waits for the next item; `None` once every producer is gone.
    pub(crate) async fn pop(&mut self) -> Option<String> {
        match self {
            QueueRx::Bounded(rx) => rx.recv().await,
            QueueRx::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// One endpoint of a simulated link, owned by a router or host.
///
/// The owner reads `inbound` and writes `outbound`. The opposite halves live
/// in the matching [`WireEnd`], held by whatever wires the topology together.
#[derive(Debug)]
pub struct Interface {
    inbound: QueueRx,
    outbound: QueueTx,
    capacity: usize,
}

/// Wiring side of an [`Interface`]: delivers into its inbound queue and
/// collects from its outbound queue.
#[derive(Debug)]
pub struct WireEnd {
    pub(crate) inbound: QueueTx,
    pub(crate) outbound: QueueRx,
}

impl Interface {
    /// Creates an interface whose queues each hold `capacity` items
    /// (0 = unbounded), along with its wiring side.
    pub fn new(capacity: usize) -> (Interface, WireEnd) {
        let (in_tx, in_rx) = queue(capacity);
        let (out_tx, out_rx) = queue(capacity);
        (
            Interface {
                inbound: in_rx,
                outbound: out_tx,
                capacity,
            },
            WireEnd {
                inbound: in_tx,
                outbound: out_rx,
            },
        )
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Next delivered item, or `None` when nothing is queued.
    pub fn receive(&mut self) -> Option<String> {
        self.inbound.try_pop()
    }

    pub fn try_send(&self, item: String) -> Result<(), LinkError> {
        self.outbound.try_push(item)
    }

    pub async fn send(&self, item: String, mode: SendMode) -> Result<(), LinkError> {
        match mode {
            SendMode::Blocking => self.outbound.push(item).await,
            SendMode::NonBlocking => self.outbound.try_push(item),
        }
    }
}

impl WireEnd {
    /// Puts an item on the interface's inbound queue without waiting.
    pub fn deliver(&self, item: String) -> Result<(), LinkError> {
        self.inbound.try_push(item)
    }

    /// Takes the next item the owner sent, if any.
    pub fn collect(&mut self) -> Option<String> {
        self.outbound.try_pop()
    }
}
