//! Transport contract consumed by the session.
//!
//! The raw transport (sockets, handshakes, reliability) lives outside the
//! core. It pushes [`TransportEvent`]s into an [`InboundSender`] from whatever
//! threads or tasks it runs on, and the session drains the matching
//! [`InboundReceiver`] once per frame. Outbound traffic is collected in an
//! [`Outbox`] during the frame and flushed through [`Transport`] at the end.

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::error::TransportError;
use crate::identity::PeerId;
use crate::protocol::Message;

/// Delivery class requested from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reliability {
    /// Ordered, retransmitted per connection.
    Reliable,
    /// Best effort; may drop or reorder.
    Unreliable,
}

/// Outbound half of the transport contract.
///
/// On a client there is a single connection, addressed as [`PeerId::HOST`],
/// and `broadcast` sends to it.
pub trait Transport {
    /// Send bytes to one peer.
    ///
    /// # Errors
    /// Implementation-defined send failure.
    fn send(
        &mut self,
        peer: PeerId,
        bytes: &[u8],
        reliability: Reliability,
    ) -> Result<(), TransportError>;

    /// Send bytes to every connected peer, optionally skipping one.
    ///
    /// # Errors
    /// Implementation-defined send failure.
    fn broadcast(
        &mut self,
        bytes: &[u8],
        reliability: Reliability,
        except: Option<PeerId>,
    ) -> Result<(), TransportError>;
}

/// Something the transport observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection was established.
    Connected(PeerId),
    /// A connection closed or timed out.
    Disconnected(PeerId),
    /// A datagram arrived.
    Received {
        /// Sending connection.
        peer: PeerId,
        /// One encoded message.
        bytes: Vec<u8>,
    },
}

/// Thread-safe producer side of the inbound queue.
#[derive(Debug, Clone)]
pub struct InboundSender {
    tx: UnboundedSender<TransportEvent>,
}

impl InboundSender {
    /// Push an event. Returns false once the session has been dropped.
    pub fn push(&self, event: TransportEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Report a new connection.
    pub fn connected(&self, peer: PeerId) -> bool {
        self.push(TransportEvent::Connected(peer))
    }

    /// Report a closed connection.
    pub fn disconnected(&self, peer: PeerId) -> bool {
        self.push(TransportEvent::Disconnected(peer))
    }

    /// Deliver a received datagram.
    pub fn received(&self, peer: PeerId, bytes: Vec<u8>) -> bool {
        self.push(TransportEvent::Received { peer, bytes })
    }
}

/// Session-owned consumer side of the inbound queue.
#[derive(Debug)]
pub struct InboundReceiver {
    rx: UnboundedReceiver<TransportEvent>,
}

impl InboundReceiver {
    /// Take every event queued so far without blocking.
    pub fn drain(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    /// Stop accepting new events.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Create a connected inbound queue.
#[must_use]
pub fn inbound_queue() -> (InboundSender, InboundReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (InboundSender { tx }, InboundReceiver { rx })
}

/// Addressing for an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// One peer.
    Peer(PeerId),
    /// Every connected peer.
    All,
    /// Every connected peer except one (host relay).
    AllExcept(PeerId),
}

/// A message waiting to be flushed.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    /// Where it goes.
    pub target: Target,
    /// What goes.
    pub message: Message,
}

/// Per-frame outbound buffer.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Outgoing>,
}

impl Outbox {
    /// Create an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message.
    pub fn push(&mut self, target: Target, message: Message) {
        self.queue.push(Outgoing { target, message });
    }

    /// Queue a message for one peer.
    pub fn send(&mut self, peer: PeerId, message: Message) {
        self.push(Target::Peer(peer), message);
    }

    /// Queue a message for every peer.
    pub fn broadcast(&mut self, message: Message) {
        self.push(Target::All, message);
    }

    /// Queue a message for every peer but one.
    pub fn relay(&mut self, except: PeerId, message: Message) {
        self.push(Target::AllExcept(except), message);
    }

    /// Messages queued so far.
    #[must_use]
    pub fn pending(&self) -> &[Outgoing] {
        &self.queue
    }

    /// Number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take every queued message.
    pub fn drain(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.queue)
    }
}
