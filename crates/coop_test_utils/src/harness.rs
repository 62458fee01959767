//! In-process loopback network.
//!
//! One host session and any number of client sessions, each with its own
//! [`World`], wired together by transports that push encoded bytes straight
//! into the receiving session's inbound queue. Nothing is delivered until the
//! receiving session runs its next frame, so a request-response round trip
//! takes three frames: client flush, host handle, client apply.
//!
//! Every delivered packet is decoded and appended to a per-node log, which
//! lets tests assert on exactly what crossed the wire.
//!
//! # Example
//!
//! ```
//! use coop_test_utils::harness::Harness;
//!
//! let mut net = Harness::new();
//! let client = net.connect_client();
//! net.settle();
//! assert!(net.client(client).session.local_player().is_some());
//! ```

use std::collections::BTreeMap;

use coop_core::config::SessionConfig;
use coop_core::error::TransportError;
use coop_core::identity::PeerId;
use coop_core::protocol::{decode, Message, MessageKind};
use coop_core::session::{NetSession, SessionEvent};
use coop_core::transport::{inbound_queue, InboundSender, Reliability, Transport};
use coop_core::world::World;

/// Frames run by [`Harness::settle`].
pub const SETTLE_FRAMES: usize = 4;

/// One packet that crossed the loopback.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Sending connection.
    pub from: PeerId,
    /// Receiving connection.
    pub to: PeerId,
    /// Requested delivery class.
    pub reliability: Reliability,
    /// Decoded message.
    pub message: Message,
}

fn log_delivery(
    log: &mut Vec<Delivery>,
    from: PeerId,
    to: PeerId,
    bytes: &[u8],
    reliability: Reliability,
) {
    if let Ok(message) = decode(bytes) {
        log.push(Delivery {
            from,
            to,
            reliability,
            message,
        });
    }
}

/// Host side of the loopback: one inbound sender per connected client.
#[derive(Debug, Default)]
pub struct HostLink {
    clients: BTreeMap<PeerId, InboundSender>,
    /// Drop every unreliable packet instead of delivering it.
    pub drop_unreliable: bool,
    /// Everything this link delivered.
    pub log: Vec<Delivery>,
}

impl HostLink {
    fn deliver(&mut self, peer: PeerId, bytes: &[u8], reliability: Reliability) -> bool {
        if self.drop_unreliable && reliability == Reliability::Unreliable {
            return true;
        }
        let Some(client) = self.clients.get(&peer) else {
            return false;
        };
        client.received(PeerId::HOST, bytes.to_vec());
        log_delivery(&mut self.log, PeerId::HOST, peer, bytes, reliability);
        true
    }
}

impl Transport for HostLink {
    fn send(
        &mut self,
        peer: PeerId,
        bytes: &[u8],
        reliability: Reliability,
    ) -> Result<(), TransportError> {
        if self.deliver(peer, bytes, reliability) {
            Ok(())
        } else {
            Err(TransportError::UnknownPeer(peer))
        }
    }

    fn broadcast(
        &mut self,
        bytes: &[u8],
        reliability: Reliability,
        except: Option<PeerId>,
    ) -> Result<(), TransportError> {
        let peers: Vec<PeerId> = self
            .clients
            .keys()
            .copied()
            .filter(|peer| Some(*peer) != except)
            .collect();
        for peer in peers {
            self.deliver(peer, bytes, reliability);
        }
        Ok(())
    }
}

/// Client side of the loopback: a single connection to the host.
#[derive(Debug)]
pub struct ClientLink {
    peer: PeerId,
    host: Option<InboundSender>,
    /// Drop every unreliable packet instead of delivering it.
    pub drop_unreliable: bool,
    /// Everything this link delivered.
    pub log: Vec<Delivery>,
}

impl ClientLink {
    /// Connection id the host knows this client by.
    #[must_use]
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Whether the link still reaches the host.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.host.is_some()
    }
}

impl Transport for ClientLink {
    fn send(
        &mut self,
        peer: PeerId,
        bytes: &[u8],
        reliability: Reliability,
    ) -> Result<(), TransportError> {
        if !peer.is_host() {
            return Err(TransportError::UnknownPeer(peer));
        }
        self.broadcast(bytes, reliability, None)
    }

    fn broadcast(
        &mut self,
        bytes: &[u8],
        reliability: Reliability,
        _except: Option<PeerId>,
    ) -> Result<(), TransportError> {
        let Some(host) = &self.host else {
            return Err(TransportError::UnknownPeer(PeerId::HOST));
        };
        if self.drop_unreliable && reliability == Reliability::Unreliable {
            return Ok(());
        }
        host.received(self.peer, bytes.to_vec());
        log_delivery(&mut self.log, self.peer, PeerId::HOST, bytes, reliability);
        Ok(())
    }
}

/// One session with its world, transport and collected events.
#[derive(Debug)]
pub struct Node<T> {
    /// The sync session.
    pub session: NetSession,
    /// Its entity store.
    pub world: World,
    /// Its outbound link.
    pub transport: T,
    /// Events returned by every frame so far.
    pub events: Vec<SessionEvent>,
    inbound: InboundSender,
}

impl<T: Transport> Node<T> {
    fn new(config: SessionConfig, transport: T) -> Self {
        let (inbound, rx) = inbound_queue();
        Self {
            session: NetSession::new(config, rx),
            world: World::new(),
            transport,
            events: Vec::new(),
            inbound,
        }
    }

    /// Run one frame.
    pub fn step(&mut self, dt: f32) {
        let events = self
            .session
            .update(dt, &mut self.world, &mut self.transport);
        self.events.extend(events);
    }

    /// Take the events collected so far.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Producer side of this node's inbound queue, for injecting raw traffic.
    #[must_use]
    pub fn inbound(&self) -> &InboundSender {
        &self.inbound
    }
}

/// Host plus clients on one loopback network.
#[derive(Debug)]
pub struct Harness {
    /// The authoritative session.
    pub host: Node<HostLink>,
    clients: Vec<Node<ClientLink>>,
    client_config: SessionConfig,
    next_peer: u32,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    /// Network with default host and client configs.
    #[must_use]
    pub fn new() -> Self {
        Self::with_configs(SessionConfig::host(), SessionConfig::client())
    }

    /// Network with explicit configs.
    #[must_use]
    pub fn with_configs(host: SessionConfig, client: SessionConfig) -> Self {
        Self {
            host: Node::new(host, HostLink::default()),
            clients: Vec::new(),
            client_config: client,
            next_peer: 1,
        }
    }

    /// Connect a new client and return its index. Peer ids start at 1.
    ///
    /// Both sides see `Connected` on their next frame.
    pub fn connect_client(&mut self) -> usize {
        let peer = PeerId(self.next_peer);
        self.next_peer += 1;

        let mut node = Node::new(
            self.client_config.clone(),
            ClientLink {
                peer,
                host: Some(self.host.inbound.clone()),
                drop_unreliable: false,
                log: Vec::new(),
            },
        );
        self.host
            .transport
            .clients
            .insert(peer, node.inbound.clone());
        self.host.inbound.connected(peer);
        node.inbound.connected(PeerId::HOST);
        node.events.clear();

        tracing::debug!(peer = %peer, "Loopback client connected");
        self.clients.push(node);
        self.clients.len() - 1
    }

    /// Cut a client's link. Both sides see `Disconnected` on their next frame.
    pub fn disconnect_client(&mut self, index: usize) {
        let Some(node) = self.clients.get_mut(index) else {
            return;
        };
        let peer = node.transport.peer;
        node.transport.host = None;
        node.inbound.disconnected(PeerId::HOST);
        self.host.transport.clients.remove(&peer);
        self.host.inbound.disconnected(peer);
        tracing::debug!(peer = %peer, "Loopback client disconnected");
    }

    /// Client node by index.
    ///
    /// # Panics
    /// Panics if the index is out of range.
    #[must_use]
    pub fn client(&self, index: usize) -> &Node<ClientLink> {
        &self.clients[index]
    }

    /// Mutable client node by index.
    ///
    /// # Panics
    /// Panics if the index is out of range.
    pub fn client_mut(&mut self, index: usize) -> &mut Node<ClientLink> {
        &mut self.clients[index]
    }

    /// All client nodes.
    #[must_use]
    pub fn clients(&self) -> &[Node<ClientLink>] {
        &self.clients
    }

    /// One frame everywhere: clients first, then the host.
    ///
    /// Peers the host refuses are disconnected, as a real transport would.
    pub fn step(&mut self, dt: f32) {
        for client in &mut self.clients {
            client.step(dt);
        }
        let seen = self.host.events.len();
        self.host.step(dt);

        let refused: Vec<PeerId> = self.host.events[seen..]
            .iter()
            .filter_map(|event| match event {
                SessionEvent::PeerRefused(peer) => Some(*peer),
                _ => None,
            })
            .collect();
        for peer in refused {
            if let Some(index) = self
                .clients
                .iter()
                .position(|client| client.transport.peer == peer)
            {
                self.disconnect_client(index);
            }
        }
    }

    /// Run `frames` frames of `dt` seconds.
    pub fn run(&mut self, frames: usize, dt: f32) {
        for _ in 0..frames {
            self.step(dt);
        }
    }

    /// Run zero-length frames until queued traffic has been handled.
    pub fn settle(&mut self) {
        self.run(SETTLE_FRAMES, 0.0);
    }

    /// Every packet delivered anywhere, host log first.
    #[must_use]
    pub fn deliveries(&self) -> Vec<&Delivery> {
        self.host
            .transport
            .log
            .iter()
            .chain(self.clients.iter().flat_map(|c| c.transport.log.iter()))
            .collect()
    }

    /// Packets of one kind delivered anywhere.
    #[must_use]
    pub fn deliveries_of(&self, kind: MessageKind) -> Vec<&Delivery> {
        self.deliveries()
            .into_iter()
            .filter(|delivery| delivery.message.kind() == kind)
            .collect()
    }

    /// Clear every delivery log.
    pub fn clear_logs(&mut self) {
        self.host.transport.log.clear();
        for client in &mut self.clients {
            client.transport.log.clear();
        }
    }
}
