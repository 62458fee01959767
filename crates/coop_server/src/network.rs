//! UDP adapter for the host.
//!
//! Every datagram starts with a control byte:
//!
//! - [`HELLO`] - an unknown address asking to join; it becomes a peer
//! - [`DATA`] - one encoded session message follows
//! - [`BYE`] - the sender is leaving
//!
//! A background task reads the socket and pushes [`TransportEvent`]s into
//! the session's inbound queue. Sends go straight out with `try_send_to`, so
//! the session never waits on the socket. Reliability is best effort: the
//! flag is accepted but every datagram is sent once.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use coop_core::error::TransportError;
use coop_core::identity::PeerId;
use coop_core::protocol::MAX_MESSAGE_SIZE;
use coop_core::transport::{InboundSender, Reliability, Transport, TransportEvent};

/// Join request.
pub const HELLO: u8 = 0x01;
/// Session message.
pub const DATA: u8 = 0x02;
/// Leave notice.
pub const BYE: u8 = 0x03;

/// Largest datagram the adapter reads or writes.
pub const MAX_DATAGRAM_SIZE: usize = MAX_MESSAGE_SIZE + 1;

/// Prefix a payload with a control byte.
#[must_use]
pub fn frame(control: u8, payload: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(payload.len() + 1);
    datagram.push(control);
    datagram.extend_from_slice(payload);
    datagram
}

#[derive(Debug, Clone, Copy)]
struct PeerSlot {
    addr: SocketAddr,
    last_seen: Instant,
}

/// Known remote addresses and their peer ids.
///
/// Peer ids start at 1 and are never reused within a process.
#[derive(Debug)]
pub struct PeerTable {
    by_addr: HashMap<SocketAddr, PeerId>,
    peers: BTreeMap<PeerId, PeerSlot>,
    next_peer: u32,
    timeout: Duration,
}

impl PeerTable {
    /// Empty table dropping peers after `timeout` of silence.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            by_addr: HashMap::new(),
            peers: BTreeMap::new(),
            next_peer: 1,
            timeout,
        }
    }

    /// Handle one datagram from `addr`, returning what the session should see.
    pub fn on_datagram(
        &mut self,
        addr: SocketAddr,
        datagram: &[u8],
        now: Instant,
    ) -> Option<TransportEvent> {
        let Some((&control, payload)) = datagram.split_first() else {
            trace!(addr = %addr, "Empty datagram");
            return None;
        };
        let known = self.by_addr.get(&addr).copied();

        match (control, known) {
            (HELLO, Some(peer)) => {
                self.touch(peer, now);
                None
            }
            (HELLO, None) => {
                let peer = PeerId(self.next_peer);
                self.next_peer = self.next_peer.saturating_add(1);
                self.by_addr.insert(addr, peer);
                self.peers.insert(
                    peer,
                    PeerSlot {
                        addr,
                        last_seen: now,
                    },
                );
                info!(peer = %peer, addr = %addr, "Peer connected");
                Some(TransportEvent::Connected(peer))
            }
            (DATA, Some(peer)) => {
                self.touch(peer, now);
                Some(TransportEvent::Received {
                    peer,
                    bytes: payload.to_vec(),
                })
            }
            (BYE, Some(peer)) => {
                self.remove(peer);
                info!(peer = %peer, addr = %addr, "Peer said goodbye");
                Some(TransportEvent::Disconnected(peer))
            }
            (DATA | BYE, None) => {
                debug!(addr = %addr, control, "Datagram from unknown address");
                None
            }
            (other, _) => {
                debug!(addr = %addr, control = other, "Unknown control byte");
                None
            }
        }
    }

    fn touch(&mut self, peer: PeerId, now: Instant) {
        if let Some(slot) = self.peers.get_mut(&peer) {
            slot.last_seen = now;
        }
    }

    /// Remove every peer silent for longer than the timeout.
    pub fn expire(&mut self, now: Instant) -> Vec<PeerId> {
        let expired: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, slot)| now.saturating_duration_since(slot.last_seen) > self.timeout)
            .map(|(peer, _)| *peer)
            .collect();
        for peer in &expired {
            self.remove(*peer);
        }
        expired
    }

    /// Forget a peer. Returns its address if it was known.
    pub fn remove(&mut self, peer: PeerId) -> Option<SocketAddr> {
        let slot = self.peers.remove(&peer)?;
        self.by_addr.remove(&slot.addr);
        Some(slot.addr)
    }

    /// Address of a peer.
    #[must_use]
    pub fn addr(&self, peer: PeerId) -> Option<SocketAddr> {
        self.peers.get(&peer).map(|slot| slot.addr)
    }

    /// Every peer with its address, in id order.
    #[must_use]
    pub fn addrs(&self) -> Vec<(PeerId, SocketAddr)> {
        self.peers
            .iter()
            .map(|(peer, slot)| (*peer, slot.addr))
            .collect()
    }

    /// Number of known peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no peer is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Host-side UDP transport.
#[derive(Debug)]
pub struct UdpHostTransport {
    socket: Arc<UdpSocket>,
    peers: Arc<Mutex<PeerTable>>,
    inbound: InboundSender,
}

impl UdpHostTransport {
    /// Bind a socket. Nothing is read until [`Self::spawn_receiver`].
    pub async fn bind(
        addr: SocketAddr,
        timeout: Duration,
        inbound: InboundSender,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket: Arc::new(socket),
            peers: Arc::new(Mutex::new(PeerTable::new(timeout))),
            inbound,
        })
    }

    /// Bound address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Number of connected peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        lock(&self.peers).len()
    }

    /// Start the socket reader. It stops once the session drops its queue.
    pub fn spawn_receiver(&self) -> JoinHandle<()> {
        let socket = Arc::clone(&self.socket);
        let peers = Arc::clone(&self.peers);
        let inbound = self.inbound.clone();

        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                let (len, addr) = match socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(err) => {
                        warn!(error = %err, "UDP receive failed");
                        continue;
                    }
                };
                let event = lock(&peers).on_datagram(addr, &buf[..len], Instant::now());
                if let Some(event) = event {
                    if !inbound.push(event) {
                        debug!("Session queue closed, stopping receiver");
                        break;
                    }
                }
            }
        })
    }

    /// Drop peers that went quiet and tell the session.
    pub fn expire_silent(&self, now: Instant) -> usize {
        let expired = lock(&self.peers).expire(now);
        for peer in &expired {
            info!(peer = %peer, "Peer timed out");
            self.inbound.disconnected(*peer);
        }
        expired.len()
    }

    /// Say goodbye to a peer and forget it without notifying the session.
    pub fn disconnect(&mut self, peer: PeerId) {
        let Some(addr) = lock(&self.peers).remove(peer) else {
            return;
        };
        if let Err(err) = self.socket.try_send_to(&[BYE], addr) {
            debug!(peer = %peer, error = %err, "Failed to send goodbye");
        }
    }

    fn send_to(
        &self,
        peer: PeerId,
        addr: SocketAddr,
        datagram: &[u8],
        reliability: Reliability,
    ) -> Result<(), TransportError> {
        match self.socket.try_send_to(datagram, addr) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                trace!(peer = %peer, ?reliability, "Send buffer full, datagram dropped");
                Ok(())
            }
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}

fn lock(peers: &Mutex<PeerTable>) -> MutexGuard<'_, PeerTable> {
    peers.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Transport for UdpHostTransport {
    fn send(
        &mut self,
        peer: PeerId,
        bytes: &[u8],
        reliability: Reliability,
    ) -> Result<(), TransportError> {
        let addr = lock(&self.peers)
            .addr(peer)
            .ok_or(TransportError::UnknownPeer(peer))?;
        self.send_to(peer, addr, &frame(DATA, bytes), reliability)
    }

    fn broadcast(
        &mut self,
        bytes: &[u8],
        reliability: Reliability,
        except: Option<PeerId>,
    ) -> Result<(), TransportError> {
        let datagram = frame(DATA, bytes);
        let targets = lock(&self.peers).addrs();
        let mut first_error = None;
        for (peer, addr) in targets {
            if Some(peer) == except {
                continue;
            }
            if let Err(err) = self.send_to(peer, addr, &datagram, reliability) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
