//! Per-domain sync systems.
//!
//! Each system is a set of free functions over a [`SessionContext`] and the
//! world store. The session owns the context and calls into the systems from
//! its dispatcher and its per-frame tick; no system holds a reference to
//! another or to any process-wide state.
//!
//! - [`transform`] - pose and movement ticks, relay, input buffer
//! - [`agent`] - host-driven agent behavior state
//! - [`interaction`] - validated pickup and drop
//! - [`container`] - container open/close and transfers
//! - [`lobby`] - lobby roster and game start
//! - [`spawn`] - spawn announcements and initial state

pub mod agent;
pub mod container;
pub mod interaction;
pub mod lobby;
pub mod spawn;
pub mod transform;

use std::collections::BTreeMap;

use crate::config::SessionConfig;
use crate::error::{RejectReason, Result, SyncError};
use crate::identity::{
    EntityCategory, IdentityMap, NetworkId, NetworkIdAllocator, NetworkIdentity, PeerId,
};
use crate::interpolation::InterpolationEngine;
use crate::protocol::{Body, InteractionRejected, Message};
use crate::session::{SessionEvent, SessionStats};
use crate::transport::{Outbox, Target};
use crate::world::{EntityId, SyncWorld};

/// Fixed-interval accumulator for a sync tick.
///
/// Fires at most once per frame; a long frame does not queue up a burst of
/// ticks because every sample is a full state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickTimer {
    interval: f32,
    accumulator: f32,
}

impl TickTimer {
    /// Timer firing every `interval` seconds.
    #[must_use]
    pub fn new(interval: f32) -> Self {
        Self {
            interval,
            accumulator: 0.0,
        }
    }

    /// Change the interval, keeping accumulated time.
    pub fn set_interval(&mut self, interval: f32) {
        self.interval = interval;
    }

    /// Advance by `dt`; returns true when a tick is due.
    pub fn tick(&mut self, dt: f32) -> bool {
        self.accumulator += dt;
        if self.interval <= 0.0 || self.accumulator < self.interval {
            return false;
        }
        self.accumulator = (self.accumulator - self.interval) % self.interval;
        true
    }
}

/// State shared by every sync system for one session.
#[derive(Debug)]
pub struct SessionContext {
    /// Active configuration (a client adopts the host's tick rates on Welcome).
    pub config: SessionConfig,
    /// This process's connection id as the host knows it. `None` on a client
    /// until Welcome arrives.
    pub local_peer: Option<PeerId>,
    /// This process's avatar, once spawned.
    pub local_player: Option<NetworkId>,
    /// Identity and authority map.
    pub identities: IdentityMap,
    /// Host-side id allocator.
    pub allocator: NetworkIdAllocator,
    /// Admitted peers and their avatars (host only).
    pub peers: BTreeMap<PeerId, NetworkId>,
    /// Remote pose smoothing.
    pub interpolation: InterpolationEngine,
    /// Messages queued this frame.
    pub outbox: Outbox,
    /// Events queued for the caller.
    pub events: Vec<SessionEvent>,
    /// Dropped-message counters.
    pub stats: SessionStats,
    /// Session time in seconds.
    pub clock: f64,
}

impl SessionContext {
    /// Fresh context for a role taken from `config`.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let local_peer = config.role.is_world_authority().then_some(PeerId::HOST);
        Self {
            config,
            local_peer,
            local_player: None,
            identities: IdentityMap::new(),
            allocator: NetworkIdAllocator::new(),
            peers: BTreeMap::new(),
            interpolation: InterpolationEngine::new(),
            outbox: Outbox::new(),
            events: Vec::new(),
            stats: SessionStats::default(),
            clock: 0.0,
        }
    }

    /// Whether this session makes final decisions for shared state.
    #[must_use]
    pub fn is_host(&self) -> bool {
        self.config.role.is_world_authority()
    }

    /// Fail unless this session is the host.
    pub fn require_host(&self, operation: &'static str) -> Result<()> {
        if self.is_host() {
            Ok(())
        } else {
            Err(SyncError::WrongRole(operation))
        }
    }

    /// The local avatar id.
    pub fn require_local_player(&self) -> Result<NetworkId> {
        self.local_player.ok_or(SyncError::NotWelcomed)
    }

    /// Whether this process authors updates for the identity.
    #[must_use]
    pub fn is_local(&self, identity: &NetworkIdentity) -> bool {
        self.local_peer == Some(identity.owner)
    }

    /// Check that a message only the host may author came from the host.
    ///
    /// Always fails on the host itself: those kinds never travel client to host.
    pub fn require_host_origin(&self, sender: PeerId, network_id: NetworkId) -> Result<()> {
        if self.is_host() || !sender.is_host() {
            return Err(SyncError::OwnershipViolation { sender, network_id });
        }
        Ok(())
    }

    /// Local handle for a network id.
    pub fn resolve(&self, network_id: NetworkId) -> Result<EntityId> {
        self.identities
            .resolve_local(network_id)
            .ok_or(SyncError::UnresolvedReference(network_id))
    }

    /// Queue an event for the caller.
    pub fn emit(&mut self, event: SessionEvent) {
        self.events.push(event);
    }

    /// Send a state sample to everyone who should see it: all peers on the
    /// host, the host on a client.
    pub fn publish(&mut self, message: Message) {
        if self.is_host() {
            self.outbox.broadcast(message);
        } else {
            self.outbox.send(PeerId::HOST, message);
        }
    }

    /// Send a message to one peer; the host addressing itself is a no-op.
    pub fn send_to(&mut self, peer: PeerId, message: Message) {
        if self.is_host() && peer.is_host() {
            return;
        }
        self.outbox.push(Target::Peer(peer), message);
    }

    /// Tick duration matching the sender's pose rate for a category.
    #[must_use]
    pub fn pose_interval(&self, category: EntityCategory) -> f32 {
        match category {
            EntityCategory::Agent => self.config.agent_interval(),
            _ => self.config.transform_interval(),
        }
    }

    /// Whether the interpolation engine should smooth this identity.
    #[must_use]
    pub fn should_interpolate(&self, identity: &NetworkIdentity) -> bool {
        !self.is_local(identity)
            && matches!(
                identity.category,
                EntityCategory::Player | EntityCategory::Agent
            )
    }

    /// Report a rejected request to its requester.
    ///
    /// A host-local requester gets an event instead of a message.
    pub fn reject(
        &mut self,
        sender: PeerId,
        player: NetworkId,
        target: NetworkId,
        reason: RejectReason,
    ) -> SyncError {
        if self.is_host() && sender.is_host() {
            self.emit(SessionEvent::InteractionRejected { target, reason });
        } else {
            self.send_to(
                sender,
                Message::new(
                    player,
                    Body::InteractionRejected(InteractionRejected { target, reason }),
                ),
            );
        }
        SyncError::ValidationRejected(reason)
    }

    /// Remove an entity from the world, retire its id and stop smoothing it.
    pub fn remove_entity(
        &mut self,
        world: &mut impl SyncWorld,
        network_id: NetworkId,
    ) -> Option<NetworkIdentity> {
        let identity = self.identities.retire(network_id)?;
        world.despawn(identity.local);
        self.interpolation.forget(network_id);
        if self.local_player == Some(network_id) {
            self.local_player = None;
        }
        Some(identity)
    }
}
