//! Session-scoped sync service.
//!
//! A [`NetSession`] is constructed explicitly for one session and dropped
//! with it. It owns every piece of sync state; the caller owns the world
//! store and the transport and lends them to [`NetSession::update`] once
//! per frame:
//!
//! 1. advance the session clock
//! 2. drain the inbound queue and dispatch every message
//! 3. run due transform and agent ticks
//! 4. advance interpolation and write rendered poses into the world
//! 5. flush the outbox through the transport
//!
//! Nothing that arrives from the network can make a handler fail the frame:
//! errors are logged, counted in [`SessionStats`] and the next message is
//! processed.
//!
//! # Example
//!
//! ```
//! use coop_core::prelude::*;
//!
//! let (_tx, rx) = inbound_queue();
//! let mut session = NetSession::new(SessionConfig::host(), rx);
//! let mut world = World::new();
//! let agent = session
//!     .spawn_agent(&mut world, Pose::at(100.0, 100.0), AgentState::default())
//!     .unwrap();
//! assert_eq!(agent, NetworkId(1000));
//! ```

use tracing::{debug, info, warn};

use crate::components::{AgentState, Motion};
use crate::config::{Role, SessionConfig};
use crate::error::{RejectReason, Result, SyncError};
use crate::identity::{EntityCategory, IdentityMap, NetworkId, PeerId};
use crate::interpolation::InterpolationEngine;
use crate::inventory::{Inventory, InventorySnapshot, ItemKind};
use crate::math::{Pose, Vec2};
use crate::protocol::{
    decode, encode, Body, CharacterSelect, Collision, ContainerAction, ContainerMessage,
    ContainerRequest, EntitySpawn, InteractionKind, InteractionRejected, InteractionRequest,
    JoinLobby, LobbyRoster, Message, PlayerInput, ReadyState, Welcome,
};
use crate::sync::agent::{self, AgentSync};
use crate::sync::container::{self, ContainerSync};
use crate::sync::interaction;
use crate::sync::lobby::{LobbyChange, LobbySync};
use crate::sync::spawn;
use crate::sync::transform::{self, InputBuffer, TransformSync};
use crate::sync::SessionContext;
use crate::transport::{InboundReceiver, Outgoing, Target, Transport, TransportEvent};
use crate::world::{SpawnDescriptor, SyncWorld};

/// Something the caller should know about, returned from [`NetSession::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The host admitted this client.
    Welcomed {
        /// Connection id the host assigned.
        peer: PeerId,
        /// This client's avatar.
        player: NetworkId,
    },
    /// The transport reached the host (client only).
    ConnectedToHost,
    /// The host lost its connection or shut down (client only).
    HostLost,
    /// A peer was admitted (host only).
    PeerJoined {
        /// Connection id.
        peer: PeerId,
        /// Its avatar.
        player: NetworkId,
    },
    /// A peer was turned away because the session is full (host only).
    PeerRefused(PeerId),
    /// An admitted peer left (host only).
    PeerLeft {
        /// Connection id.
        peer: PeerId,
        /// Its former avatar.
        player: NetworkId,
    },
    /// A network entity appeared.
    Spawned {
        /// Its id.
        network_id: NetworkId,
        /// Its category.
        category: EntityCategory,
    },
    /// A network entity was removed.
    Despawned {
        /// Its id.
        network_id: NetworkId,
    },
    /// A network entity changed owner.
    OwnershipChanged {
        /// Its id.
        network_id: NetworkId,
        /// New owner.
        owner: PeerId,
    },
    /// A collision was reported.
    Collision {
        /// Entity that collided.
        network_id: NetworkId,
        /// The other entity, when network visible.
        other: Option<NetworkId>,
        /// Contact point.
        point: Vec2,
    },
    /// An item moved from the world into a player's inventory.
    ItemPickedUp {
        /// Receiving player.
        player: NetworkId,
        /// Retired world item.
        item: NetworkId,
        /// Slot it landed in.
        slot_index: u8,
    },
    /// An item was dropped into the world (host only).
    ItemDropped {
        /// Dropping player.
        player: NetworkId,
        /// New world item.
        item: NetworkId,
    },
    /// One of this process's requests was rejected.
    InteractionRejected {
        /// Target of the request.
        target: NetworkId,
        /// Why.
        reason: RejectReason,
    },
    /// An inventory was overwritten from a snapshot.
    InventoryUpdated {
        /// Inventory owner.
        owner: NetworkId,
    },
    /// A container operation completed.
    ContainerUpdated {
        /// Requesting player.
        player: NetworkId,
        /// Container.
        container: NetworkId,
    },
    /// The lobby roster changed.
    LobbyUpdated(LobbyRoster),
    /// The host started the game.
    GameStarted {
        /// Shared seed.
        seed: u64,
    },
}

/// Dropped-message and traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Messages that failed to decode or encode.
    pub protocol_errors: u64,
    /// Messages from a sender not authoritative for the entity.
    pub ownership_violations: u64,
    /// Messages referring to unknown network ids.
    pub unresolved_references: u64,
    /// Requests rejected by validation.
    pub rejected: u64,
    /// Messages with a kind tag this build does not know.
    pub unknown_kinds: u64,
    /// Messages from peers the host has not admitted.
    pub unadmitted: u64,
    /// Any other handler failure.
    pub other_errors: u64,
    /// Transport send failures.
    pub transport_errors: u64,
    /// Client samples relayed by the host.
    pub relayed: u64,
}

impl SessionStats {
    /// Messages dropped for any reason.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.protocol_errors
            + self.ownership_violations
            + self.unresolved_references
            + self.unknown_kinds
            + self.unadmitted
            + self.other_errors
    }
}

/// One session's worth of sync state.
#[derive(Debug)]
pub struct NetSession {
    ctx: SessionContext,
    transform: TransformSync,
    agents: AgentSync,
    containers: ContainerSync,
    lobby: LobbySync,
    inputs: InputBuffer,
    inbound: InboundReceiver,
}

impl NetSession {
    /// Start a session. The role comes from `config`.
    #[must_use]
    pub fn new(config: SessionConfig, inbound: InboundReceiver) -> Self {
        let transform = TransformSync::new(config.transform_interval());
        let agents = AgentSync::new(config.agent_interval());
        info!(role = ?config.role, "Session created");
        Self {
            ctx: SessionContext::new(config),
            transform,
            agents,
            containers: ContainerSync::new(),
            lobby: LobbySync::new(),
            inputs: InputBuffer::new(),
            inbound,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.ctx.config
    }

    /// Host or client.
    #[must_use]
    pub fn role(&self) -> Role {
        self.ctx.config.role
    }

    /// Whether this is the host session.
    #[must_use]
    pub fn is_host(&self) -> bool {
        self.ctx.is_host()
    }

    /// This process's connection id as the host knows it.
    #[must_use]
    pub fn local_peer(&self) -> Option<PeerId> {
        self.ctx.local_peer
    }

    /// This process's avatar.
    #[must_use]
    pub fn local_player(&self) -> Option<NetworkId> {
        self.ctx.local_player
    }

    /// Identity and authority map.
    #[must_use]
    pub fn identities(&self) -> &IdentityMap {
        &self.ctx.identities
    }

    /// Interpolation states.
    #[must_use]
    pub fn interpolation(&self) -> &InterpolationEngine {
        &self.ctx.interpolation
    }

    /// Rendered pose of a remote entity right now.
    #[must_use]
    pub fn rendered_pose(&self, network_id: NetworkId) -> Option<Pose> {
        self.ctx.interpolation.sample(network_id, self.ctx.clock)
    }

    /// Counters.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.ctx.stats
    }

    /// Session time in seconds.
    #[must_use]
    pub fn clock(&self) -> f64 {
        self.ctx.clock
    }

    /// Admitted peers and their avatars, in peer order (host only).
    #[must_use]
    pub fn peers(&self) -> Vec<(PeerId, NetworkId)> {
        self.ctx.peers.iter().map(|(&peer, &player)| (peer, player)).collect()
    }

    /// Current lobby roster.
    #[must_use]
    pub fn roster(&self) -> LobbyRoster {
        self.lobby.roster()
    }

    /// Seed of the started game, if any.
    #[must_use]
    pub fn game_seed(&self) -> Option<u64> {
        self.lobby.started()
    }

    /// Latest input received for a player (host only).
    #[must_use]
    pub fn latest_input(&self, player: NetworkId) -> Option<PlayerInput> {
        self.inputs.latest(player)
    }

    /// Whether a player has a container open (host only).
    #[must_use]
    pub fn is_viewing(&self, container: NetworkId, player: NetworkId) -> bool {
        self.containers.is_viewing(container, player)
    }

    // ------------------------------------------------------------------
    // Frame
    // ------------------------------------------------------------------

    /// Run one frame.
    pub fn update(
        &mut self,
        dt: f32,
        world: &mut impl SyncWorld,
        transport: &mut impl Transport,
    ) -> Vec<SessionEvent> {
        self.ctx.clock += f64::from(dt);

        for event in self.inbound.drain() {
            self.handle_transport_event(world, event);
        }

        self.transform.tick(dt, &mut self.ctx, &*world);
        self.agents.tick(dt, &mut self.ctx, &*world);
        self.render(world);
        self.flush(transport);

        std::mem::take(&mut self.ctx.events)
    }

    /// Stop accepting inbound traffic and drop everything queued.
    pub fn shutdown(&mut self) {
        self.inbound.close();
        self.inbound.drain();
        self.ctx.outbox.drain();
        self.ctx.interpolation.clear();
        self.ctx.peers.clear();
        self.containers.clear();
        self.inputs.clear();
        info!("Session shut down");
    }

    fn render(&mut self, world: &mut impl SyncWorld) {
        for (network_id, pose) in self.ctx.interpolation.advance(self.ctx.clock) {
            if let Some(local) = self.ctx.identities.resolve_local(network_id) {
                world.set_pose(local, pose);
            }
        }
    }

    fn flush(&mut self, transport: &mut impl Transport) {
        for Outgoing { target, message } in self.ctx.outbox.drain() {
            let bytes = match encode(&message) {
                Ok(bytes) => bytes,
                Err(err) => {
                    self.ctx.stats.protocol_errors += 1;
                    warn!(kind = ?message.kind(), error = %err, "Dropping unencodable message");
                    continue;
                }
            };
            let reliability = message.kind().reliability();
            let sent = match target {
                Target::Peer(peer) => transport.send(peer, &bytes, reliability),
                Target::All => transport.broadcast(&bytes, reliability, None),
                Target::AllExcept(peer) => transport.broadcast(&bytes, reliability, Some(peer)),
            };
            if let Err(err) = sent {
                self.ctx.stats.transport_errors += 1;
                warn!(to = ?target, error = %err, "Send failed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    fn handle_transport_event(&mut self, world: &mut impl SyncWorld, event: TransportEvent) {
        match event {
            TransportEvent::Connected(peer) => self.on_connected(world, peer),
            TransportEvent::Disconnected(peer) => self.on_disconnected(world, peer),
            TransportEvent::Received { peer, bytes } => self.on_received(world, peer, &bytes),
        }
    }

    fn on_received(&mut self, world: &mut impl SyncWorld, peer: PeerId, bytes: &[u8]) {
        let message = match decode(bytes) {
            Ok(message) => message,
            Err(err) => {
                self.record(peer, &SyncError::Protocol(err));
                return;
            }
        };
        if self.ctx.is_host() && !self.ctx.peers.contains_key(&peer) {
            self.ctx.stats.unadmitted += 1;
            debug!(peer = %peer, kind = ?message.kind(), "Dropping message from unadmitted peer");
            return;
        }
        if let Err(err) = self.dispatch(world, peer, message) {
            self.record(peer, &err);
        }
    }

    fn record(&mut self, peer: PeerId, err: &SyncError) {
        let stats = &mut self.ctx.stats;
        match err {
            SyncError::Protocol(_) => {
                stats.protocol_errors += 1;
                warn!(peer = %peer, error = %err, "Dropping malformed message");
            }
            SyncError::OwnershipViolation { .. } => {
                stats.ownership_violations += 1;
                debug!(peer = %peer, error = %err, "Ignoring unauthorized update");
            }
            SyncError::UnresolvedReference(_) => {
                stats.unresolved_references += 1;
                debug!(peer = %peer, error = %err, "Dropping update for unknown entity");
            }
            SyncError::ValidationRejected(_) => {
                stats.rejected += 1;
                debug!(peer = %peer, error = %err, "Request rejected");
            }
            _ => {
                stats.other_errors += 1;
                warn!(peer = %peer, error = %err, "Message handler failed");
            }
        }
    }

    fn dispatch(
        &mut self,
        world: &mut impl SyncWorld,
        sender: PeerId,
        message: Message,
    ) -> Result<()> {
        let network_id = message.network_id();
        let ctx = &mut self.ctx;
        match message.body {
            Body::Welcome(welcome) => self.on_welcome(sender, network_id, welcome),
            Body::Transform(pose) => transform::receive_transform(ctx, sender, network_id, pose),
            Body::Movement(motion) => {
                transform::receive_movement(ctx, world, sender, network_id, motion)
            }
            Body::PlayerInput(input) => {
                transform::receive_input(ctx, &mut self.inputs, sender, network_id, input)
            }
            Body::AgentState(state) => {
                agent::receive_agent_state(ctx, world, sender, network_id, state)
            }
            Body::EntitySpawn(spawn) => self.on_entity_spawn(world, sender, network_id, &spawn),
            Body::Collision(collision) => self.on_collision(sender, network_id, collision),
            Body::InteractionRequest(request) => {
                interaction::handle_request(ctx, world, sender, network_id, request)
            }
            Body::InteractionRejected(rejected) => {
                self.on_rejected(sender, network_id, rejected)
            }
            Body::ItemPickup(pickup) => {
                interaction::receive_pickup(ctx, world, sender, network_id, &pickup)
            }
            Body::InventoryUpdate(snapshot) => {
                self.on_inventory_update(world, sender, network_id, &snapshot)
            }
            Body::ContainerInteraction(ContainerMessage::Request(request)) => self
                .containers
                .handle_request(ctx, world, sender, network_id, request),
            Body::ContainerInteraction(ContainerMessage::Snapshot(snapshot)) => {
                container::receive_snapshot(ctx, world, sender, &snapshot)
            }
            Body::PlayerJoinLobby(JoinLobby { name }) => {
                self.lobby
                    .handle(ctx, sender, network_id, LobbyChange::Join(name))
            }
            Body::PlayerLeaveLobby => self.lobby.handle(ctx, sender, network_id, LobbyChange::Leave),
            Body::PlayerCharacterSelect(select) => self.lobby.handle(
                ctx,
                sender,
                network_id,
                LobbyChange::Character(select.character),
            ),
            Body::PlayerReadyState(state) => {
                self.lobby
                    .handle(ctx, sender, network_id, LobbyChange::Ready(state.ready))
            }
            Body::LobbyState(roster) => self.on_lobby_state(sender, network_id, roster),
            Body::GameStart(start) => {
                ctx.require_host_origin(sender, network_id)?;
                self.lobby.mark_started(start.seed);
                info!(seed = start.seed, "Game started by host");
                ctx.emit(SessionEvent::GameStarted { seed: start.seed });
                Ok(())
            }
            Body::Unknown { kind, payload } => {
                ctx.stats.unknown_kinds += 1;
                debug!(peer = %sender, kind, len = payload.len(), "Skipping unknown message kind");
                Ok(())
            }
        }
    }

    fn on_welcome(&mut self, sender: PeerId, player: NetworkId, welcome: Welcome) -> Result<()> {
        self.ctx.require_host_origin(sender, player)?;
        let config = &mut self.ctx.config;
        config.transform_tick_hz = u32::from(welcome.transform_tick_hz.max(1));
        config.agent_tick_hz = u32::from(welcome.agent_tick_hz.max(1));
        if welcome.interaction_radius.is_finite() && welcome.interaction_radius > 0.0 {
            config.interaction_radius = welcome.interaction_radius;
        }
        self.transform.set_interval(config.transform_interval());
        self.agents.set_interval(config.agent_interval());

        self.ctx.local_peer = Some(welcome.peer);
        self.ctx.local_player = Some(player);
        info!(peer = %welcome.peer, player = %player, "Welcomed by host");
        self.ctx.emit(SessionEvent::Welcomed {
            peer: welcome.peer,
            player,
        });
        Ok(())
    }

    fn on_entity_spawn(
        &mut self,
        world: &mut impl SyncWorld,
        sender: PeerId,
        network_id: NetworkId,
        spawn: &EntitySpawn,
    ) -> Result<()> {
        self.ctx.require_host_origin(sender, network_id)?;
        spawn::apply_spawn(&mut self.ctx, world, network_id, spawn)?;
        if self.ctx.identities.get(network_id).is_none() {
            self.containers.remove_container(network_id);
        }
        Ok(())
    }

    fn on_collision(
        &mut self,
        sender: PeerId,
        network_id: NetworkId,
        collision: Collision,
    ) -> Result<()> {
        if self.ctx.is_host() {
            self.ctx.identities.may_author(network_id, sender)?;
            self.ctx
                .outbox
                .relay(sender, Message::new(network_id, Body::Collision(collision)));
            self.ctx.stats.relayed += 1;
        } else {
            self.ctx.require_host_origin(sender, network_id)?;
        }
        self.ctx.emit(SessionEvent::Collision {
            network_id,
            other: collision.other,
            point: collision.point,
        });
        Ok(())
    }

    fn on_rejected(
        &mut self,
        sender: PeerId,
        player: NetworkId,
        rejected: InteractionRejected,
    ) -> Result<()> {
        self.ctx.require_host_origin(sender, player)?;
        if self.ctx.local_player == Some(player) {
            self.ctx.emit(SessionEvent::InteractionRejected {
                target: rejected.target,
                reason: rejected.reason,
            });
        }
        Ok(())
    }

    fn on_inventory_update(
        &mut self,
        world: &mut impl SyncWorld,
        sender: PeerId,
        owner: NetworkId,
        snapshot: &InventorySnapshot,
    ) -> Result<()> {
        self.ctx.require_host_origin(sender, owner)?;
        let local = self.ctx.resolve(owner)?;
        world
            .inventory_mut(local)
            .ok_or(SyncError::UnresolvedReference(owner))?
            .apply_snapshot(snapshot);
        self.ctx.emit(SessionEvent::InventoryUpdated { owner });
        Ok(())
    }

    fn on_lobby_state(
        &mut self,
        sender: PeerId,
        network_id: NetworkId,
        roster: LobbyRoster,
    ) -> Result<()> {
        self.ctx.require_host_origin(sender, network_id)?;
        self.lobby.replace(&roster);
        self.ctx.emit(SessionEvent::LobbyUpdated(roster));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    fn on_connected(&mut self, world: &mut impl SyncWorld, peer: PeerId) {
        if !self.ctx.is_host() {
            if peer.is_host() {
                info!("Connected to host");
                self.ctx.emit(SessionEvent::ConnectedToHost);
            }
            return;
        }
        if peer.is_host() || self.ctx.peers.contains_key(&peer) {
            return;
        }
        if self.ctx.peers.len() >= self.ctx.config.max_peers {
            warn!(peer = %peer, max_peers = self.ctx.config.max_peers, "Session full, refusing peer");
            self.ctx.emit(SessionEvent::PeerRefused(peer));
            return;
        }
        match self.admit(world, peer) {
            Ok(player) => {
                info!(peer = %peer, player = %player, "Peer joined");
                self.ctx.emit(SessionEvent::PeerJoined { peer, player });
            }
            Err(err) => {
                warn!(peer = %peer, error = %err, "Failed to admit peer");
                self.ctx.emit(SessionEvent::PeerRefused(peer));
            }
        }
    }

    fn admit(&mut self, world: &mut impl SyncWorld, peer: PeerId) -> Result<NetworkId> {
        let player = self.ctx.allocator.allocate(EntityCategory::Player)?;
        let config = &self.ctx.config;
        let welcome = Welcome {
            peer,
            transform_tick_hz: u16::try_from(config.transform_tick_hz).unwrap_or(u16::MAX),
            agent_tick_hz: u16::try_from(config.agent_tick_hz).unwrap_or(u16::MAX),
            interaction_radius: config.interaction_radius,
        };
        let slots = config.player_inventory_slots;

        self.ctx
            .send_to(peer, Message::new(player, Body::Welcome(welcome)));
        spawn::send_initial_state(&mut self.ctx, &*world, peer);
        self.ctx.send_to(
            peer,
            Message::session(Body::LobbyState(self.lobby.roster())),
        );
        spawn::spawn_with_id(
            &mut self.ctx,
            world,
            player,
            EntityCategory::Player,
            peer,
            spawn::avatar_descriptor(Pose::default(), slots),
        )?;
        self.ctx.peers.insert(peer, player);
        Ok(player)
    }

    fn on_disconnected(&mut self, world: &mut impl SyncWorld, peer: PeerId) {
        if !self.ctx.is_host() {
            if peer.is_host() {
                warn!("Lost connection to host");
                self.clear_remote_state(world);
                self.ctx.emit(SessionEvent::HostLost);
            }
            return;
        }
        let Some(player) = self.ctx.peers.remove(&peer) else {
            return;
        };

        for network_id in self.ctx.identities.owned_by(peer) {
            let outcome = if network_id == player {
                spawn::despawn_entity(&mut self.ctx, world, network_id).map(|_| ())
            } else {
                spawn::reassign(&mut self.ctx, &*world, network_id, PeerId::HOST)
            };
            if let Err(err) = outcome {
                warn!(network_id = %network_id, error = %err, "Cleanup after disconnect failed");
            }
        }

        self.containers.remove_player(player);
        self.inputs.remove(player);
        if self.lobby.remove(player) {
            self.lobby.broadcast(&mut self.ctx);
        }
        info!(peer = %peer, player = %player, "Peer left");
        self.ctx.emit(SessionEvent::PeerLeft { peer, player });
    }

    fn clear_remote_state(&mut self, world: &mut impl SyncWorld) {
        for identity in self.ctx.identities.sorted() {
            world.despawn(identity.local);
        }
        self.ctx.identities.clear();
        self.ctx.interpolation.clear();
        self.ctx.outbox.drain();
        self.ctx.local_player = None;
        self.ctx.local_peer = None;
        self.containers.clear();
        self.lobby.clear();
    }

    // ------------------------------------------------------------------
    // Host API
    // ------------------------------------------------------------------

    /// Spawn the host's own avatar.
    pub fn spawn_local_player(
        &mut self,
        world: &mut impl SyncWorld,
        pose: Pose,
    ) -> Result<NetworkId> {
        self.ctx.require_host("spawn_local_player")?;
        if let Some(player) = self.ctx.local_player {
            return Err(SyncError::DuplicateIdentity(player));
        }
        let slots = self.ctx.config.player_inventory_slots;
        let player = spawn::spawn_new(
            &mut self.ctx,
            world,
            EntityCategory::Player,
            PeerId::HOST,
            spawn::avatar_descriptor(pose, slots),
        )?;
        self.ctx.local_player = Some(player);
        Ok(player)
    }

    /// Spawn a host-driven agent.
    pub fn spawn_agent(
        &mut self,
        world: &mut impl SyncWorld,
        pose: Pose,
        state: AgentState,
    ) -> Result<NetworkId> {
        spawn::spawn_new(
            &mut self.ctx,
            world,
            EntityCategory::Agent,
            PeerId::HOST,
            SpawnDescriptor {
                pose: Some(pose),
                motion: Some(Motion::default()),
                agent: Some(state),
                ..Default::default()
            },
        )
    }

    /// Spawn a world item.
    pub fn spawn_item(
        &mut self,
        world: &mut impl SyncWorld,
        pose: Pose,
        kind: ItemKind,
    ) -> Result<NetworkId> {
        spawn::spawn_new(
            &mut self.ctx,
            world,
            EntityCategory::Item,
            PeerId::HOST,
            SpawnDescriptor {
                pose: Some(pose),
                item: Some(kind),
                ..Default::default()
            },
        )
    }

    /// Spawn a container holding `contents`.
    pub fn spawn_container(
        &mut self,
        world: &mut impl SyncWorld,
        pose: Pose,
        contents: Inventory,
    ) -> Result<NetworkId> {
        let container = spawn::spawn_new(
            &mut self.ctx,
            world,
            EntityCategory::Container,
            PeerId::HOST,
            SpawnDescriptor {
                pose: Some(pose),
                inventory_slots: Some(contents.capacity()),
                ..Default::default()
            },
        )?;
        let local = self.ctx.resolve(container)?;
        if let Some(inventory) = world.inventory_mut(local) {
            *inventory = contents;
        }
        self.publish_inventory(&*world, container)?;
        Ok(container)
    }

    /// Remove a network entity everywhere.
    pub fn despawn(&mut self, world: &mut impl SyncWorld, network_id: NetworkId) -> Result<()> {
        spawn::despawn_entity(&mut self.ctx, world, network_id)?;
        self.containers.remove_container(network_id);
        self.containers.remove_player(network_id);
        Ok(())
    }

    /// Broadcast the full inventory of an entity after a gameplay change.
    pub fn publish_inventory(
        &mut self,
        world: &impl SyncWorld,
        owner: NetworkId,
    ) -> Result<()> {
        self.ctx.require_host("publish_inventory")?;
        let identity = self
            .ctx
            .identities
            .get(owner)
            .ok_or(SyncError::UnresolvedReference(owner))?;
        if !identity.flags.inventory {
            debug!(owner = %owner, "Inventory not synced for this entity");
            return Ok(());
        }
        let local = identity.local;
        let snapshot = world
            .inventory(local)
            .ok_or(SyncError::UnresolvedReference(owner))?
            .snapshot();
        self.ctx
            .outbox
            .broadcast(Message::new(owner, Body::InventoryUpdate(snapshot)));
        Ok(())
    }

    /// Announce a collision to every peer.
    pub fn report_collision(
        &mut self,
        network_id: NetworkId,
        other: Option<NetworkId>,
        point: Vec2,
    ) -> Result<()> {
        self.ctx.require_host("report_collision")?;
        if self.ctx.identities.get(network_id).is_none() {
            return Err(SyncError::UnresolvedReference(network_id));
        }
        self.ctx.outbox.broadcast(Message::new(
            network_id,
            Body::Collision(Collision { other, point }),
        ));
        Ok(())
    }

    /// Start the game once everyone in the lobby is ready.
    pub fn start_game(&mut self, seed: u64) -> Result<()> {
        self.lobby.start_game(&mut self.ctx, seed)
    }

    // ------------------------------------------------------------------
    // Requests (client, or host acting for its own avatar)
    // ------------------------------------------------------------------

    /// Ask to pick up a world item.
    pub fn request_pickup(&mut self, world: &mut impl SyncWorld, item: NetworkId) -> Result<()> {
        let (player, position) = self.local_avatar(&*world)?;
        self.submit(
            world,
            Message::new(
                player,
                Body::InteractionRequest(InteractionRequest {
                    target: item,
                    kind: InteractionKind::Pickup,
                    requester_position: position,
                }),
            ),
        );
        Ok(())
    }

    /// Ask to drop the item in a slot at the avatar's position.
    pub fn request_drop(&mut self, world: &mut impl SyncWorld, slot_index: u8) -> Result<()> {
        let (player, position) = self.local_avatar(&*world)?;
        self.submit(
            world,
            Message::new(
                player,
                Body::InteractionRequest(InteractionRequest {
                    target: player,
                    kind: InteractionKind::Drop { slot_index },
                    requester_position: position,
                }),
            ),
        );
        Ok(())
    }

    /// Open, close or transfer against a container.
    pub fn request_container(
        &mut self,
        world: &mut impl SyncWorld,
        container: NetworkId,
        action: ContainerAction,
        source_slot: u8,
    ) -> Result<()> {
        let player = self.ctx.require_local_player()?;
        self.submit(
            world,
            Message::new(
                player,
                Body::ContainerInteraction(ContainerMessage::Request(ContainerRequest {
                    container,
                    action,
                    source_slot,
                })),
            ),
        );
        Ok(())
    }

    /// Join the lobby under a display name.
    pub fn join_lobby(&mut self, world: &mut impl SyncWorld, name: &str) -> Result<()> {
        let player = self.ctx.require_local_player()?;
        self.submit(
            world,
            Message::new(
                player,
                Body::PlayerJoinLobby(JoinLobby {
                    name: name.to_string(),
                }),
            ),
        );
        Ok(())
    }

    /// Leave the lobby.
    pub fn leave_lobby(&mut self, world: &mut impl SyncWorld) -> Result<()> {
        let player = self.ctx.require_local_player()?;
        self.submit(world, Message::new(player, Body::PlayerLeaveLobby));
        Ok(())
    }

    /// Pick a character.
    pub fn select_character(&mut self, world: &mut impl SyncWorld, character: u8) -> Result<()> {
        let player = self.ctx.require_local_player()?;
        self.submit(
            world,
            Message::new(
                player,
                Body::PlayerCharacterSelect(CharacterSelect { character }),
            ),
        );
        Ok(())
    }

    /// Toggle ready.
    pub fn set_ready(&mut self, world: &mut impl SyncWorld, ready: bool) -> Result<()> {
        let player = self.ctx.require_local_player()?;
        self.submit(
            world,
            Message::new(player, Body::PlayerReadyState(ReadyState { ready })),
        );
        Ok(())
    }

    /// Send the latest input sample to the host (stored directly on the host).
    pub fn send_input(&mut self, input: PlayerInput) -> Result<()> {
        let player = self.ctx.require_local_player()?;
        if self.ctx.is_host() {
            self.inputs.store(player, input);
        } else {
            self.ctx
                .outbox
                .send(PeerId::HOST, Message::new(player, Body::PlayerInput(input)));
        }
        Ok(())
    }

    fn local_avatar(&self, world: &impl SyncWorld) -> Result<(NetworkId, Vec2)> {
        let player = self.ctx.require_local_player()?;
        let local = self.ctx.resolve(player)?;
        let position = world
            .pose(local)
            .ok_or(SyncError::UnresolvedReference(player))?
            .position;
        Ok((player, position))
    }

    /// Route a request: handled in place on the host, queued to it otherwise.
    fn submit(&mut self, world: &mut impl SyncWorld, message: Message) {
        if self.ctx.is_host() {
            if let Err(err) = self.dispatch(world, PeerId::HOST, message) {
                self.record(PeerId::HOST, &err);
            }
        } else {
            self.ctx.outbox.send(PeerId::HOST, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::AgentMode;
    use crate::error::TransportError;
    use crate::protocol::MessageKind;
    use crate::transport::{inbound_queue, InboundSender, Reliability};
    use crate::world::World;

    /// Records everything sent.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Vec<(Option<PeerId>, Option<PeerId>, Message)>,
    }

    impl RecordingTransport {
        fn kinds(&self) -> Vec<MessageKind> {
            self.sent.iter().map(|(_, _, m)| m.kind()).collect()
        }
    }

    impl Transport for RecordingTransport {
        fn send(
            &mut self,
            peer: PeerId,
            bytes: &[u8],
            _reliability: Reliability,
        ) -> std::result::Result<(), TransportError> {
            self.sent.push((Some(peer), None, decode(bytes).unwrap()));
            Ok(())
        }

        fn broadcast(
            &mut self,
            bytes: &[u8],
            _reliability: Reliability,
            except: Option<PeerId>,
        ) -> std::result::Result<(), TransportError> {
            self.sent.push((None, except, decode(bytes).unwrap()));
            Ok(())
        }
    }

    fn host() -> (NetSession, InboundSender, World, RecordingTransport) {
        let (tx, rx) = inbound_queue();
        (
            NetSession::new(SessionConfig::host(), rx),
            tx,
            World::new(),
            RecordingTransport::default(),
        )
    }

    fn client() -> (NetSession, InboundSender, World, RecordingTransport) {
        let (tx, rx) = inbound_queue();
        (
            NetSession::new(SessionConfig::client(), rx),
            tx,
            World::new(),
            RecordingTransport::default(),
        )
    }

    fn from_host(tx: &InboundSender, message: &Message) {
        tx.received(PeerId::HOST, encode(message).unwrap());
    }

    // ========================================================================
    // Host connection handling
    // ========================================================================

    #[test]
    fn test_connect_sends_welcome_state_then_avatar() {
        let (mut session, tx, mut world, mut transport) = host();
        session
            .spawn_item(&mut world, Pose::at(1.0, 1.0), ItemKind(3))
            .unwrap();
        session.update(0.0, &mut world, &mut transport);
        transport.sent.clear();

        tx.connected(PeerId(1));
        let events = session.update(0.0, &mut world, &mut transport);

        assert!(events.contains(&SessionEvent::PeerJoined {
            peer: PeerId(1),
            player: NetworkId(1)
        }));
        assert_eq!(
            transport.kinds(),
            vec![
                MessageKind::Welcome,
                MessageKind::EntitySpawn,
                MessageKind::LobbyState,
                MessageKind::EntitySpawn,
            ]
        );
        // The avatar announcement goes to everyone, the rest only to the newcomer.
        assert_eq!(transport.sent[0].0, Some(PeerId(1)));
        assert_eq!(transport.sent[3].0, None);
        assert_eq!(session.peers(), vec![(PeerId(1), NetworkId(1))]);
    }

    #[test]
    fn test_connect_beyond_max_peers_refused() {
        let (tx, rx) = inbound_queue();
        let mut session = NetSession::new(
            SessionConfig {
                max_peers: 1,
                ..SessionConfig::host()
            },
            rx,
        );
        let mut world = World::new();
        let mut transport = RecordingTransport::default();
        tx.connected(PeerId(1));
        tx.connected(PeerId(2));
        let events = session.update(0.0, &mut world, &mut transport);
        assert!(events.contains(&SessionEvent::PeerRefused(PeerId(2))));
        assert_eq!(session.peers().len(), 1);
    }

    #[test]
    fn test_unadmitted_peer_traffic_dropped() {
        let (mut session, tx, mut world, mut transport) = host();
        tx.received(
            PeerId(7),
            encode(&Message::new(NetworkId(1), Body::Transform(Pose::default()))).unwrap(),
        );
        session.update(0.0, &mut world, &mut transport);
        assert_eq!(session.stats().unadmitted, 1);
    }

    #[test]
    fn test_malformed_packet_counted_not_fatal() {
        let (mut session, tx, mut world, mut transport) = host();
        tx.connected(PeerId(1));
        tx.received(PeerId(1), vec![1, 2]);
        tx.received(PeerId(1), vec![4, 1, 0, 0, 0, 99]);
        session.update(0.0, &mut world, &mut transport);
        assert_eq!(session.stats().protocol_errors, 2);
        assert_eq!(session.peers().len(), 1);
    }

    #[test]
    fn test_disconnect_despawns_avatar_and_clears_lobby() {
        let (mut session, tx, mut world, mut transport) = host();
        tx.connected(PeerId(1));
        session.update(0.0, &mut world, &mut transport);
        tx.received(
            PeerId(1),
            encode(&Message::new(
                NetworkId(1),
                Body::PlayerJoinLobby(JoinLobby { name: "Ada".into() }),
            ))
            .unwrap(),
        );
        session.update(0.0, &mut world, &mut transport);
        assert_eq!(session.roster().players.len(), 1);
        transport.sent.clear();

        tx.disconnected(PeerId(1));
        let events = session.update(0.0, &mut world, &mut transport);

        assert!(events.contains(&SessionEvent::PeerLeft {
            peer: PeerId(1),
            player: NetworkId(1)
        }));
        assert!(session.identities().is_retired(NetworkId(1)));
        assert!(world.is_empty());
        assert!(session.roster().players.is_empty());
        assert_eq!(
            transport.kinds(),
            vec![MessageKind::EntitySpawn, MessageKind::LobbyState]
        );
    }

    // ========================================================================
    // Host API
    // ========================================================================

    #[test]
    fn test_host_local_pickup_applies_in_place() {
        let (mut session, _tx, mut world, mut transport) = host();
        let player = session
            .spawn_local_player(&mut world, Pose::at(0.0, 0.0))
            .unwrap();
        let item = session
            .spawn_item(&mut world, Pose::at(10.0, 0.0), ItemKind(5))
            .unwrap();
        session.request_pickup(&mut world, item).unwrap();
        let events = session.update(0.0, &mut world, &mut transport);

        assert!(events.contains(&SessionEvent::ItemPickedUp {
            player,
            item,
            slot_index: 0
        }));
        let local = session.identities().resolve_local(player).unwrap();
        assert_eq!(world.inventory(local).unwrap().get(0), Some(ItemKind(5)));
    }

    #[test]
    fn test_host_local_rejection_is_event() {
        let (mut session, _tx, mut world, mut transport) = host();
        session
            .spawn_local_player(&mut world, Pose::at(0.0, 0.0))
            .unwrap();
        let item = session
            .spawn_item(&mut world, Pose::at(500.0, 0.0), ItemKind(5))
            .unwrap();
        session.request_pickup(&mut world, item).unwrap();
        let events = session.update(0.0, &mut world, &mut transport);
        assert!(events.contains(&SessionEvent::InteractionRejected {
            target: item,
            reason: RejectReason::OutOfRange
        }));
        assert_eq!(session.stats().rejected, 1);
    }

    #[test]
    fn test_client_cannot_use_host_api() {
        let (mut session, _tx, mut world, _transport) = client();
        assert!(matches!(
            session.spawn_agent(&mut world, Pose::default(), AgentState::default()),
            Err(SyncError::WrongRole(_))
        ));
        assert!(matches!(
            session.request_pickup(&mut world, NetworkId(2000)),
            Err(SyncError::NotWelcomed)
        ));
    }

    #[test]
    fn test_agent_tick_follows_interval() {
        let (mut session, _tx, mut world, mut transport) = host();
        session
            .spawn_agent(
                &mut world,
                Pose::at(0.0, 0.0),
                AgentState::with_mode(AgentMode::Wander),
            )
            .unwrap();
        session.update(0.05, &mut world, &mut transport);
        transport.sent.clear();
        session.update(0.06, &mut world, &mut transport);
        assert_eq!(
            transport.kinds(),
            vec![MessageKind::AgentState, MessageKind::Transform]
        );
    }

    // ========================================================================
    // Client receive path
    // ========================================================================

    #[test]
    fn test_client_welcome_adopts_host_rates() {
        let (mut session, tx, mut world, mut transport) = client();
        tx.connected(PeerId::HOST);
        from_host(
            &tx,
            &Message::new(
                NetworkId(3),
                Body::Welcome(Welcome {
                    peer: PeerId(5),
                    transform_tick_hz: 30,
                    agent_tick_hz: 5,
                    interaction_radius: 40.0,
                }),
            ),
        );
        let events = session.update(0.0, &mut world, &mut transport);
        assert_eq!(
            events,
            vec![
                SessionEvent::ConnectedToHost,
                SessionEvent::Welcomed {
                    peer: PeerId(5),
                    player: NetworkId(3)
                }
            ]
        );
        assert_eq!(session.config().agent_tick_hz, 5);
        assert_eq!(session.local_peer(), Some(PeerId(5)));
    }

    #[test]
    fn test_client_host_lost_clears_state() {
        let (mut session, tx, mut world, mut transport) = client();
        from_host(
            &tx,
            &Message::new(
                NetworkId(2000),
                Body::EntitySpawn(EntitySpawn {
                    action: crate::protocol::SpawnAction::Spawn,
                    category: EntityCategory::Item,
                    authority: crate::identity::AuthorityKind::HostOwned,
                    owner: PeerId::HOST,
                    pose: Pose::default(),
                    kind: 1,
                    slots: 0,
                }),
            ),
        );
        session.update(0.0, &mut world, &mut transport);
        assert_eq!(world.len(), 1);

        tx.disconnected(PeerId::HOST);
        let events = session.update(0.0, &mut world, &mut transport);
        assert!(events.contains(&SessionEvent::HostLost));
        assert!(world.is_empty());
        assert!(session.identities().is_empty());
    }

    fn item_spawn(kind: u16, at: Pose) -> Body {
        Body::EntitySpawn(EntitySpawn {
            action: crate::protocol::SpawnAction::Spawn,
            category: EntityCategory::Item,
            authority: crate::identity::AuthorityKind::HostOwned,
            owner: PeerId::HOST,
            pose: at,
            kind,
            slots: 0,
        })
    }

    #[test]
    fn test_client_duplicate_pickup_after_drop_keeps_one_item() {
        let (mut session, tx, mut world, mut transport) = client();
        let player = NetworkId(1);
        from_host(
            &tx,
            &Message::new(
                player,
                Body::Welcome(Welcome {
                    peer: PeerId(5),
                    transform_tick_hz: 20,
                    agent_tick_hz: 10,
                    interaction_radius: 64.0,
                }),
            ),
        );
        from_host(
            &tx,
            &Message::new(
                player,
                Body::EntitySpawn(EntitySpawn {
                    action: crate::protocol::SpawnAction::Spawn,
                    category: EntityCategory::Player,
                    authority: crate::identity::AuthorityKind::ClientOwned,
                    owner: PeerId(5),
                    pose: Pose::default(),
                    kind: 0,
                    slots: 3,
                }),
            ),
        );
        from_host(
            &tx,
            &Message::new(NetworkId(2050), item_spawn(3, Pose::at(5.0, 0.0))),
        );
        let pickup = Message::new(
            player,
            Body::ItemPickup(crate::protocol::ItemPickup {
                item: NetworkId(2050),
                slot_index: 0,
                item_kind: ItemKind(3),
                world_position: Vec2::new(5.0, 0.0),
                success: true,
            }),
        );
        from_host(&tx, &pickup);
        from_host(
            &tx,
            &Message::new(NetworkId(2051), item_spawn(3, Pose::default())),
        );
        from_host(
            &tx,
            &Message::new(
                player,
                Body::InventoryUpdate(InventorySnapshot {
                    slots: vec![None, None, None],
                }),
            ),
        );
        from_host(&tx, &pickup);
        session.update(0.0, &mut world, &mut transport);

        let avatar = session.identities().resolve_local(player).unwrap();
        let in_inventory = world.inventory(avatar).unwrap().item_count();
        let on_ground = world
            .entities_with(&[crate::world::Capability::Item])
            .len();
        assert_eq!(in_inventory + on_ground, 1);
        assert!(session.identities().resolve_local(NetworkId(2051)).is_some());
    }

    #[test]
    fn test_unknown_kind_skipped() {
        let (mut session, tx, mut world, mut transport) = client();
        tx.received(PeerId::HOST, vec![200, 0, 0, 0, 0, 1, 2, 3]);
        session.update(0.0, &mut world, &mut transport);
        assert_eq!(session.stats().unknown_kinds, 1);
        assert_eq!(session.stats().protocol_errors, 0);
    }
}
