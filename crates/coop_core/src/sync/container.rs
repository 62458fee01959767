//! Container open/close and slot transfers.
//!
//! Transfers are computed on copies of both inventories and written back
//! only on success, so a rejected request leaves both untouched. Every
//! successful operation ends in a single broadcast carrying both complete
//! inventories, which receivers (and the host) apply verbatim.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info};

use super::interaction::authorize_requester;
use super::SessionContext;
use crate::error::{RejectReason, Result, SyncError};
use crate::identity::{EntityCategory, NetworkId, PeerId};
use crate::inventory::{self, Inventory};
use crate::protocol::{
    Body, ContainerAction, ContainerMessage, ContainerRequest, ContainerSnapshot, Message,
};
use crate::session::SessionEvent;
use crate::world::{EntityId, SyncWorld};

#[derive(Debug, Clone, Copy)]
enum Direction {
    ToContainer,
    ToPlayer,
}

/// Which players have which containers open (host only).
#[derive(Debug, Clone, Default)]
pub struct ContainerSync {
    viewers: HashMap<NetworkId, BTreeSet<NetworkId>>,
}

impl ContainerSync {
    /// Create an empty viewer table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a player has a container open.
    #[must_use]
    pub fn is_viewing(&self, container: NetworkId, player: NetworkId) -> bool {
        self.viewers
            .get(&container)
            .is_some_and(|players| players.contains(&player))
    }

    /// Players viewing a container, in id order.
    #[must_use]
    pub fn viewers(&self, container: NetworkId) -> Vec<NetworkId> {
        self.viewers
            .get(&container)
            .map(|players| players.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Close every container a player has open.
    pub fn remove_player(&mut self, player: NetworkId) {
        for players in self.viewers.values_mut() {
            players.remove(&player);
        }
        self.viewers.retain(|_, players| !players.is_empty());
    }

    /// Forget a container.
    pub fn remove_container(&mut self, container: NetworkId) {
        self.viewers.remove(&container);
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.viewers.clear();
    }

    /// Validate and apply a container request (host only).
    pub fn handle_request(
        &mut self,
        ctx: &mut SessionContext,
        world: &mut impl SyncWorld,
        sender: PeerId,
        player: NetworkId,
        request: ContainerRequest,
    ) -> Result<()> {
        ctx.require_host("handle container request")?;
        let player_local = authorize_requester(ctx, sender, player)?;

        let outcome = self.apply(ctx, world, player, player_local, request);
        match outcome {
            Ok(Some(snapshot)) => {
                info!(
                    player = %player,
                    container = %request.container,
                    action = ?request.action,
                    "Container updated"
                );
                ctx.emit(SessionEvent::ContainerUpdated {
                    player,
                    container: request.container,
                });
                ctx.outbox.broadcast(Message::new(
                    player,
                    Body::ContainerInteraction(ContainerMessage::Snapshot(snapshot)),
                ));
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(reason) => Err(ctx.reject(sender, player, request.container, reason)),
        }
    }

    fn apply(
        &mut self,
        ctx: &SessionContext,
        world: &mut impl SyncWorld,
        player: NetworkId,
        player_local: EntityId,
        request: ContainerRequest,
    ) -> std::result::Result<Option<ContainerSnapshot>, RejectReason> {
        let container = request.container;
        let container_local = resolve_container(ctx, &*world, container)?;

        let direction = match request.action {
            ContainerAction::Close => {
                if let Some(players) = self.viewers.get_mut(&container) {
                    players.remove(&player);
                }
                debug!(player = %player, container = %container, "Container closed");
                return Ok(None);
            }
            ContainerAction::Open => None,
            ContainerAction::TransferToContainer => Some(Direction::ToContainer),
            ContainerAction::TransferToPlayer => Some(Direction::ToPlayer),
        };

        check_range(ctx, &*world, player_local, container_local)?;
        let mut player_inv = world
            .inventory(player_local)
            .cloned()
            .ok_or(RejectReason::InvalidSlot)?;
        let mut container_inv = world
            .inventory(container_local)
            .cloned()
            .ok_or(RejectReason::NotAContainer)?;
        let slot = usize::from(request.source_slot);

        match direction {
            None => {
                self.viewers.entry(container).or_default().insert(player);
            }
            Some(Direction::ToContainer) => {
                self.require_open(container, player)?;
                inventory::transfer(
                    &mut player_inv,
                    slot,
                    &mut container_inv,
                    RejectReason::ContainerFull,
                )?;
            }
            Some(Direction::ToPlayer) => {
                self.require_open(container, player)?;
                inventory::transfer(
                    &mut container_inv,
                    slot,
                    &mut player_inv,
                    RejectReason::InventoryFull,
                )?;
            }
        }

        let snapshot = ContainerSnapshot {
            player,
            container,
            player_slots: player_inv.snapshot(),
            container_slots: container_inv.snapshot(),
        };
        write_back(world, player_local, player_inv);
        write_back(world, container_local, container_inv);
        Ok(Some(snapshot))
    }

    fn require_open(
        &self,
        container: NetworkId,
        player: NetworkId,
    ) -> std::result::Result<(), RejectReason> {
        if self.is_viewing(container, player) {
            Ok(())
        } else {
            Err(RejectReason::ContainerNotOpen)
        }
    }
}

fn resolve_container(
    ctx: &SessionContext,
    world: &impl SyncWorld,
    container: NetworkId,
) -> std::result::Result<EntityId, RejectReason> {
    let identity = ctx
        .identities
        .get(container)
        .ok_or(RejectReason::TargetMissing)?;
    if identity.category != EntityCategory::Container {
        return Err(RejectReason::NotAContainer);
    }
    if !world.is_active(identity.local) {
        return Err(RejectReason::TargetInactive);
    }
    if world.inventory(identity.local).is_none() {
        return Err(RejectReason::NotAContainer);
    }
    Ok(identity.local)
}

fn check_range(
    ctx: &SessionContext,
    world: &impl SyncWorld,
    player_local: EntityId,
    container_local: EntityId,
) -> std::result::Result<(), RejectReason> {
    let (Some(player_pose), Some(container_pose)) =
        (world.pose(player_local), world.pose(container_local))
    else {
        return Err(RejectReason::OutOfRange);
    };
    if player_pose.position.distance(container_pose.position) > ctx.config.interaction_radius {
        return Err(RejectReason::OutOfRange);
    }
    Ok(())
}

fn write_back(world: &mut impl SyncWorld, entity: EntityId, inventory: Inventory) {
    if let Some(slot) = world.inventory_mut(entity) {
        *slot = inventory;
    }
}

/// Apply a snapshot pair from the host, overwriting both inventories.
pub fn receive_snapshot(
    ctx: &mut SessionContext,
    world: &mut impl SyncWorld,
    sender: PeerId,
    snapshot: &ContainerSnapshot,
) -> Result<()> {
    ctx.require_host_origin(sender, snapshot.player)?;
    let player_local = ctx.resolve(snapshot.player)?;
    let container_local = ctx.resolve(snapshot.container)?;

    world
        .inventory_mut(player_local)
        .ok_or(SyncError::UnresolvedReference(snapshot.player))?
        .apply_snapshot(&snapshot.player_slots);
    world
        .inventory_mut(container_local)
        .ok_or(SyncError::UnresolvedReference(snapshot.container))?
        .apply_snapshot(&snapshot.container_slots);

    ctx.emit(SessionEvent::ContainerUpdated {
        player: snapshot.player,
        container: snapshot.container,
    });
    Ok(())
}
