//! Host-validated world interactions: pickup and drop.
//!
//! ```text
//! Requested ──validate──► Rejected   (InteractionRejected to the requester only)
//!            └──────────► Applied    (ItemPickup / EntitySpawn + InventoryUpdate to all)
//! ```
//!
//! Pickup checks run in a fixed order so every peer sees the same reason:
//! target exists, target is an item, target is active, requester in range,
//! requester has a free slot. A successful pickup retires the item id, so a
//! second request for the same item can only ever be rejected.
//!
//! Lost requests are not retried; the player can simply ask again.

use tracing::{debug, info};

use super::spawn;
use super::SessionContext;
use crate::error::{RejectReason, Result, SyncError};
use crate::identity::{EntityCategory, NetworkId, PeerId};
use crate::math::Pose;
use crate::protocol::{Body, InteractionKind, InteractionRequest, ItemPickup, Message};
use crate::session::SessionEvent;
use crate::world::{EntityId, SpawnDescriptor, SyncWorld};

/// Check that `sender` owns the requesting player and return its handle.
pub fn authorize_requester(
    ctx: &SessionContext,
    sender: PeerId,
    player: NetworkId,
) -> Result<EntityId> {
    let identity = ctx.identities.may_author(player, sender)?;
    if identity.category != EntityCategory::Player {
        return Err(SyncError::OwnershipViolation {
            sender,
            network_id: player,
        });
    }
    Ok(identity.local)
}

/// Validate and apply an interaction request (host only).
pub fn handle_request(
    ctx: &mut SessionContext,
    world: &mut impl SyncWorld,
    sender: PeerId,
    player: NetworkId,
    request: InteractionRequest,
) -> Result<()> {
    ctx.require_host("handle interaction request")?;
    let player_local = authorize_requester(ctx, sender, player)?;
    match request.kind {
        InteractionKind::Pickup => pickup(ctx, world, sender, player, player_local, &request),
        InteractionKind::Drop { slot_index } => {
            drop_item(ctx, world, sender, player, player_local, slot_index)
        }
    }
}

/// Run the pickup checks without changing anything.
pub fn validate_pickup(
    ctx: &SessionContext,
    world: &impl SyncWorld,
    player_local: EntityId,
    request: &InteractionRequest,
) -> std::result::Result<ItemPickup, RejectReason> {
    let identity = ctx
        .identities
        .get(request.target)
        .ok_or(RejectReason::TargetMissing)?;
    if identity.category != EntityCategory::Item {
        return Err(RejectReason::NotAnItem);
    }
    let item_local = identity.local;
    if !world.is_active(item_local) {
        return Err(RejectReason::TargetInactive);
    }
    let item_kind = world.item_kind(item_local).ok_or(RejectReason::NotAnItem)?;
    let position = world
        .pose(item_local)
        .ok_or(RejectReason::TargetMissing)?
        .position;
    if request.requester_position.distance(position) > ctx.config.interaction_radius {
        return Err(RejectReason::OutOfRange);
    }
    let slot = world
        .inventory(player_local)
        .and_then(|inv| inv.first_free_slot())
        .ok_or(RejectReason::InventoryFull)?;
    let slot_index = u8::try_from(slot).map_err(|_| RejectReason::InventoryFull)?;

    Ok(ItemPickup {
        item: request.target,
        slot_index,
        item_kind,
        world_position: position,
        success: true,
    })
}

fn pickup(
    ctx: &mut SessionContext,
    world: &mut impl SyncWorld,
    sender: PeerId,
    player: NetworkId,
    player_local: EntityId,
    request: &InteractionRequest,
) -> Result<()> {
    let result = match validate_pickup(ctx, &*world, player_local, request) {
        Ok(result) => result,
        Err(reason) => return Err(ctx.reject(sender, player, request.target, reason)),
    };
    apply_pickup(ctx, world, player, &result)?;
    ctx.outbox
        .broadcast(Message::new(player, Body::ItemPickup(result)));
    info!(
        player = %player,
        item = %result.item,
        slot = result.slot_index,
        "Item picked up"
    );
    Ok(())
}

/// Apply a pickup result. Idempotent: applying it again changes nothing,
/// even after the slot has since been emptied or refilled.
///
/// Returns whether the world item was still present.
pub fn apply_pickup(
    ctx: &mut SessionContext,
    world: &mut impl SyncWorld,
    player: NetworkId,
    pickup: &ItemPickup,
) -> Result<bool> {
    let player_local = ctx.resolve(player)?;
    if ctx.identities.is_retired(pickup.item) {
        debug!(item = %pickup.item, "Ignoring pickup for an item already retired");
        return Ok(false);
    }
    let inventory = world
        .inventory_mut(player_local)
        .ok_or(SyncError::UnresolvedReference(player))?;
    inventory.set(usize::from(pickup.slot_index), Some(pickup.item_kind));

    // An id that was never announced here still retires, so a replay is a no-op.
    let removed = ctx.remove_entity(world, pickup.item).is_some();
    if !removed {
        ctx.identities.mark_retired(pickup.item);
    }
    ctx.emit(SessionEvent::ItemPickedUp {
        player,
        item: pickup.item,
        slot_index: pickup.slot_index,
    });
    Ok(removed)
}

/// Handle an authoritative ItemPickup from the host.
pub fn receive_pickup(
    ctx: &mut SessionContext,
    world: &mut impl SyncWorld,
    sender: PeerId,
    player: NetworkId,
    pickup: &ItemPickup,
) -> Result<()> {
    ctx.require_host_origin(sender, player)?;
    if !pickup.success {
        return Ok(());
    }
    apply_pickup(ctx, world, player, pickup).map(|_| ())
}

fn drop_item(
    ctx: &mut SessionContext,
    world: &mut impl SyncWorld,
    sender: PeerId,
    player: NetworkId,
    player_local: EntityId,
    slot_index: u8,
) -> Result<()> {
    // The host's copy of the avatar decides where the item lands.
    let Some(position) = world.pose(player_local).map(|pose| pose.position) else {
        return Err(ctx.reject(sender, player, player, RejectReason::TargetMissing));
    };
    let slot = usize::from(slot_index);
    let taken = match world.inventory_mut(player_local) {
        Some(inventory) => inventory.take(slot),
        None => Err(RejectReason::InvalidSlot),
    };
    let kind = match taken {
        Ok(kind) => kind,
        Err(reason) => return Err(ctx.reject(sender, player, player, reason)),
    };

    let descriptor = SpawnDescriptor {
        pose: Some(Pose::new(position, 0.0)),
        item: Some(kind),
        ..Default::default()
    };
    let item = match spawn::spawn_new(ctx, world, EntityCategory::Item, PeerId::HOST, descriptor)
    {
        Ok(item) => item,
        Err(err) => {
            if let Some(inventory) = world.inventory_mut(player_local) {
                inventory.set(slot, Some(kind));
            }
            return Err(err);
        }
    };

    if let Some(inventory) = world.inventory(player_local) {
        ctx.outbox.broadcast(Message::new(
            player,
            Body::InventoryUpdate(inventory.snapshot()),
        ));
    }
    info!(player = %player, item = %item, slot = slot_index, "Item dropped");
    ctx.emit(SessionEvent::ItemDropped { player, item });
    Ok(())
}
