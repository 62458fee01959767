//! Spawn announcements, despawns, ownership handoff and join-time state.
//!
//! The host creates every network identity. `EntitySpawn` carries a
//! [`SpawnAction`]: `Spawn` creates the entity on receivers (or, for an id
//! they already know, hands ownership to the announced owner) and `Despawn`
//! removes it and retires the id.

use tracing::{debug, info};

use super::SessionContext;
use crate::components::{AgentState, Motion};
use crate::error::{Result, SyncError};
use crate::identity::{AuthorityKind, EntityCategory, NetworkId, NetworkIdentity, PeerId};
use crate::inventory::ItemKind;
use crate::math::Pose;
use crate::protocol::{Body, EntitySpawn, Message, SpawnAction};
use crate::session::SessionEvent;
use crate::world::{SpawnDescriptor, SyncWorld};

/// Authority class implied by an owner.
#[must_use]
pub fn authority_for(owner: PeerId) -> AuthorityKind {
    if owner.is_host() {
        AuthorityKind::HostOwned
    } else {
        AuthorityKind::ClientOwned
    }
}

/// Spawn announcement describing an identity as it currently is.
#[must_use]
pub fn announcement(identity: &NetworkIdentity, world: &impl SyncWorld) -> EntitySpawn {
    let local = identity.local;
    EntitySpawn {
        action: SpawnAction::Spawn,
        category: identity.category,
        authority: identity.authority,
        owner: identity.owner,
        pose: world.pose(local).unwrap_or_default(),
        kind: world.item_kind(local).map_or(0, |kind| kind.0),
        slots: world
            .inventory(local)
            .map_or(0, |inv| u8::try_from(inv.capacity()).unwrap_or(u8::MAX)),
    }
}

/// World components to create for a received spawn announcement.
#[must_use]
pub fn descriptor(spawn: &EntitySpawn) -> SpawnDescriptor {
    let is_player = spawn.category == EntityCategory::Player;
    SpawnDescriptor {
        category: Some(spawn.category),
        pose: Some(spawn.pose),
        motion: is_player.then(Motion::default),
        agent: (spawn.category == EntityCategory::Agent).then(AgentState::default),
        inventory_slots: (spawn.slots > 0).then_some(usize::from(spawn.slots)),
        item: (spawn.category == EntityCategory::Item).then_some(ItemKind(spawn.kind)),
        player_controlled: is_player,
    }
}

/// Components for a player avatar.
#[must_use]
pub fn avatar_descriptor(pose: Pose, inventory_slots: usize) -> SpawnDescriptor {
    SpawnDescriptor {
        category: Some(EntityCategory::Player),
        pose: Some(pose),
        motion: Some(Motion::default()),
        inventory_slots: Some(inventory_slots),
        player_controlled: true,
        ..Default::default()
    }
}

/// Allocate an id and spawn a new network entity (host only).
pub fn spawn_new(
    ctx: &mut SessionContext,
    world: &mut impl SyncWorld,
    category: EntityCategory,
    owner: PeerId,
    descriptor: SpawnDescriptor,
) -> Result<NetworkId> {
    ctx.require_host("spawn")?;
    let network_id = ctx.allocator.allocate(category)?;
    spawn_with_id(ctx, world, network_id, category, owner, descriptor)?;
    Ok(network_id)
}

/// Spawn a network entity under a pre-allocated id and announce it to all
/// peers (host only).
pub fn spawn_with_id(
    ctx: &mut SessionContext,
    world: &mut impl SyncWorld,
    network_id: NetworkId,
    category: EntityCategory,
    owner: PeerId,
    descriptor: SpawnDescriptor,
) -> Result<()> {
    ctx.require_host("spawn")?;
    let local = world.spawn(&SpawnDescriptor {
        category: Some(category),
        ..descriptor
    });
    let identity = match ctx.identities.register(
        local,
        network_id,
        category,
        authority_for(owner),
        owner,
    ) {
        Ok(identity) => identity.clone(),
        Err(err) => {
            world.despawn(local);
            return Err(err);
        }
    };

    if ctx.should_interpolate(&identity) {
        if let Some(pose) = world.pose(local) {
            ctx.interpolation.track(network_id, pose);
        }
    }

    let spawn = announcement(&identity, &*world);
    ctx.outbox
        .broadcast(Message::new(network_id, Body::EntitySpawn(spawn)));
    info!(
        network_id = %network_id,
        category = ?category,
        owner = %owner,
        "Spawned network entity"
    );
    ctx.emit(SessionEvent::Spawned {
        network_id,
        category,
    });
    Ok(())
}

/// Remove a network entity everywhere (host only).
pub fn despawn_entity(
    ctx: &mut SessionContext,
    world: &mut impl SyncWorld,
    network_id: NetworkId,
) -> Result<NetworkIdentity> {
    ctx.require_host("despawn")?;
    let identity = ctx
        .remove_entity(world, network_id)
        .ok_or(SyncError::UnresolvedReference(network_id))?;
    ctx.outbox.broadcast(Message::new(
        network_id,
        Body::EntitySpawn(EntitySpawn::despawn(identity.category)),
    ));
    info!(network_id = %network_id, "Despawned network entity");
    ctx.emit(SessionEvent::Despawned { network_id });
    Ok(identity)
}

/// Hand an entity to a new owner and re-announce it (host only).
pub fn reassign(
    ctx: &mut SessionContext,
    world: &impl SyncWorld,
    network_id: NetworkId,
    owner: PeerId,
) -> Result<()> {
    ctx.require_host("reassign")?;
    let identity = ctx.identities.reassign(network_id, owner)?.clone();
    if !ctx.should_interpolate(&identity) {
        ctx.interpolation.forget(network_id);
    }
    let spawn = announcement(&identity, world);
    ctx.outbox
        .broadcast(Message::new(network_id, Body::EntitySpawn(spawn)));
    info!(network_id = %network_id, owner = %owner, "Reassigned ownership");
    ctx.emit(SessionEvent::OwnershipChanged { network_id, owner });
    Ok(())
}

/// Queue every existing entity and inventory for a newly admitted peer.
///
/// Spawns go first so the inventory snapshots that follow always resolve.
pub fn send_initial_state(ctx: &mut SessionContext, world: &impl SyncWorld, peer: PeerId) {
    let identities = ctx.identities.sorted();
    let mut messages: Vec<Message> = identities
        .iter()
        .map(|identity| {
            Message::new(
                identity.network_id,
                Body::EntitySpawn(announcement(identity, world)),
            )
        })
        .collect();
    messages.extend(
        identities
            .iter()
            .filter(|identity| identity.flags.inventory)
            .filter_map(|identity| {
                world.inventory(identity.local).map(|inv| {
                    Message::new(identity.network_id, Body::InventoryUpdate(inv.snapshot()))
                })
            }),
    );

    debug!(peer = %peer, messages = messages.len(), "Sending initial state");
    for message in messages {
        ctx.send_to(peer, message);
    }
}

/// Apply a spawn announcement from the host.
pub fn apply_spawn(
    ctx: &mut SessionContext,
    world: &mut impl SyncWorld,
    network_id: NetworkId,
    spawn: &EntitySpawn,
) -> Result<()> {
    match spawn.action {
        SpawnAction::Despawn => {
            ctx.remove_entity(world, network_id)
                .ok_or(SyncError::UnresolvedReference(network_id))?;
            debug!(network_id = %network_id, "Remote entity despawned");
            ctx.emit(SessionEvent::Despawned { network_id });
            Ok(())
        }
        SpawnAction::Spawn => {
            if ctx.identities.is_retired(network_id) {
                return Err(SyncError::RetiredIdentity(network_id));
            }
            if let Some(existing) = ctx.identities.get(network_id) {
                if existing.owner == spawn.owner {
                    return Ok(());
                }
                let local = existing.local;
                let identity = ctx.identities.reassign(network_id, spawn.owner)?.clone();
                if ctx.should_interpolate(&identity) {
                    if let Some(pose) = world.pose(local) {
                        ctx.interpolation.track(network_id, pose);
                    }
                } else {
                    ctx.interpolation.forget(network_id);
                }
                ctx.emit(SessionEvent::OwnershipChanged {
                    network_id,
                    owner: spawn.owner,
                });
                return Ok(());
            }

            let local = world.spawn(&descriptor(spawn));
            let identity = match ctx.identities.register(
                local,
                network_id,
                spawn.category,
                spawn.authority,
                spawn.owner,
            ) {
                Ok(identity) => identity.clone(),
                Err(err) => {
                    world.despawn(local);
                    return Err(err);
                }
            };

            if ctx.is_local(&identity) && identity.category == EntityCategory::Player {
                ctx.local_player = Some(network_id);
            }
            if ctx.should_interpolate(&identity) {
                ctx.interpolation.track(network_id, spawn.pose);
            }
            debug!(network_id = %network_id, category = ?spawn.category, "Remote entity spawned");
            ctx.emit(SessionEvent::Spawned {
                network_id,
                category: spawn.category,
            });
            Ok(())
        }
    }
}
