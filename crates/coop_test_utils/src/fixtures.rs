//! Test fixtures and helpers.
//!
//! Pre-built configs, world setups and host-originated messages for
//! consistent testing.

use coop_core::components::AgentState;
use coop_core::config::{Role, SessionConfig};
use coop_core::error::Result;
use coop_core::identity::{AuthorityKind, EntityCategory, NetworkId, PeerId};
use coop_core::inventory::{Inventory, ItemKind};
use coop_core::math::Pose;
use coop_core::protocol::{encode, Body, EntitySpawn, Message, SpawnAction, Welcome};
use coop_core::session::NetSession;
use coop_core::world::World;

/// Host config with a given peer cap.
#[must_use]
pub fn host_config(max_peers: usize) -> SessionConfig {
    SessionConfig {
        max_peers,
        ..SessionConfig::host()
    }
}

/// Client config with default rates.
#[must_use]
pub fn client_config() -> SessionConfig {
    SessionConfig {
        role: Role::Client,
        ..SessionConfig::default()
    }
}

/// Encode a message, panicking on failure (test input is always valid).
///
/// # Panics
/// Panics if the message does not encode.
#[must_use]
pub fn encoded(message: &Message) -> Vec<u8> {
    encode(message).expect("fixture message should encode")
}

/// Host greeting as a client would receive it.
#[must_use]
pub fn welcome(peer: PeerId, player: NetworkId, config: &SessionConfig) -> Message {
    Message::new(
        player,
        Body::Welcome(Welcome {
            peer,
            transform_tick_hz: u16::try_from(config.transform_tick_hz).unwrap_or(u16::MAX),
            agent_tick_hz: u16::try_from(config.agent_tick_hz).unwrap_or(u16::MAX),
            interaction_radius: config.interaction_radius,
        }),
    )
}

/// Spawn announcement for a host-owned entity.
#[must_use]
pub fn host_spawn(network_id: NetworkId, category: EntityCategory, pose: Pose) -> Message {
    Message::new(
        network_id,
        Body::EntitySpawn(EntitySpawn {
            action: SpawnAction::Spawn,
            category,
            authority: AuthorityKind::HostOwned,
            owner: PeerId::HOST,
            pose,
            kind: 0,
            slots: 0,
        }),
    )
}

/// Spawn `count` items of one kind in a row along the x axis.
///
/// # Errors
/// Fails if the session is not the host.
pub fn spawn_item_row(
    session: &mut NetSession,
    world: &mut World,
    origin: Pose,
    spacing: f32,
    count: usize,
    kind: ItemKind,
) -> Result<Vec<NetworkId>> {
    let mut ids = Vec::with_capacity(count);
    let mut x = origin.position.x;
    for _ in 0..count {
        ids.push(session.spawn_item(world, Pose::at(x, origin.position.y), kind)?);
        x += spacing;
    }
    Ok(ids)
}

/// Spawn a container with the given slot contents.
///
/// # Errors
/// Fails if the session is not the host.
pub fn spawn_stocked_container(
    session: &mut NetSession,
    world: &mut World,
    pose: Pose,
    slots: Vec<Option<ItemKind>>,
) -> Result<NetworkId> {
    session.spawn_container(world, pose, Inventory::from_slots(slots))
}

/// Spawn `count` idle agents spread along the y axis.
///
/// # Errors
/// Fails if the session is not the host.
pub fn spawn_agents(
    session: &mut NetSession,
    world: &mut World,
    count: usize,
) -> Result<Vec<NetworkId>> {
    let mut ids = Vec::with_capacity(count);
    let mut y = 0.0;
    for _ in 0..count {
        ids.push(session.spawn_agent(world, Pose::at(200.0, y), AgentState::default())?);
        y += 32.0;
    }
    Ok(ids)
}
