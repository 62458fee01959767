//! Transform and movement sync, plus the host's player input buffer.
//!
//! Every transform tick (default 20 Hz) each locally owned, transform-flagged
//! entity publishes one full [`Pose`]; movement-flagged entities also publish
//! their [`Motion`]. Samples are unreliable and never deltas, so a dropped or
//! reordered one is simply superseded by the next.
//!
//! The host relays accepted client samples to every other peer. Received
//! poses always go through the interpolation engine; movement state is
//! logical and is applied directly.

use std::collections::HashMap;

use tracing::trace;

use super::{SessionContext, TickTimer};
use crate::components::Motion;
use crate::error::{Result, SyncError};
use crate::identity::{EntityCategory, NetworkId, PeerId};
use crate::math::Pose;
use crate::protocol::{Body, Message, PlayerInput};
use crate::world::{EntityId, SyncWorld};

/// Fixed-rate pose publisher.
#[derive(Debug, Clone)]
pub struct TransformSync {
    timer: TickTimer,
}

impl TransformSync {
    /// Publisher ticking every `interval` seconds.
    #[must_use]
    pub fn new(interval: f32) -> Self {
        Self {
            timer: TickTimer::new(interval),
        }
    }

    /// Change the tick interval.
    pub fn set_interval(&mut self, interval: f32) {
        self.timer.set_interval(interval);
    }

    /// Advance the timer and publish samples when a tick is due.
    pub fn tick(&mut self, dt: f32, ctx: &mut SessionContext, world: &impl SyncWorld) {
        if self.timer.tick(dt) {
            publish_samples(ctx, world);
        }
    }
}

/// Publish one Transform (and Movement where flagged) per owned entity.
pub fn publish_samples(ctx: &mut SessionContext, world: &impl SyncWorld) {
    let owned: Vec<_> = ctx
        .identities
        .sorted()
        .into_iter()
        .filter(|identity| ctx.is_local(identity) && identity.flags.transform)
        .map(|identity| (identity.network_id, identity.local, identity.flags.movement))
        .collect();

    for (network_id, local, with_movement) in owned {
        if !world.is_active(local) {
            continue;
        }
        if let Some(pose) = world.pose(local) {
            ctx.publish(Message::new(network_id, Body::Transform(pose)));
        }
        if with_movement {
            if let Some(motion) = world.motion(local) {
                ctx.publish(Message::new(network_id, Body::Movement(motion)));
            }
        }
    }
    trace!(queued = ctx.outbox.len(), "Transform tick");
}

/// Authorize a received pose-class sample.
///
/// Returns `None` for echoes of entities this process owns.
pub fn authorize_sample(
    ctx: &SessionContext,
    sender: PeerId,
    network_id: NetworkId,
) -> Result<Option<(EntityId, EntityCategory)>> {
    if ctx.is_host() {
        let identity = ctx.identities.may_author(network_id, sender)?;
        return Ok(Some((identity.local, identity.category)));
    }
    if !sender.is_host() {
        return Err(SyncError::OwnershipViolation { sender, network_id });
    }
    let identity = ctx
        .identities
        .get(network_id)
        .ok_or(SyncError::UnresolvedReference(network_id))?;
    if ctx.is_local(identity) {
        return Ok(None);
    }
    Ok(Some((identity.local, identity.category)))
}

fn mark_synced(ctx: &mut SessionContext, network_id: NetworkId) {
    let now = ctx.clock;
    if let Some(identity) = ctx.identities.get_mut(network_id) {
        identity.last_sync_time = now;
    }
}

/// Handle a received Transform.
pub fn receive_transform(
    ctx: &mut SessionContext,
    sender: PeerId,
    network_id: NetworkId,
    pose: Pose,
) -> Result<()> {
    let Some((_, category)) = authorize_sample(ctx, sender, network_id)? else {
        return Ok(());
    };
    mark_synced(ctx, network_id);
    let interval = ctx.pose_interval(category);
    ctx.interpolation.push(network_id, pose, ctx.clock, interval);

    if ctx.is_host() {
        ctx.outbox
            .relay(sender, Message::new(network_id, Body::Transform(pose)));
        ctx.stats.relayed += 1;
    }
    Ok(())
}

/// Handle a received Movement.
pub fn receive_movement(
    ctx: &mut SessionContext,
    world: &mut impl SyncWorld,
    sender: PeerId,
    network_id: NetworkId,
    motion: Motion,
) -> Result<()> {
    let Some((local, _)) = authorize_sample(ctx, sender, network_id)? else {
        return Ok(());
    };
    mark_synced(ctx, network_id);
    world.set_motion(local, motion);

    if ctx.is_host() {
        ctx.outbox
            .relay(sender, Message::new(network_id, Body::Movement(motion)));
        ctx.stats.relayed += 1;
    }
    Ok(())
}

/// Latest input per player, kept on the host for the simulation.
#[derive(Debug, Clone, Default)]
pub struct InputBuffer {
    latest: HashMap<NetworkId, PlayerInput>,
}

impl InputBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an input if it is newer than the one held. Sequence numbers may
    /// wrap.
    pub fn store(&mut self, player: NetworkId, input: PlayerInput) -> bool {
        if let Some(previous) = self.latest.get(&player) {
            let delta = input.sequence.wrapping_sub(previous.sequence);
            if delta == 0 || delta >= u32::MAX / 2 {
                return false;
            }
        }
        self.latest.insert(player, input);
        true
    }

    /// Latest input for a player.
    #[must_use]
    pub fn latest(&self, player: NetworkId) -> Option<PlayerInput> {
        self.latest.get(&player).copied()
    }

    /// Forget a player's input.
    pub fn remove(&mut self, player: NetworkId) {
        self.latest.remove(&player);
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.latest.clear();
    }
}

/// Handle a PlayerInput from a client (host only, never relayed).
pub fn receive_input(
    ctx: &mut SessionContext,
    inputs: &mut InputBuffer,
    sender: PeerId,
    player: NetworkId,
    input: PlayerInput,
) -> Result<()> {
    ctx.require_host("receive player input")?;
    let identity = ctx.identities.may_author(player, sender)?;
    if identity.category != EntityCategory::Player {
        return Err(SyncError::OwnershipViolation {
            sender,
            network_id: player,
        });
    }
    if inputs.store(player, input) {
        mark_synced(ctx, player);
    }
    Ok(())
}
