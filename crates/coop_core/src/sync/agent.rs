//! Autonomous-agent state sync.
//!
//! Only the host runs agent behavior. Each agent tick (default 10 Hz) it
//! sends, for every agent not under player control, one `AgentState`
//! followed by one `Transform`. Clients apply the behavior fields as they
//! arrive and smooth the position over one agent tick.

use tracing::trace;

use super::{SessionContext, TickTimer};
use crate::components::AgentState;
use crate::error::{Result, SyncError};
use crate::identity::{NetworkId, PeerId};
use crate::protocol::{Body, Message};
use crate::world::{Capability, SyncWorld};

/// Fixed-rate agent state publisher (host only).
#[derive(Debug, Clone)]
pub struct AgentSync {
    timer: TickTimer,
}

impl AgentSync {
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

    /// Advance the timer and publish agent state when a tick is due.
    pub fn tick(&mut self, dt: f32, ctx: &mut SessionContext, world: &impl SyncWorld) {
        if !ctx.is_host() {
            return;
        }
        if self.timer.tick(dt) {
            publish_agents(ctx, world);
        }
    }
}

/// Broadcast behavior state and pose for every host-driven agent.
pub fn publish_agents(ctx: &mut SessionContext, world: &impl SyncWorld) {
    let mut sent = 0usize;
    for entity in world.entities_with(&[Capability::Agent, Capability::Pose]) {
        if world.is_player_controlled(entity) {
            continue;
        }
        let Some(network_id) = ctx.identities.resolve_network(entity) else {
            continue;
        };
        let owned = ctx
            .identities
            .get(network_id)
            .is_some_and(|identity| ctx.is_local(identity));
        if !owned {
            continue;
        }

        if let Some(state) = world.agent_state(entity) {
            ctx.outbox
                .broadcast(Message::new(network_id, Body::AgentState(state)));
        }
        if let Some(pose) = world.pose(entity) {
            ctx.outbox
                .broadcast(Message::new(network_id, Body::Transform(pose)));
        }
        sent += 1;
    }
    trace!(agents = sent, "Agent tick");
}

/// Apply a received AgentState. Only the host may originate one.
pub fn receive_agent_state(
    ctx: &mut SessionContext,
    world: &mut impl SyncWorld,
    sender: PeerId,
    network_id: NetworkId,
    state: AgentState,
) -> Result<()> {
    ctx.require_host_origin(sender, network_id)?;
    let identity = ctx
        .identities
        .get_mut(network_id)
        .ok_or(SyncError::UnresolvedReference(network_id))?;
    identity.last_sync_time = ctx.clock;
    world.set_agent_state(identity.local, state);
    Ok(())
}
