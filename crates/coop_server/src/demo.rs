//! Demo world for the headless host.
//!
//! A row of patrolling agents, a scatter of items and one stocked chest,
//! enough for clients to exercise every sync path. The [`PatrolDriver`]
//! stands in for gameplay: it walks agents back and forth inside a square
//! and writes the resulting behavior state, which agent sync then publishes.

use coop_core::components::{AgentMode, AgentState, Motion};
use coop_core::error::Result;
use coop_core::identity::NetworkId;
use coop_core::inventory::{Inventory, ItemKind};
use coop_core::math::{Pose, Vec2};
use coop_core::session::NetSession;
use coop_core::world::{Capability, SyncWorld};

/// Counts and spacing for [`populate`].
#[derive(Debug, Clone)]
pub struct DemoLayout {
    /// Agents spawned along the x axis.
    pub agents: usize,
    /// Items spawned along the y axis.
    pub items: usize,
    /// Distance between neighbours.
    pub spacing: f32,
    /// Chest contents.
    pub chest: Vec<Option<ItemKind>>,
}

impl Default for DemoLayout {
    fn default() -> Self {
        Self {
            agents: 6,
            items: 8,
            spacing: 48.0,
            chest: vec![Some(ItemKind(1)), Some(ItemKind(2)), None, Some(ItemKind(3)), None, None],
        }
    }
}

/// Network ids of everything [`populate`] spawned.
#[derive(Debug, Clone, Default)]
pub struct DemoWorld {
    /// Patrolling agents.
    pub agents: Vec<NetworkId>,
    /// Loose items.
    pub items: Vec<NetworkId>,
    /// The chest.
    pub container: Option<NetworkId>,
}

/// Spawn the demo world through the host session.
pub fn populate(
    session: &mut NetSession,
    world: &mut impl SyncWorld,
    layout: &DemoLayout,
) -> Result<DemoWorld> {
    let mut demo = DemoWorld::default();

    for i in 0..layout.agents {
        let offset = i as f32 * layout.spacing;
        let heading = if i % 2 == 0 {
            Vec2::new(1.0, 0.0)
        } else {
            Vec2::new(0.0, 1.0)
        };
        let state = AgentState {
            mode: AgentMode::Patrol,
            heading,
            ..AgentState::default()
        };
        demo.agents
            .push(session.spawn_agent(world, Pose::at(offset, 0.0), state)?);
    }

    for i in 0..layout.items {
        let offset = (i + 1) as f32 * layout.spacing;
        let kind = ItemKind(u16::try_from(i % 4 + 1).unwrap_or(1));
        demo.items
            .push(session.spawn_item(world, Pose::at(0.0, -offset), kind)?);
    }

    demo.container = Some(session.spawn_container(
        world,
        Pose::at(-layout.spacing, 0.0),
        Inventory::from_slots(layout.chest.clone()),
    )?);

    tracing::info!(
        agents = demo.agents.len(),
        items = demo.items.len(),
        "Demo world spawned"
    );
    Ok(demo)
}

/// Walks agents along their heading, bouncing off the edges of a square.
#[derive(Debug, Clone, Copy)]
pub struct PatrolDriver {
    /// Half the side length of the patrol square, centred on the origin.
    pub half_extent: f32,
    /// Walking speed in world units per second.
    pub speed: f32,
}

impl Default for PatrolDriver {
    fn default() -> Self {
        Self {
            half_extent: 320.0,
            speed: 40.0,
        }
    }
}

impl PatrolDriver {
    /// Advance every free agent by `dt` seconds.
    pub fn drive(&self, world: &mut impl SyncWorld, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        for entity in world.entities_with(&[Capability::Agent, Capability::Pose]) {
            if world.is_player_controlled(entity) {
                continue;
            }
            let (Some(pose), Some(mut state)) = (world.pose(entity), world.agent_state(entity))
            else {
                continue;
            };
            if state.mode != AgentMode::Patrol {
                continue;
            }

            let mut heading = state.heading.normalize_or_zero();
            if heading == Vec2::ZERO {
                heading = Vec2::new(1.0, 0.0);
            }
            let mut position = pose.position + heading * (self.speed * dt);
            if position.x.abs() > self.half_extent {
                heading.x = -heading.x;
                position.x = position.x.clamp(-self.half_extent, self.half_extent);
            }
            if position.y.abs() > self.half_extent {
                heading.y = -heading.y;
                position.y = position.y.clamp(-self.half_extent, self.half_extent);
            }

            state.heading = heading;
            state.state_timer += dt;
            state.target_position = position + heading * self.speed;
            world.set_pose(entity, Pose::new(position, heading.y.atan2(heading.x)));
            world.set_agent_state(entity, state);
            world.set_motion(
                entity,
                Motion {
                    direction: heading,
                    speed: self.speed,
                    moving: true,
                },
            );
        }
    }
}
