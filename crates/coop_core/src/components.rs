//! Component data the sync systems read and write.
//!
//! Components are pure data with no behavior. The gameplay side owns the
//! real component types; these are the fields the core must serialize.

use serde::{Deserialize, Serialize};

use crate::identity::NetworkId;
use crate::math::Vec2;

/// Logical movement state of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Motion {
    /// Normalized movement direction.
    pub direction: Vec2,
    /// Speed in world units per second.
    pub speed: f32,
    /// Whether the entity is currently moving.
    pub moving: bool,
}

/// Behavior mode of an autonomous agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AgentMode {
    /// Standing still.
    #[default]
    Idle,
    /// Random wandering.
    Wander,
    /// Walking a patrol route.
    Patrol,
    /// Pursuing a target.
    Chase,
    /// Running away from a target.
    Flee,
    /// Returning to its home position.
    Return,
}

/// Behavior state of an autonomous agent, applied verbatim on clients.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentState {
    /// Current behavior.
    pub mode: AgentMode,
    /// Movement heading.
    pub heading: Vec2,
    /// Seconds spent in the current mode.
    pub state_timer: f32,
    /// Where the agent is heading.
    pub target_position: Vec2,
    /// Entity the agent is focused on, if any.
    pub target: Option<NetworkId>,
}

impl AgentState {
    /// State in a given mode with everything else zeroed.
    #[must_use]
    pub fn with_mode(mode: AgentMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}
