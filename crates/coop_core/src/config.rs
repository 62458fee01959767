//! Session configuration.
//!
//! Loaded from RON. Every field has a default, so a config file only needs
//! the values it changes.
//!
//! # Example RON
//!
//! ```ron
//! SessionConfig(
//!     role: Client,
//!     transform_tick_hz: 30,
//!     interaction_radius: 48.0,
//! )
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default transform tick rate.
pub const DEFAULT_TRANSFORM_TICK_HZ: u32 = 20;

/// Default agent tick rate.
pub const DEFAULT_AGENT_TICK_HZ: u32 = 10;

/// Default interaction radius in world units.
pub const DEFAULT_INTERACTION_RADIUS: f32 = 64.0;

/// Which side of the star topology this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Role {
    /// Authoritative host; also plays.
    #[default]
    Host,
    /// Connects to a host.
    Client,
}

impl Role {
    /// Whether this role makes final decisions for shared world state.
    #[must_use]
    pub const fn is_world_authority(self) -> bool {
        matches!(self, Self::Host)
    }
}

/// Session tuning and role selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Host or client.
    pub role: Role,
    /// Transform sync ticks per second.
    pub transform_tick_hz: u32,
    /// Agent sync ticks per second (host only).
    pub agent_tick_hz: u32,
    /// Maximum requester-to-target distance for interactions.
    pub interaction_radius: f32,
    /// Maximum simultaneously connected remote peers.
    pub max_peers: usize,
    /// Slots in each player inventory.
    pub player_inventory_slots: usize,
    /// Lobby names are truncated to this many characters.
    pub max_player_name_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            role: Role::Host,
            transform_tick_hz: DEFAULT_TRANSFORM_TICK_HZ,
            agent_tick_hz: DEFAULT_AGENT_TICK_HZ,
            interaction_radius: DEFAULT_INTERACTION_RADIUS,
            max_peers: 8,
            player_inventory_slots: 9,
            max_player_name_len: 24,
        }
    }
}

impl SessionConfig {
    /// Default config for a host.
    #[must_use]
    pub fn host() -> Self {
        Self::default()
    }

    /// Default config for a client.
    #[must_use]
    pub fn client() -> Self {
        Self {
            role: Role::Client,
            ..Self::default()
        }
    }

    /// Parse and validate a config from RON text.
    pub fn from_ron_str(ron: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(ron)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_ron_str(&contents)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transform_tick_hz == 0 || self.transform_tick_hz > u32::from(u16::MAX) {
            return Err(ConfigError::Invalid(format!(
                "transform_tick_hz must be in 1..={}, got {}",
                u16::MAX,
                self.transform_tick_hz
            )));
        }
        if self.agent_tick_hz == 0 || self.agent_tick_hz > u32::from(u16::MAX) {
            return Err(ConfigError::Invalid(format!(
                "agent_tick_hz must be in 1..={}, got {}",
                u16::MAX,
                self.agent_tick_hz
            )));
        }
        if !self.interaction_radius.is_finite() || self.interaction_radius <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "interaction_radius must be positive, got {}",
                self.interaction_radius
            )));
        }
        if self.max_peers == 0 {
            return Err(ConfigError::Invalid("max_peers must be at least 1".into()));
        }
        if self.player_inventory_slots == 0 || self.player_inventory_slots > usize::from(u8::MAX) {
            return Err(ConfigError::Invalid(format!(
                "player_inventory_slots must be in 1..=255, got {}",
                self.player_inventory_slots
            )));
        }
        Ok(())
    }

    /// Seconds between transform ticks.
    #[must_use]
    pub fn transform_interval(&self) -> f32 {
        1.0 / self.transform_tick_hz as f32
    }

    /// Seconds between agent ticks.
    #[must_use]
    pub fn agent_interval(&self) -> f32 {
        1.0 / self.agent_tick_hz as f32
    }
}
