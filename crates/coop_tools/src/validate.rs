//! Config validation.

use std::path::Path;

use coop_core::config::SessionConfig;

use crate::Result;

/// Load and validate a session config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, does not parse or holds
/// out-of-range values.
pub fn validate_config(path: &Path) -> Result<SessionConfig> {
    Ok(SessionConfig::load(path)?)
}

/// One-line description of the effective values.
#[must_use]
pub fn summary(config: &SessionConfig) -> String {
    format!(
        "role={:?} transform={}Hz agent={}Hz radius={} max_peers={} slots={} name_len={}",
        config.role,
        config.transform_tick_hz,
        config.agent_tick_hz,
        config.interaction_radius,
        config.max_peers,
        config.player_inventory_slots,
        config.max_player_name_len,
    )
}
