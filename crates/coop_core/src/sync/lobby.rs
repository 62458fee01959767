//! Pre-game lobby roster.
//!
//! Peers send changes about their own player; the host folds them into the
//! roster and broadcasts the complete roster after each change, so clients
//! never merge partial updates.

use std::collections::BTreeMap;

use tracing::info;

use super::SessionContext;
use crate::error::{Result, SyncError};
use crate::identity::{EntityCategory, NetworkId, PeerId};
use crate::protocol::{Body, GameStart, LobbyEntry, LobbyRoster, Message};
use crate::session::SessionEvent;

/// One lobby change from a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyChange {
    /// Join (or rename) under a display name.
    Join(String),
    /// Leave the lobby.
    Leave,
    /// Pick a character.
    Character(u8),
    /// Toggle ready.
    Ready(bool),
}

/// Lobby roster keyed by player id.
#[derive(Debug, Clone, Default)]
pub struct LobbySync {
    roster: BTreeMap<NetworkId, LobbyEntry>,
    started: Option<u64>,
}

impl LobbySync {
    /// Create an empty lobby.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete roster in player id order.
    #[must_use]
    pub fn roster(&self) -> LobbyRoster {
        LobbyRoster {
            players: self.roster.values().cloned().collect(),
        }
    }

    /// One player's row.
    #[must_use]
    pub fn entry(&self, player: NetworkId) -> Option<&LobbyEntry> {
        self.roster.get(&player)
    }

    /// Seed of the started game, if any.
    #[must_use]
    pub fn started(&self) -> Option<u64> {
        self.started
    }

    /// Whether the roster is non-empty and everyone is ready.
    #[must_use]
    pub fn all_ready(&self) -> bool {
        !self.roster.is_empty() && self.roster.values().all(|entry| entry.ready)
    }

    /// Apply a change to the roster.
    ///
    /// # Errors
    /// [`SyncError::UnresolvedReference`] when a player who has not joined
    /// changes character or ready state.
    pub fn apply(&mut self, player: NetworkId, change: LobbyChange, max_name_len: usize) -> Result<()> {
        match change {
            LobbyChange::Join(name) => {
                let name: String = name.chars().take(max_name_len).collect();
                let entry = self.roster.entry(player).or_insert_with(|| LobbyEntry {
                    player,
                    name: String::new(),
                    character: 0,
                    ready: false,
                });
                entry.name = name;
            }
            LobbyChange::Leave => {
                self.roster.remove(&player);
            }
            LobbyChange::Character(character) => {
                self.roster
                    .get_mut(&player)
                    .ok_or(SyncError::UnresolvedReference(player))?
                    .character = character;
            }
            LobbyChange::Ready(ready) => {
                self.roster
                    .get_mut(&player)
                    .ok_or(SyncError::UnresolvedReference(player))?
                    .ready = ready;
            }
        }
        Ok(())
    }

    /// Remove a player; returns whether they were in the lobby.
    pub fn remove(&mut self, player: NetworkId) -> bool {
        self.roster.remove(&player).is_some()
    }

    /// Replace the roster with one received from the host.
    pub fn replace(&mut self, roster: &LobbyRoster) {
        self.roster = roster
            .players
            .iter()
            .map(|entry| (entry.player, entry.clone()))
            .collect();
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.roster.clear();
        self.started = None;
    }

    /// Handle a change from a peer about its own player (host only).
    pub fn handle(
        &mut self,
        ctx: &mut SessionContext,
        sender: PeerId,
        player: NetworkId,
        change: LobbyChange,
    ) -> Result<()> {
        ctx.require_host("handle lobby change")?;
        let identity = ctx.identities.may_author(player, sender)?;
        if identity.category != EntityCategory::Player {
            return Err(SyncError::OwnershipViolation {
                sender,
                network_id: player,
            });
        }
        self.apply(player, change, ctx.config.max_player_name_len)?;
        self.broadcast(ctx);
        Ok(())
    }

    /// Broadcast the roster and report it locally.
    pub fn broadcast(&self, ctx: &mut SessionContext) {
        let roster = self.roster();
        ctx.outbox
            .broadcast(Message::session(Body::LobbyState(roster.clone())));
        ctx.emit(SessionEvent::LobbyUpdated(roster));
    }

    /// Start the game once everyone is ready (host only).
    ///
    /// # Errors
    /// [`SyncError::LobbyNotReady`] when the lobby is empty or someone is
    /// not ready.
    pub fn start_game(&mut self, ctx: &mut SessionContext, seed: u64) -> Result<()> {
        ctx.require_host("start game")?;
        if !self.all_ready() {
            return Err(SyncError::LobbyNotReady {
                ready: self.roster.values().filter(|entry| entry.ready).count(),
                total: self.roster.len(),
            });
        }
        self.started = Some(seed);
        ctx.outbox
            .broadcast(Message::session(Body::GameStart(GameStart { seed })));
        info!(seed, players = self.roster.len(), "Game started");
        ctx.emit(SessionEvent::GameStarted { seed });
        Ok(())
    }

    /// Record a game start received from the host.
    pub fn mark_started(&mut self, seed: u64) {
        self.started = Some(seed);
    }
}
