//! Entity identity and authority map.
//!
//! Binds local world handles to stable network ids and records which peer
//! may author updates for each entity. Both lookups are O(1).
//!
//! # Id partitioning
//!
//! | Category            | Range          |
//! |---------------------|----------------|
//! | Players             | `1..=999`      |
//! | Agents              | `1000..=1999`  |
//! | Items / containers  | `2000..`       |
//!
//! Ids are handed out by [`NetworkIdAllocator`] on the host and never reused
//! while the session lives.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::world::EntityId;

/// Stable, session-wide entity identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct NetworkId(pub u32);

impl NetworkId {
    /// Whether the id falls in the player range.
    #[must_use]
    pub fn is_player(self) -> bool {
        EntityCategory::Player.id_range().contains(&self.0)
    }

    /// Whether the id falls in the agent range.
    #[must_use]
    pub fn is_agent(self) -> bool {
        EntityCategory::Agent.id_range().contains(&self.0)
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Transport-level connection identifier.
///
/// On a client the connection to the host is always [`PeerId::HOST`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct PeerId(pub u32);

impl PeerId {
    /// The host process itself.
    pub const HOST: Self = Self(0);

    /// Whether this is the host.
    #[must_use]
    pub const fn is_host(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_host() {
            write!(f, "host")
        } else {
            write!(f, "peer-{}", self.0)
        }
    }
}

/// What kind of network-visible entity an identity describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityCategory {
    /// A player avatar.
    Player,
    /// An autonomous agent driven by the host.
    Agent,
    /// A pick-up-able world item.
    Item,
    /// A world container with its own inventory.
    Container,
}

impl EntityCategory {
    /// Id range reserved for this category.
    #[must_use]
    pub const fn id_range(self) -> RangeInclusive<u32> {
        match self {
            Self::Player => 1..=999,
            Self::Agent => 1000..=1999,
            Self::Item | Self::Container => 2000..=u32::MAX,
        }
    }

    /// Default sync flags for entities of this category.
    #[must_use]
    pub const fn default_flags(self) -> SyncFlags {
        match self {
            Self::Player => SyncFlags {
                transform: true,
                movement: true,
                inventory: true,
            },
            // Agent poses ride the agent tick, not the transform tick.
            Self::Agent => SyncFlags {
                transform: false,
                movement: false,
                inventory: false,
            },
            Self::Item => SyncFlags {
                transform: false,
                movement: false,
                inventory: false,
            },
            Self::Container => SyncFlags {
                transform: false,
                movement: false,
                inventory: true,
            },
        }
    }
}

/// Who holds ownership of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorityKind {
    /// The host authors all updates.
    HostOwned,
    /// A connected client authors updates (its own avatar).
    ClientOwned,
}

/// Which sync systems care about an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SyncFlags {
    /// Pose is broadcast by transform sync.
    pub transform: bool,
    /// Movement state is broadcast.
    pub movement: bool,
    /// Inventory is reconciled via snapshots.
    pub inventory: bool,
}

/// Network identity record for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkIdentity {
    /// Stable network id.
    pub network_id: NetworkId,
    /// Local world handle.
    pub local: EntityId,
    /// Entity category.
    pub category: EntityCategory,
    /// Ownership class.
    pub authority: AuthorityKind,
    /// Peer allowed to author updates.
    pub owner: PeerId,
    /// Sync participation.
    pub flags: SyncFlags,
    /// Session time of the last accepted update.
    pub last_sync_time: f64,
}

impl NetworkIdentity {
    /// Whether `peer` may author state-changing updates for this entity.
    #[must_use]
    pub fn is_owned_by(&self, peer: PeerId) -> bool {
        self.owner == peer
    }
}

/// Bidirectional map between local handles and network identities.
#[derive(Debug, Default)]
pub struct IdentityMap {
    by_network: HashMap<NetworkId, NetworkIdentity>,
    by_local: HashMap<EntityId, NetworkId>,
    retired: HashSet<NetworkId>,
}

impl IdentityMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a local handle to a network id.
    ///
    /// # Errors
    /// Fails if the id is live or was retired earlier this session, or if the
    /// local handle is already bound.
    pub fn register(
        &mut self,
        local: EntityId,
        network_id: NetworkId,
        category: EntityCategory,
        authority: AuthorityKind,
        owner: PeerId,
    ) -> Result<&NetworkIdentity> {
        if self.retired.contains(&network_id) {
            return Err(SyncError::RetiredIdentity(network_id));
        }
        if self.by_network.contains_key(&network_id) || self.by_local.contains_key(&local) {
            return Err(SyncError::DuplicateIdentity(network_id));
        }

        self.by_local.insert(local, network_id);
        let identity = self
            .by_network
            .entry(network_id)
            .or_insert(NetworkIdentity {
                network_id,
                local,
                category,
                authority,
                owner,
                flags: category.default_flags(),
                last_sync_time: 0.0,
            });
        Ok(identity)
    }

    /// Local handle for a network id.
    #[must_use]
    pub fn resolve_local(&self, network_id: NetworkId) -> Option<EntityId> {
        self.by_network.get(&network_id).map(|identity| identity.local)
    }

    /// Network id for a local handle.
    #[must_use]
    pub fn resolve_network(&self, local: EntityId) -> Option<NetworkId> {
        self.by_local.get(&local).copied()
    }

    /// Full identity record.
    #[must_use]
    pub fn get(&self, network_id: NetworkId) -> Option<&NetworkIdentity> {
        self.by_network.get(&network_id)
    }

    /// Mutable identity record.
    pub fn get_mut(&mut self, network_id: NetworkId) -> Option<&mut NetworkIdentity> {
        self.by_network.get_mut(&network_id)
    }

    /// Authority predicate: `sender` may author updates for `network_id`.
    ///
    /// # Errors
    /// [`SyncError::UnresolvedReference`] when the id is unknown,
    /// [`SyncError::OwnershipViolation`] when another peer owns it.
    pub fn may_author(&self, network_id: NetworkId, sender: PeerId) -> Result<&NetworkIdentity> {
        let identity = self
            .by_network
            .get(&network_id)
            .ok_or(SyncError::UnresolvedReference(network_id))?;
        if !identity.is_owned_by(sender) {
            return Err(SyncError::OwnershipViolation { sender, network_id });
        }
        Ok(identity)
    }

    /// Remove an identity and mark its id as retired.
    pub fn retire(&mut self, network_id: NetworkId) -> Option<NetworkIdentity> {
        let identity = self.by_network.remove(&network_id)?;
        self.by_local.remove(&identity.local);
        self.retired.insert(network_id);
        Some(identity)
    }

    /// Record an id as retired without it ever having been registered.
    pub fn mark_retired(&mut self, network_id: NetworkId) {
        self.retired.insert(network_id);
    }

    /// Whether an id was retired this session.
    #[must_use]
    pub fn is_retired(&self, network_id: NetworkId) -> bool {
        self.retired.contains(&network_id)
    }

    /// Hand ownership of an entity to another peer.
    ///
    /// # Errors
    /// Fails if the id is unknown.
    pub fn reassign(&mut self, network_id: NetworkId, owner: PeerId) -> Result<&NetworkIdentity> {
        let identity = self
            .by_network
            .get_mut(&network_id)
            .ok_or(SyncError::UnresolvedReference(network_id))?;
        identity.owner = owner;
        identity.authority = if owner.is_host() {
            AuthorityKind::HostOwned
        } else {
            AuthorityKind::ClientOwned
        };
        Ok(identity)
    }

    /// Ids owned by `peer`, sorted.
    #[must_use]
    pub fn owned_by(&self, peer: PeerId) -> Vec<NetworkId> {
        let mut ids: Vec<_> = self
            .by_network
            .values()
            .filter(|identity| identity.owner == peer)
            .map(|identity| identity.network_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// All identities in network id order.
    #[must_use]
    pub fn sorted(&self) -> Vec<&NetworkIdentity> {
        let mut all: Vec<_> = self.by_network.values().collect();
        all.sort_unstable_by_key(|identity| identity.network_id);
        all
    }

    /// Number of live identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_network.len()
    }

    /// Whether no identities are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_network.is_empty()
    }

    /// Drop every identity without retiring ids.
    pub fn clear(&mut self) {
        self.by_network.clear();
        self.by_local.clear();
    }
}

/// Host-side allocator for fresh network ids.
#[derive(Debug, Clone)]
pub struct NetworkIdAllocator {
    next_player: u32,
    next_agent: u32,
    next_object: u32,
}

impl Default for NetworkIdAllocator {
    fn default() -> Self {
        Self {
            next_player: *EntityCategory::Player.id_range().start(),
            next_agent: *EntityCategory::Agent.id_range().start(),
            next_object: *EntityCategory::Item.id_range().start(),
        }
    }
}

impl NetworkIdAllocator {
    /// Create an allocator starting at the bottom of every range.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id for a category.
    ///
    /// # Errors
    /// [`SyncError::IdSpaceExhausted`] once the category's range is used up.
    pub fn allocate(&mut self, category: EntityCategory) -> Result<NetworkId> {
        let range = category.id_range();
        let next = match category {
            EntityCategory::Player => &mut self.next_player,
            EntityCategory::Agent => &mut self.next_agent,
            EntityCategory::Item | EntityCategory::Container => &mut self.next_object,
        };
        if !range.contains(next) {
            return Err(SyncError::IdSpaceExhausted(category));
        }
        let id = NetworkId(*next);
        // u32::MAX is the end of the object range; leave `next` past the range.
        *next = next.checked_add(1).unwrap_or(0);
        Ok(id)
    }
}
