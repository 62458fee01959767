//! Message bodies.

use serde::{Deserialize, Serialize};

use super::MessageKind;
use crate::components::{AgentState, Motion};
use crate::error::RejectReason;
use crate::identity::{AuthorityKind, EntityCategory, NetworkId, PeerId};
use crate::inventory::{InventorySnapshot, ItemKind};
use crate::math::{Pose, Vec2};

/// One wire message: header id plus a typed body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Origin-or-target id from the header (meaning depends on the kind).
    pub id: u32,
    /// Kind-specific body.
    pub body: Body,
}

impl Message {
    /// Build a message addressed by network id.
    #[must_use]
    pub const fn new(id: NetworkId, body: Body) -> Self {
        Self { id: id.0, body }
    }

    /// Session-wide message (header id 0).
    #[must_use]
    pub const fn session(body: Body) -> Self {
        Self { id: 0, body }
    }

    /// Header id as a network id.
    #[must_use]
    pub const fn network_id(&self) -> NetworkId {
        NetworkId(self.id)
    }

    /// Kind of the body.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }
}

/// Closed set of message bodies.
///
/// The header id column documents what [`Message::id`] refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Body {
    /// Header: the admitted peer's player id.
    Welcome(Welcome),
    /// Header: entity. Full pose, not a delta.
    Transform(Pose),
    /// Header: entity.
    Movement(Motion),
    /// Header: player.
    PlayerInput(PlayerInput),
    /// Header: agent.
    AgentState(AgentState),
    /// Header: entity being spawned or despawned.
    EntitySpawn(EntitySpawn),
    /// Header: entity that collided.
    Collision(Collision),
    /// Header: requesting player.
    InteractionRequest(InteractionRequest),
    /// Header: requesting player.
    InteractionRejected(InteractionRejected),
    /// Header: player that received the item.
    ItemPickup(ItemPickup),
    /// Header: owner of the inventory (player or container).
    InventoryUpdate(InventorySnapshot),
    /// Header: requesting player.
    ContainerInteraction(ContainerMessage),
    /// Header: player.
    PlayerJoinLobby(JoinLobby),
    /// Header: player.
    PlayerLeaveLobby,
    /// Header: player.
    PlayerCharacterSelect(CharacterSelect),
    /// Header: player.
    PlayerReadyState(ReadyState),
    /// Header: 0.
    LobbyState(LobbyRoster),
    /// Header: 0.
    GameStart(GameStart),
    /// Unrecognized kind tag, kept raw so it re-encodes byte-identically.
    Unknown {
        /// Raw kind tag.
        kind: u8,
        /// Raw payload bytes.
        payload: Vec<u8>,
    },
}

impl Body {
    /// Kind of this body.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Welcome(_) => MessageKind::Welcome,
            Self::Transform(_) => MessageKind::Transform,
            Self::Movement(_) => MessageKind::Movement,
            Self::PlayerInput(_) => MessageKind::PlayerInput,
            Self::AgentState(_) => MessageKind::AgentState,
            Self::EntitySpawn(_) => MessageKind::EntitySpawn,
            Self::Collision(_) => MessageKind::Collision,
            Self::InteractionRequest(_) => MessageKind::InteractionRequest,
            Self::InteractionRejected(_) => MessageKind::InteractionRejected,
            Self::ItemPickup(_) => MessageKind::ItemPickup,
            Self::InventoryUpdate(_) => MessageKind::InventoryUpdate,
            Self::ContainerInteraction(_) => MessageKind::ContainerInteraction,
            Self::PlayerJoinLobby(_) => MessageKind::PlayerJoinLobby,
            Self::PlayerLeaveLobby => MessageKind::PlayerLeaveLobby,
            Self::PlayerCharacterSelect(_) => MessageKind::PlayerCharacterSelect,
            Self::PlayerReadyState(_) => MessageKind::PlayerReadyState,
            Self::LobbyState(_) => MessageKind::LobbyState,
            Self::GameStart(_) => MessageKind::GameStart,
            Self::Unknown { .. } => MessageKind::Unknown,
        }
    }
}

/// Greeting sent by the host to an admitted peer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    /// Connection id the host knows this peer by.
    pub peer: PeerId,
    /// Host transform tick rate.
    pub transform_tick_hz: u16,
    /// Host agent tick rate.
    pub agent_tick_hz: u16,
    /// Host interaction radius.
    pub interaction_radius: f32,
}

/// Latest input sample from a player.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerInput {
    /// Monotonic per-player input counter.
    pub sequence: u32,
    /// Movement stick / WASD axis.
    pub move_axis: Vec2,
    /// Action button bitmask.
    pub actions: u8,
}

/// Whether an [`EntitySpawn`] creates or removes the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpawnAction {
    /// Create (or re-announce with a new owner).
    Spawn,
    /// Remove and retire the id.
    Despawn,
}

/// Spawn announcement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntitySpawn {
    /// Spawn or despawn.
    pub action: SpawnAction,
    /// Entity category.
    pub category: EntityCategory,
    /// Ownership class.
    pub authority: AuthorityKind,
    /// Peer that may author updates.
    pub owner: PeerId,
    /// Initial pose.
    pub pose: Pose,
    /// Item kind for items, species code for agents, 0 otherwise.
    pub kind: u16,
    /// Inventory capacity, 0 for entities without one.
    pub slots: u8,
}

impl EntitySpawn {
    /// Despawn announcement for an entity.
    #[must_use]
    pub fn despawn(category: EntityCategory) -> Self {
        Self {
            action: SpawnAction::Despawn,
            category,
            authority: AuthorityKind::HostOwned,
            owner: PeerId::HOST,
            pose: Pose::default(),
            kind: 0,
            slots: 0,
        }
    }
}

/// Collision report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collision {
    /// The other entity, when it is network visible.
    pub other: Option<NetworkId>,
    /// Contact point.
    pub point: Vec2,
}

/// Kind of world interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionKind {
    /// Take a world item into the first free inventory slot.
    Pickup,
    /// Put the item in a slot back into the world.
    Drop {
        /// Source slot in the requester's inventory.
        slot_index: u8,
    },
}

/// Interaction request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InteractionRequest {
    /// Target entity (item for pickup, the requester itself for drop).
    pub target: NetworkId,
    /// What to do.
    pub kind: InteractionKind,
    /// Where the requester stands. Range-checks pickups; drops land at the
    /// host's copy of the avatar instead.
    pub requester_position: Vec2,
}

/// Rejection, sent to the requester only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRejected {
    /// Target of the failed request.
    pub target: NetworkId,
    /// Why it failed.
    pub reason: RejectReason,
}

/// Authoritative pickup result.
///
/// Carries everything needed to converge regardless of arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemPickup {
    /// World item that was picked up.
    pub item: NetworkId,
    /// Slot the item landed in.
    pub slot_index: u8,
    /// Item kind placed into the slot.
    pub item_kind: ItemKind,
    /// Where the item was in the world.
    pub world_position: Vec2,
    /// Always true on the wire today; rejections use [`InteractionRejected`].
    pub success: bool,
}

/// Container action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerAction {
    /// Start viewing the container.
    Open,
    /// Stop viewing the container.
    Close,
    /// Move a player slot into the container.
    TransferToContainer,
    /// Move a container slot into the player inventory.
    TransferToPlayer,
}

/// Client request against a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRequest {
    /// Container entity.
    pub container: NetworkId,
    /// Action.
    pub action: ContainerAction,
    /// Source slot for transfers (player slot for `TransferToContainer`,
    /// container slot for `TransferToPlayer`).
    pub source_slot: u8,
}

/// Host broadcast of both inventories after a container operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    /// Player whose inventory is included.
    pub player: NetworkId,
    /// Container whose inventory is included.
    pub container: NetworkId,
    /// Complete player inventory.
    pub player_slots: InventorySnapshot,
    /// Complete container inventory.
    pub container_slots: InventorySnapshot,
}

/// Container traffic in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerMessage {
    /// Client to host.
    Request(ContainerRequest),
    /// Host to everyone.
    Snapshot(ContainerSnapshot),
}

/// Join the lobby under a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinLobby {
    /// Display name.
    pub name: String,
}

/// Character choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSelect {
    /// Character index.
    pub character: u8,
}

/// Ready toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyState {
    /// Whether the player is ready.
    pub ready: bool,
}

/// One lobby roster row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyEntry {
    /// Player id.
    pub player: NetworkId,
    /// Display name.
    pub name: String,
    /// Character index.
    pub character: u8,
    /// Ready flag.
    pub ready: bool,
}

/// Complete lobby roster.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LobbyRoster {
    /// Rows in player id order.
    pub players: Vec<LobbyEntry>,
}

/// Game start signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStart {
    /// Shared seed for gameplay randomness.
    pub seed: u64,
}
