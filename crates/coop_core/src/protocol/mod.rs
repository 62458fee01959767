//! Wire protocol.
//!
//! Every datagram carries exactly one message:
//!
//! ```text
//! +--------+----------------+---------------------------+
//! | kind   | id (u32 LE)    | kind-specific payload     |
//! | 1 byte | 4 bytes        | bincode, fixint LE        |
//! +--------+----------------+---------------------------+
//! ```
//!
//! The header id is the origin or target network id; its meaning is fixed per
//! kind (see [`Body`]). Strings and sequences inside payloads are length
//! prefixed, so decoding never depends on socket framing. Unknown kind tags
//! decode to [`Body::Unknown`] so older peers can skip newer messages.

mod codec;
mod message;

pub use codec::{decode, encode, HEADER_SIZE, MAX_MESSAGE_SIZE, MAX_PAYLOAD_SIZE};
pub use message::{
    Body, CharacterSelect, Collision, ContainerAction, ContainerMessage, ContainerRequest,
    ContainerSnapshot, EntitySpawn, GameStart, InteractionKind, InteractionRejected,
    InteractionRequest, ItemPickup, JoinLobby, LobbyEntry, LobbyRoster, Message, PlayerInput,
    ReadyState, SpawnAction, Welcome,
};

use serde::{Deserialize, Serialize};

use crate::transport::Reliability;

/// Closed set of message kinds with their wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageKind {
    /// Host greets a newly admitted peer.
    Welcome = 0,
    /// Full pose sample.
    Transform = 1,
    /// Logical movement state.
    Movement = 2,
    /// Raw player input for the host simulation.
    PlayerInput = 3,
    /// Agent behavior state.
    AgentState = 4,
    /// Spawn or despawn announcement.
    EntitySpawn = 5,
    /// Collision report.
    Collision = 6,
    /// World interaction request.
    InteractionRequest = 7,
    /// Interaction rejected by the host.
    InteractionRejected = 8,
    /// Successful pickup result.
    ItemPickup = 9,
    /// Full inventory snapshot.
    InventoryUpdate = 10,
    /// Container request or snapshot pair.
    ContainerInteraction = 11,
    /// Player joins the lobby.
    PlayerJoinLobby = 12,
    /// Player leaves the lobby.
    PlayerLeaveLobby = 13,
    /// Player picks a character.
    PlayerCharacterSelect = 14,
    /// Player toggles ready.
    PlayerReadyState = 15,
    /// Full lobby roster.
    LobbyState = 16,
    /// Host starts the game.
    GameStart = 17,
    /// Tag not known to this build.
    Unknown = 255,
}

impl MessageKind {
    /// Parse a known kind from its tag.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Welcome,
            1 => Self::Transform,
            2 => Self::Movement,
            3 => Self::PlayerInput,
            4 => Self::AgentState,
            5 => Self::EntitySpawn,
            6 => Self::Collision,
            7 => Self::InteractionRequest,
            8 => Self::InteractionRejected,
            9 => Self::ItemPickup,
            10 => Self::InventoryUpdate,
            11 => Self::ContainerInteraction,
            12 => Self::PlayerJoinLobby,
            13 => Self::PlayerLeaveLobby,
            14 => Self::PlayerCharacterSelect,
            15 => Self::PlayerReadyState,
            16 => Self::LobbyState,
            17 => Self::GameStart,
            _ => return None,
        })
    }

    /// Wire tag.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Delivery class for the kind.
    ///
    /// Pose and behavior samples are full state and may be lost or reordered;
    /// everything that mutates shared state goes over the reliable channel.
    #[must_use]
    pub const fn reliability(self) -> Reliability {
        match self {
            Self::Transform | Self::Movement | Self::PlayerInput | Self::AgentState => {
                Reliability::Unreliable
            }
            _ => Reliability::Reliable,
        }
    }
}
