//! Error types for the session sync core.
//!
//! Every failure inside the core maps onto one of the classes below. None of
//! them is fatal to the session: the dispatcher logs the error, bumps a
//! counter in [`crate::session::SessionStats`] and moves on to the next message.

use thiserror::Error;

use crate::identity::{EntityCategory, NetworkId, PeerId};
use crate::protocol::MessageKind;

/// Result type alias using [`SyncError`].
pub type Result<T> = std::result::Result<T, SyncError>;

/// Top-level error type for all sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed or undecodable message.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Business-rule failure, reported back to the requester only.
    #[error("Request rejected: {0:?}")]
    ValidationRejected(RejectReason),

    /// Sender is not authoritative for the referenced entity.
    #[error("Peer {sender} may not author updates for entity {network_id}")]
    OwnershipViolation {
        /// Peer that sent the message.
        sender: PeerId,
        /// Entity the message referred to.
        network_id: NetworkId,
    },

    /// The connection to a peer went away.
    #[error("Connection to peer {0} lost")]
    ConnectionLost(PeerId),

    /// Network id not present in the identity map.
    #[error("Unresolved network id: {0}")]
    UnresolvedReference(NetworkId),

    /// A live identity already uses this network id.
    #[error("Network id {0} is already registered")]
    DuplicateIdentity(NetworkId),

    /// The network id was retired earlier in this session and cannot come back.
    #[error("Network id {0} was retired and cannot be reused")]
    RetiredIdentity(NetworkId),

    /// The id range for an entity category ran out.
    #[error("Network id space exhausted for {0:?}")]
    IdSpaceExhausted(EntityCategory),

    /// Operation requires a different session role.
    #[error("Operation '{0}' is not available in this session role")]
    WrongRole(&'static str),

    /// Operation requires the session to know its local player.
    #[error("Local player is not assigned yet")]
    NotWelcomed,

    /// Game start requested while the lobby is empty or someone is not ready.
    #[error("Lobby not ready: {ready} of {total} players ready")]
    LobbyNotReady {
        /// Players marked ready.
        ready: usize,
        /// Players in the lobby.
        total: usize,
    },

    /// Underlying transport refused to send.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors raised while encoding or decoding wire messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Fewer bytes than the fixed header.
    #[error("Packet truncated: {len} bytes, header needs {needed}")]
    Truncated {
        /// Bytes available.
        len: usize,
        /// Bytes required.
        needed: usize,
    },

    /// Encoded message exceeds the maximum message size.
    #[error("Payload for {kind:?} is {size} bytes, limit is {limit}")]
    PayloadTooLarge {
        /// Kind being encoded or decoded.
        kind: MessageKind,
        /// Offending payload size (or the limit when the size is unknown).
        size: usize,
        /// Maximum payload size.
        limit: usize,
    },

    /// Payload bytes do not match the layout for the kind.
    #[error("Malformed {kind:?} payload: {reason}")]
    MalformedPayload {
        /// Kind whose payload failed to decode.
        kind: MessageKind,
        /// Decoder message.
        reason: String,
    },

    /// An unknown-kind body carries a tag this build assigns to a known kind.
    #[error("Tag {0} belongs to a known kind and cannot be sent as unknown")]
    ReservedTag(u8),
}

/// Errors surfaced by a [`crate::transport::Transport`] implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No connection exists for the peer.
    #[error("Peer {0} is not connected")]
    UnknownPeer(PeerId),

    /// Socket-level failure.
    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors loading or validating a session config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// Path to the file.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse RON.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Values out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Closed vocabulary of business-rule rejections shared by host and clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RejectReason {
    /// Target entity does not exist (or was already consumed).
    TargetMissing,
    /// Target exists but is not active in the world.
    TargetInactive,
    /// Requester is farther than the interaction radius.
    OutOfRange,
    /// Requester inventory has no free slot.
    InventoryFull,
    /// Source slot holds nothing.
    SlotEmpty,
    /// Slot index outside the inventory.
    InvalidSlot,
    /// Container inventory has no free slot.
    ContainerFull,
    /// Transfer attempted on a container the requester has not opened.
    ContainerNotOpen,
    /// Target of a container request is not a container.
    NotAContainer,
    /// Target of a pickup is not a world item.
    NotAnItem,
}
