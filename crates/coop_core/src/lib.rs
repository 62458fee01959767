//! # Co-op Core
//!
//! Session sync core for a small co-operative game: one authoritative host
//! that also plays, plus a handful of clients, over a message-oriented
//! transport that may drop or reorder unreliable traffic.
//!
//! This crate contains **only** sync logic:
//! - No sockets (the transport is a trait the host binary implements)
//! - No threads of its own (the inbound queue is drained once per frame)
//! - No rendering or gameplay rules
//!
//! ## Crate Structure
//!
//! - [`protocol`] - Wire format and the closed message set
//! - [`identity`] - Network ids and the authority map
//! - [`sync`] - Per-domain sync systems (transform, agents, interactions, containers, lobby)
//! - [`interpolation`] - Client-side pose smoothing
//! - [`session`] - Session-scoped service driving everything per frame
//! - [`world`] - Entity store contract and an in-memory implementation
//! - [`transport`] - Transport contract, inbound queue and outbox

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod components;
pub mod config;
pub mod error;
pub mod identity;
pub mod interpolation;
pub mod inventory;
pub mod math;
pub mod protocol;
pub mod session;
pub mod sync;
pub mod transport;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::components::{AgentMode, AgentState, Motion};
    pub use crate::config::{Role, SessionConfig};
    pub use crate::error::{ProtocolError, RejectReason, Result, SyncError, TransportError};
    pub use crate::identity::{
        AuthorityKind, EntityCategory, IdentityMap, NetworkId, NetworkIdentity, PeerId,
    };
    pub use crate::interpolation::{InterpolationEngine, InterpolationPhase};
    pub use crate::inventory::{Inventory, InventorySnapshot, ItemKind};
    pub use crate::math::{Pose, Vec2};
    pub use crate::protocol::{decode, encode, Body, Message, MessageKind};
    pub use crate::session::{NetSession, SessionEvent, SessionStats};
    pub use crate::transport::{
        inbound_queue, InboundReceiver, InboundSender, Reliability, Transport, TransportEvent,
    };
    pub use crate::world::{Capability, EntityId, SpawnDescriptor, SyncWorld, World};
}
