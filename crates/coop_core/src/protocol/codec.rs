//! Symmetric encode/decode for [`Message`].

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::message::{Body, Message};
use super::MessageKind;
use crate::error::ProtocolError;

/// Header size: kind tag plus 32-bit id.
pub const HEADER_SIZE: usize = 5;

/// Largest message (header included) that fits a conservative datagram MTU.
pub const MAX_MESSAGE_SIZE: usize = 1200;

/// Largest payload after the header.
pub const MAX_PAYLOAD_SIZE: usize = MAX_MESSAGE_SIZE - HEADER_SIZE;

/// Payload encoding: fixed-width little-endian integers, u64 length prefixes,
/// bounded size, no trailing garbage.
fn wire() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_PAYLOAD_SIZE as u64)
        .with_little_endian()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

fn to_payload<T: Serialize>(kind: MessageKind, value: &T) -> Result<Vec<u8>, ProtocolError> {
    wire().serialize(value).map_err(|err| match *err {
        bincode::ErrorKind::SizeLimit => ProtocolError::PayloadTooLarge {
            kind,
            size: MAX_PAYLOAD_SIZE + 1,
            limit: MAX_PAYLOAD_SIZE,
        },
        other => ProtocolError::MalformedPayload {
            kind,
            reason: other.to_string(),
        },
    })
}

fn from_payload<T: DeserializeOwned>(kind: MessageKind, bytes: &[u8]) -> Result<T, ProtocolError> {
    wire()
        .deserialize(bytes)
        .map_err(|err| ProtocolError::MalformedPayload {
            kind,
            reason: err.to_string(),
        })
}

fn encode_payload(body: &Body) -> Result<Vec<u8>, ProtocolError> {
    let kind = body.kind();
    match body {
        Body::Welcome(welcome) => to_payload(kind, welcome),
        Body::Transform(pose) => to_payload(kind, pose),
        Body::Movement(motion) => to_payload(kind, motion),
        Body::PlayerInput(input) => to_payload(kind, input),
        Body::AgentState(state) => to_payload(kind, state),
        Body::EntitySpawn(spawn) => to_payload(kind, spawn),
        Body::Collision(collision) => to_payload(kind, collision),
        Body::InteractionRequest(request) => to_payload(kind, request),
        Body::InteractionRejected(rejected) => to_payload(kind, rejected),
        Body::ItemPickup(pickup) => to_payload(kind, pickup),
        Body::InventoryUpdate(snapshot) => to_payload(kind, snapshot),
        Body::ContainerInteraction(container) => to_payload(kind, container),
        Body::PlayerJoinLobby(join) => to_payload(kind, join),
        Body::PlayerLeaveLobby => Ok(Vec::new()),
        Body::PlayerCharacterSelect(select) => to_payload(kind, select),
        Body::PlayerReadyState(ready) => to_payload(kind, ready),
        Body::LobbyState(roster) => to_payload(kind, roster),
        Body::GameStart(start) => to_payload(kind, start),
        Body::Unknown { payload, .. } => {
            if payload.len() > MAX_PAYLOAD_SIZE {
                return Err(ProtocolError::PayloadTooLarge {
                    kind,
                    size: payload.len(),
                    limit: MAX_PAYLOAD_SIZE,
                });
            }
            Ok(payload.clone())
        }
    }
}

fn decode_payload(kind: MessageKind, payload: &[u8]) -> Result<Body, ProtocolError> {
    Ok(match kind {
        MessageKind::Welcome => Body::Welcome(from_payload(kind, payload)?),
        MessageKind::Transform => Body::Transform(from_payload(kind, payload)?),
        MessageKind::Movement => Body::Movement(from_payload(kind, payload)?),
        MessageKind::PlayerInput => Body::PlayerInput(from_payload(kind, payload)?),
        MessageKind::AgentState => Body::AgentState(from_payload(kind, payload)?),
        MessageKind::EntitySpawn => Body::EntitySpawn(from_payload(kind, payload)?),
        MessageKind::Collision => Body::Collision(from_payload(kind, payload)?),
        MessageKind::InteractionRequest => Body::InteractionRequest(from_payload(kind, payload)?),
        MessageKind::InteractionRejected => {
            Body::InteractionRejected(from_payload(kind, payload)?)
        }
        MessageKind::ItemPickup => Body::ItemPickup(from_payload(kind, payload)?),
        MessageKind::InventoryUpdate => Body::InventoryUpdate(from_payload(kind, payload)?),
        MessageKind::ContainerInteraction => {
            Body::ContainerInteraction(from_payload(kind, payload)?)
        }
        MessageKind::PlayerJoinLobby => Body::PlayerJoinLobby(from_payload(kind, payload)?),
        MessageKind::PlayerLeaveLobby => {
            if !payload.is_empty() {
                return Err(ProtocolError::MalformedPayload {
                    kind,
                    reason: format!("expected empty payload, got {} bytes", payload.len()),
                });
            }
            Body::PlayerLeaveLobby
        }
        MessageKind::PlayerCharacterSelect => {
            Body::PlayerCharacterSelect(from_payload(kind, payload)?)
        }
        MessageKind::PlayerReadyState => Body::PlayerReadyState(from_payload(kind, payload)?),
        MessageKind::LobbyState => Body::LobbyState(from_payload(kind, payload)?),
        MessageKind::GameStart => Body::GameStart(from_payload(kind, payload)?),
        // `from_tag` never yields Unknown; the caller handles unknown tags.
        MessageKind::Unknown => Body::Unknown {
            kind: MessageKind::Unknown.tag(),
            payload: payload.to_vec(),
        },
    })
}

/// Encode a message into its wire bytes.
///
/// # Errors
/// [`ProtocolError::PayloadTooLarge`] if the message does not fit in
/// [`MAX_MESSAGE_SIZE`], [`ProtocolError::ReservedTag`] for an unknown body
/// whose tag names a known kind.
pub fn encode(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let tag = match &message.body {
        Body::Unknown { kind, .. } if MessageKind::from_tag(*kind).is_some() => {
            return Err(ProtocolError::ReservedTag(*kind));
        }
        Body::Unknown { kind, .. } => *kind,
        body => body.kind().tag(),
    };
    let payload = encode_payload(&message.body)?;

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.push(tag);
    bytes.extend_from_slice(&message.id.to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode one message from wire bytes.
///
/// Unknown kind tags yield [`Body::Unknown`] instead of an error.
///
/// # Errors
/// [`ProtocolError::Truncated`] for short packets, [`ProtocolError::MalformedPayload`]
/// when a known kind's payload does not parse.
pub fn decode(bytes: &[u8]) -> Result<Message, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::Truncated {
            len: bytes.len(),
            needed: HEADER_SIZE,
        });
    }

    let tag = bytes[0];
    let id = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    let payload = &bytes[HEADER_SIZE..];

    let body = match MessageKind::from_tag(tag) {
        Some(kind) => {
            if payload.len() > MAX_PAYLOAD_SIZE {
                return Err(ProtocolError::PayloadTooLarge {
                    kind,
                    size: payload.len(),
                    limit: MAX_PAYLOAD_SIZE,
                });
            }
            decode_payload(kind, payload)?
        }
        None => Body::Unknown {
            kind: tag,
            payload: payload.to_vec(),
        },
    };

    Ok(Message { id, body })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{AgentMode, AgentState, Motion};
    use crate::error::RejectReason;
    use crate::identity::{AuthorityKind, EntityCategory, NetworkId, PeerId};
    use crate::inventory::{InventorySnapshot, ItemKind};
    use crate::math::{Pose, Vec2};
    use crate::protocol::message::*;

    fn round_trip(message: &Message) -> Message {
        let bytes = encode(message).unwrap();
        decode(&bytes).unwrap()
    }

    #[test]
    fn test_header_layout() {
        let message = Message::new(NetworkId(1001), Body::Transform(Pose::at(105.0, 100.0)));
        let bytes = encode(&message).unwrap();
        assert_eq!(bytes[0], MessageKind::Transform.tag());
        assert_eq!(&bytes[1..5], &1001u32.to_le_bytes());
        // Two f32 position components plus one f32 rotation.
        assert_eq!(bytes.len(), HEADER_SIZE + 12);
    }

    #[test]
    fn test_round_trip_every_kind() {
        let snapshot = InventorySnapshot {
            slots: vec![Some(ItemKind(4)), None, Some(ItemKind(2))],
        };
        let messages = vec![
            Message::new(
                NetworkId(2),
                Body::Welcome(Welcome {
                    peer: PeerId(5),
                    transform_tick_hz: 20,
                    agent_tick_hz: 10,
                    interaction_radius: 64.0,
                }),
            ),
            Message::new(NetworkId(1), Body::Transform(Pose::new(Vec2::new(1.5, -2.0), 0.3))),
            Message::new(
                NetworkId(1),
                Body::Movement(Motion {
                    direction: Vec2::new(0.0, 1.0),
                    speed: 80.0,
                    moving: true,
                }),
            ),
            Message::new(
                NetworkId(1),
                Body::PlayerInput(PlayerInput {
                    sequence: 99,
                    move_axis: Vec2::new(-1.0, 0.0),
                    actions: 0b101,
                }),
            ),
            Message::new(
                NetworkId(1001),
                Body::AgentState(AgentState {
                    mode: AgentMode::Chase,
                    heading: Vec2::new(1.0, 0.0),
                    state_timer: 2.5,
                    target_position: Vec2::new(10.0, 20.0),
                    target: Some(NetworkId(3)),
                }),
            ),
            Message::new(
                NetworkId(2050),
                Body::EntitySpawn(EntitySpawn {
                    action: SpawnAction::Spawn,
                    category: EntityCategory::Item,
                    authority: AuthorityKind::HostOwned,
                    owner: PeerId::HOST,
                    pose: Pose::at(50.0, 50.0),
                    kind: 7,
                    slots: 0,
                }),
            ),
            Message::new(
                NetworkId(1),
                Body::Collision(Collision {
                    other: None,
                    point: Vec2::new(3.0, 3.0),
                }),
            ),
            Message::new(
                NetworkId(1),
                Body::InteractionRequest(InteractionRequest {
                    target: NetworkId(2050),
                    kind: InteractionKind::Drop { slot_index: 3 },
                    requester_position: Vec2::new(50.0, 50.0),
                }),
            ),
            Message::new(
                NetworkId(1),
                Body::InteractionRejected(InteractionRejected {
                    target: NetworkId(2050),
                    reason: RejectReason::OutOfRange,
                }),
            ),
            Message::new(
                NetworkId(1),
                Body::ItemPickup(ItemPickup {
                    item: NetworkId(2050),
                    slot_index: 0,
                    item_kind: ItemKind(7),
                    world_position: Vec2::new(50.0, 50.0),
                    success: true,
                }),
            ),
            Message::new(NetworkId(2001), Body::InventoryUpdate(snapshot.clone())),
            Message::new(
                NetworkId(1),
                Body::ContainerInteraction(ContainerMessage::Request(ContainerRequest {
                    container: NetworkId(2001),
                    action: ContainerAction::TransferToContainer,
                    source_slot: 2,
                })),
            ),
            Message::new(
                NetworkId(1),
                Body::ContainerInteraction(ContainerMessage::Snapshot(ContainerSnapshot {
                    player: NetworkId(1),
                    container: NetworkId(2001),
                    player_slots: InventorySnapshot::default(),
                    container_slots: snapshot,
                })),
            ),
            Message::new(
                NetworkId(3),
                Body::PlayerJoinLobby(JoinLobby {
                    name: "Wren".into(),
                }),
            ),
            Message::new(NetworkId(3), Body::PlayerLeaveLobby),
            Message::new(
                NetworkId(3),
                Body::PlayerCharacterSelect(CharacterSelect { character: 2 }),
            ),
            Message::new(NetworkId(3), Body::PlayerReadyState(ReadyState { ready: true })),
            Message::session(Body::LobbyState(LobbyRoster {
                players: vec![LobbyEntry {
                    player: NetworkId(3),
                    name: "Wren".into(),
                    character: 2,
                    ready: true,
                }],
            })),
            Message::session(Body::GameStart(GameStart { seed: u64::MAX })),
            Message {
                id: 42,
                body: Body::Unknown {
                    kind: 200,
                    payload: vec![1, 2, 3],
                },
            },
        ];

        for message in &messages {
            assert_eq!(&round_trip(message), message, "kind {:?}", message.kind());
        }
    }

    #[test]
    fn test_empty_collections_round_trip() {
        let empty_inventory = Message::new(
            NetworkId(2001),
            Body::InventoryUpdate(InventorySnapshot::default()),
        );
        let empty_roster = Message::session(Body::LobbyState(LobbyRoster::default()));
        let empty_name = Message::new(
            NetworkId(1),
            Body::PlayerJoinLobby(JoinLobby {
                name: String::new(),
            }),
        );
        let empty_unknown = Message {
            id: 0,
            body: Body::Unknown {
                kind: 77,
                payload: Vec::new(),
            },
        };
        for message in [empty_inventory, empty_roster, empty_name, empty_unknown] {
            assert_eq!(round_trip(&message), message);
        }
    }

    #[test]
    fn test_max_size_payload() {
        // u64 length prefix + 3 bytes per occupied slot.
        let fits = (MAX_PAYLOAD_SIZE - 8) / 3;
        let full = Message::new(
            NetworkId(2001),
            Body::InventoryUpdate(InventorySnapshot {
                slots: vec![Some(ItemKind(1)); fits],
            }),
        );
        let bytes = encode(&full).unwrap();
        assert!(bytes.len() <= MAX_MESSAGE_SIZE);
        assert_eq!(decode(&bytes).unwrap(), full);

        let too_big = Message::new(
            NetworkId(2001),
            Body::InventoryUpdate(InventorySnapshot {
                slots: vec![Some(ItemKind(1)); fits + 1],
            }),
        );
        assert!(matches!(
            encode(&too_big),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_unknown_tag_is_not_an_error() {
        let bytes = [250u8, 9, 0, 0, 0, 0xAA, 0xBB];
        let message = decode(&bytes).unwrap();
        assert_eq!(message.id, 9);
        assert_eq!(
            message.body,
            Body::Unknown {
                kind: 250,
                payload: vec![0xAA, 0xBB]
            }
        );
        assert_eq!(encode(&message).unwrap(), bytes.to_vec());
    }

    #[test]
    fn test_unknown_body_with_known_tag_rejected() {
        for tag in [0u8, 1, 17] {
            let message = Message {
                id: 1,
                body: Body::Unknown {
                    kind: tag,
                    payload: vec![0; 4],
                },
            };
            assert!(matches!(
                encode(&message),
                Err(ProtocolError::ReservedTag(t)) if t == tag
            ));
        }
        let sentinel = Message {
            id: 1,
            body: Body::Unknown {
                kind: MessageKind::Unknown.tag(),
                payload: Vec::new(),
            },
        };
        assert_eq!(round_trip(&sentinel), sentinel);
    }

    #[test]
    fn test_truncated_header() {
        assert_eq!(
            decode(&[1, 2, 3]),
            Err(ProtocolError::Truncated { len: 3, needed: 5 })
        );
    }

    #[test]
    fn test_malformed_payload() {
        // Transform needs 12 payload bytes.
        let bytes = [MessageKind::Transform.tag(), 1, 0, 0, 0, 0, 0];
        assert!(matches!(
            decode(&bytes),
            Err(ProtocolError::MalformedPayload {
                kind: MessageKind::Transform,
                ..
            })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode(&Message::new(
            NetworkId(1),
            Body::PlayerReadyState(ReadyState { ready: true }),
        ))
        .unwrap();
        bytes.push(0);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn test_leave_lobby_has_empty_payload() {
        let bytes = encode(&Message::new(NetworkId(4), Body::PlayerLeaveLobby)).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
    }
}
