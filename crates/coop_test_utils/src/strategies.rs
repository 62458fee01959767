//! Property-based testing strategies.
//!
//! Floats are drawn from finite ranges so decoded messages compare equal to
//! the originals.

use proptest::collection::vec;
use proptest::option;
use proptest::prelude::*;

use coop_core::components::{AgentMode, AgentState, Motion};
use coop_core::error::RejectReason;
use coop_core::identity::{AuthorityKind, EntityCategory, NetworkId, PeerId};
use coop_core::inventory::{InventorySnapshot, ItemKind};
use coop_core::math::{Pose, Vec2};
use coop_core::protocol::{
    Body, CharacterSelect, Collision, ContainerAction, ContainerMessage, ContainerRequest,
    ContainerSnapshot, EntitySpawn, GameStart, InteractionKind, InteractionRejected,
    InteractionRequest, ItemPickup, JoinLobby, LobbyEntry, LobbyRoster, Message, PlayerInput,
    ReadyState, SpawnAction, Welcome,
};

/// World coordinate.
pub fn arb_coord() -> impl Strategy<Value = f32> {
    -10_000.0f32..10_000.0
}

/// Position.
pub fn arb_vec2() -> impl Strategy<Value = Vec2> {
    (arb_coord(), arb_coord()).prop_map(|(x, y)| Vec2::new(x, y))
}

/// Position plus rotation in `[-pi, pi)`.
pub fn arb_pose() -> impl Strategy<Value = Pose> {
    (arb_vec2(), -std::f32::consts::PI..std::f32::consts::PI)
        .prop_map(|(position, rotation)| Pose::new(position, rotation))
}

/// Any network id, across all category ranges.
pub fn arb_network_id() -> impl Strategy<Value = NetworkId> {
    prop_oneof![1u32..1000, 1000u32..2000, 2000u32..100_000].prop_map(NetworkId)
}

/// Connection id.
pub fn arb_peer() -> impl Strategy<Value = PeerId> {
    (0u32..16).prop_map(PeerId)
}

/// Entity category.
pub fn arb_category() -> impl Strategy<Value = EntityCategory> {
    prop_oneof![
        Just(EntityCategory::Player),
        Just(EntityCategory::Agent),
        Just(EntityCategory::Item),
        Just(EntityCategory::Container),
    ]
}

/// Rejection reason.
pub fn arb_reject_reason() -> impl Strategy<Value = RejectReason> {
    prop_oneof![
        Just(RejectReason::TargetMissing),
        Just(RejectReason::TargetInactive),
        Just(RejectReason::OutOfRange),
        Just(RejectReason::InventoryFull),
        Just(RejectReason::SlotEmpty),
        Just(RejectReason::InvalidSlot),
        Just(RejectReason::ContainerFull),
        Just(RejectReason::ContainerNotOpen),
        Just(RejectReason::NotAContainer),
        Just(RejectReason::NotAnItem),
    ]
}

/// Item kind.
pub fn arb_item_kind() -> impl Strategy<Value = ItemKind> {
    (1u16..64).prop_map(ItemKind)
}

/// Slot contents of an inventory with up to `max_slots` slots.
pub fn arb_slots(max_slots: usize) -> impl Strategy<Value = Vec<Option<ItemKind>>> {
    vec(option::of(arb_item_kind()), 0..=max_slots)
}

/// Inventory snapshot.
pub fn arb_snapshot() -> impl Strategy<Value = InventorySnapshot> {
    arb_slots(16).prop_map(|slots| InventorySnapshot { slots })
}

/// Agent behavior state.
pub fn arb_agent_state() -> impl Strategy<Value = AgentState> {
    (
        prop_oneof![
            Just(AgentMode::Idle),
            Just(AgentMode::Wander),
            Just(AgentMode::Patrol),
            Just(AgentMode::Chase),
            Just(AgentMode::Flee),
            Just(AgentMode::Return),
        ],
        arb_vec2(),
        0.0f32..60.0,
        arb_vec2(),
        option::of(arb_network_id()),
    )
        .prop_map(|(mode, heading, state_timer, target_position, target)| AgentState {
            mode,
            heading,
            state_timer,
            target_position,
            target,
        })
}

/// Movement state.
pub fn arb_motion() -> impl Strategy<Value = Motion> {
    (arb_vec2(), 0.0f32..500.0, any::<bool>()).prop_map(|(direction, speed, moving)| Motion {
        direction,
        speed,
        moving,
    })
}

/// Container action.
pub fn arb_container_action() -> impl Strategy<Value = ContainerAction> {
    prop_oneof![
        Just(ContainerAction::Open),
        Just(ContainerAction::Close),
        Just(ContainerAction::TransferToContainer),
        Just(ContainerAction::TransferToPlayer),
    ]
}

fn arb_spawn() -> impl Strategy<Value = EntitySpawn> {
    (
        prop_oneof![Just(SpawnAction::Spawn), Just(SpawnAction::Despawn)],
        arb_category(),
        arb_peer(),
        arb_pose(),
        any::<u16>(),
        any::<u8>(),
    )
        .prop_map(|(action, category, owner, pose, kind, slots)| EntitySpawn {
            action,
            category,
            authority: if owner.is_host() {
                AuthorityKind::HostOwned
            } else {
                AuthorityKind::ClientOwned
            },
            owner,
            pose,
            kind,
            slots,
        })
}

fn arb_lobby_entry() -> impl Strategy<Value = LobbyEntry> {
    (1u32..1000, "[a-zA-Z0-9 ]{0,24}", any::<u8>(), any::<bool>()).prop_map(
        |(player, name, character, ready)| LobbyEntry {
            player: NetworkId(player),
            name,
            character,
            ready,
        },
    )
}

/// Any known message body.
pub fn arb_body() -> impl Strategy<Value = Body> {
    prop_oneof![
        (arb_peer(), any::<u16>(), any::<u16>(), 1.0f32..500.0).prop_map(
            |(peer, transform_tick_hz, agent_tick_hz, interaction_radius)| {
                Body::Welcome(Welcome {
                    peer,
                    transform_tick_hz,
                    agent_tick_hz,
                    interaction_radius,
                })
            }
        ),
        arb_pose().prop_map(Body::Transform),
        arb_motion().prop_map(Body::Movement),
        (any::<u32>(), arb_vec2(), any::<u8>()).prop_map(|(sequence, move_axis, actions)| {
            Body::PlayerInput(PlayerInput {
                sequence,
                move_axis,
                actions,
            })
        }),
        arb_agent_state().prop_map(Body::AgentState),
        arb_spawn().prop_map(Body::EntitySpawn),
        (option::of(arb_network_id()), arb_vec2())
            .prop_map(|(other, point)| Body::Collision(Collision { other, point })),
        (arb_network_id(), option::of(any::<u8>()), arb_vec2()).prop_map(
            |(target, drop_slot, requester_position)| {
                Body::InteractionRequest(InteractionRequest {
                    target,
                    kind: drop_slot.map_or(InteractionKind::Pickup, |slot_index| {
                        InteractionKind::Drop { slot_index }
                    }),
                    requester_position,
                })
            }
        ),
        (arb_network_id(), arb_reject_reason()).prop_map(|(target, reason)| {
            Body::InteractionRejected(InteractionRejected { target, reason })
        }),
        (arb_network_id(), any::<u8>(), arb_item_kind(), arb_vec2()).prop_map(
            |(item, slot_index, item_kind, world_position)| Body::ItemPickup(ItemPickup {
                item,
                slot_index,
                item_kind,
                world_position,
                success: true,
            })
        ),
        arb_snapshot().prop_map(Body::InventoryUpdate),
        (arb_network_id(), arb_container_action(), any::<u8>()).prop_map(
            |(container, action, source_slot)| Body::ContainerInteraction(
                ContainerMessage::Request(ContainerRequest {
                    container,
                    action,
                    source_slot,
                })
            )
        ),
        (arb_network_id(), arb_network_id(), arb_snapshot(), arb_snapshot()).prop_map(
            |(player, container, player_slots, container_slots)| Body::ContainerInteraction(
                ContainerMessage::Snapshot(ContainerSnapshot {
                    player,
                    container,
                    player_slots,
                    container_slots,
                })
            )
        ),
        "[a-zA-Z0-9 ]{0,24}".prop_map(|name| Body::PlayerJoinLobby(JoinLobby { name })),
        Just(Body::PlayerLeaveLobby),
        any::<u8>().prop_map(|character| Body::PlayerCharacterSelect(CharacterSelect {
            character
        })),
        any::<bool>().prop_map(|ready| Body::PlayerReadyState(ReadyState { ready })),
        vec(arb_lobby_entry(), 0..8)
            .prop_map(|players| Body::LobbyState(LobbyRoster { players })),
        any::<u64>().prop_map(|seed| Body::GameStart(GameStart { seed })),
    ]
}

/// Any known message.
pub fn arb_message() -> impl Strategy<Value = Message> {
    (any::<u32>(), arb_body()).prop_map(|(id, body)| Message { id, body })
}

/// Arbitrary bytes, for decoder robustness.
pub fn arb_datagram() -> impl Strategy<Value = Vec<u8>> {
    vec(any::<u8>(), 0..1400)
}
