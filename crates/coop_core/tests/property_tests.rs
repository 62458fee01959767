//! Property-based tests for the session-level guarantees.

use coop_core::interpolation::InterpolationState;
use coop_core::prelude::*;
use coop_core::protocol::ContainerAction;
use coop_test_utils::convergence::check_convergence;
use coop_test_utils::harness::Harness;
use coop_test_utils::proptest::prelude::*;
use coop_test_utils::strategies::{
    arb_container_action, arb_datagram, arb_message, arb_pose, arb_slots,
};

fn total_items(net: &Harness, player: NetworkId, container: NetworkId) -> usize {
    let identities = net.host.session.identities();
    [player, container]
        .into_iter()
        .filter_map(|id| identities.resolve_local(id))
        .filter_map(|local| net.host.world.inventory(local))
        .map(Inventory::item_count)
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    // =========================================================================
    // Protocol
    // =========================================================================

    /// Every known message survives the wire unchanged.
    #[test]
    fn prop_codec_round_trip(message in arb_message()) {
        let bytes = encode(&message).unwrap();
        prop_assert!(bytes.len() <= coop_core::protocol::MAX_MESSAGE_SIZE);
        prop_assert_eq!(decode(&bytes).unwrap(), message);
    }

    /// Garbage never panics the decoder.
    #[test]
    fn prop_decode_arbitrary_bytes_never_panics(bytes in arb_datagram()) {
        let _ = decode(&bytes);
    }

    // =========================================================================
    // Interactions
    // =========================================================================

    /// However many peers ask for the same item, at most one pickup succeeds.
    #[test]
    fn prop_at_most_one_pickup_per_item(
        clients in 1usize..4,
        repeats in 1usize..4,
        host_requests in any::<bool>(),
        x in -100.0f32..100.0,
        y in -100.0f32..100.0,
    ) {
        let mut net = Harness::new();
        net.host.session.spawn_local_player(&mut net.host.world, Pose::default()).unwrap();
        for _ in 0..clients {
            net.connect_client();
        }
        let item = net
            .host
            .session
            .spawn_item(&mut net.host.world, Pose::at(x, y), ItemKind(5))
            .unwrap();
        net.settle();

        for _ in 0..repeats {
            for index in 0..clients {
                let node = net.client_mut(index);
                node.session.request_pickup(&mut node.world, item).unwrap();
            }
            if host_requests {
                net.host.session.request_pickup(&mut net.host.world, item).unwrap();
            }
        }
        net.settle();

        let successes = net
            .host
            .events
            .iter()
            .filter(|event| matches!(event, SessionEvent::ItemPickedUp { item: i, .. } if *i == item))
            .count();
        let in_range = Vec2::ZERO.distance(Vec2::new(x, y)) <= net.host.session.config().interaction_radius;
        prop_assert_eq!(successes, usize::from(in_range));
        prop_assert!(net.deliveries_of(MessageKind::ItemPickup).len() <= clients);
        check_convergence(&net).assert_converged();
    }

    /// Accepted container transfers neither create nor destroy items.
    #[test]
    fn prop_container_transfers_conserve_items(
        player_slots in arb_slots(9).prop_filter("non-empty", |s| !s.is_empty()),
        container_slots in arb_slots(12).prop_filter("non-empty", |s| !s.is_empty()),
        ops in proptest::collection::vec((arb_container_action(), 0u8..14), 1..24),
    ) {
        let host_config = SessionConfig {
            player_inventory_slots: player_slots.len(),
            ..SessionConfig::host()
        };
        let mut net = Harness::with_configs(host_config, SessionConfig::client());
        let client = net.connect_client();
        net.settle();

        let player = net.client(client).session.local_player().unwrap();
        let container = net
            .host
            .session
            .spawn_container(
                &mut net.host.world,
                Pose::at(16.0, 0.0),
                Inventory::from_slots(container_slots),
            )
            .unwrap();
        let player_local = net.host.session.identities().resolve_local(player).unwrap();
        *net.host.world.inventory_mut(player_local).unwrap() = Inventory::from_slots(player_slots);
        net.host.session.publish_inventory(&net.host.world, player).unwrap();
        net.settle();

        let before = total_items(&net, player, container);
        for (action, slot) in ops {
            {
                let node = net.client_mut(client);
                node.session
                    .request_container(&mut node.world, container, action, slot)
                    .unwrap();
            }
            net.settle();
            prop_assert_eq!(total_items(&net, player, container), before);
        }
        check_convergence(&net).assert_converged();
    }

    /// Opening from out of range never changes either inventory.
    #[test]
    fn prop_out_of_range_container_untouched(distance in 65.0f32..1000.0) {
        let mut net = Harness::new();
        let client = net.connect_client();
        net.settle();
        let container = net
            .host
            .session
            .spawn_container(
                &mut net.host.world,
                Pose::at(distance, 0.0),
                Inventory::from_slots(vec![Some(ItemKind(2)); 3]),
            )
            .unwrap();
        net.settle();
        {
            let node = net.client_mut(client);
            node.session
                .request_container(&mut node.world, container, ContainerAction::Open, 0)
                .unwrap();
        }
        net.settle();
        let player = net.client(client).session.local_player().unwrap();
        prop_assert!(!net.host.session.is_viewing(container, player));
        prop_assert_eq!(net.deliveries_of(MessageKind::InteractionRejected).len(), 1);
    }

    // =========================================================================
    // Interpolation
    // =========================================================================

    /// Rendered pose starts at the previous pose, ends exactly at the target
    /// and never moves backwards in between.
    #[test]
    fn prop_interpolation_endpoints_and_monotonic(
        from in arb_pose(),
        to in arb_pose(),
        start in 0.0f64..1000.0,
        duration in 0.01f32..1.0,
        samples in 2usize..32,
    ) {
        let mut state = InterpolationState::new(from);
        state.push_target(to, start, duration);

        prop_assert_eq!(state.sample(start).position, from.position);
        prop_assert_eq!(state.sample(start + f64::from(duration)), to);

        let total = from.position.distance(to.position);
        let mut last = 0.0f32;
        for step in 0..=samples {
            let t = start + f64::from(duration) * step as f64 / samples as f64;
            let travelled = from.position.distance(state.sample(t).position);
            prop_assert!(travelled + 1e-2 >= last, "moved backwards at step {}", step);
            prop_assert!(travelled <= total + 1e-2);
            last = travelled;
        }

        state.advance(start + f64::from(duration));
        prop_assert_eq!(state.phase(), InterpolationPhase::Settled);
        prop_assert_eq!(state.sample(start + 10.0), to);
    }
}
