//! End-to-end session scenarios.
//!
//! The agent scenario drives a lone client session by injecting host traffic
//! directly into its inbound queue. The inventory scenarios run a host and
//! clients over the loopback harness.

use coop_core::prelude::*;
use coop_core::protocol::{ContainerAction, ContainerMessage, SpawnAction};
use coop_test_utils::convergence::check_convergence;
use coop_test_utils::fixtures::{encoded, host_spawn, welcome};
use coop_test_utils::harness::Harness;

/// Transport that discards everything.
struct NullTransport;

impl Transport for NullTransport {
    fn send(
        &mut self,
        _peer: PeerId,
        _bytes: &[u8],
        _reliability: Reliability,
    ) -> std::result::Result<(), TransportError> {
        Ok(())
    }

    fn broadcast(
        &mut self,
        _bytes: &[u8],
        _reliability: Reliability,
        _except: Option<PeerId>,
    ) -> std::result::Result<(), TransportError> {
        Ok(())
    }
}

fn local_of(session: &NetSession, id: NetworkId) -> EntityId {
    session
        .identities()
        .resolve_local(id)
        .expect("entity should be registered")
}

// =============================================================================
// Agent sync and interpolation
// =============================================================================

#[test]
fn test_agent_patrol_interpolates_to_exact_target() {
    let config = SessionConfig::client();
    let (tx, rx) = inbound_queue();
    let mut session = NetSession::new(config.clone(), rx);
    let mut world = World::new();
    let mut transport = NullTransport;

    let agent = NetworkId(1001);
    tx.connected(PeerId::HOST);
    tx.received(PeerId::HOST, encoded(&welcome(PeerId(1), NetworkId(1), &config)));
    tx.received(
        PeerId::HOST,
        encoded(&host_spawn(agent, EntityCategory::Agent, Pose::at(100.0, 100.0))),
    );
    let patrol = AgentState {
        mode: AgentMode::Patrol,
        heading: Vec2::new(1.0, 0.0),
        ..AgentState::default()
    };
    tx.received(
        PeerId::HOST,
        encoded(&Message::new(agent, Body::AgentState(patrol))),
    );
    tx.received(
        PeerId::HOST,
        encoded(&Message::new(agent, Body::Transform(Pose::at(105.0, 100.0)))),
    );

    session.update(0.0, &mut world, &mut transport);
    let local = local_of(&session, agent);

    // Behavior applies immediately, the pose starts from the spawn position.
    assert_eq!(world.agent_state(local), Some(patrol));
    assert_eq!(world.pose(local), Some(Pose::at(100.0, 100.0)));
    assert_eq!(
        session.interpolation().phase(agent),
        Some(InterpolationPhase::Interpolating)
    );

    session.update(0.05, &mut world, &mut transport);
    let midway = world.pose(local).unwrap().position;
    assert!(midway.x > 100.0 && midway.x < 105.0, "midway x = {}", midway.x);

    session.update(0.05, &mut world, &mut transport);
    assert_eq!(world.pose(local), Some(Pose::at(105.0, 100.0)));
    assert_eq!(
        session.interpolation().phase(agent),
        Some(InterpolationPhase::Settled)
    );

    // Holds still once settled.
    session.update(0.05, &mut world, &mut transport);
    assert_eq!(world.pose(local), Some(Pose::at(105.0, 100.0)));
}

#[test]
fn test_agent_sync_over_loopback() {
    let mut net = Harness::new();
    let agent = net
        .host
        .session
        .spawn_agent(
            &mut net.host.world,
            Pose::at(100.0, 100.0),
            AgentState::with_mode(AgentMode::Patrol),
        )
        .unwrap();
    let client = net.connect_client();
    net.settle();

    let client_local = local_of(&net.client(client).session, agent);
    assert_eq!(
        net.client(client).world.pose(client_local),
        Some(Pose::at(100.0, 100.0))
    );

    let host_local = local_of(&net.host.session, agent);
    net.host
        .world
        .set_pose(host_local, Pose::at(105.0, 100.0));
    net.host.world.set_agent_state(
        host_local,
        AgentState::with_mode(AgentMode::Chase),
    );

    // Several agent ticks; later samples repeat the same pose.
    net.run(30, 0.02);

    let node = net.client(client);
    assert_eq!(
        node.world.agent_state(client_local).map(|state| state.mode),
        Some(AgentMode::Chase)
    );
    let rendered = node.world.pose(client_local).unwrap().position;
    assert!((rendered.x - 105.0).abs() < 1e-3, "rendered x = {}", rendered.x);
    assert!((rendered.y - 100.0).abs() < 1e-3);
}

// =============================================================================
// Pickup
// =============================================================================

#[test]
fn test_pickup_inserts_into_first_slot_everywhere() {
    let mut net = Harness::new();
    let host_player = net
        .host
        .session
        .spawn_local_player(&mut net.host.world, Pose::at(-300.0, 0.0))
        .unwrap();
    let first = net.connect_client();
    let second = net.connect_client();
    net.settle();

    // Fill ids 2000..=2049 far away so the target lands on 2050.
    for _ in 0..50 {
        net.host
            .session
            .spawn_item(&mut net.host.world, Pose::at(900.0, 900.0), ItemKind(1))
            .unwrap();
    }
    let target = net
        .host
        .session
        .spawn_item(&mut net.host.world, Pose::at(50.0, 50.0), ItemKind(4))
        .unwrap();
    assert_eq!(target, NetworkId(2050));
    net.settle();

    // The host avatar took id 1.
    let player = net.client(first).session.local_player().unwrap();
    assert_eq!(player, NetworkId(2));
    {
        let node = net.client_mut(first);
        let local = node.session.identities().resolve_local(player).unwrap();
        node.world.set_pose(local, Pose::at(50.0, 50.0));
        node.session.request_pickup(&mut node.world, target).unwrap();
    }
    net.clear_logs();
    net.settle();

    let results = net.deliveries_of(MessageKind::ItemPickup);
    assert_eq!(results.len(), 2, "one result per client");
    for delivery in results {
        assert_eq!(delivery.from, PeerId::HOST);
        assert_eq!(delivery.message.network_id(), player);
        match &delivery.message.body {
            Body::ItemPickup(pickup) => {
                assert_eq!(pickup.item, target);
                assert_eq!(pickup.slot_index, 0);
                assert!(pickup.success);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    let host_local = local_of(&net.host.session, player);
    assert_eq!(
        net.host.world.inventory(host_local).unwrap().get(0),
        Some(ItemKind(4))
    );
    assert!(net.host.session.identities().is_retired(target));
    for index in [first, second] {
        let node = net.client(index);
        let local = local_of(&node.session, player);
        assert_eq!(node.world.inventory(local).unwrap().get(0), Some(ItemKind(4)));
        assert!(node.session.identities().get(target).is_none());
    }
    assert!(net
        .host
        .events
        .iter()
        .any(|event| matches!(event, SessionEvent::ItemPickedUp { item, .. } if *item == target)));
    assert!(net.host.session.identities().get(host_player).is_some());
    check_convergence(&net).assert_converged();
}

#[test]
fn test_repeated_pickup_rejected_to_requester_only() {
    let mut net = Harness::new();
    let first = net.connect_client();
    let second = net.connect_client();
    let item = net
        .host
        .session
        .spawn_item(&mut net.host.world, Pose::at(10.0, 0.0), ItemKind(2))
        .unwrap();
    net.settle();

    for index in [first, second] {
        let node = net.client_mut(index);
        node.session.request_pickup(&mut node.world, item).unwrap();
    }
    net.clear_logs();
    net.settle();

    assert_eq!(net.deliveries_of(MessageKind::ItemPickup).len(), 2);
    let rejections = net.deliveries_of(MessageKind::InteractionRejected);
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].to, net.client(second).transport.peer());

    let events = net.client_mut(second).take_events();
    assert!(events.contains(&SessionEvent::InteractionRejected {
        target: item,
        reason: RejectReason::TargetMissing,
    }));
}

// =============================================================================
// Containers
// =============================================================================

#[test]
fn test_container_transfer_overwrites_both_inventories() {
    let key = ItemKind(77);
    let host_config = SessionConfig {
        player_inventory_slots: 3,
        ..SessionConfig::host()
    };
    let mut net = Harness::with_configs(host_config, SessionConfig::client());
    let requester = net.connect_client();
    let observer = net.connect_client();
    net.settle();

    let player = net.client(requester).session.local_player().unwrap();
    let chest = net
        .host
        .session
        .spawn_container(&mut net.host.world, Pose::at(20.0, 0.0), Inventory::new(4))
        .unwrap();
    let host_player = local_of(&net.host.session, player);
    net.host
        .world
        .inventory_mut(host_player)
        .unwrap()
        .set(2, Some(key));
    net.host
        .session
        .publish_inventory(&net.host.world, player)
        .unwrap();
    net.settle();

    // Scribble over the observer's copies; the snapshot must win regardless.
    {
        let node = net.client_mut(observer);
        let chest_local = node.session.identities().resolve_local(chest).unwrap();
        *node.world.inventory_mut(chest_local).unwrap() =
            Inventory::from_slots(vec![Some(ItemKind(1)); 4]);
    }

    {
        let node = net.client_mut(requester);
        assert_eq!(
            node.world
                .inventory(local_of(&node.session, player))
                .unwrap()
                .get(2),
            Some(key)
        );
        node.session
            .request_container(&mut node.world, chest, ContainerAction::Open, 0)
            .unwrap();
        node.session
            .request_container(
                &mut node.world,
                chest,
                ContainerAction::TransferToContainer,
                2,
            )
            .unwrap();
    }
    net.clear_logs();
    net.settle();

    let snapshots: Vec<_> = net
        .deliveries_of(MessageKind::ContainerInteraction)
        .into_iter()
        .filter(|d| matches!(d.message.body, Body::ContainerInteraction(ContainerMessage::Snapshot(_))))
        .collect();
    // Open and transfer, each to both clients.
    assert_eq!(snapshots.len(), 4);

    let expected_player = vec![None, None, None];
    let expected_chest = vec![Some(key), None, None, None];
    for index in [requester, observer] {
        let node = net.client(index);
        let player_local = local_of(&node.session, player);
        let chest_local = local_of(&node.session, chest);
        assert_eq!(node.world.inventory(player_local).unwrap().slots(), &expected_player[..]);
        assert_eq!(node.world.inventory(chest_local).unwrap().slots(), &expected_chest[..]);
    }
    assert!(net.host.session.is_viewing(chest, player));
    check_convergence(&net).assert_converged();
}

#[test]
fn test_transfer_without_open_rejected() {
    let mut net = Harness::new();
    let client = net.connect_client();
    net.settle();
    let chest = net
        .host
        .session
        .spawn_container(
            &mut net.host.world,
            Pose::at(5.0, 5.0),
            Inventory::from_slots(vec![Some(ItemKind(3))]),
        )
        .unwrap();
    net.settle();

    {
        let node = net.client_mut(client);
        node.session
            .request_container(&mut node.world, chest, ContainerAction::TransferToPlayer, 0)
            .unwrap();
        node.take_events();
    }
    net.settle();

    let events = net.client_mut(client).take_events();
    assert!(events.contains(&SessionEvent::InteractionRejected {
        target: chest,
        reason: RejectReason::ContainerNotOpen,
    }));
    let chest_local = local_of(&net.host.session, chest);
    assert_eq!(
        net.host.world.inventory(chest_local).unwrap().get(0),
        Some(ItemKind(3))
    );
}

#[test]
fn test_despawn_announcement_retires_id_on_clients() {
    let mut net = Harness::new();
    let client = net.connect_client();
    let item = net
        .host
        .session
        .spawn_item(&mut net.host.world, Pose::at(1.0, 1.0), ItemKind(1))
        .unwrap();
    net.settle();
    net.host.session.despawn(&mut net.host.world, item).unwrap();
    net.clear_logs();
    net.settle();

    let despawns = net.deliveries_of(MessageKind::EntitySpawn);
    assert_eq!(despawns.len(), 1);
    assert!(matches!(
        despawns[0].message.body,
        Body::EntitySpawn(spawn) if spawn.action == SpawnAction::Despawn
    ));
    assert!(net.client(client).session.identities().is_retired(item));
}
