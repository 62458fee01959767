//! Session lifecycle over the loopback: admission, lobby, inputs, loss.

use coop_core::prelude::*;
use coop_core::protocol::PlayerInput;
use coop_test_utils::convergence::check_convergence;
use coop_test_utils::fixtures::{host_config, spawn_agents, spawn_item_row, spawn_stocked_container};
use coop_test_utils::harness::Harness;

// =============================================================================
// Admission
// =============================================================================

#[test]
fn test_late_joiner_receives_full_state() {
    let mut net = Harness::new();
    spawn_agents(&mut net.host.session, &mut net.host.world, 3).unwrap();
    spawn_item_row(
        &mut net.host.session,
        &mut net.host.world,
        Pose::at(0.0, 300.0),
        20.0,
        4,
        ItemKind(9),
    )
    .unwrap();
    spawn_stocked_container(
        &mut net.host.session,
        &mut net.host.world,
        Pose::at(-50.0, 0.0),
        vec![Some(ItemKind(3)), None, Some(ItemKind(4))],
    )
    .unwrap();
    let early = net.connect_client();
    net.settle();
    net.run(10, 0.02);

    let late = net.connect_client();
    net.settle();

    // Agents, items, container and the two avatars.
    assert_eq!(net.client(late).session.identities().len(), 3 + 4 + 1 + 2);
    assert_eq!(net.client(early).session.identities().len(), 3 + 4 + 1 + 2);
    check_convergence(&net).assert_converged();
}

#[test]
fn test_full_session_refuses_extra_peer() {
    let mut net = Harness::with_configs(host_config(1), SessionConfig::client());
    net.connect_client();
    let refused = net.connect_client();
    net.settle();

    assert_eq!(net.host.session.peers().len(), 1);
    assert!(net
        .host
        .take_events()
        .contains(&SessionEvent::PeerRefused(net.client(refused).transport.peer())));
    assert!(net.client(refused).session.local_player().is_none());
}

#[test]
fn test_welcome_carries_host_rates() {
    let host = SessionConfig {
        transform_tick_hz: 30,
        agent_tick_hz: 5,
        interaction_radius: 48.0,
        ..SessionConfig::host()
    };
    let mut net = Harness::with_configs(host, SessionConfig::client());
    let client = net.connect_client();
    net.settle();

    let config = net.client(client).session.config();
    assert_eq!(config.transform_tick_hz, 30);
    assert_eq!(config.agent_tick_hz, 5);
    assert!((config.interaction_radius - 48.0).abs() < f32::EPSILON);
}

// =============================================================================
// Lobby
// =============================================================================

#[test]
fn test_lobby_ready_then_start() {
    let mut net = Harness::new();
    let ada = net.connect_client();
    let bo = net.connect_client();
    net.settle();

    for (index, name) in [(ada, "Ada"), (bo, "Bo")] {
        let node = net.client_mut(index);
        node.session.join_lobby(&mut node.world, name).unwrap();
    }
    {
        let node = net.client_mut(bo);
        node.session.select_character(&mut node.world, 3).unwrap();
    }
    net.settle();

    let roster = net.host.session.roster();
    assert_eq!(roster.players.len(), 2);
    assert_eq!(net.client(ada).session.roster(), roster);
    assert_eq!(roster.players[1].character, 3);

    {
        let node = net.client_mut(ada);
        node.session.set_ready(&mut node.world, true).unwrap();
    }
    net.settle();
    assert!(matches!(
        net.host.session.start_game(42),
        Err(SyncError::LobbyNotReady { ready: 1, total: 2 })
    ));

    {
        let node = net.client_mut(bo);
        node.session.set_ready(&mut node.world, true).unwrap();
    }
    net.settle();
    net.host.session.start_game(42).unwrap();
    net.settle();

    for index in [ada, bo] {
        let node = net.client_mut(index);
        assert_eq!(node.session.game_seed(), Some(42));
        assert!(node
            .take_events()
            .contains(&SessionEvent::GameStarted { seed: 42 }));
    }
}

#[test]
fn test_lobby_name_truncated_and_leaver_removed() {
    let mut net = Harness::new();
    let stays = net.connect_client();
    let leaves = net.connect_client();
    net.settle();

    for index in [stays, leaves] {
        let node = net.client_mut(index);
        node.session
            .join_lobby(&mut node.world, "An exceedingly long display name")
            .unwrap();
    }
    net.settle();
    let max = net.host.session.config().max_player_name_len;
    assert!(net
        .host
        .session
        .roster()
        .players
        .iter()
        .all(|entry| entry.name.chars().count() == max));

    net.disconnect_client(leaves);
    net.settle();
    assert_eq!(net.host.session.roster().players.len(), 1);
    assert_eq!(net.client(stays).session.roster().players.len(), 1);
}

// =============================================================================
// Inputs and loss
// =============================================================================

#[test]
fn test_stale_inputs_discarded() {
    let mut net = Harness::new();
    let client = net.connect_client();
    net.settle();
    let player = net.client(client).session.local_player().unwrap();

    for sequence in [5, 3, 6, 6] {
        net.client_mut(client)
            .session
            .send_input(PlayerInput {
                sequence,
                move_axis: Vec2::new(1.0, 0.0),
                actions: 0,
            })
            .unwrap();
    }
    net.settle();

    assert_eq!(
        net.host.session.latest_input(player).map(|input| input.sequence),
        Some(6)
    );
    // Inputs are never relayed.
    assert!(net
        .deliveries_of(MessageKind::PlayerInput)
        .iter()
        .all(|delivery| delivery.to == PeerId::HOST));
}

#[test]
fn test_lost_agent_ticks_recover_on_next_sample() {
    let mut net = Harness::new();
    let agents = spawn_agents(&mut net.host.session, &mut net.host.world, 1).unwrap();
    let client = net.connect_client();
    net.settle();

    let host_local = net.host.session.identities().resolve_local(agents[0]).unwrap();
    net.host.world.set_agent_state(host_local, AgentState::with_mode(AgentMode::Wander));
    net.host.transport.drop_unreliable = true;
    net.run(20, 0.02);

    let client_local = net
        .client(client)
        .session
        .identities()
        .resolve_local(agents[0])
        .unwrap();
    assert_eq!(
        net.client(client).world.agent_state(client_local).map(|s| s.mode),
        Some(AgentMode::Idle)
    );

    net.host.transport.drop_unreliable = false;
    net.run(20, 0.02);
    assert_eq!(
        net.client(client).world.agent_state(client_local).map(|s| s.mode),
        Some(AgentMode::Wander)
    );
}

#[test]
fn test_shutdown_stops_processing() {
    let mut net = Harness::new();
    net.connect_client();
    net.settle();
    net.host.session.shutdown();
    net.connect_client();
    net.settle();
    assert!(net.host.session.peers().is_empty());
}
