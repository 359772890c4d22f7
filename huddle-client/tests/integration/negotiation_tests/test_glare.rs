use huddle_client::{NegotiationRole, RoomSession, SignalMessage, SignalingState};

use crate::integration::{Harness, deliver, init_tracing, joined_room, new_client, settle, test_config};
use crate::utils::{CapabilityCall, MockBackend, MockRelay};

fn offers(sent: Vec<SignalMessage>) -> Vec<SignalMessage> {
    sent.into_iter()
        .filter(|m| m.kind() == "offer")
        .collect()
}

/// Both sides start a call at the same time; `first` handles the crossing
/// offer before `second` does.
async fn run_glare(local_a: &str, local_b: &str, a_first: bool) {
    let a_harness = Harness::new();
    let b_harness = Harness::new();
    let mut a = joined_room(&a_harness, local_a, &[local_a, local_b]).await;
    let mut b = joined_room(&b_harness, local_b, &[local_a, local_b]).await;

    a.start_call(&a_harness.ctx()).await.unwrap();
    b.start_call(&b_harness.ctx()).await.unwrap();
    let a_offer = offers(a_harness.output.take()).remove(0);
    let b_offer = offers(b_harness.output.take()).remove(0);

    if a_first {
        deliver(&mut a, &a_harness, b_offer).await;
        deliver(&mut b, &b_harness, a_offer).await;
    } else {
        deliver(&mut b, &b_harness, a_offer).await;
        deliver(&mut a, &a_harness, b_offer).await;
    }

    // Route whatever answers came out until both sides are quiet.
    loop {
        let from_a = a_harness.output.take();
        let from_b = b_harness.output.take();
        if from_a.is_empty() && from_b.is_empty() {
            break;
        }
        for msg in from_a {
            deliver(&mut b, &b_harness, msg).await;
        }
        for msg in from_b {
            deliver(&mut a, &a_harness, msg).await;
        }
    }

    let na = a.negotiator(local_b).unwrap();
    let nb = b.negotiator(local_a).unwrap();
    assert_eq!(na.state(), SignalingState::Stable, "{local_a} side");
    assert_eq!(nb.state(), SignalingState::Stable, "{local_b} side");

    let roles = [na.role(), nb.role()];
    assert!(
        roles.contains(&NegotiationRole::Offerer) && roles.contains(&NegotiationRole::Answerer),
        "exactly one offerer and one answerer, got {roles:?}"
    );

    let (winner, loser_harness, loser_remote): (&str, &Harness, &str) = if local_a < local_b {
        (local_a, &b_harness, local_a)
    } else {
        (local_b, &a_harness, local_b)
    };
    let winner_room: &RoomSession = if winner == local_a { &a } else { &b };
    let winner_remote = if winner == local_a { local_b } else { local_a };
    assert_eq!(
        winner_room.negotiator(winner_remote).unwrap().role(),
        NegotiationRole::Offerer,
        "smaller username keeps its offer"
    );

    // The loser discarded its own offer: the first connection was closed
    // and a second one answered.
    let connections = loser_harness.backend.connections_for(loser_remote).await;
    assert_eq!(connections.len(), 2);
    let calls = loser_harness.backend.calls().await;
    assert!(calls.contains(&(connections[0].clone(), CapabilityCall::Close)));
}

#[tokio::test]
async fn test_glare_resolves_to_single_stable_negotiation() {
    init_tracing();

    for a_first in [true, false] {
        run_glare("Alice", "Bob", a_first).await;
        run_glare("Zed", "Amy", a_first).await;
    }
}

#[tokio::test]
async fn test_glare_winner_ignores_candidates_of_discarded_offer() {
    init_tracing();

    let relay = MockRelay::new();
    let alice_backend = MockBackend::gathering();
    let bob_backend = MockBackend::gathering();
    let (mut alice, alice_events) = new_client(test_config(), &relay, &alice_backend);
    let (mut bob, _) = new_client(test_config(), &relay, &bob_backend);

    alice.join_room("r1", "Alice").await.unwrap();
    bob.join_room("r1", "Bob").await.unwrap();
    settle(&mut [&mut alice, &mut bob]).await;

    // Bob offers first and trickles a candidate from that connection before
    // Alice, who has not seen any of it yet, offers too.
    bob.start_call().await.unwrap();
    bob.drain().await;
    alice.start_call().await.unwrap();
    settle(&mut [&mut alice, &mut bob]).await;

    assert_eq!(
        alice.room().negotiator("Bob").unwrap().state(),
        SignalingState::Stable
    );
    assert_eq!(
        bob.room().negotiator("Alice").unwrap().state(),
        SignalingState::Stable
    );

    let bob_connections = bob_backend.connections_for("Alice").await;
    assert_eq!(bob_connections.len(), 2);
    let surviving = format!("candidate:{} ", bob_connections[1]);

    let applied = alice_backend.applied_candidates("Bob").await;
    assert!(!applied.is_empty());
    assert!(
        applied.iter().all(|c| c.starts_with(&surviving)),
        "only candidates of Bob's answering connection may be applied: {applied:?}"
    );
    assert!(alice_events.errors().await.is_empty());
}
