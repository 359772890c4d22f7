use huddle_client::{
    FailureRecovery, IceCandidate, PeerKey, RoomSession, RoomSignal, SessionDescription,
    SignalMessage, SignalingState, TransportEvent,
};

use crate::integration::{Harness, deliver, init_tracing, joined_room};
use crate::utils::{MockBackend, Observed};

fn answer_from(sender: &str) -> SignalMessage {
    SignalMessage::Answer {
        sdp: SessionDescription::answer(format!("v=0 {sender}")),
        room: "r1".to_owned(),
        username: sender.to_owned(),
        target: Some("Alice".to_owned()),
    }
}

#[tokio::test]
async fn test_one_failing_peer_does_not_affect_others() {
    init_tracing();

    let harness = Harness::with_backend(MockBackend::new());
    harness.backend.fail_set_remote_for("Carol").await;
    let mut room = joined_room(&harness, "Alice", &["Alice", "Bob", "Carol"]).await;

    room.start_call(&harness.ctx()).await.unwrap();
    deliver(&mut room, &harness, answer_from("Bob")).await;
    deliver(&mut room, &harness, answer_from("Carol")).await;

    assert_eq!(room.negotiator("Bob").unwrap().state(), SignalingState::Stable);

    let carol = room.negotiator("Carol").unwrap();
    assert_eq!(carol.state(), SignalingState::Idle, "failed negotiation is replaced");
    assert_ne!(carol.key().negotiation, 0);

    let errors = harness.observer.errors().await;
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Carol"), "{}", errors[0]);
    let events = harness.observer.events().await;
    assert!(events.contains(&Observed::CallEnded("Carol".to_owned())));
    assert!(!events.contains(&Observed::CallEnded("Bob".to_owned())));
    assert!(room.call_active());
    assert_eq!(room.live_peers().len(), 2);
}

#[tokio::test]
async fn test_offer_from_non_member_is_dropped() {
    let harness = Harness::new();
    let mut room = joined_room(&harness, "Bob", &["Alice", "Bob"]).await;

    let offer = SignalMessage::Offer {
        sdp: SessionDescription::offer("v=0"),
        room: "r1".to_owned(),
        username: "Mallory".to_owned(),
        target: None,
    };
    deliver(&mut room, &harness, offer).await;

    assert!(room.negotiator("Mallory").is_none());
    assert!(harness.output.sent().is_empty());
    assert!(harness.backend.calls().await.is_empty());
}

#[tokio::test]
async fn test_remote_end_call_resets_only_that_peer() {
    let harness = Harness::new();
    let mut room = joined_room(&harness, "Alice", &["Alice", "Bob", "Carol"]).await;
    room.start_call(&harness.ctx()).await.unwrap();
    deliver(&mut room, &harness, answer_from("Bob")).await;
    deliver(&mut room, &harness, answer_from("Carol")).await;

    let end = SignalMessage::EndCall {
        room: "r1".to_owned(),
        username: "Bob".to_owned(),
    };
    deliver(&mut room, &harness, end).await;

    assert_eq!(room.negotiator("Bob").unwrap().state(), SignalingState::Idle);
    assert_eq!(room.negotiator("Carol").unwrap().state(), SignalingState::Stable);
    assert!(room.call_active());
    assert!(
        harness
            .observer
            .events()
            .await
            .contains(&Observed::CallEnded("Bob".to_owned()))
    );
}

#[tokio::test]
async fn test_local_end_call_is_idempotent() {
    let harness = Harness::new();
    let mut room = joined_room(&harness, "Alice", &["Alice", "Bob"]).await;
    room.start_call(&harness.ctx()).await.unwrap();
    harness.output.take();

    assert!(room.end_call(&harness.ctx()).await);
    assert!(!room.end_call(&harness.ctx()).await);

    assert_eq!(harness.output.kinds(), vec!["end_call"]);
    assert!(!room.call_active());
    assert_eq!(room.negotiator("Bob").unwrap().state(), SignalingState::Idle);
}

#[tokio::test]
async fn test_events_from_replaced_negotiation_are_discarded() {
    let harness = Harness::new();
    let mut room = joined_room(&harness, "Alice", &["Alice", "Bob"]).await;
    room.start_call(&harness.ctx()).await.unwrap();
    let old_key = room.negotiator("Bob").unwrap().key().clone();
    room.end_call(&harness.ctx()).await;
    harness.output.take();

    let signal = room
        .handle_transport_event(
            TransportEvent::CandidateGenerated(old_key.clone(), IceCandidate::new("candidate:late")),
            &harness.ctx(),
        )
        .await;
    assert_eq!(signal, RoomSignal::None);

    let signal = room
        .handle_transport_event(
            TransportEvent::Disconnected(old_key, "failed".to_owned()),
            &harness.ctx(),
        )
        .await;
    assert_eq!(signal, RoomSignal::None, "stale failure must not trigger a rejoin");
    assert!(harness.output.sent().is_empty());
}

#[tokio::test]
async fn test_local_candidates_are_forwarded_with_target() {
    let harness = Harness::new();
    let mut room = joined_room(&harness, "Alice", &["Alice", "Bob"]).await;
    room.start_call(&harness.ctx()).await.unwrap();
    harness.output.take();

    let key = room.negotiator("Bob").unwrap().key().clone();
    room.handle_transport_event(
        TransportEvent::CandidateGenerated(key, IceCandidate::new("candidate:1")),
        &harness.ctx(),
    )
    .await;

    let sent = harness.output.take();
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0],
        SignalMessage::IceCandidate { ice, username, target, .. }
            if ice.candidate == "candidate:1" && username == "Alice" && target.as_deref() == Some("Bob")
    ));
}

#[tokio::test]
async fn test_ice_failure_recovery_policies() {
    let harness = Harness::new();

    let mut rejoin = joined_room(&harness, "Alice", &["Alice", "Bob"]).await;
    rejoin.start_call(&harness.ctx()).await.unwrap();
    let key = rejoin.negotiator("Bob").unwrap().key().clone();
    let signal = rejoin
        .handle_transport_event(TransportEvent::Disconnected(key, "failed".to_owned()), &harness.ctx())
        .await;
    assert_eq!(signal, RoomSignal::RejoinRequired);

    let mut renegotiate = RoomSession::new(FailureRecovery::RenegotiatePeer);
    renegotiate.begin_join("r1", "Alice", true).unwrap();
    let users: Vec<String> = ["Alice", "Bob"].map(String::from).to_vec();
    renegotiate.reconcile(&users, &harness.ctx()).await;
    renegotiate.start_call(&harness.ctx()).await.unwrap();
    let old: PeerKey = renegotiate.negotiator("Bob").unwrap().key().clone();
    harness.output.take();

    let signal = renegotiate
        .handle_transport_event(
            TransportEvent::Disconnected(old.clone(), "failed".to_owned()),
            &harness.ctx(),
        )
        .await;
    assert_eq!(signal, RoomSignal::None);

    let fresh = renegotiate.negotiator("Bob").unwrap();
    assert_ne!(*fresh.key(), old);
    assert_eq!(fresh.state(), SignalingState::HaveLocalOffer);
    assert_eq!(harness.output.kinds(), vec!["offer"]);
    assert!(
        harness
            .observer
            .events()
            .await
            .contains(&Observed::CallEnded("Bob".to_owned()))
    );
}
