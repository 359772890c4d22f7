use huddle_client::{
    ConnectionState, SessionConfig, SessionController, SessionError, SessionHandle, SignalingState,
    WsConnector,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::integration::init_tracing;
use crate::utils::{MockBackend, Observed, RecordingObserver, spawn_test_relay};

fn spawn_client(url: &str) -> (SessionHandle, RecordingObserver) {
    let observer = RecordingObserver::new();
    let controller = SessionController::new(
        SessionConfig::new(url).with_connect_timeout(Duration::from_secs(2)),
        Arc::new(WsConnector::new()),
        Arc::new(MockBackend::gathering()),
        Arc::new(observer.clone()),
    );
    (controller.spawn(), observer)
}

async fn wait_until_stable(handle: &SessionHandle, remote: &str) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        let snapshot = handle.snapshot().await.unwrap();
        if snapshot
            .negotiations
            .iter()
            .any(|(peer, state)| peer == remote && *state == SignalingState::Stable)
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_call_over_websocket_relay() {
    init_tracing();

    let relay = spawn_test_relay().await;
    let (alice, alice_events) = spawn_client(&relay.url);
    let (bob, bob_events) = spawn_client(&relay.url);

    alice.join_room("r1", "Alice").await.unwrap();
    bob.join_room("r1", "Bob").await.unwrap();

    assert!(
        alice_events
            .wait_for(5000, |events| events.contains(&Observed::Members(vec!["Bob".to_owned()])))
            .await
    );
    assert!(
        bob_events
            .wait_for(5000, |events| events
                .contains(&Observed::Members(vec!["Alice".to_owned()])))
            .await
    );

    alice.start_call().await.unwrap();

    assert!(wait_until_stable(&alice, "Bob").await, "Alice never reached stable");
    assert!(wait_until_stable(&bob, "Alice").await, "Bob never reached stable");

    let snapshot = alice.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConnectionState::InRoom);
    assert_eq!(snapshot.room.as_deref(), Some("r1"));
    assert!(snapshot.has_local_media);

    alice.leave_room().await.unwrap();
    alice.leave_room().await.unwrap();

    assert!(
        bob_events
            .wait_for(5000, |events| events.contains(&Observed::PeerLeft("Alice".to_owned())))
            .await
    );
    let snapshot = alice.snapshot().await.unwrap();
    assert_eq!(snapshot.state, ConnectionState::Disconnected);
    assert!(snapshot.negotiations.is_empty());
    assert!(alice_events.errors().await.is_empty());
}

#[tokio::test]
async fn test_unreachable_relay_fails_join() {
    init_tracing();

    let (alice, _) = spawn_client("ws://127.0.0.1:9/ws");
    let err = alice.join_room("r1", "Alice").await.unwrap_err();
    assert!(
        matches!(
            err,
            SessionError::Transport(_) | SessionError::ConnectTimeout(_)
        ),
        "{err:?}"
    );
    assert_eq!(
        alice.snapshot().await.unwrap().state,
        ConnectionState::Disconnected
    );
}
