use huddle_client::{ConnectionState, SessionController};
use std::time::Duration;

use crate::integration::{init_tracing, new_client, settle, test_config};
use crate::utils::{MockBackend, MockRelay, Observed};

/// Let the reconnect timer fire and handle what it posts.
async fn step(client: &mut SessionController) {
    tokio::time::timeout(Duration::from_secs(5), client.step())
        .await
        .expect("reconnect timer should fire");
}

#[tokio::test(start_paused = true)]
async fn test_abnormal_close_rejoins_with_fresh_suffix() {
    init_tracing();

    let relay = MockRelay::new();
    let backend = MockBackend::new();
    let (mut alice, alice_events) = new_client(test_config(), &relay, &backend);
    let (mut bob, _) = new_client(test_config(), &relay, &backend);

    alice.join_room("r1", "Alice").await.unwrap();
    bob.join_room("r1", "Bob").await.unwrap();
    settle(&mut [&mut alice, &mut bob]).await;
    alice.start_call().await.unwrap();
    settle(&mut [&mut alice, &mut bob]).await;

    relay.drop_connection("Alice");
    settle(&mut [&mut alice, &mut bob]).await;

    assert_eq!(alice.state(), ConnectionState::Disconnected);
    assert!(alice.room().live_peers().is_empty());
    assert!(alice.local_media().is_none());
    assert!(alice.channel().reconnect_pending());

    step(&mut alice).await;
    settle(&mut [&mut alice, &mut bob]).await;

    let joins = relay.joins();
    assert_eq!(joins.len(), 3, "{joins:?}");
    let first_rejoin = joins[2].clone();
    assert!(first_rejoin.starts_with("Alice_"), "{first_rejoin}");
    assert_eq!(alice.state(), ConnectionState::InRoom);
    assert_eq!(alice.room().username(), Some(first_rejoin.as_str()));
    assert_eq!(bob.room().live_peers().into_iter().collect::<Vec<_>>(), vec![first_rejoin.clone()]);
    assert_eq!(alice.room().live_peers().into_iter().collect::<Vec<_>>(), vec!["Bob".to_owned()]);

    // A second drop derives the next name from the typed base again.
    relay.drop_connection(&first_rejoin);
    settle(&mut [&mut alice, &mut bob]).await;
    step(&mut alice).await;

    let second_rejoin = relay.joins().last().cloned().unwrap();
    assert_ne!(second_rejoin, first_rejoin);
    let suffix = second_rejoin.strip_prefix("Alice_").unwrap();
    assert!(!suffix.contains('_'), "suffixes must not compound: {second_rejoin}");

    assert!(alice_events.errors().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_bounded_attempts() {
    init_tracing();

    let relay = MockRelay::new();
    let (mut alice, events) = new_client(test_config(), &relay, &MockBackend::new());

    alice.join_room("r1", "Alice").await.unwrap();
    settle(&mut [&mut alice]).await;

    relay.fail_next_connects(u32::MAX);
    relay.drop_connection("Alice");
    settle(&mut [&mut alice]).await;

    for _ in 0..3 {
        step(&mut alice).await;
    }

    assert_eq!(relay.connects(), 1 + 3);
    assert_eq!(alice.state(), ConnectionState::Disconnected);
    assert!(!alice.channel().reconnect_pending());
    let errors = events.errors().await;
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("connection refused"), "{}", errors[0]);

    // Nothing else is scheduled.
    assert!(
        tokio::time::timeout(Duration::from_secs(60), alice.step())
            .await
            .is_err()
    );
}

#[tokio::test(start_paused = true)]
async fn test_leave_cancels_pending_reconnect() {
    let relay = MockRelay::new();
    let (mut alice, events) = new_client(test_config(), &relay, &MockBackend::new());

    alice.join_room("r1", "Alice").await.unwrap();
    relay.drop_connection("Alice");
    settle(&mut [&mut alice]).await;
    assert!(alice.channel().reconnect_pending());

    alice.leave_room().await;
    assert!(!alice.channel().reconnect_pending());

    tokio::time::sleep(Duration::from_secs(10)).await;
    settle(&mut [&mut alice]).await;

    assert_eq!(relay.connects(), 1);
    assert_eq!(alice.state(), ConnectionState::Disconnected);
    assert!(
        !events
            .events()
            .await
            .iter()
            .any(|e| matches!(e, Observed::Error(_)))
    );
}

#[tokio::test(start_paused = true)]
async fn test_normal_close_from_server_does_not_reconnect() {
    let relay = MockRelay::new();
    let config = test_config();
    let (mut alice, events) = new_client(config, &relay, &MockBackend::new());

    alice.join_room("r1", "Alice").await.unwrap();
    settle(&mut [&mut alice]).await;

    // A relay that closes cleanly on its side ends the session.
    relay.close_connection("Alice", 1000);
    settle(&mut [&mut alice]).await;

    assert!(!alice.channel().reconnect_pending());
    assert_eq!(alice.state(), ConnectionState::Disconnected);
    assert_eq!(events.errors().await.len(), 1);
}
