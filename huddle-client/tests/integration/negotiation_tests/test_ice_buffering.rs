use huddle_client::{IceCandidate, PeerKey, PeerNegotiator, SessionDescription, SignalingState};
use huddle_core::SdpKind;

use crate::integration::{Harness, init_tracing};
use crate::utils::CapabilityCall;

fn candidate(n: usize) -> IceCandidate {
    IceCandidate::new(format!("candidate:{n}")).with_mid("0", 0)
}

/// Position of the remote description among capability calls, and the
/// candidates in the order they were applied.
fn split_calls(calls: &[CapabilityCall]) -> (Option<usize>, Vec<(usize, String)>) {
    let remote = calls
        .iter()
        .position(|c| matches!(c, CapabilityCall::SetRemote(_)));
    let applied = calls
        .iter()
        .enumerate()
        .filter_map(|(i, c)| match c {
            CapabilityCall::AddCandidate(name) => Some((i, name.clone())),
            _ => None,
        })
        .collect();
    (remote, applied)
}

#[tokio::test]
async fn test_candidates_before_offer_are_flushed_in_order() {
    init_tracing();

    let harness = Harness::new();
    let ctx = harness.negotiation("r1", "Bob");
    let mut negotiator = PeerNegotiator::new(PeerKey::new("Alice", 1));

    for n in 1..=3 {
        negotiator.add_remote_candidate(candidate(n)).await.unwrap();
    }
    assert_eq!(negotiator.pending_candidates(), 3);
    assert_eq!(negotiator.state(), SignalingState::Idle);
    assert!(harness.backend.calls_for("Alice").await.is_empty());

    negotiator
        .accept_offer(SessionDescription::offer("v=0"), &ctx)
        .await
        .unwrap();

    let calls = harness.backend.calls_for("Alice").await;
    let (remote, applied) = split_calls(&calls);
    let remote = remote.expect("remote description must be set");
    let names: Vec<String> = applied.iter().map(|(_, c)| c.clone()).collect();

    assert_eq!(names, vec!["candidate:1", "candidate:2", "candidate:3"]);
    assert!(applied.iter().all(|(i, _)| *i > remote));
    assert_eq!(negotiator.pending_candidates(), 0);
}

/// Every interleaving of three candidates with the offer: candidates are
/// applied in arrival order and never before the remote description.
#[tokio::test]
async fn test_answerer_applies_candidates_in_arrival_order_for_every_interleaving() {
    const CANDIDATES: usize = 3;

    for offer_at in 0..=CANDIDATES {
        let harness = Harness::new();
        let ctx = harness.negotiation("r1", "Bob");
        let mut negotiator = PeerNegotiator::new(PeerKey::new("Alice", 1));

        let mut next = 1;
        for step in 0..=CANDIDATES {
            if step == offer_at {
                negotiator
                    .accept_offer(SessionDescription::offer("v=0"), &ctx)
                    .await
                    .unwrap();
            } else {
                negotiator.add_remote_candidate(candidate(next)).await.unwrap();
                next += 1;
            }
        }

        let calls = harness.backend.calls_for("Alice").await;
        let (remote, applied) = split_calls(&calls);
        let remote = remote.unwrap();
        let names: Vec<String> = applied.iter().map(|(_, c)| c.clone()).collect();

        assert_eq!(
            names,
            (1..=CANDIDATES).map(|n| format!("candidate:{n}")).collect::<Vec<_>>(),
            "offer at position {offer_at}"
        );
        assert!(
            applied.iter().all(|(i, _)| *i > remote),
            "candidate applied before remote description (offer at {offer_at})"
        );
    }
}

#[tokio::test]
async fn test_offerer_applies_candidates_in_arrival_order_for_every_interleaving() {
    const CANDIDATES: usize = 3;

    for answer_at in 0..=CANDIDATES {
        let harness = Harness::new();
        let ctx = harness.negotiation("r1", "Alice");
        let mut negotiator = PeerNegotiator::new(PeerKey::new("Bob", 1));
        negotiator.start(&ctx).await.unwrap();

        let mut next = 1;
        for step in 0..=CANDIDATES {
            if step == answer_at {
                negotiator
                    .accept_answer(SessionDescription::answer("v=0"))
                    .await
                    .unwrap();
            } else {
                negotiator.add_remote_candidate(candidate(next)).await.unwrap();
                next += 1;
            }
        }

        let calls = harness.backend.calls_for("Bob").await;
        let (remote, applied) = split_calls(&calls);
        assert_eq!(calls[remote.unwrap()], CapabilityCall::SetRemote(SdpKind::Answer));
        assert_eq!(applied.len(), CANDIDATES, "answer at {answer_at}");
        assert!(applied.windows(2).all(|w| w[0].1 < w[1].1));
        assert!(applied.iter().all(|(i, _)| *i > remote.unwrap()));
        assert_eq!(negotiator.state(), SignalingState::Stable);
    }
}

#[tokio::test]
async fn test_closed_negotiator_discards_candidates() {
    let harness = Harness::new();
    let ctx = harness.negotiation("r1", "Alice");
    let mut negotiator = PeerNegotiator::new(PeerKey::new("Bob", 1));

    negotiator.start(&ctx).await.unwrap();
    negotiator.add_remote_candidate(candidate(1)).await.unwrap();
    negotiator.close().await;
    negotiator.add_remote_candidate(candidate(2)).await.unwrap();

    assert_eq!(negotiator.pending_candidates(), 0);
    assert!(harness.backend.applied_candidates("Bob").await.is_empty());
}
