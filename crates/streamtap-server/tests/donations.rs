mod common;

use std::time::Duration;

use common::{next_event, FakeResolver};
use serde_json::json;
use streamtap_observe::Emitter;
use streamtap_server::DonationRelay;
use streamtap_types::{Event, EventCategory, LogLevel, Producer};
use tokio::sync::broadcast;

async fn attached_relay(accept_test: bool) -> (DonationRelay, broadcast::Receiver<Event>) {
    let emitter = Emitter::default();
    let events = emitter.subscribe();
    let relay = DonationRelay::new(
        FakeResolver::with(&[("7", "Alice"), ("8", "BigStreamer")]),
        emitter,
        accept_test,
    );
    assert!(relay.produce_events(EventCategory::Donation).await);
    (relay, events)
}

fn donation(id: &str, from: &str, amount: serde_json::Value) -> serde_json::Value {
    json!({
        "type": "donation",
        "message": [{
            "_id": id,
            "from": from,
            "amount": amount,
            "currency": "USD",
            "message": "hi"
        }]
    })
}

#[tokio::test]
async fn only_donation_and_host_are_served() {
    let relay = DonationRelay::new(FakeResolver::with(&[]), Emitter::default(), false);
    assert!(relay.produce_events(EventCategory::Host).await);
    assert!(!relay.produce_events(EventCategory::Chat).await);
    assert!(!relay.produce_events(EventCategory::Follow).await);
}

#[tokio::test]
async fn donation_from_known_viewer() {
    let (relay, mut events) = attached_relay(false).await;

    relay.feed().send(donation("a", "alice", json!("12.50"))).await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Donation {
            viewer_id: Some("7".to_string()),
            viewer_name: "Alice".to_string(),
            amount: 12.5,
            currency: "USD".to_string(),
            message: Some("hi".to_string()),
        })
    );
}

#[tokio::test]
async fn donation_from_unknown_donor_keeps_the_given_name() {
    let (relay, mut events) = attached_relay(false).await;

    relay
        .feed()
        .send(json!({
            "type": "donation",
            "message": [{ "_id": "b", "from": "Anonymous Fan", "amount": 5, "currency": "EUR", "message": "" }]
        }))
        .await
        .unwrap();

    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Donation {
            viewer_id: None,
            viewer_name: "Anonymous Fan".to_string(),
            amount: 5.0,
            currency: "EUR".to_string(),
            message: None,
        })
    );
}

#[tokio::test]
async fn test_donations_follow_the_setting() {
    let mut test_message = donation("c", "alice", json!("1"));
    test_message["message"][0]["isTest"] = json!(true);

    let (relay, mut events) = attached_relay(false).await;
    relay.feed().send(test_message.clone()).await.unwrap();
    assert_eq!(next_event(&mut events).await, None);

    let (relay, mut events) = attached_relay(true).await;
    relay.feed().send(test_message).await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        Some(Event::Donation { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn repeated_ids_are_dropped_for_a_minute() {
    let (relay, mut events) = attached_relay(false).await;
    let feed = relay.feed();

    feed.send(donation("dup", "alice", json!("2"))).await.unwrap();
    assert!(next_event(&mut events).await.is_some());

    feed.send(donation("dup", "alice", json!("2"))).await.unwrap();
    assert_eq!(next_event(&mut events).await, None);

    tokio::time::sleep(Duration::from_secs(61)).await;
    feed.send(donation("dup", "alice", json!("2"))).await.unwrap();
    assert!(next_event(&mut events).await.is_some());
}

#[tokio::test]
async fn unparseable_amount_is_logged_and_dropped() {
    let (relay, mut events) = attached_relay(false).await;

    relay.feed().send(donation("d", "alice", json!("lots"))).await.unwrap();

    match next_event(&mut events).await {
        Some(Event::Log { level, error, .. }) => {
            assert_eq!(level, LogLevel::Error);
            assert!(error.unwrap_or_default().contains("amount"));
        }
        other => panic!("expected an error log, got {other:?}"),
    }
    assert_eq!(next_event(&mut events).await, None);
}

#[tokio::test]
async fn host_requires_a_known_viewer() {
    let (relay, mut events) = attached_relay(false).await;
    assert!(relay.produce_events(EventCategory::Host).await);
    let feed = relay.feed();

    feed.send(json!({
        "type": "host",
        "message": [{ "_id": "h1", "name": "bigstreamer", "viewers": "42" }]
    }))
    .await
    .unwrap();
    assert_eq!(
        next_event(&mut events).await,
        Some(Event::Host {
            viewer_id: "8".to_string(),
            viewer_name: "BigStreamer".to_string(),
            viewers: 42,
            autohost: false,
        })
    );

    feed.send(json!({
        "type": "host",
        "message": [{ "_id": "h2", "name": "nobody", "viewers": 3 }]
    }))
    .await
    .unwrap();
    match next_event(&mut events).await {
        Some(Event::Log { level, .. }) => assert_eq!(level, LogLevel::Error),
        other => panic!("expected an error log, got {other:?}"),
    }
}

#[tokio::test]
async fn unattached_kinds_and_unknown_types_are_ignored() {
    let (relay, mut events) = attached_relay(false).await;
    let feed = relay.feed();

    feed.send(json!({
        "type": "host",
        "message": [{ "name": "bigstreamer", "viewers": 1 }]
    }))
    .await
    .unwrap();
    feed.send(json!({ "type": "merch", "message": [{}] }))
        .await
        .unwrap();

    assert_eq!(next_event(&mut events).await, None);
}

#[tokio::test]
async fn stopped_relay_emits_nothing() {
    let (relay, mut events) = attached_relay(false).await;
    relay.stop();
    relay.stop();

    let _ = relay.feed().send(donation("e", "alice", json!("3"))).await;

    assert_eq!(next_event(&mut events).await, None);
}
