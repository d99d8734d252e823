use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use streamtap_chat::{ChatConnection, ChatError, ChatMessage, ChatProducer, ConnectionState};
use streamtap_helix::{HelixError, Viewer, ViewerResolver};
use streamtap_observe::Emitter;
use streamtap_types::{Event, EventCategory, LogLevel, Producer, Tier};
use tokio::sync::broadcast;

struct FakeConnection {
    state: Mutex<ConnectionState>,
    messages: broadcast::Sender<ChatMessage>,
    moderators: Vec<String>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl FakeConnection {
    fn new(moderators: &[&str]) -> Arc<Self> {
        let (messages, _) = broadcast::channel(64);
        Arc::new(Self {
            state: Mutex::new(ConnectionState::Closed),
            messages,
            moderators: moderators.iter().map(|m| m.to_string()).collect(),
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        })
    }

    fn send(&self, message: ChatMessage) {
        self.messages.send(message).unwrap();
    }
}

#[async_trait]
impl ChatConnection for FakeConnection {
    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    async fn connect(&self) -> Result<(), ChatError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = ConnectionState::Open;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ChatError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = ConnectionState::Closed;
        Ok(())
    }

    async fn moderators(&self, _channel: &str) -> Result<Vec<String>, ChatError> {
        Ok(self.moderators.clone())
    }

    fn messages(&self) -> broadcast::Receiver<ChatMessage> {
        self.messages.subscribe()
    }
}

#[derive(Default)]
struct FakeResolver {
    viewers: HashMap<String, Viewer>,
}

impl FakeResolver {
    fn with(names: &[(&str, &str)]) -> Arc<Self> {
        let viewers = names
            .iter()
            .map(|(id, name)| {
                (
                    name.to_lowercase(),
                    Viewer {
                        id: id.to_string(),
                        login: name.to_lowercase(),
                        display_name: name.to_string(),
                    },
                )
            })
            .collect();
        Arc::new(Self { viewers })
    }
}

#[async_trait]
impl ViewerResolver for FakeResolver {
    async fn viewer_by_name(&self, name: &str) -> Result<Option<Viewer>, HelixError> {
        Ok(self.viewers.get(&name.to_lowercase()).cloned())
    }

    async fn viewer_by_id(&self, id: &str) -> Result<Option<Viewer>, HelixError> {
        Ok(self.viewers.values().find(|v| v.id == id).cloned())
    }
}

fn producer(
    connection: &Arc<FakeConnection>,
    resolver: Arc<FakeResolver>,
    emitter: &Emitter,
    bot: Option<&str>,
) -> ChatProducer {
    ChatProducer::new(connection.clone(), resolver, emitter.clone(), "SomeChannel", bot)
}

/// Next event that is not an informational log line.
async fn next_event(rx: &mut broadcast::Receiver<Event>) -> Event {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("emitter closed");
        match &event {
            Event::Log { level, .. } if *level < LogLevel::Warn => continue,
            _ => return event,
        }
    }
}

#[tokio::test]
async fn cheer_with_invalid_bits_logs_one_error_and_keeps_connection() {
    let emitter = Emitter::default();
    let connection = FakeConnection::new(&[]);
    let chat = producer(&connection, FakeResolver::with(&[]), &emitter, None);
    let mut events = emitter.subscribe();

    chat.connect().await.unwrap();
    assert!(chat.produce_events(EventCategory::Cheer).await);

    connection.send(ChatMessage::Cheer {
        user_id: "7".into(),
        display_name: "Cheerer".into(),
        bits: "lots".into(),
        message: "cheer".into(),
    });
    connection.send(ChatMessage::Cheer {
        user_id: "7".into(),
        display_name: "Cheerer".into(),
        bits: "100".into(),
        message: "cheer100".into(),
    });

    match next_event(&mut events).await {
        Event::Log { level, message, error } => {
            assert_eq!(level, LogLevel::Error);
            assert!(message.contains("cheer"));
            assert!(error.is_some());
        }
        other => panic!("expected an error log, got {other:?}"),
    }
    assert_eq!(
        next_event(&mut events).await,
        Event::Cheer {
            viewer_id: "7".into(),
            viewer_name: "Cheerer".into(),
            amount: 100,
            message: "cheer100".into(),
        }
    );
    assert_eq!(connection.state(), ConnectionState::Open);
}

#[tokio::test]
async fn ban_requires_privilege() {
    let emitter = Emitter::default();
    let connection = FakeConnection::new(&[]);
    let chat = producer(&connection, FakeResolver::with(&[]), &emitter, Some("somebot"));

    chat.connect().await.unwrap();

    assert!(!chat.produce_events(EventCategory::Ban).await);
    assert!(!chat.produce_events(EventCategory::Timeout).await);
    assert!(!chat.produce_events(EventCategory::Host).await);
    assert!(chat.produce_events(EventCategory::Chat).await);
}

#[tokio::test]
async fn moderator_serves_bans_resolved_by_id() {
    let emitter = Emitter::default();
    let connection = FakeConnection::new(&["SomeBot"]);
    let resolver = FakeResolver::with(&[("9", "Troll")]);
    let chat = producer(&connection, resolver, &emitter, Some("somebot"));
    let mut events = emitter.subscribe();

    chat.connect().await.unwrap();
    assert!(chat.is_privileged());
    assert!(chat.produce_events(EventCategory::Ban).await);
    assert!(chat.produce_events(EventCategory::Timeout).await);

    connection.send(ChatMessage::Timeout {
        username: "troll".into(),
        target_user_id: Some("9".into()),
        duration: "600".into(),
    });

    assert_eq!(
        next_event(&mut events).await,
        Event::Timeout {
            viewer_id: "9".into(),
            viewer_name: "Troll".into(),
            duration: 600,
        }
    );
}

#[tokio::test]
async fn broadcaster_identity_is_privileged_without_moderator_list() {
    let emitter = Emitter::default();
    let connection = FakeConnection::new(&[]);
    let chat = producer(&connection, FakeResolver::with(&[]), &emitter, Some("SomeChannel"));

    chat.connect().await.unwrap();

    assert!(chat.produce_events(EventCategory::Host).await);
    assert!(chat.produce_events(EventCategory::Ban).await);
}

#[tokio::test]
async fn sub_attaches_first_and_repeat_notifications() {
    let emitter = Emitter::default();
    let connection = FakeConnection::new(&[]);
    let resolver = FakeResolver::with(&[("1", "Fan"), ("2", "Loyal")]);
    let chat = producer(&connection, resolver, &emitter, None);
    let mut events = emitter.subscribe();

    chat.connect().await.unwrap();
    assert!(chat.produce_events(EventCategory::Sub).await);

    connection.send(ChatMessage::Subscription {
        username: "fan".into(),
        plan: Some("Prime".into()),
        message: None,
    });
    let first = next_event(&mut events).await;
    assert_eq!(
        first,
        Event::Sub {
            viewer_id: "1".into(),
            viewer_name: "Fan".into(),
            message: String::new(),
            months: 1,
            tier: Tier::Tier1,
        }
    );
    assert_eq!(serde_json::to_value(&first).unwrap()["tier"], "1000");

    connection.send(ChatMessage::Resub {
        username: "loyal".into(),
        plan: Some("2000".into()),
        message: Some("two years".into()),
        cumulative_months: Some("24".into()),
    });
    assert_eq!(
        next_event(&mut events).await,
        Event::Sub {
            viewer_id: "2".into(),
            viewer_name: "Loyal".into(),
            message: "two years".into(),
            months: 24,
            tier: Tier::Tier2,
        }
    );
}

#[tokio::test]
async fn anonymous_gift_burst_has_null_gifter() {
    let emitter = Emitter::default();
    let connection = FakeConnection::new(&[]);
    let resolver = FakeResolver::with(&[("3", "Lucky")]);
    let chat = producer(&connection, resolver, &emitter, None);
    let mut events = emitter.subscribe();

    chat.connect().await.unwrap();
    assert!(chat.produce_events(EventCategory::SubGift).await);
    assert!(chat.produce_events(EventCategory::SubGiftReceived).await);

    connection.send(ChatMessage::MysteryGift {
        gifter: None,
        count: "1".into(),
        total: None,
        plan: Some("1000".into()),
    });
    assert_eq!(
        next_event(&mut events).await,
        Event::SubGift {
            viewer_id: None,
            viewer_name: None,
            number: 1,
            total: None,
            tier: Tier::Tier1,
        }
    );

    connection.send(ChatMessage::SubGift {
        gifter: None,
        recipient: "lucky".into(),
        plan: Some("1000".into()),
    });
    assert_eq!(
        next_event(&mut events).await,
        Event::SubGiftReceived {
            recipient_id: "3".into(),
            recipient_name: "Lucky".into(),
            gifter_id: None,
            gifter_name: None,
            tier: Tier::Tier1,
        }
    );
}

#[tokio::test]
async fn unknown_raider_is_dropped_with_error() {
    let emitter = Emitter::default();
    let connection = FakeConnection::new(&[]);
    let chat = producer(&connection, FakeResolver::with(&[]), &emitter, None);
    let mut events = emitter.subscribe();

    chat.connect().await.unwrap();
    assert!(chat.produce_events(EventCategory::Raid).await);

    connection.send(ChatMessage::Raided {
        raider: "ghost".into(),
        viewers: "12".into(),
    });

    match next_event(&mut events).await {
        Event::Log { level, error, .. } => {
            assert_eq!(level, LogLevel::Error);
            assert!(error.unwrap().contains("ghost"));
        }
        other => panic!("expected an error log, got {other:?}"),
    }
}

#[tokio::test]
async fn own_and_unattached_messages_are_ignored() {
    let emitter = Emitter::default();
    let connection = FakeConnection::new(&[]);
    let chat = producer(&connection, FakeResolver::with(&[]), &emitter, Some("somebot"));
    let mut events = emitter.subscribe();

    chat.connect().await.unwrap();
    assert!(chat.produce_events(EventCategory::Chat).await);

    connection.send(ChatMessage::SlowMode {
        enabled: true,
        interval: 30,
    });
    connection.send(ChatMessage::Chat {
        user_id: "1".into(),
        display_name: "SomeBot".into(),
        message: "mine".into(),
        from_self: true,
    });
    connection.send(ChatMessage::Chat {
        user_id: "5".into(),
        display_name: "Viewer".into(),
        message: "hello".into(),
        from_self: false,
    });

    assert_eq!(
        next_event(&mut events).await,
        Event::Chat {
            viewer_id: "5".into(),
            viewer_name: "Viewer".into(),
            message: "hello".into(),
        }
    );
}

#[tokio::test]
async fn unmapped_categories_are_declined() {
    let emitter = Emitter::default();
    let connection = FakeConnection::new(&[]);
    let chat = producer(&connection, FakeResolver::with(&[]), &emitter, None);

    assert!(!chat.produce_events(EventCategory::Follow).await);
    assert!(!chat.produce_events(EventCategory::StreamBegin).await);
    assert!(!chat.produce_events(EventCategory::Donation).await);
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let emitter = Emitter::default();
    let connection = FakeConnection::new(&[]);
    let chat = producer(&connection, FakeResolver::with(&[]), &emitter, None);

    chat.disconnect().await.unwrap();
    chat.connect().await.unwrap();
    chat.disconnect().await.unwrap();
    chat.disconnect().await.unwrap();

    assert_eq!(connection.connects.load(Ordering::SeqCst), 1);
    assert_eq!(connection.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(connection.state(), ConnectionState::Closed);
}
