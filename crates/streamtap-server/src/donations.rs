//! Relay for messages from a donation socket.
//!
//! The embedding application owns the socket connection and pushes each raw
//! `{"type": ..., "message": [...]}` event into the relay's
//! [`feed`](DonationRelay::feed). The relay serves `donation` and `host`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use streamtap_helix::ViewerResolver;
use streamtap_observe::Emitter;
use streamtap_types::{Event, EventCategory, Producer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::DonationError;

/// The socket often delivers a message twice; ids are remembered this long.
const DUPLICATE_WINDOW: Duration = Duration::from_secs(60);

const FEED_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
struct SocketEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Vec<Value>,
}

/// Fields shared by every message, read before the kind-specific ones.
#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(rename = "isTest", default)]
    is_test: bool,
}

#[derive(Debug, Deserialize)]
struct DonationMessage {
    from: String,
    amount: Value,
    #[serde(default)]
    currency: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HostMessage {
    name: String,
    viewers: Value,
}

struct Relay {
    resolver: Arc<dyn ViewerResolver>,
    emitter: Emitter,
    accept_test: bool,
    attached: RwLock<HashSet<EventCategory>>,
    seen: Mutex<HashMap<String, Instant>>,
}

/// Producer fed by the embedding application's donation socket.
pub struct DonationRelay {
    relay: Arc<Relay>,
    feed: mpsc::Sender<Value>,
    rx: Mutex<Option<mpsc::Receiver<Value>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DonationRelay {
    /// Test donations are dropped unless `accept_test` is set.
    pub fn new(resolver: Arc<dyn ViewerResolver>, emitter: Emitter, accept_test: bool) -> Self {
        let (feed, rx) = mpsc::channel(FEED_CAPACITY);
        Self {
            relay: Arc::new(Relay {
                resolver,
                emitter,
                accept_test,
                attached: RwLock::new(HashSet::new()),
                seen: Mutex::new(HashMap::new()),
            }),
            feed,
            rx: Mutex::new(Some(rx)),
            task: Mutex::new(None),
        }
    }

    /// Sender for raw socket events. Events sent before a category is
    /// attached are dropped.
    pub fn feed(&self) -> mpsc::Sender<Value> {
        self.feed.clone()
    }

    /// Stops relaying. Idempotent; the feed is not reopened.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
        self.relay
            .attached
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    fn start(&self) {
        let Some(mut rx) = self.rx.lock().unwrap_or_else(|e| e.into_inner()).take() else {
            return;
        };
        let relay = self.relay.clone();
        let task = tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                let relay = relay.clone();
                tokio::spawn(async move { relay.handle(raw).await });
            }
        });
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
        self.relay.emitter.info("Listening to donation socket events");
    }
}

#[async_trait]
impl Producer for DonationRelay {
    fn name(&self) -> &'static str {
        "donations"
    }

    async fn produce_events(&self, category: EventCategory) -> bool {
        if !matches!(category, EventCategory::Donation | EventCategory::Host) {
            return false;
        }
        self.relay
            .attached
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(category);
        self.start();
        true
    }
}

impl Relay {
    fn attached(&self, category: EventCategory) -> bool {
        self.attached
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&category)
    }

    /// Remembers `id` and reports whether it was already seen recently.
    fn is_duplicate(&self, id: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.retain(|_, at| now.duration_since(*at) < DUPLICATE_WINDOW);
        if seen.contains_key(id) {
            return true;
        }
        seen.insert(id.to_string(), now);
        false
    }

    async fn handle(&self, raw: Value) {
        let event: SocketEvent = match serde_json::from_value(raw) {
            Ok(event) => event,
            Err(err) => {
                self.emitter
                    .error("Couldn't read a donation socket event", err);
                return;
            }
        };
        let category = match event.kind.as_str() {
            "donation" => EventCategory::Donation,
            "host" => EventCategory::Host,
            _ => return,
        };
        if !self.attached(category) {
            return;
        }

        let results = join_all(
            event
                .message
                .into_iter()
                .map(|message| self.normalize(category, message)),
        )
        .await;
        for result in results {
            match result {
                Ok(Some(event)) => self.emitter.emit(event),
                Ok(None) => {}
                Err(err) => self.emitter.error(
                    format!("An error happened during a donation socket {category} event"),
                    err,
                ),
            }
        }
    }

    async fn normalize(
        &self,
        category: EventCategory,
        message: Value,
    ) -> Result<Option<Event>, DonationError> {
        let envelope: Envelope = serde_json::from_value(message.clone()).unwrap_or_default();
        if envelope.is_test && !self.accept_test {
            return Ok(None);
        }
        if let Some(id) = &envelope.id {
            if self.is_duplicate(id) {
                return Ok(None);
            }
        }

        match category {
            EventCategory::Donation => {
                let donation: DonationMessage = serde_json::from_value(message)?;
                let amount = number(&donation.amount)
                    .ok_or_else(|| invalid("amount", &donation.amount))?;
                let message = donation.message.filter(|m| !m.is_empty());
                let event = match self.resolver.viewer_by_name(&donation.from).await? {
                    Some(viewer) => Event::Donation {
                        viewer_id: Some(viewer.id),
                        viewer_name: viewer.display_name,
                        amount,
                        currency: donation.currency,
                        message,
                    },
                    None => Event::Donation {
                        viewer_id: None,
                        viewer_name: donation.from,
                        amount,
                        currency: donation.currency,
                        message,
                    },
                };
                Ok(Some(event))
            }
            _ => {
                let host: HostMessage = serde_json::from_value(message)?;
                let viewers = number(&host.viewers)
                    .filter(|v| v.fract() == 0.0 && *v >= 0.0 && *v <= f64::from(u32::MAX))
                    .ok_or_else(|| invalid("viewers", &host.viewers))?;
                let viewer = self
                    .resolver
                    .viewer_by_name(&host.name)
                    .await?
                    .ok_or_else(|| DonationError::UnknownViewer(host.name.clone()))?;
                Ok(Some(Event::Host {
                    viewer_id: viewer.id,
                    viewer_name: viewer.display_name,
                    viewers: viewers as u32,
                    autohost: false,
                }))
            }
        }
    }
}

/// Numeric value of a field sent either as a JSON number or a string.
fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn invalid(field: &'static str, value: &Value) -> DonationError {
    DonationError::InvalidNumber {
        field,
        value: value.to_string(),
    }
}
