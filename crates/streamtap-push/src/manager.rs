//! Push-subscription lifecycle: creation, renewal and teardown.
//!
//! Every subscription gets a random id, used as the last segment of its
//! callback URL, and a random secret the hub signs notifications with. The
//! registry maps live ids to their secret and handler; the inbound router
//! (see [`crate::router`]) consults it for every request.
//!
//! The hub has no way to extend a lease, so renewal creates a brand-new
//! subscription for the same topic and only then forgets the old id. The old
//! subscription is not unsubscribed; its lease runs out on the hub side.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use rand::RngCore;
use serde_json::Value;
use streamtap_observe::Emitter;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::HubError;
use crate::hub::{HubClient, HubMode, HubRequest};

/// Upper bound of the time left on a lease when it gets renewed.
const MAX_RENEWAL_MARGIN: Duration = Duration::from_secs(3600);

/// Delay between failed renewal attempts, capped at half the time left on
/// the old lease.
const RENEWAL_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Below this, the old lease is considered lapsed.
const MIN_RENEWAL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Shortest lease the manager requests. Shorter leases are raised to it.
pub const MIN_LEASE: Duration = Duration::from_secs(60);

/// Receives the first data item of each verified notification.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, data: Option<Value>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    /// A replacement subscription is being created.
    Renewing,
    Stopped,
}

pub(crate) struct Entry {
    pub(crate) topic: String,
    pub(crate) secret: String,
    pub(crate) handler: Arc<dyn NotificationHandler>,
    pub(crate) denied: bool,
}

pub(crate) struct ManagerInner {
    hub: Arc<dyn HubClient>,
    callback_base: String,
    lease: Duration,
    pub(crate) emitter: Emitter,
    registry: Mutex<HashMap<String, Entry>>,
}

impl ManagerInner {
    pub(crate) fn registry(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn register(&self, id: &str, topic: &str, secret: &str, handler: Arc<dyn NotificationHandler>) {
        self.registry().insert(
            id.to_string(),
            Entry {
                topic: topic.to_string(),
                secret: secret.to_string(),
                handler,
                denied: false,
            },
        );
    }

    fn deregister(&self, id: &str) {
        self.registry().remove(id);
    }

    fn request(&self, mode: HubMode, id: &str, topic: &str, secret: &str) -> HubRequest {
        HubRequest {
            callback: format!("{}/{}", self.callback_base, id),
            mode,
            topic: topic.to_string(),
            lease_seconds: self.lease.as_secs(),
            secret: secret.to_string(),
        }
    }

    /// Registers a fresh id, then asks the hub to subscribe it. The id is
    /// removed again if the hub request fails.
    async fn create(
        &self,
        topic: &str,
        handler: Arc<dyn NotificationHandler>,
    ) -> Result<(String, String), HubError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let secret = new_secret();
        self.register(&id, topic, &secret, handler);

        let request = self.request(HubMode::Subscribe, &id, topic, &secret);
        if let Err(err) = self.hub.send(&request).await {
            self.deregister(&id);
            return Err(err);
        }
        Ok((id, secret))
    }
}

fn new_secret() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Time from lease start to renewal: strictly before expiry.
fn renewal_delay(lease: Duration) -> Duration {
    lease - (lease / 10).min(MAX_RENEWAL_MARGIN)
}

/// Owns the subscription registry shared by all subscriptions and the
/// inbound router.
#[derive(Clone)]
pub struct SubscriptionManager {
    pub(crate) inner: Arc<ManagerInner>,
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("callback_base", &self.inner.callback_base)
            .field("lease", &self.inner.lease)
            .field("registered", &self.inner.registry().len())
            .finish()
    }
}

impl SubscriptionManager {
    /// `callback_base` is the public URL the router is reachable at; each
    /// subscription's callback is `{callback_base}/{id}`. A `lease` below
    /// [`MIN_LEASE`] is raised to it.
    pub fn new(
        hub: Arc<dyn HubClient>,
        callback_base: impl Into<String>,
        lease: Duration,
        emitter: Emitter,
    ) -> Self {
        let lease = if lease < MIN_LEASE {
            tracing::warn!(
                ?lease,
                minimum = ?MIN_LEASE,
                "push lease too short, using the minimum"
            );
            MIN_LEASE
        } else {
            lease
        };
        Self {
            inner: Arc::new(ManagerInner {
                hub,
                callback_base: callback_base.into().trim_end_matches('/').to_string(),
                lease,
                emitter,
                registry: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Subscribes to `topic` and keeps the subscription renewed until it is
    /// stopped.
    ///
    /// On error nothing stays registered.
    pub async fn subscribe_to(
        &self,
        topic: impl Into<String>,
        handler: Arc<dyn NotificationHandler>,
    ) -> Result<Subscription, HubError> {
        let topic = topic.into();
        let (id, secret) = self.inner.create(&topic, handler.clone()).await?;
        tracing::debug!(%topic, %id, "push subscription created");

        let shared = Arc::new(Shared {
            topic,
            handler,
            state: Mutex::new(State {
                id,
                secret,
                status: SubscriptionStatus::Active,
                replacement: None,
            }),
            renewal: Mutex::new(None),
        });
        let renewal = tokio::spawn(renew(self.inner.clone(), Arc::downgrade(&shared)));
        *shared.renewal() = Some(renewal);

        Ok(Subscription {
            manager: self.inner.clone(),
            shared,
        })
    }

    /// Ids currently accepted by the router.
    pub fn registered_ids(&self) -> Vec<String> {
        self.inner.registry().keys().cloned().collect()
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.inner.registry().contains_key(id)
    }
}

struct State {
    id: String,
    secret: String,
    status: SubscriptionStatus,
    /// Id registered by an in-flight renewal.
    replacement: Option<String>,
}

struct Shared {
    topic: String,
    handler: Arc<dyn NotificationHandler>,
    state: Mutex<State>,
    renewal: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn renewal(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.renewal.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle to a live subscription.
pub struct Subscription {
    manager: Arc<ManagerInner>,
    shared: Arc<Shared>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state();
        f.debug_struct("Subscription")
            .field("id", &state.id)
            .field("topic", &self.shared.topic)
            .field("status", &state.status)
            .finish()
    }
}

impl Subscription {
    /// Current id. Changes on every renewal.
    pub fn id(&self) -> String {
        self.shared.state().id.clone()
    }

    pub fn topic(&self) -> &str {
        &self.shared.topic
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.shared.state().status
    }

    /// Cancels renewal, deregisters and unsubscribes. Stopping twice is a
    /// no-op.
    pub async fn stop(&self) -> Result<(), HubError> {
        let (id, secret, replacement) = {
            let mut state = self.shared.state();
            if state.status == SubscriptionStatus::Stopped {
                return Ok(());
            }
            state.status = SubscriptionStatus::Stopped;
            (state.id.clone(), state.secret.clone(), state.replacement.take())
        };

        if let Some(renewal) = self.shared.renewal().take() {
            renewal.abort();
        }
        self.manager.deregister(&id);
        if let Some(replacement) = replacement {
            self.manager.deregister(&replacement);
        }

        let request = self
            .manager
            .request(HubMode::Unsubscribe, &id, &self.shared.topic, &secret);
        self.manager.hub.send(&request).await?;
        tracing::debug!(topic = %self.shared.topic, %id, "push subscription stopped");
        Ok(())
    }
}

/// A dropped subscription stops renewing and its ids stop being answered.
/// The hub is not told; the lease runs out on its side.
impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(renewal) = self.shared.renewal().take() {
            renewal.abort();
        }
        let mut state = self.shared.state();
        if state.status == SubscriptionStatus::Stopped {
            return;
        }
        state.status = SubscriptionStatus::Stopped;
        self.manager.deregister(&state.id);
        if let Some(replacement) = state.replacement.take() {
            self.manager.deregister(&replacement);
        }
    }
}

/// Renewal loop of one subscription. Ends when the subscription is stopped,
/// dropped, or its lease lapses without a successful renewal.
async fn renew(manager: Arc<ManagerInner>, subscription: Weak<Shared>) {
    let mut expires_at = Instant::now() + manager.lease;
    let mut next_attempt = Instant::now() + renewal_delay(manager.lease);

    loop {
        tokio::time::sleep_until(next_attempt).await;
        let Some(shared) = subscription.upgrade() else {
            return;
        };

        let replacement = uuid::Uuid::new_v4().simple().to_string();
        let secret = new_secret();
        {
            let mut state = shared.state();
            if state.status == SubscriptionStatus::Stopped {
                return;
            }
            state.status = SubscriptionStatus::Renewing;
            state.replacement = Some(replacement.clone());
            // Under the state lock, so a concurrent drop or stop sees it.
            manager.register(&replacement, &shared.topic, &secret, shared.handler.clone());
        }

        let request = manager.request(HubMode::Subscribe, &replacement, &shared.topic, &secret);
        match manager.hub.send(&request).await {
            Ok(()) => {
                let old = {
                    let mut state = shared.state();
                    state.replacement = None;
                    state.status = SubscriptionStatus::Active;
                    state.secret = secret;
                    std::mem::replace(&mut state.id, replacement)
                };
                manager.deregister(&old);
                tracing::debug!(topic = %shared.topic, %old, "push subscription renewed");

                let now = Instant::now();
                expires_at = now + manager.lease;
                next_attempt = now + renewal_delay(manager.lease);
            }
            Err(err) => {
                manager.deregister(&replacement);
                manager.emitter.error(
                    format!("Couldn't renew the push subscription to {}", shared.topic),
                    &err,
                );

                let now = Instant::now();
                let retry_delay =
                    RENEWAL_RETRY_DELAY.min(expires_at.saturating_duration_since(now) / 2);
                let mut state = shared.state();
                state.replacement = None;
                if retry_delay < MIN_RENEWAL_RETRY_DELAY {
                    state.status = SubscriptionStatus::Stopped;
                    let id = state.id.clone();
                    drop(state);
                    manager.deregister(&id);
                    manager.emitter.error(
                        format!("The push subscription to {} expired", shared.topic),
                        err,
                    );
                    return;
                }
                state.status = SubscriptionStatus::Active;
                next_attempt = now + retry_delay;
            }
        }
    }
}
