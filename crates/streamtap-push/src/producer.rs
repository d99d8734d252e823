//! The push-notification producer.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use serde_json::Value;
use streamtap_helix::{ChannelDirectory, ChannelInfo, ViewerResolver};
use streamtap_observe::Emitter;
use streamtap_types::{Event, EventCategory, Producer, Tier, ViewerRef};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

use crate::error::{HubError, NotificationError, PushError};
use crate::hub::HubClient;
use crate::manager::{NotificationHandler, Subscription, SubscriptionManager};
use crate::topics::{
    ChannelUpdatePayload, FollowPayload, HypeTrainEndPayload, ModerationPayload,
    RedemptionPayload, SubscriptionGiftPayload, TopicKind, DEFAULT_TOPIC_BASE,
};

/// Ten days, the longest lease the hub grants.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(864_000);

#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Channel whose notifications are requested.
    pub channel: String,
    /// Public base URL the callback router is reachable at.
    pub callback_url: String,
    /// Port to serve the router on. `None` is middleware mode: the router is
    /// mounted by the embedding application instead.
    pub port: Option<u16>,
    pub lease: Duration,
    pub topic_base: String,
}

impl PushConfig {
    pub fn new(channel: impl Into<String>, callback_url: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            callback_url: callback_url.into(),
            port: None,
            lease: DEFAULT_LEASE,
            topic_base: DEFAULT_TOPIC_BASE.to_string(),
        }
    }
}

/// Last known category and title, used to detect changes.
#[derive(Debug, Default)]
struct ChannelCache {
    category_id: Option<String>,
    title: Option<String>,
}

struct State {
    emitter: Emitter,
    directory: Arc<dyn ChannelDirectory>,
    owned: RwLock<HashSet<EventCategory>>,
    cache: Mutex<ChannelCache>,
}

struct Listener {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Serves categories backed by hub subscriptions.
///
/// [`init`](PushProducer::init) must succeed before any category is
/// produced.
pub struct PushProducer {
    config: PushConfig,
    path_prefix: String,
    manager: SubscriptionManager,
    resolver: Arc<dyn ViewerResolver>,
    state: Arc<State>,
    broadcaster_id: OnceLock<String>,
    subscriptions: tokio::sync::Mutex<HashMap<TopicKind, Subscription>>,
    listener: tokio::sync::Mutex<Option<Listener>>,
    stopped: AtomicBool,
}

impl fmt::Debug for PushProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushProducer")
            .field("config", &self.config)
            .field("broadcaster_id", &self.broadcaster_id.get())
            .finish()
    }
}

impl PushProducer {
    pub fn new(
        config: PushConfig,
        hub: Arc<dyn HubClient>,
        resolver: Arc<dyn ViewerResolver>,
        directory: Arc<dyn ChannelDirectory>,
        emitter: Emitter,
    ) -> Result<Self, PushError> {
        let url = Url::parse(&config.callback_url).map_err(|source| {
            PushError::InvalidCallbackUrl {
                url: config.callback_url.clone(),
                source,
            }
        })?;
        let path_prefix = url.path().trim_end_matches('/').to_string();

        let manager = SubscriptionManager::new(
            hub,
            config.callback_url.clone(),
            config.lease,
            emitter.clone(),
        );
        Ok(Self {
            config,
            path_prefix,
            manager,
            resolver,
            state: Arc::new(State {
                emitter,
                directory,
                owned: RwLock::new(HashSet::new()),
                cache: Mutex::new(ChannelCache::default()),
            }),
            broadcaster_id: OnceLock::new(),
            subscriptions: tokio::sync::Mutex::new(HashMap::new()),
            listener: tokio::sync::Mutex::new(None),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn manager(&self) -> &SubscriptionManager {
        &self.manager
    }

    /// The callback router, rooted so that it can be served as-is: its
    /// routes live under the path of the callback URL.
    pub fn router(&self) -> Router {
        if self.path_prefix.is_empty() {
            self.manager.router()
        } else {
            Router::new().nest(&self.path_prefix, self.manager.router())
        }
    }

    /// Resolves the channel, then either starts listening on the configured
    /// port or, in middleware mode, just marks itself ready.
    pub async fn init(&self) -> Result<(), PushError> {
        let channel = self
            .resolver
            .viewer_by_name(&self.config.channel)
            .await?
            .ok_or_else(|| PushError::ChannelNotFound(self.config.channel.clone()))?;
        let _ = self.broadcaster_id.set(channel.id);

        let Some(port) = self.config.port else {
            self.state
                .emitter
                .info("Push notifications ready, waiting for the router to be mounted");
            return Ok(());
        };

        let mut listener = self.listener.lock().await;
        if listener.is_some() {
            return Ok(());
        }
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let tcp = TcpListener::bind(addr)
            .await
            .map_err(|source| PushError::Bind { port, source })?;

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let app = self.router();
        let handle = tokio::spawn(async move {
            let served = axum::serve(tcp, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(err) = served {
                tracing::error!(error = %err, "push callback server failed");
            }
        });
        *listener = Some(Listener { shutdown, handle });

        self.state
            .emitter
            .info(format!("Push notifications listening on port {port}"));
        Ok(())
    }

    /// Stops every subscription, then closes the listener if one was
    /// opened. Safe to call repeatedly, or before `init`.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);

        let subscriptions: Vec<(TopicKind, Subscription)> =
            self.subscriptions.lock().await.drain().collect();
        for (kind, subscription) in subscriptions {
            if let Err(err) = subscription.stop().await {
                self.state
                    .emitter
                    .error(format!("Couldn't unsubscribe from {kind} notifications"), err);
            }
        }

        if let Some(listener) = self.listener.lock().await.take() {
            let _ = listener.shutdown.send(());
            if let Err(err) = listener.handle.await {
                tracing::warn!(error = %err, "push callback server task ended abnormally");
            }
        }
    }

    /// Subscribes to `kind` unless a subscription already exists.
    ///
    /// Returns `Ok(false)` when the producer was stopped while the request
    /// was in flight; the fresh subscription is torn down again.
    async fn ensure_subscription(
        &self,
        kind: TopicKind,
        broadcaster_id: &str,
    ) -> Result<bool, HubError> {
        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.contains_key(&kind) {
            return Ok(true);
        }

        let topic = kind.url(&self.config.topic_base, broadcaster_id);
        let handler = Arc::new(TopicHandler {
            state: self.state.clone(),
            kind,
            broadcaster_id: broadcaster_id.to_string(),
        });
        let subscription = self.manager.subscribe_to(topic, handler).await?;

        if self.stopped.load(Ordering::SeqCst) {
            subscription.stop().await?;
            return Ok(false);
        }
        subscriptions.insert(kind, subscription);
        Ok(true)
    }

    /// Seeds the cache field a diff-based category compares against.
    async fn seed_cache(
        &self,
        category: EventCategory,
        broadcaster_id: &str,
    ) -> Result<(), NotificationError> {
        let info = self.state.channel_info(broadcaster_id).await?;
        let mut cache = self.state.cache();
        match category {
            EventCategory::StreamChangeCategory => cache.category_id = Some(info.category_id),
            EventCategory::StreamChangeTitle => cache.title = Some(info.title),
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Producer for PushProducer {
    fn name(&self) -> &'static str {
        "push"
    }

    async fn produce_events(&self, category: EventCategory) -> bool {
        let Some(kind) = TopicKind::for_category(category) else {
            return false;
        };
        if self.stopped.load(Ordering::SeqCst) {
            return false;
        }
        let Some(broadcaster_id) = self.broadcaster_id.get() else {
            self.state.emitter.warn(format!(
                "Push notifications can't produce {category} events before init"
            ));
            return false;
        };

        match self.ensure_subscription(kind, broadcaster_id).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(err) if err.is_rejection() => {
                self.state.emitter.info(format!(
                    "Push notifications failed to subscribe to {category} events because the target channel did not authorize the client"
                ));
                return false;
            }
            Err(err) => {
                self.state.emitter.error(
                    format!("Push notifications failed to subscribe to {category} events"),
                    err,
                );
                return false;
            }
        }

        if matches!(
            category,
            EventCategory::StreamChangeCategory | EventCategory::StreamChangeTitle
        ) {
            if let Err(err) = self.seed_cache(category, broadcaster_id).await {
                self.state.emitter.error(
                    format!("Push notifications couldn't fetch the channel for {category} events"),
                    err,
                );
                return false;
            }
        }

        self.state.owned().insert(category);
        true
    }
}

impl State {
    fn owned(&self) -> std::sync::RwLockWriteGuard<'_, HashSet<EventCategory>> {
        self.owned.write().unwrap_or_else(|e| e.into_inner())
    }

    fn owns(&self, category: EventCategory) -> bool {
        self.owned
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&category)
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, ChannelCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit_owned(&self, event: Event) {
        if self.owns(event.category()) {
            self.emitter.emit(event);
        }
    }

    async fn channel_info(&self, broadcaster_id: &str) -> Result<ChannelInfo, NotificationError> {
        self.directory
            .channel_info(broadcaster_id)
            .await?
            .ok_or_else(|| NotificationError::ChannelUnavailable(broadcaster_id.to_string()))
    }

    async fn dispatch(
        &self,
        kind: TopicKind,
        broadcaster_id: &str,
        data: Option<Value>,
    ) -> Result<(), NotificationError> {
        match kind {
            TopicKind::StreamOffline => {
                *self.cache() = ChannelCache::default();
                self.emit_owned(Event::StreamEnd);
                return Ok(());
            }
            TopicKind::HypeTrainBegin => {
                self.emit_owned(Event::HypeTrainBegin);
                return Ok(());
            }
            TopicKind::StreamOnline => {
                let info = self.channel_info(broadcaster_id).await?;
                {
                    let mut cache = self.cache();
                    cache.category_id = Some(info.category_id.clone());
                    cache.title = Some(info.title.clone());
                }
                self.emit_owned(Event::StreamBegin {
                    category_id: info.category_id,
                    category_name: info.category_name,
                    title: info.title,
                });
                return Ok(());
            }
            _ => {}
        }

        let data = data.ok_or(NotificationError::MissingPayload)?;
        match kind {
            TopicKind::Follow => {
                let payload: FollowPayload = serde_json::from_value(data)?;
                self.emit_owned(Event::Follow {
                    viewer_id: payload.user_id,
                    viewer_name: payload.user_name,
                });
            }
            TopicKind::ChannelUpdate => {
                let payload: ChannelUpdatePayload = serde_json::from_value(data)?;
                for event in self.diff(payload) {
                    self.emitter.emit(event);
                }
            }
            TopicKind::Moderation => {
                let payload: ModerationPayload = serde_json::from_value(data)?;
                if payload.is_permanent {
                    self.emit_owned(Event::Ban {
                        viewer_id: payload.user_id,
                        viewer_name: payload.user_name,
                    });
                } else if self.owns(EventCategory::Timeout) {
                    let ends_at = payload
                        .ends_at
                        .ok_or(NotificationError::MissingField("ends_at"))?;
                    let millis = (ends_at - Utc::now()).num_milliseconds().max(0);
                    self.emitter.emit(Event::Timeout {
                        viewer_id: payload.user_id,
                        viewer_name: payload.user_name,
                        duration: (millis as f64 / 1000.0).round() as u64,
                    });
                }
            }
            TopicKind::Redemption => {
                let payload: RedemptionPayload = serde_json::from_value(data)?;
                self.emit_owned(Event::RewardRedeem {
                    viewer_id: payload.user_id,
                    viewer_name: payload.user_name,
                    reward_id: payload.reward.id,
                    reward_title: payload.reward.title,
                    reward_cost: payload.reward.cost,
                    message: payload.user_input,
                });
            }
            TopicKind::SubscriptionGift => {
                let payload: SubscriptionGiftPayload = serde_json::from_value(data)?;
                let tier = Tier::from_plan(Some(&payload.tier))
                    .ok_or_else(|| NotificationError::UnknownTier(payload.tier.clone()))?;
                let (viewer_id, viewer_name) = if payload.is_anonymous {
                    (None, None)
                } else {
                    (payload.user_id, payload.user_name)
                };
                self.emit_owned(Event::SubGift {
                    viewer_id,
                    viewer_name,
                    number: payload.total,
                    total: payload.cumulative_total,
                    tier,
                });
            }
            TopicKind::HypeTrainEnd => {
                let payload: HypeTrainEndPayload = serde_json::from_value(data)?;
                self.emit_owned(Event::HypeTrainEnd {
                    level: payload.level,
                    top_viewers: payload
                        .top_contributions
                        .into_iter()
                        .map(|c| ViewerRef {
                            viewer_id: c.user_id,
                            viewer_name: c.user_name,
                        })
                        .collect(),
                });
            }
            TopicKind::StreamOffline | TopicKind::HypeTrainBegin | TopicKind::StreamOnline => {}
        }
        Ok(())
    }

    /// Compares an update against the cache and records the new values.
    ///
    /// A field with nothing cached is seeded without an event.
    fn diff(&self, update: ChannelUpdatePayload) -> Vec<Event> {
        let mut events = Vec::new();
        let mut cache = self.cache();

        if self.owns(EventCategory::StreamChangeCategory) {
            let changed = cache
                .category_id
                .as_ref()
                .is_some_and(|known| *known != update.category_id);
            if changed {
                events.push(Event::StreamChangeCategory {
                    category_id: update.category_id.clone(),
                    category_name: update.category_name,
                });
            }
            cache.category_id = Some(update.category_id);
        }

        if self.owns(EventCategory::StreamChangeTitle) {
            let changed = cache
                .title
                .as_ref()
                .is_some_and(|known| *known != update.title);
            if changed {
                events.push(Event::StreamChangeTitle {
                    title: update.title.clone(),
                });
            }
            cache.title = Some(update.title);
        }

        events
    }
}

struct TopicHandler {
    state: Arc<State>,
    kind: TopicKind,
    broadcaster_id: String,
}

#[async_trait]
impl NotificationHandler for TopicHandler {
    async fn handle(&self, data: Option<Value>) {
        if let Err(err) = self
            .state
            .dispatch(self.kind, &self.broadcaster_id, data)
            .await
        {
            self.state.emitter.error(
                format!("An error happened during a push {} notification", self.kind),
                err,
            );
        }
    }
}
