//! The chat producer: raw [`ChatMessage`]s in, canonical [`Event`]s out.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use streamtap_helix::{normalize_login, Viewer, ViewerResolver};
use streamtap_observe::Emitter;
use streamtap_types::{Event, EventCategory, Producer, Tier};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::connection::{ChatConnection, ConnectionState};
use crate::error::{ChatError, HandlerError};
use crate::message::{ChatMessage, ChatMessageKind};

/// Turns the raw notifications of a [`ChatConnection`] into canonical events.
///
/// Categories are served by attaching message kinds; a message of a kind
/// that was never attached is ignored. Each attached message is normalized
/// on its own and any failure becomes an `error` log event.
pub struct ChatProducer {
    connection: Arc<dyn ChatConnection>,
    handler: Arc<Handler>,
    channel: String,
    bot_login: Option<String>,
    broadcaster: bool,
    moderator: AtomicBool,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

struct Handler {
    resolver: Arc<dyn ViewerResolver>,
    emitter: Emitter,
    attached: RwLock<HashSet<ChatMessageKind>>,
}

impl ChatProducer {
    /// `bot_name` is the account the connection authenticates as, if any.
    pub fn new(
        connection: Arc<dyn ChatConnection>,
        resolver: Arc<dyn ViewerResolver>,
        emitter: Emitter,
        channel: &str,
        bot_name: Option<&str>,
    ) -> Self {
        let channel = normalize_login(channel);
        let bot_login = bot_name.map(normalize_login);
        let broadcaster = bot_login.as_deref() == Some(channel.as_str());
        Self {
            connection,
            handler: Arc::new(Handler {
                resolver,
                emitter,
                attached: RwLock::new(HashSet::new()),
            }),
            channel,
            bot_login,
            broadcaster,
            moderator: AtomicBool::new(false),
            dispatcher: Mutex::new(None),
        }
    }

    /// Whether the connection's identity may see moderation actions.
    pub fn is_privileged(&self) -> bool {
        self.broadcaster || self.moderator.load(Ordering::SeqCst)
    }

    /// Opens the connection if needed and starts dispatching messages.
    ///
    /// With a bot identity, the moderator list is consulted to find out
    /// whether privileged categories can be served.
    pub async fn connect(&self) -> Result<(), ChatError> {
        let mut dispatcher = self.dispatcher.lock().await;
        let messages = self.connection.messages();

        if self.connection.state() == ConnectionState::Closed {
            self.connection.connect().await?;
        }

        if let Some(login) = &self.bot_login {
            match self.connection.moderators(&self.channel).await {
                Ok(moderators) => {
                    let is_moderator = moderators.iter().any(|m| normalize_login(m) == *login);
                    self.moderator.store(is_moderator, Ordering::SeqCst);
                }
                Err(err) => self
                    .handler
                    .emitter
                    .error("Couldn't fetch the channel moderators", err),
            }
        }

        if let Some(previous) = dispatcher.replace(tokio::spawn(dispatch(
            self.handler.clone(),
            messages,
        ))) {
            previous.abort();
        }

        self.handler.emitter.info(format!(
            "Connected to the chat of {} ({})",
            self.channel,
            match (&self.bot_login, self.is_privileged()) {
                (None, _) => "anonymous",
                (Some(_), false) => "logged in",
                (Some(_), true) => "privileged",
            }
        ));
        Ok(())
    }

    /// Detaches every handler and closes the connection. Safe to repeat.
    pub async fn disconnect(&self) -> Result<(), ChatError> {
        if let Some(dispatcher) = self.dispatcher.lock().await.take() {
            dispatcher.abort();
        }
        self.handler.attached.write().await.clear();

        if self.connection.state() != ConnectionState::Closed {
            self.connection.disconnect().await?;
            self.handler.emitter.info("Disconnected from chat");
        }
        Ok(())
    }

    /// Raw message kinds backing `category`, or `None` if this producer
    /// cannot serve it with its current privileges.
    fn kinds_for(&self, category: EventCategory) -> Option<&'static [ChatMessageKind]> {
        use ChatMessageKind as K;
        let kinds: &'static [ChatMessageKind] = match category {
            EventCategory::Ban if self.is_privileged() => &[K::Ban],
            EventCategory::Timeout if self.is_privileged() => &[K::Timeout],
            EventCategory::Host if self.broadcaster => &[K::Hosted],
            EventCategory::Chat => &[K::Chat],
            EventCategory::Cheer => &[K::Cheer],
            EventCategory::ClearChat => &[K::ClearChat],
            EventCategory::EmotesOnly => &[K::EmoteOnly],
            EventCategory::FollowersOnly => &[K::FollowersOnly],
            EventCategory::Hosting => &[K::Hosting],
            EventCategory::MessageDeleted => &[K::MessageDeleted],
            EventCategory::Raid => &[K::Raided],
            EventCategory::SlowMode => &[K::SlowMode],
            EventCategory::Sub => &[K::Subscription, K::Resub],
            EventCategory::SubGift => &[K::MysteryGift],
            EventCategory::SubGiftReceived => &[K::SubGift],
            EventCategory::SubsOnly => &[K::SubsOnly],
            _ => return None,
        };
        Some(kinds)
    }
}

#[async_trait]
impl Producer for ChatProducer {
    fn name(&self) -> &'static str {
        "chat"
    }

    async fn produce_events(&self, category: EventCategory) -> bool {
        let Some(kinds) = self.kinds_for(category) else {
            return false;
        };
        self.handler
            .attached
            .write()
            .await
            .extend(kinds.iter().copied());
        true
    }
}

async fn dispatch(handler: Arc<Handler>, mut messages: broadcast::Receiver<ChatMessage>) {
    loop {
        match messages.recv().await {
            Ok(message) => {
                let kind = message.kind();
                if !handler.is_attached(kind).await {
                    continue;
                }
                if kind.needs_lookup() {
                    let handler = handler.clone();
                    tokio::spawn(async move { handler.handle(message).await });
                } else {
                    handler.handle(message).await;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "chat dispatcher lagged; raw messages were dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, HandlerError> {
    value.trim().parse().map_err(|_| HandlerError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn tier(plan: Option<String>) -> Result<Tier, HandlerError> {
    Tier::from_plan(plan.as_deref()).ok_or_else(|| HandlerError::UnknownPlan(plan.unwrap_or_default()))
}

impl Handler {
    async fn is_attached(&self, kind: ChatMessageKind) -> bool {
        self.attached.read().await.contains(&kind)
    }

    async fn handle(&self, message: ChatMessage) {
        let kind = message.kind();
        match self.normalize(message).await {
            Ok(Some(event)) => {
                // May have been detached while the lookup was in flight.
                if self.is_attached(kind).await {
                    self.emitter.emit(event);
                }
            }
            Ok(None) => {}
            Err(err) => self
                .emitter
                .error(format!("An error happened during a chat {kind} event"), err),
        }
    }

    async fn viewer(&self, name: &str) -> Result<Viewer, HandlerError> {
        self.resolver
            .viewer_by_name(name)
            .await?
            .ok_or_else(|| HandlerError::UnknownViewer(name.to_string()))
    }

    /// Resolves a moderation target, by id when the protocol provided one.
    async fn target(&self, name: &str, id: Option<&str>) -> Result<Viewer, HandlerError> {
        if let Some(id) = id {
            if let Some(viewer) = self.resolver.viewer_by_id(id).await? {
                return Ok(viewer);
            }
        }
        self.viewer(name).await
    }

    async fn gifter(&self, name: Option<&str>) -> Result<Option<Viewer>, HandlerError> {
        match name {
            Some(name) => self.viewer(name).await.map(Some),
            None => Ok(None),
        }
    }

    async fn normalize(&self, message: ChatMessage) -> Result<Option<Event>, HandlerError> {
        let event = match message {
            ChatMessage::Chat { from_self: true, .. } => return Ok(None),
            ChatMessage::Chat {
                user_id,
                display_name,
                message,
                ..
            } => Event::Chat {
                viewer_id: user_id,
                viewer_name: display_name,
                message,
            },
            ChatMessage::Cheer {
                user_id,
                display_name,
                bits,
                message,
            } => Event::Cheer {
                viewer_id: user_id,
                viewer_name: display_name,
                amount: parse_number("bits", &bits)?,
                message,
            },
            ChatMessage::Ban {
                username,
                target_user_id,
            } => {
                let viewer = self.target(&username, target_user_id.as_deref()).await?;
                Event::Ban {
                    viewer_id: viewer.id,
                    viewer_name: viewer.display_name,
                }
            }
            ChatMessage::Timeout {
                username,
                target_user_id,
                duration,
            } => {
                let duration = parse_number("ban-duration", &duration)?;
                let viewer = self.target(&username, target_user_id.as_deref()).await?;
                Event::Timeout {
                    viewer_id: viewer.id,
                    viewer_name: viewer.display_name,
                    duration,
                }
            }
            ChatMessage::ClearChat => Event::ClearChat,
            ChatMessage::EmoteOnly { enabled } => Event::EmotesOnly { enabled },
            ChatMessage::FollowersOnly {
                enabled,
                follow_age,
            } => Event::FollowersOnly {
                enabled,
                follow_age,
            },
            ChatMessage::SlowMode { enabled, interval } => Event::SlowMode { enabled, interval },
            ChatMessage::SubsOnly { enabled } => Event::SubsOnly { enabled },
            ChatMessage::Hosted {
                username,
                viewers,
                autohost,
            } => {
                let viewer = self.viewer(&username).await?;
                Event::Host {
                    viewer_id: viewer.id,
                    viewer_name: viewer.display_name,
                    viewers,
                    autohost,
                }
            }
            ChatMessage::Hosting { target, viewers } => {
                let target = self.viewer(&target).await?;
                Event::Hosting {
                    target_id: target.id,
                    target_name: target.display_name,
                    viewers,
                }
            }
            ChatMessage::MessageDeleted { username, message } => {
                let viewer = self.viewer(&username).await?;
                Event::MessageDeleted {
                    viewer_id: viewer.id,
                    viewer_name: viewer.display_name,
                    message,
                }
            }
            ChatMessage::Raided { raider, viewers } => {
                let viewers = parse_number("viewers", &viewers)?;
                let viewer = self.viewer(&raider).await?;
                Event::Raid {
                    viewer_id: viewer.id,
                    viewer_name: viewer.display_name,
                    viewers,
                }
            }
            ChatMessage::Subscription {
                username,
                plan,
                message,
            } => {
                let tier = tier(plan)?;
                let viewer = self.viewer(&username).await?;
                Event::Sub {
                    viewer_id: viewer.id,
                    viewer_name: viewer.display_name,
                    message: message.unwrap_or_default(),
                    months: 1,
                    tier,
                }
            }
            ChatMessage::Resub {
                username,
                plan,
                message,
                cumulative_months,
            } => {
                let tier = tier(plan)?;
                let months = match cumulative_months {
                    Some(months) => parse_number("cumulative-months", &months)?,
                    None => 1,
                };
                let viewer = self.viewer(&username).await?;
                Event::Sub {
                    viewer_id: viewer.id,
                    viewer_name: viewer.display_name,
                    message: message.unwrap_or_default(),
                    months,
                    tier,
                }
            }
            ChatMessage::SubGift {
                gifter,
                recipient,
                plan,
            } => {
                let tier = tier(plan)?;
                let recipient = self.viewer(&recipient).await?;
                let gifter = self.gifter(gifter.as_deref()).await?;
                let (gifter_id, gifter_name) = gifter.map(|g| (g.id, g.display_name)).unzip();
                Event::SubGiftReceived {
                    recipient_id: recipient.id,
                    recipient_name: recipient.display_name,
                    gifter_id,
                    gifter_name,
                    tier,
                }
            }
            ChatMessage::MysteryGift {
                gifter,
                count,
                total,
                plan,
            } => {
                let tier = tier(plan)?;
                let number = parse_number("mass-gift-count", &count)?;
                let total = total
                    .map(|total| parse_number("sender-count", &total))
                    .transpose()?;
                let gifter = self.gifter(gifter.as_deref()).await?;
                let (viewer_id, viewer_name) = gifter.map(|g| (g.id, g.display_name)).unzip();
                Event::SubGift {
                    viewer_id,
                    viewer_name,
                    number,
                    total,
                    tier,
                }
            }
        };
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_must_be_non_negative_integers() {
        assert_eq!(parse_number::<u64>("bits", "100").unwrap(), 100);
        assert!(parse_number::<u64>("bits", "-5").is_err());
        assert!(parse_number::<u64>("bits", "lots").is_err());
        assert!(parse_number::<u32>("viewers", "").is_err());
    }

    #[test]
    fn free_plan_counts_as_tier_one() {
        assert_eq!(tier(Some("Prime".to_string())).unwrap(), Tier::Tier1);
        assert_eq!(tier(None).unwrap(), Tier::Tier1);
        assert!(matches!(
            tier(Some("9000".to_string())),
            Err(HandlerError::UnknownPlan(plan)) if plan == "9000"
        ));
    }
}
