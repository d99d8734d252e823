//! Streamtap: one event stream for everything happening on a channel.
//!
//! [`Streamtap`] wires the chat producer, the push-notification producer
//! (when configured) and the donation relay to a shared
//! [`Emitter`], then lets the [`ProducersOrchestrator`] decide which producer
//! serves each event category.

pub mod config;
pub mod donations;
mod error;
pub mod orchestrator;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use serde_json::Value;
use streamtap_chat::{BotIdentity, ChatProducer, IrcClient, IrcConfig};
use streamtap_helix::HelixClient;
use streamtap_observe::{Emitter, Listener};
use streamtap_push::{HelixHub, PushConfig, PushProducer};
use streamtap_types::{Event, EventCategory, Producer};
use tokio::sync::{broadcast, mpsc};

pub use config::{load_config, Config, ConfigError};
pub use donations::DonationRelay;
pub use error::{DonationError, StreamtapError};
pub use orchestrator::ProducersOrchestrator;

/// The assembled set of producers behind one emitter.
pub struct Streamtap {
    emitter: Emitter,
    chat: Arc<ChatProducer>,
    push: Option<Arc<PushProducer>>,
    donations: Arc<DonationRelay>,
    orchestrator: ProducersOrchestrator,
}

impl Streamtap {
    /// Builds every producer from `config`. Nothing touches the network
    /// until [`connect`](Self::connect).
    pub fn new(config: &Config) -> Result<Self, StreamtapError> {
        let channel = config.channel.name.trim();
        if channel.is_empty() {
            return Err(StreamtapError::MissingChannel);
        }

        let emitter = Emitter::default();
        let helix = Arc::new(HelixClient::new(
            config.channel.client_id.clone(),
            config.channel.client_secret.clone(),
        ));

        let identity = config.bot.as_ref().map(|bot| BotIdentity {
            name: bot.name.clone(),
            token: bot.token.clone(),
        });
        let bot_name = identity.as_ref().map(|identity| identity.name.clone());
        let irc = Arc::new(IrcClient::new(
            IrcConfig::new(channel, identity),
            emitter.clone(),
        ));
        let chat = ChatProducer::new(
            irc,
            helix.clone(),
            emitter.clone(),
            channel,
            bot_name.as_deref(),
        );

        let push = match &config.push {
            Some(settings) => {
                let hub = Arc::new(HelixHub::new(settings.hub_url.clone(), helix.clone()));
                let push_config = PushConfig {
                    port: settings.port,
                    lease: settings.lease(),
                    ..PushConfig::new(channel, settings.callback_url.clone())
                };
                Some(PushProducer::new(
                    push_config,
                    hub,
                    helix.clone(),
                    helix.clone(),
                    emitter.clone(),
                )?)
            }
            None => None,
        };

        let donations = DonationRelay::new(helix, emitter.clone(), config.donations.accept_test);
        Ok(Self::from_parts(emitter, chat, push, donations))
    }

    /// Assembles already-built producers. Priority is chat, then push, then
    /// donations.
    pub fn from_parts(
        emitter: Emitter,
        chat: ChatProducer,
        push: Option<PushProducer>,
        donations: DonationRelay,
    ) -> Self {
        let chat = Arc::new(chat);
        let push = push.map(Arc::new);
        let donations = Arc::new(donations);

        let mut producers: Vec<Arc<dyn Producer>> = Vec::new();
        producers.push(chat.clone());
        if let Some(push) = &push {
            producers.push(push.clone());
        }
        producers.push(donations.clone());

        Self {
            orchestrator: ProducersOrchestrator::new(producers, emitter.clone()),
            emitter,
            chat,
            push,
            donations,
        }
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// Calls `handler` for every future event of `category`.
    pub fn on<F>(&self, category: EventCategory, handler: F) -> Listener
    where
        F: FnMut(Event) + Send + 'static,
    {
        self.emitter.on(category, handler)
    }

    /// Every event emitted from now on, `log` included.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.emitter.subscribe()
    }

    /// Connects chat, initializes push notifications, then assigns every
    /// category to a producer. Returns the owner of each served category.
    ///
    /// On error, call [`disconnect`](Self::disconnect) to release whatever
    /// was already opened.
    pub async fn connect(&self) -> Result<BTreeMap<EventCategory, &'static str>, StreamtapError> {
        self.chat.connect().await?;
        if let Some(push) = &self.push {
            push.init().await?;
        }
        Ok(self.orchestrator.subscribe_producers().await)
    }

    /// Stops every producer. Safe to call repeatedly, or without a prior
    /// [`connect`](Self::connect).
    pub async fn disconnect(&self) {
        if let Some(push) = &self.push {
            push.stop().await;
        }
        self.donations.stop();
        if let Err(err) = self.chat.disconnect().await {
            self.emitter.error("Couldn't close the chat connection", err);
        }
    }

    /// The push callback router, for mounting on an application server in
    /// middleware mode.
    pub fn push_router(&self) -> Option<Router> {
        self.push.as_ref().map(|push| push.router())
    }

    /// Sender for raw donation-socket events.
    pub fn donation_feed(&self) -> mpsc::Sender<Value> {
        self.donations.feed()
    }
}
