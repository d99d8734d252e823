//! Push-notification subscriptions for streamtap.
//!
//! [`SubscriptionManager`] keeps hub subscriptions alive: it registers each
//! one under a random id, answers the hub's verification challenge, checks
//! the HMAC signature of every notification and renews leases before they
//! run out. [`PushProducer`] builds on it to serve the categories only the
//! hub can deliver (follows, stream state, channel updates and so on).
//!
//! The callback endpoints are a plain axum [`Router`](axum::Router): the
//! producer either serves it on its own port or hands it to the embedding
//! application to mount.

mod error;
mod hub;
mod manager;
mod producer;
mod router;
pub mod signature;
pub mod topics;

pub use error::{HubError, NotificationError, PushError};
pub use hub::{HelixHub, HubClient, HubMode, HubRequest, DEFAULT_HUB_URL};
pub use manager::{
    NotificationHandler, Subscription, SubscriptionManager, SubscriptionStatus, MIN_LEASE,
};
pub use producer::{PushConfig, PushProducer, DEFAULT_LEASE};
