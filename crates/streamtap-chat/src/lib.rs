//! Chat-protocol producer for streamtap.
//!
//! [`ChatProducer`] consumes a [`ChatConnection`] and serves the chat-side
//! event categories. [`IrcClient`] is the production connection: IRC lines
//! over a websocket, parsed by the [`irc`] module into raw [`ChatMessage`]s.

mod client;
mod connection;
mod error;
pub mod irc;
mod message;
mod producer;

pub use client::{BotIdentity, IrcClient, IrcConfig, DEFAULT_CHAT_URL};
pub use connection::{ChatConnection, ConnectionState};
pub use error::{ChatError, HandlerError};
pub use message::{ChatMessage, ChatMessageKind};
pub use producer::ChatProducer;
