//! Platform API collaborators for streamtap.
//!
//! Producers never talk to the platform API directly: they consume the
//! [`ViewerResolver`], [`ChannelDirectory`] and [`CredentialProvider`]
//! traits defined here. [`HelixClient`] implements all three with `reqwest`
//! and an app access token obtained through the client-credentials flow.

mod client;
mod error;
mod login;
mod types;

pub use client::{HelixClient, DEFAULT_API_URL, DEFAULT_TOKEN_URL};
pub use error::HelixError;
pub use login::normalize_login;
pub use types::{ChannelDirectory, ChannelInfo, CredentialProvider, Viewer, ViewerResolver};
