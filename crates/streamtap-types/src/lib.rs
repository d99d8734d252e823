//! Shared types for the streamtap workspace.
//!
//! This crate is the single source of truth for the canonical event
//! taxonomy: the closed [`Event`] variant, its [`EventCategory`]
//! discriminator and the catalog of categories consulted by the producer
//! orchestrator. It also defines the [`Producer`] interface every upstream
//! source implements.
//!
//! No crate in the workspace defines event shapes of its own; producers map
//! raw upstream payloads onto these types.

mod category;
mod event;
mod producer;

pub use category::{EventCategory, ParseEventCategoryError};
pub use event::{Event, LogLevel, Tier, ViewerRef};
pub use producer::Producer;
