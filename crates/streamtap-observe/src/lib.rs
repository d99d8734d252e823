//! Unified event bus for streamtap.
//!
//! Every producer pushes normalized [`Event`](streamtap_types::Event)s into a
//! shared [`Emitter`]; consumers subscribe once and never see which upstream
//! produced an event.
//!
//! The `log` category is the only diagnostic channel exposed to consumers:
//! library code reports problems through [`Emitter::debug`],
//! [`Emitter::info`], [`Emitter::warn`] and [`Emitter::error`], which publish
//! a `log` event and mirror it to `tracing`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use streamtap_observe::Emitter;
//! use streamtap_types::EventCategory;
//!
//! let emitter = Emitter::default();
//! let _listener = emitter.on(EventCategory::Follow, |event| println!("{event:?}"));
//! emitter.info("ready");
//! ```

mod emitter;

pub use emitter::{Emitter, Listener, DEFAULT_CAPACITY};
