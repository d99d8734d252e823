//! The unified event bus.
//!
//! [`Emitter`] is a thin wrapper around [`tokio::sync::broadcast`]: every
//! producer holds a clone and pushes normalized events into it, consumers
//! either [`subscribe`](Emitter::subscribe) to the raw stream or register a
//! per-category handler with [`on`](Emitter::on).
//!
//! Publishing never blocks. Events sent while nobody listens are dropped, and
//! a receiver that falls behind the ring buffer skips the oldest events.

use std::fmt::Display;

use streamtap_types::{Event, EventCategory, LogLevel};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Default capacity of the broadcast ring buffer.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast sink shared by every producer.
#[derive(Clone, Debug)]
pub struct Emitter {
    tx: broadcast::Sender<Event>,
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Emitter {
    /// Creates an emitter with the given ring buffer capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to every current receiver.
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Returns a receiver observing every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers, including `on` listeners.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Calls `handler` for every future event of `category`.
    ///
    /// The receiver is created before this returns, so events emitted right
    /// after the call are not missed. The handler runs on its own task; the
    /// returned [`Listener`] stops it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on<F>(&self, category: EventCategory, mut handler: F) -> Listener
    where
        F: FnMut(Event) + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.category() == category => handler(event),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            category = %category,
                            skipped,
                            "event listener lagged; events were dropped for this listener"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Listener { handle }
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message.into(), None);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message.into(), None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message.into(), None);
    }

    /// Emits an `error` log event carrying the rendered cause.
    pub fn error(&self, message: impl Into<String>, error: impl Display) {
        self.log(LogLevel::Error, message.into(), Some(error.to_string()));
    }

    /// Publishes a `log` event and mirrors it to `tracing` at the same level.
    pub fn log(&self, level: LogLevel, message: String, error: Option<String>) {
        match level {
            LogLevel::Debug => tracing::debug!("{}", message),
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warn => tracing::warn!("{}", message),
            LogLevel::Error => match &error {
                Some(cause) => tracing::error!(error = %cause, "{}", message),
                None => tracing::error!("{}", message),
            },
        }
        self.emit(Event::Log {
            level,
            message,
            error,
        });
    }
}

/// Handle to a handler registered with [`Emitter::on`].
///
/// Dropping the handle leaves the handler running; call
/// [`stop`](Listener::stop) to detach it.
#[derive(Debug)]
pub struct Listener {
    handle: JoinHandle<()>,
}

impl Listener {
    /// Detaches the handler. Events already being handled are not interrupted.
    pub fn stop(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
