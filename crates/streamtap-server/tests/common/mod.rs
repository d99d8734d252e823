#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use streamtap_chat::{ChatConnection, ChatError, ChatMessage, ConnectionState};
use streamtap_helix::{HelixError, Viewer, ViewerResolver};
use streamtap_types::{Event, LogLevel};
use tokio::sync::broadcast;

/// Chat connection double that never touches the network.
pub struct FakeConnection {
    state: Mutex<ConnectionState>,
    messages: broadcast::Sender<ChatMessage>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl FakeConnection {
    pub fn new() -> Arc<Self> {
        let (messages, _) = broadcast::channel(64);
        Arc::new(Self {
            state: Mutex::new(ConnectionState::Closed),
            messages,
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        })
    }

    pub fn send(&self, message: ChatMessage) {
        self.messages.send(message).unwrap();
    }
}

#[async_trait]
impl ChatConnection for FakeConnection {
    fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    async fn connect(&self) -> Result<(), ChatError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = ConnectionState::Open;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ChatError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = ConnectionState::Closed;
        Ok(())
    }

    async fn moderators(&self, _channel: &str) -> Result<Vec<String>, ChatError> {
        Ok(Vec::new())
    }

    fn messages(&self) -> broadcast::Receiver<ChatMessage> {
        self.messages.subscribe()
    }
}

/// Resolves a fixed set of `(id, display name)` viewers by login.
#[derive(Default)]
pub struct FakeResolver {
    viewers: HashMap<String, Viewer>,
}

impl FakeResolver {
    pub fn with(names: &[(&str, &str)]) -> Arc<Self> {
        let viewers = names
            .iter()
            .map(|(id, name)| {
                (
                    name.to_lowercase(),
                    Viewer {
                        id: id.to_string(),
                        login: name.to_lowercase(),
                        display_name: name.to_string(),
                    },
                )
            })
            .collect();
        Arc::new(Self { viewers })
    }
}

#[async_trait]
impl ViewerResolver for FakeResolver {
    async fn viewer_by_name(&self, name: &str) -> Result<Option<Viewer>, HelixError> {
        Ok(self.viewers.get(&name.to_lowercase()).cloned())
    }

    async fn viewer_by_id(&self, id: &str) -> Result<Option<Viewer>, HelixError> {
        Ok(self.viewers.values().find(|v| v.id == id).cloned())
    }
}

/// Next event that is not an informational log line, if one arrives soon.
pub async fn next_event(rx: &mut broadcast::Receiver<Event>) -> Option<Event> {
    loop {
        let event = tokio::time::timeout(Duration::from_millis(300), rx.recv())
            .await
            .ok()?
            .ok()?;
        match &event {
            Event::Log { level, .. } if *level < LogLevel::Warn => continue,
            _ => return Some(event),
        }
    }
}
