//! [`ChatConnection`] over IRC-on-websocket.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use streamtap_observe::Emitter;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::connection::{ChatConnection, ConnectionState};
use crate::error::ChatError;
use crate::irc::{chat_message, is_privileged_userstate, IrcLine};
use crate::message::ChatMessage;

pub const DEFAULT_CHAT_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Nickname used when no bot identity is configured. Read-only.
const ANONYMOUS_LOGIN: &str = "justinfan12345";

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);
const USERSTATE_TIMEOUT: Duration = Duration::from_secs(5);
const MESSAGE_CAPACITY: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Credentials of the account the chat connection logs in as.
#[derive(Clone)]
pub struct BotIdentity {
    pub name: String,
    pub token: String,
}

impl fmt::Debug for BotIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotIdentity")
            .field("name", &self.name)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct IrcConfig {
    pub channel: String,
    pub identity: Option<BotIdentity>,
    pub url: String,
}

impl IrcConfig {
    pub fn new(channel: impl Into<String>, identity: Option<BotIdentity>) -> Self {
        Self {
            channel: channel.into(),
            identity,
            url: DEFAULT_CHAT_URL.to_string(),
        }
    }

    fn channel_login(&self) -> String {
        self.channel.trim_start_matches('#').to_lowercase()
    }

    fn own_login(&self) -> String {
        match &self.identity {
            Some(identity) => identity.name.to_lowercase(),
            None => ANONYMOUS_LOGIN.to_string(),
        }
    }

    fn login_lines(&self) -> Vec<String> {
        let mut lines = vec!["CAP REQ :twitch.tv/tags twitch.tv/commands".to_string()];
        match &self.identity {
            Some(identity) => {
                let token = identity.token.trim();
                let token = if token.starts_with("oauth:") {
                    token.to_string()
                } else {
                    format!("oauth:{token}")
                };
                lines.push(format!("PASS {token}"));
                lines.push(format!("NICK {}", self.own_login()));
            }
            None => {
                lines.push("PASS SCHMOOPIIE".to_string());
                lines.push(format!("NICK {ANONYMOUS_LOGIN}"));
            }
        }
        lines
    }
}

struct Inner {
    config: IrcConfig,
    own_login: String,
    emitter: Emitter,
    state: watch::Sender<ConnectionState>,
    privileged: watch::Sender<Option<bool>>,
    messages: broadcast::Sender<ChatMessage>,
}

struct Session {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Websocket chat client for a single channel.
///
/// After the first successful login the connection is kept alive by a
/// background task that answers `PING`s and reconnects with exponential
/// backoff until [`disconnect`](ChatConnection::disconnect) is called.
pub struct IrcClient {
    inner: Arc<Inner>,
    session: Mutex<Option<Session>>,
}

impl IrcClient {
    pub fn new(config: IrcConfig, emitter: Emitter) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        let (privileged, _) = watch::channel(None);
        let (messages, _) = broadcast::channel(MESSAGE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                own_login: config.own_login(),
                config,
                emitter,
                state,
                privileged,
                messages,
            }),
            session: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ChatConnection for IrcClient {
    fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    async fn connect(&self) -> Result<(), ChatError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        self.inner.state.send_replace(ConnectionState::Connecting);
        let ws = match open(&self.inner).await {
            Ok(ws) => ws,
            Err(err) => {
                self.inner.state.send_replace(ConnectionState::Closed);
                return Err(err);
            }
        };
        self.inner.state.send_replace(ConnectionState::Open);

        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(self.inner.clone(), ws, stop_rx));
        *session = Some(Session { stop, handle });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ChatError> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };
        let _ = session.stop.send(true);
        if let Err(err) = session.handle.await {
            tracing::warn!(error = %err, "chat connection task ended abnormally");
        }
        self.inner.state.send_replace(ConnectionState::Closed);
        Ok(())
    }

    async fn moderators(&self, channel: &str) -> Result<Vec<String>, ChatError> {
        if self.state() != ConnectionState::Open {
            return Err(ChatError::NotConnected);
        }
        let joined = self.inner.config.channel_login();
        if self.inner.config.identity.is_none()
            || channel.trim_start_matches('#').to_lowercase() != joined
        {
            return Ok(Vec::new());
        }

        let mut rx = self.inner.privileged.subscribe();
        let privileged = tokio::time::timeout(USERSTATE_TIMEOUT, rx.wait_for(Option::is_some))
            .await
            .ok()
            .and_then(|seen| seen.ok().and_then(|value| *value));

        match privileged {
            Some(true) => Ok(vec![self.inner.own_login.clone()]),
            _ => Ok(Vec::new()),
        }
    }

    fn messages(&self) -> broadcast::Receiver<ChatMessage> {
        self.inner.messages.subscribe()
    }
}

/// Opens the websocket, logs in and joins the channel.
async fn open(inner: &Inner) -> Result<WsStream, ChatError> {
    let (mut ws, _resp) = tokio_tungstenite::connect_async(inner.config.url.as_str()).await?;
    inner.privileged.send_replace(None);

    for line in inner.config.login_lines() {
        ws.send(Message::text(line)).await?;
    }
    match tokio::time::timeout(LOGIN_TIMEOUT, await_welcome(&mut ws)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(ChatError::LoginRefused(
                "no welcome received before the login timeout".to_string(),
            ))
        }
    }
    ws.send(Message::text(format!(
        "JOIN #{}",
        inner.config.channel_login()
    )))
    .await?;

    tracing::debug!(
        channel = %inner.config.channel_login(),
        login = %inner.own_login,
        "joined chat channel"
    );
    Ok(ws)
}

async fn await_welcome(ws: &mut WsStream) -> Result<(), ChatError> {
    while let Some(frame) = ws.next().await {
        let Message::Text(text) = frame? else {
            continue;
        };
        for line in text.as_str().split("\r\n").filter_map(IrcLine::parse) {
            match line.command.as_str() {
                "001" => return Ok(()),
                "PING" => {
                    ws.send(Message::text(pong(&line))).await?;
                }
                "NOTICE" => {
                    let notice = line.param(1).unwrap_or_default();
                    if notice.contains("authentication failed")
                        || notice.contains("Improperly formatted auth")
                    {
                        return Err(ChatError::LoginRefused(notice.to_string()));
                    }
                }
                _ => {}
            }
        }
    }
    Err(ChatError::LoginRefused(
        "connection closed during login".to_string(),
    ))
}

fn pong(ping: &IrcLine) -> String {
    match ping.param(0) {
        Some(server) => format!("PONG :{server}"),
        None => "PONG".to_string(),
    }
}

enum Flow {
    Continue,
    Reply(String),
    Reconnect,
}

fn handle_line(inner: &Inner, line: &IrcLine) -> Flow {
    match line.command.as_str() {
        "PING" => Flow::Reply(pong(line)),
        "RECONNECT" => Flow::Reconnect,
        "USERSTATE" => {
            inner
                .privileged
                .send_replace(Some(is_privileged_userstate(line)));
            Flow::Continue
        }
        _ => {
            if let Some(message) = chat_message(line, &inner.own_login) {
                let _ = inner.messages.send(message);
            }
            Flow::Continue
        }
    }
}

/// Reads frames until a stop is requested (`Ok`) or the connection drops.
async fn pump(
    inner: &Inner,
    ws: &mut WsStream,
    stop: &mut watch::Receiver<bool>,
) -> Result<(), String> {
    loop {
        tokio::select! {
            _ = stop.changed() => return Ok(()),
            frame = ws.next() => match frame {
                None => return Err("closed by server".to_string()),
                Some(Err(err)) => return Err(err.to_string()),
                Some(Ok(Message::Text(text))) => {
                    for line in text.as_str().split("\r\n").filter_map(IrcLine::parse) {
                        match handle_line(inner, &line) {
                            Flow::Continue => {}
                            Flow::Reply(reply) => {
                                ws.send(Message::text(reply)).await.map_err(|e| e.to_string())?;
                            }
                            Flow::Reconnect => {
                                return Err("server requested a reconnect".to_string());
                            }
                        }
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = ws.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) => return Err("closed by server".to_string()),
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn run(inner: Arc<Inner>, mut ws: WsStream, mut stop: watch::Receiver<bool>) {
    loop {
        let reason = match pump(&inner, &mut ws, &mut stop).await {
            Ok(()) => {
                let _ = ws.close(None).await;
                break;
            }
            Err(reason) => reason,
        };

        inner.state.send_replace(ConnectionState::Connecting);
        inner
            .emitter
            .warn(format!("Chat connection lost ({reason}), reconnecting"));

        let mut backoff = INITIAL_BACKOFF;
        ws = loop {
            tokio::select! {
                _ = stop.changed() => {
                    inner.state.send_replace(ConnectionState::Closed);
                    return;
                }
                _ = tokio::time::sleep(backoff) => {}
            }
            match open(&inner).await {
                Ok(next) => break next,
                Err(err) => {
                    inner.emitter.error("Chat reconnection failed", err);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        };

        inner.state.send_replace(ConnectionState::Open);
        inner.emitter.info("Chat connection restored");
    }
    inner.state.send_replace(ConnectionState::Closed);
}
