//! IRCv3 line parsing and mapping to raw [`ChatMessage`]s.
//!
//! Lines look like `@tag=value;tag2=value2 :prefix COMMAND param :trailing`.
//! Only the commands that carry channel activity are mapped; everything else
//! parses into an [`IrcLine`] and is ignored by [`chat_message`].

use std::collections::HashMap;

use crate::message::ChatMessage;

/// Login used by the platform for anonymous gifters.
pub const ANONYMOUS_GIFTER: &str = "ananonymousgifter";

/// A parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IrcLine {
    pub tags: HashMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    /// Middle params followed by the trailing param, if any.
    pub params: Vec<String>,
}

impl IrcLine {
    /// Parses one line, without its `\r\n` terminator.
    ///
    /// Returns `None` for empty lines and lines without a command.
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        let mut parsed = IrcLine::default();

        if let Some(stripped) = rest.strip_prefix('@') {
            let (raw_tags, tail) = stripped.split_once(' ')?;
            parsed.tags = parse_tags(raw_tags);
            rest = tail.trim_start();
        }

        if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix, tail) = stripped.split_once(' ')?;
            parsed.prefix = Some(prefix.to_string());
            rest = tail.trim_start();
        }

        let (command, mut tail) = match rest.split_once(' ') {
            Some((command, tail)) => (command, tail),
            None => (rest, ""),
        };
        if command.is_empty() {
            return None;
        }
        parsed.command = command.to_string();

        while !tail.is_empty() {
            if let Some(trailing) = tail.strip_prefix(':') {
                parsed.params.push(trailing.to_string());
                break;
            }
            match tail.split_once(' ') {
                Some((param, next)) => {
                    if !param.is_empty() {
                        parsed.params.push(param.to_string());
                    }
                    tail = next;
                }
                None => {
                    parsed.params.push(tail.to_string());
                    break;
                }
            }
        }

        Some(parsed)
    }

    /// Returns a non-empty tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// The nickname part of the prefix (`nick!user@host`).
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split('!').next().unwrap_or(prefix))
    }

    /// The parameter at `index`, if present.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

fn parse_tags(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), unescape_tag_value(value)),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Whether a `USERSTATE` line grants moderator-level rights to its sender.
pub fn is_privileged_userstate(line: &IrcLine) -> bool {
    if line.tag("mod") == Some("1") {
        return true;
    }
    line.tag("badges").is_some_and(|badges| {
        badges
            .split(',')
            .any(|badge| badge.starts_with("broadcaster/") || badge.starts_with("moderator/"))
    })
}

/// Maps a parsed line to a raw chat message.
///
/// `own_login` flags chat sent by the connection's own identity.
pub fn chat_message(line: &IrcLine, own_login: &str) -> Option<ChatMessage> {
    match line.command.as_str() {
        "PRIVMSG" => privmsg(line, own_login),
        "CLEARCHAT" => clearchat(line),
        "CLEARMSG" => Some(ChatMessage::MessageDeleted {
            username: line.tag("login")?.to_string(),
            message: line.param(1).unwrap_or_default().to_string(),
        }),
        "ROOMSTATE" => roomstate(line),
        "USERNOTICE" => usernotice(line),
        "HOSTTARGET" => hosttarget(line),
        _ => None,
    }
}

fn privmsg(line: &IrcLine, own_login: &str) -> Option<ChatMessage> {
    let nick = line.nick()?;
    let text = line.param(1)?;

    if nick == "jtv" {
        return host_notice(text);
    }

    let message = strip_action(text).to_string();
    let user_id = line.tag("user-id").unwrap_or_default().to_string();
    let display_name = line.tag("display-name").unwrap_or(nick).to_string();

    if let Some(bits) = line.tag("bits") {
        return Some(ChatMessage::Cheer {
            user_id,
            display_name,
            bits: bits.to_string(),
            message,
        });
    }

    Some(ChatMessage::Chat {
        user_id,
        display_name,
        message,
        from_self: nick.eq_ignore_ascii_case(own_login),
    })
}

fn strip_action(text: &str) -> &str {
    text.strip_prefix("\u{1}ACTION ")
        .and_then(|t| t.strip_suffix('\u{1}'))
        .unwrap_or(text)
}

/// Parses `Name is now [auto ]hosting you[ for up to N viewers].`
fn host_notice(text: &str) -> Option<ChatMessage> {
    let (username, rest) = text.split_once(' ')?;
    let autohost = rest.starts_with("is now auto hosting you");
    if !autohost && !rest.starts_with("is now hosting you") {
        return None;
    }
    let viewers = rest
        .split_once("up to ")
        .and_then(|(_, tail)| tail.split(' ').next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);
    Some(ChatMessage::Hosted {
        username: username.to_string(),
        viewers,
        autohost,
    })
}

fn clearchat(line: &IrcLine) -> Option<ChatMessage> {
    let Some(username) = line.param(1) else {
        return Some(ChatMessage::ClearChat);
    };
    let target_user_id = line.tag("target-user-id").map(str::to_string);
    match line.tag("ban-duration") {
        Some(duration) => Some(ChatMessage::Timeout {
            username: username.to_string(),
            target_user_id,
            duration: duration.to_string(),
        }),
        None => Some(ChatMessage::Ban {
            username: username.to_string(),
            target_user_id,
        }),
    }
}

/// Only single-mode updates are mapped; the full state sent on join is not a
/// change.
fn roomstate(line: &IrcLine) -> Option<ChatMessage> {
    const MODES: [&str; 4] = ["emote-only", "followers-only", "slow", "subs-only"];
    let present: Vec<&str> = MODES
        .into_iter()
        .filter(|key| line.tags.contains_key(*key))
        .collect();
    let [mode] = present.as_slice() else {
        return None;
    };
    let value = line.tags.get(*mode)?;

    match *mode {
        "emote-only" => Some(ChatMessage::EmoteOnly {
            enabled: value == "1",
        }),
        "subs-only" => Some(ChatMessage::SubsOnly {
            enabled: value == "1",
        }),
        "followers-only" => {
            let minutes: i64 = value.parse().ok()?;
            Some(ChatMessage::FollowersOnly {
                enabled: minutes >= 0,
                follow_age: u32::try_from(minutes).unwrap_or(0),
            })
        }
        "slow" => {
            let seconds: u32 = value.parse().ok()?;
            Some(ChatMessage::SlowMode {
                enabled: seconds > 0,
                interval: seconds,
            })
        }
        _ => None,
    }
}

fn gifter(line: &IrcLine, anonymous: bool) -> Option<String> {
    if anonymous {
        return None;
    }
    line.tag("login")
        .filter(|login| *login != ANONYMOUS_GIFTER)
        .map(str::to_string)
}

fn usernotice(line: &IrcLine) -> Option<ChatMessage> {
    let plan = line.tag("msg-param-sub-plan").map(str::to_string);
    let message = line.param(1).map(str::to_string);

    match line.tag("msg-id")? {
        "sub" => Some(ChatMessage::Subscription {
            username: line.tag("login")?.to_string(),
            plan,
            message,
        }),
        "resub" => Some(ChatMessage::Resub {
            username: line.tag("login")?.to_string(),
            plan,
            message,
            cumulative_months: line.tag("msg-param-cumulative-months").map(str::to_string),
        }),
        id @ ("subgift" | "anonsubgift") => Some(ChatMessage::SubGift {
            gifter: gifter(line, id == "anonsubgift"),
            recipient: line.tag("msg-param-recipient-user-name")?.to_string(),
            plan,
        }),
        id @ ("submysterygift" | "anonsubmysterygift") => Some(ChatMessage::MysteryGift {
            gifter: gifter(line, id == "anonsubmysterygift"),
            count: line.tag("msg-param-mass-gift-count")?.to_string(),
            total: line
                .tag("msg-param-sender-count")
                .filter(|n| *n != "0")
                .map(str::to_string),
            plan,
        }),
        "raid" => Some(ChatMessage::Raided {
            raider: line
                .tag("msg-param-login")
                .or_else(|| line.tag("login"))?
                .to_string(),
            viewers: line.tag("msg-param-viewerCount").unwrap_or_default().to_string(),
        }),
        _ => None,
    }
}

/// `HOSTTARGET #channel :target viewers`; a `-` target ends hosting.
fn hosttarget(line: &IrcLine) -> Option<ChatMessage> {
    let mut parts = line.param(1)?.split(' ');
    let target = parts.next().filter(|t| !t.is_empty() && *t != "-")?;
    let viewers = parts.next().and_then(|n| n.parse().ok()).unwrap_or(0);
    Some(ChatMessage::Hosting {
        target: target.to_string(),
        viewers,
    })
}
