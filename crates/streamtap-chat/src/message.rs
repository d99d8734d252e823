//! Raw messages delivered by a chat connection.
//!
//! These mirror the protocol closely: numeric fields the protocol sends as
//! text stay text here and are validated by the producer.

/// A raw chat-protocol notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMessage {
    Chat {
        user_id: String,
        display_name: String,
        message: String,
        /// Sent by the connection's own identity.
        from_self: bool,
    },
    Cheer {
        user_id: String,
        display_name: String,
        bits: String,
        message: String,
    },
    Ban {
        username: String,
        target_user_id: Option<String>,
    },
    Timeout {
        username: String,
        target_user_id: Option<String>,
        /// Seconds, as sent.
        duration: String,
    },
    ClearChat,
    EmoteOnly {
        enabled: bool,
    },
    FollowersOnly {
        enabled: bool,
        /// Minutes.
        follow_age: u32,
    },
    SlowMode {
        enabled: bool,
        /// Seconds.
        interval: u32,
    },
    SubsOnly {
        enabled: bool,
    },
    Hosted {
        username: String,
        viewers: u32,
        autohost: bool,
    },
    Hosting {
        target: String,
        viewers: u32,
    },
    MessageDeleted {
        username: String,
        message: String,
    },
    Raided {
        raider: String,
        viewers: String,
    },
    Subscription {
        username: String,
        plan: Option<String>,
        message: Option<String>,
    },
    Resub {
        username: String,
        plan: Option<String>,
        message: Option<String>,
        cumulative_months: Option<String>,
    },
    /// One gifted subscription; `gifter` is `None` for anonymous gifts.
    SubGift {
        gifter: Option<String>,
        recipient: String,
        plan: Option<String>,
    },
    /// The aggregate notice preceding a burst of [`ChatMessage::SubGift`]s.
    MysteryGift {
        gifter: Option<String>,
        count: String,
        total: Option<String>,
        plan: Option<String>,
    },
}

/// Fieldless discriminator of [`ChatMessage`], used to attach handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatMessageKind {
    Chat,
    Cheer,
    Ban,
    Timeout,
    ClearChat,
    EmoteOnly,
    FollowersOnly,
    SlowMode,
    SubsOnly,
    Hosted,
    Hosting,
    MessageDeleted,
    Raided,
    Subscription,
    Resub,
    SubGift,
    MysteryGift,
}

impl ChatMessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Cheer => "cheer",
            Self::Ban => "ban",
            Self::Timeout => "timeout",
            Self::ClearChat => "clearchat",
            Self::EmoteOnly => "emoteonly",
            Self::FollowersOnly => "followersonly",
            Self::SlowMode => "slowmode",
            Self::SubsOnly => "subscribers",
            Self::Hosted => "hosted",
            Self::Hosting => "hosting",
            Self::MessageDeleted => "messagedeleted",
            Self::Raided => "raided",
            Self::Subscription => "subscription",
            Self::Resub => "resub",
            Self::SubGift => "subgift",
            Self::MysteryGift => "submysterygift",
        }
    }

    /// Whether handling this kind awaits a viewer lookup.
    pub fn needs_lookup(self) -> bool {
        matches!(
            self,
            Self::Ban
                | Self::Timeout
                | Self::Hosted
                | Self::Hosting
                | Self::MessageDeleted
                | Self::Raided
                | Self::Subscription
                | Self::Resub
                | Self::SubGift
                | Self::MysteryGift
        )
    }
}

impl std::fmt::Display for ChatMessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ChatMessage {
    pub fn kind(&self) -> ChatMessageKind {
        match self {
            Self::Chat { .. } => ChatMessageKind::Chat,
            Self::Cheer { .. } => ChatMessageKind::Cheer,
            Self::Ban { .. } => ChatMessageKind::Ban,
            Self::Timeout { .. } => ChatMessageKind::Timeout,
            Self::ClearChat => ChatMessageKind::ClearChat,
            Self::EmoteOnly { .. } => ChatMessageKind::EmoteOnly,
            Self::FollowersOnly { .. } => ChatMessageKind::FollowersOnly,
            Self::SlowMode { .. } => ChatMessageKind::SlowMode,
            Self::SubsOnly { .. } => ChatMessageKind::SubsOnly,
            Self::Hosted { .. } => ChatMessageKind::Hosted,
            Self::Hosting { .. } => ChatMessageKind::Hosting,
            Self::MessageDeleted { .. } => ChatMessageKind::MessageDeleted,
            Self::Raided { .. } => ChatMessageKind::Raided,
            Self::Subscription { .. } => ChatMessageKind::Subscription,
            Self::Resub { .. } => ChatMessageKind::Resub,
            Self::SubGift { .. } => ChatMessageKind::SubGift,
            Self::MysteryGift { .. } => ChatMessageKind::MysteryGift,
        }
    }
}
