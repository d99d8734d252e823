//! Event categories: the discriminator shared by every canonical event.

use serde::{Deserialize, Serialize};

/// The category of a canonical event.
///
/// Serialises to the kebab-case wire name used as the `type` tag of
/// [`Event`](crate::Event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventCategory {
    /// A viewer was permanently banned.
    Ban,
    /// A viewer sent a chat message.
    Chat,
    /// A viewer cheered with bits.
    Cheer,
    /// The chat was cleared.
    ClearChat,
    /// Emote-only mode was toggled.
    EmotesOnly,
    /// A viewer followed the channel.
    Follow,
    /// Followers-only mode was toggled.
    FollowersOnly,
    /// Another channel hosts this channel.
    Host,
    /// This channel hosts another channel.
    Hosting,
    /// A hype train started.
    HypeTrainBegin,
    /// A hype train ended.
    HypeTrainEnd,
    /// A chat message was deleted by a moderator.
    MessageDeleted,
    /// Another channel raided this channel.
    Raid,
    /// A viewer redeemed a channel-points reward.
    RewardRedeem,
    /// Slow mode was toggled.
    SlowMode,
    /// The broadcast started.
    StreamBegin,
    /// The broadcast category changed.
    StreamChangeCategory,
    /// The broadcast title changed.
    StreamChangeTitle,
    /// The broadcast ended.
    StreamEnd,
    /// A viewer subscribed or shared a resubscription.
    Sub,
    /// A viewer gifted one or more subscriptions.
    SubGift,
    /// A viewer received a gifted subscription.
    SubGiftReceived,
    /// Subscribers-only mode was toggled.
    SubsOnly,
    /// A viewer was temporarily banned.
    Timeout,
    /// A viewer donated through the donation socket.
    Donation,
    /// A diagnostic message from the library itself.
    Log,
}

impl EventCategory {
    /// Every category, in declaration order.
    pub const ALL: [EventCategory; 26] = [
        Self::Ban,
        Self::Chat,
        Self::Cheer,
        Self::ClearChat,
        Self::EmotesOnly,
        Self::Follow,
        Self::FollowersOnly,
        Self::Host,
        Self::Hosting,
        Self::HypeTrainBegin,
        Self::HypeTrainEnd,
        Self::MessageDeleted,
        Self::Raid,
        Self::RewardRedeem,
        Self::SlowMode,
        Self::StreamBegin,
        Self::StreamChangeCategory,
        Self::StreamChangeTitle,
        Self::StreamEnd,
        Self::Sub,
        Self::SubGift,
        Self::SubGiftReceived,
        Self::SubsOnly,
        Self::Timeout,
        Self::Donation,
        Self::Log,
    ];

    /// The categories a producer can be asked to serve.
    ///
    /// `log` is excluded: it is emitted by every component and never owned.
    pub fn catalog() -> impl Iterator<Item = EventCategory> {
        Self::ALL.into_iter().filter(|c| *c != Self::Log)
    }

    /// Returns the wire name of this category.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ban => "ban",
            Self::Chat => "chat",
            Self::Cheer => "cheer",
            Self::ClearChat => "clear-chat",
            Self::EmotesOnly => "emotes-only",
            Self::Follow => "follow",
            Self::FollowersOnly => "followers-only",
            Self::Host => "host",
            Self::Hosting => "hosting",
            Self::HypeTrainBegin => "hype-train-begin",
            Self::HypeTrainEnd => "hype-train-end",
            Self::MessageDeleted => "message-deleted",
            Self::Raid => "raid",
            Self::RewardRedeem => "reward-redeem",
            Self::SlowMode => "slow-mode",
            Self::StreamBegin => "stream-begin",
            Self::StreamChangeCategory => "stream-change-category",
            Self::StreamChangeTitle => "stream-change-title",
            Self::StreamEnd => "stream-end",
            Self::Sub => "sub",
            Self::SubGift => "sub-gift",
            Self::SubGiftReceived => "sub-gift-received",
            Self::SubsOnly => "subs-only",
            Self::Timeout => "timeout",
            Self::Donation => "donation",
            Self::Log => "log",
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventCategory {
    type Err = ParseEventCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ParseEventCategoryError(s.to_string()))
    }
}

/// Error returned when parsing an unknown category name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event category: {0}")]
pub struct ParseEventCategoryError(pub String);
