//! Hub topics and the notification payloads they deliver.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use streamtap_types::EventCategory;

pub const DEFAULT_TOPIC_BASE: &str = "https://api.twitch.tv/helix";

/// Upstream notification kinds the push producer subscribes to.
///
/// One kind can back several categories: `ChannelUpdate` serves both
/// category and title changes, `Moderation` serves bans and timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    Follow,
    StreamOnline,
    StreamOffline,
    ChannelUpdate,
    Moderation,
    Redemption,
    SubscriptionGift,
    HypeTrainBegin,
    HypeTrainEnd,
}

impl TopicKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Follow => "channel.follow",
            Self::StreamOnline => "stream.online",
            Self::StreamOffline => "stream.offline",
            Self::ChannelUpdate => "channel.update",
            Self::Moderation => "channel.ban",
            Self::Redemption => "channel.channel_points_custom_reward_redemption.add",
            Self::SubscriptionGift => "channel.subscription.gift",
            Self::HypeTrainBegin => "channel.hype_train.begin",
            Self::HypeTrainEnd => "channel.hype_train.end",
        }
    }

    /// The topic backing `category`, if any.
    pub fn for_category(category: EventCategory) -> Option<Self> {
        Some(match category {
            EventCategory::Follow => Self::Follow,
            EventCategory::StreamBegin => Self::StreamOnline,
            EventCategory::StreamEnd => Self::StreamOffline,
            EventCategory::StreamChangeCategory | EventCategory::StreamChangeTitle => {
                Self::ChannelUpdate
            }
            EventCategory::Ban | EventCategory::Timeout => Self::Moderation,
            EventCategory::RewardRedeem => Self::Redemption,
            EventCategory::SubGift => Self::SubscriptionGift,
            EventCategory::HypeTrainBegin => Self::HypeTrainBegin,
            EventCategory::HypeTrainEnd => Self::HypeTrainEnd,
            _ => return None,
        })
    }

    /// Full topic URL for a broadcaster.
    pub fn url(self, base: &str, broadcaster_id: &str) -> String {
        format!(
            "{}/{}?broadcaster_user_id={}",
            base.trim_end_matches('/'),
            self.as_str(),
            broadcaster_id
        )
    }
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowPayload {
    pub user_id: String,
    pub user_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelUpdatePayload {
    pub title: String,
    pub category_id: String,
    pub category_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModerationPayload {
    pub user_id: String,
    pub user_name: String,
    pub is_permanent: bool,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Reward {
    pub id: String,
    pub title: String,
    pub cost: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedemptionPayload {
    pub user_id: String,
    pub user_name: String,
    #[serde(default)]
    pub user_input: String,
    pub reward: Reward,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionGiftPayload {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    pub total: u32,
    pub tier: String,
    #[serde(default)]
    pub cumulative_total: Option<u32>,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contributor {
    pub user_id: String,
    pub user_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HypeTrainEndPayload {
    pub level: u32,
    #[serde(default)]
    pub top_contributions: Vec<Contributor>,
}
