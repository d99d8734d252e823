//! Canonical event shapes.

use serde::{Deserialize, Serialize};

use crate::category::EventCategory;

/// Subscription tier.
///
/// The free ("Prime") plan is reported as [`Tier::Tier1`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Tier 1, wire value `"1000"`.
    #[serde(rename = "1000")]
    Tier1,
    /// Tier 2, wire value `"2000"`.
    #[serde(rename = "2000")]
    Tier2,
    /// Tier 3, wire value `"3000"`.
    #[serde(rename = "3000")]
    Tier3,
}

impl Tier {
    /// Maps a raw upstream plan to a tier.
    ///
    /// A missing plan, an empty plan and the `Prime` marker all map to
    /// [`Tier::Tier1`]. Returns `None` for anything else that is not a known
    /// numeric tier.
    pub fn from_plan(plan: Option<&str>) -> Option<Self> {
        match plan.map(str::trim) {
            None | Some("") => Some(Self::Tier1),
            Some(p) if p.eq_ignore_ascii_case("prime") => Some(Self::Tier1),
            Some("1000") => Some(Self::Tier1),
            Some("2000") => Some(Self::Tier2),
            Some("3000") => Some(Self::Tier3),
            Some(_) => None,
        }
    }

    /// Returns the numeric wire value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tier1 => "1000",
            Self::Tier2 => "2000",
            Self::Tier3 => "3000",
        }
    }
}

/// Severity of a [`Event::Log`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A viewer reference inside a composite event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerRef {
    pub viewer_id: String,
    pub viewer_name: String,
}

/// A canonical event.
///
/// Serialised with a `type` tag holding the [`EventCategory`] wire name and
/// camelCase fields. Optional fields serialise as explicit `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Event {
    Ban {
        viewer_id: String,
        viewer_name: String,
    },
    Chat {
        viewer_id: String,
        viewer_name: String,
        message: String,
    },
    Cheer {
        viewer_id: String,
        viewer_name: String,
        amount: u64,
        message: String,
    },
    ClearChat,
    EmotesOnly {
        enabled: bool,
    },
    Follow {
        viewer_id: String,
        viewer_name: String,
    },
    FollowersOnly {
        enabled: bool,
        /// Minimum follow age, in minutes.
        follow_age: u32,
    },
    Host {
        viewer_id: String,
        viewer_name: String,
        viewers: u32,
        autohost: bool,
    },
    Hosting {
        target_id: String,
        target_name: String,
        viewers: u32,
    },
    HypeTrainBegin,
    HypeTrainEnd {
        level: u32,
        top_viewers: Vec<ViewerRef>,
    },
    MessageDeleted {
        viewer_id: String,
        viewer_name: String,
        message: String,
    },
    Raid {
        viewer_id: String,
        viewer_name: String,
        viewers: u32,
    },
    RewardRedeem {
        viewer_id: String,
        viewer_name: String,
        reward_id: String,
        reward_title: String,
        reward_cost: u64,
        message: String,
    },
    SlowMode {
        enabled: bool,
        /// Minimum delay between messages, in seconds.
        interval: u32,
    },
    StreamBegin {
        category_id: String,
        category_name: String,
        title: String,
    },
    StreamChangeCategory {
        category_id: String,
        category_name: String,
    },
    StreamChangeTitle {
        title: String,
    },
    StreamEnd,
    Sub {
        viewer_id: String,
        viewer_name: String,
        message: String,
        months: u32,
        tier: Tier,
    },
    SubGift {
        /// `None` for anonymous gifts.
        viewer_id: Option<String>,
        /// `None` for anonymous gifts.
        viewer_name: Option<String>,
        number: u32,
        /// Cumulative number of gifts from this viewer, when shared.
        total: Option<u32>,
        tier: Tier,
    },
    SubGiftReceived {
        recipient_id: String,
        recipient_name: String,
        gifter_id: Option<String>,
        gifter_name: Option<String>,
        tier: Tier,
    },
    SubsOnly {
        enabled: bool,
    },
    Timeout {
        viewer_id: String,
        viewer_name: String,
        /// In seconds.
        duration: u64,
    },
    Donation {
        /// `None` when the donor could not be matched to a viewer.
        viewer_id: Option<String>,
        viewer_name: String,
        amount: f64,
        currency: String,
        message: Option<String>,
    },
    Log {
        level: LogLevel,
        message: String,
        error: Option<String>,
    },
}

impl Event {
    /// Returns the category of this event.
    pub fn category(&self) -> EventCategory {
        match self {
            Self::Ban { .. } => EventCategory::Ban,
            Self::Chat { .. } => EventCategory::Chat,
            Self::Cheer { .. } => EventCategory::Cheer,
            Self::ClearChat => EventCategory::ClearChat,
            Self::EmotesOnly { .. } => EventCategory::EmotesOnly,
            Self::Follow { .. } => EventCategory::Follow,
            Self::FollowersOnly { .. } => EventCategory::FollowersOnly,
            Self::Host { .. } => EventCategory::Host,
            Self::Hosting { .. } => EventCategory::Hosting,
            Self::HypeTrainBegin => EventCategory::HypeTrainBegin,
            Self::HypeTrainEnd { .. } => EventCategory::HypeTrainEnd,
            Self::MessageDeleted { .. } => EventCategory::MessageDeleted,
            Self::Raid { .. } => EventCategory::Raid,
            Self::RewardRedeem { .. } => EventCategory::RewardRedeem,
            Self::SlowMode { .. } => EventCategory::SlowMode,
            Self::StreamBegin { .. } => EventCategory::StreamBegin,
            Self::StreamChangeCategory { .. } => EventCategory::StreamChangeCategory,
            Self::StreamChangeTitle { .. } => EventCategory::StreamChangeTitle,
            Self::StreamEnd => EventCategory::StreamEnd,
            Self::Sub { .. } => EventCategory::Sub,
            Self::SubGift { .. } => EventCategory::SubGift,
            Self::SubGiftReceived { .. } => EventCategory::SubGiftReceived,
            Self::SubsOnly { .. } => EventCategory::SubsOnly,
            Self::Timeout { .. } => EventCategory::Timeout,
            Self::Donation { .. } => EventCategory::Donation,
            Self::Log { .. } => EventCategory::Log,
        }
    }
}
