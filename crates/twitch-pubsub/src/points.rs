//! Channel points payloads.
//!
//! The `channel-points-channel-v1.<channel_id>` topic family carries reward
//! redemption notifications. Payload fields follow the documented redemption
//! shape; fields the API docs leave unspecified are optional here.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Topic family prefix for channel points notifications.
pub const CHANNEL_POINTS_PREFIX: &str = "channel-points-channel-v1.";

/// Build the channel points topic line for a channel.
pub fn channel_points_topic(channel_id: &str) -> String {
    format!("{CHANNEL_POINTS_PREFIX}{channel_id}")
}

/// A decoded reward redemption, published on
/// [`PubSubClient::redemptions`](crate::PubSubClient::redemptions).
#[derive(Debug, Clone)]
pub struct RedemptionEvent {
    /// Topic line the notification arrived on.
    pub topic: String,
    /// The decoded payload.
    pub redemption: RewardRedeemed,
}

/// Payload of a `reward-redeemed` notification.
#[derive(Debug, Clone, Deserialize)]
pub struct RewardRedeemed {
    /// Time the notification was sent.
    pub timestamp: DateTime<Utc>,
    /// The redemption itself.
    pub redemption: Redemption,
}

/// A single redemption of a custom reward.
#[derive(Debug, Clone, Deserialize)]
pub struct Redemption {
    /// Unique redemption id.
    pub id: String,
    /// The user who redeemed.
    pub user: RedeemingUser,
    /// Channel in which the reward was redeemed.
    pub channel_id: String,
    /// When the reward was redeemed.
    pub redeemed_at: DateTime<Utc>,
    /// The reward that was redeemed.
    pub reward: Reward,
    /// Text the user entered, for rewards that require input.
    #[serde(default)]
    pub user_input: Option<String>,
    /// `FULFILLED` if the redemption skipped the request queue, `UNFULFILLED`
    /// otherwise.
    pub status: String,
}

/// The user behind a redemption.
#[derive(Debug, Clone, Deserialize)]
pub struct RedeemingUser {
    pub id: String,
    pub login: String,
    pub display_name: String,
}

/// A custom channel points reward.
#[derive(Debug, Clone, Deserialize)]
pub struct Reward {
    pub id: String,
    pub channel_id: String,
    pub title: String,
    pub prompt: String,
    pub cost: u64,
    pub is_user_input_required: bool,
    pub is_sub_only: bool,
    /// Uploaded images, absent when none were uploaded.
    #[serde(default)]
    pub image: Option<RewardImages>,
    pub default_image: RewardImages,
    /// Hex color with `#` prefix.
    pub background_color: String,
    pub is_enabled: bool,
    pub is_paused: bool,
    pub is_in_stock: bool,
    pub max_per_stream: MaxPerStream,
    #[serde(default)]
    pub max_per_user_per_stream: Option<MaxPerUserPerStream>,
    #[serde(default)]
    pub global_cooldown: Option<GlobalCooldown>,
    pub should_redemptions_skip_request_queue: bool,
    #[serde(default)]
    pub updated_for_indicator_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub redemptions_redeemed_current_stream: Option<u64>,
    #[serde(default)]
    pub cooldown_expires_at: Option<DateTime<Utc>>,
}

/// Reward images at 1x, 2x and 4x sizes.
#[derive(Debug, Clone, Deserialize)]
pub struct RewardImages {
    pub url_1x: String,
    pub url_2x: String,
    pub url_4x: String,
}

/// Per-stream redemption limit.
#[derive(Debug, Clone, Deserialize)]
pub struct MaxPerStream {
    pub is_enabled: bool,
    pub max_per_stream: u64,
}

/// Per-user, per-stream redemption limit.
#[derive(Debug, Clone, Deserialize)]
pub struct MaxPerUserPerStream {
    pub is_enabled: bool,
    pub max_per_user_per_stream: u64,
}

/// Cooldown between redemptions.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalCooldown {
    pub is_enabled: bool,
    pub global_cooldown_seconds: u64,
}

/// Envelope wrapping typed payloads inside a MESSAGE frame's encoded string.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PayloadEnvelope<T> {
    pub data: T,
}
