//! Persistent client for the Twitch PubSub WebSocket protocol.
//!
//! The client keeps one long-lived connection to a PubSub edge server and
//! takes care of everything that makes such a connection tedious to hold
//! open by hand:
//!
//! - **Reconnection**: exponential backoff with jitter (1 s floor, 120 s
//!   ceiling), resetting after every successful connect
//! - **Keepalive**: application-level PING every ~4 minutes with a 12 s pong
//!   grace window; a missed pong forces a reconnect
//! - **Subscriptions**: LISTEN/UNLISTEN requests correlated to responses by
//!   an 8-character nonce; confirmed topics are resubscribed automatically
//!   after every reconnect
//! - **Auth refresh**: an `ERR_BADAUTH` response triggers a caller-supplied
//!   [`TokenRefresher`] once, then resends the request with the new token
//!
//! # Architecture
//!
//! A single background actor owns the socket; client handles talk to it over
//! a command channel and share the session registry:
//!
//! ```text
//! ┌──────────────┐  commands   ┌─────────────────┐   frames   ┌────────────┐
//! │ PubSubClient │────────────▶│ ConnectionActor │◀──────────▶│ PubSub edge│
//! │   (Clone)    │             │  (background)   │            │   server   │
//! └──────┬───────┘             └────────┬────────┘            └────────────┘
//!        │                              │
//!        ▼                              ▼
//! ┌─────────────────────────────────────────────┐
//! │ SessionState: channels / topics / pending   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use twitch_pubsub::{PubSubClient, PubSubConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PubSubClient::new(PubSubConfig::new())?;
//!     client.add_channel("30515034", "oauth-token")?;
//!     client.connect().await?;
//!     client.listen_channel_points("30515034").await?;
//!
//!     let mut events = client.events();
//!     while let Ok(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

mod actor;
mod auth;
mod backoff;
mod client;
mod config;
mod dispatch;
mod error;
mod events;
mod nonce;
mod points;
mod session;
mod transport;
mod wire;

pub use actor::ConnectionStatus;
pub use auth::TokenRefresher;
pub use client::PubSubClient;
pub use config::{DEFAULT_URL, PubSubConfig};
pub use error::{BoxError, PubSubError, PubSubResult, RejectCode};
pub use events::{ClientEvent, Warning};
pub use points::{
    CHANNEL_POINTS_PREFIX, GlobalCooldown, MaxPerStream, MaxPerUserPerStream, RedeemingUser,
    Redemption, RedemptionEvent, Reward, RewardImages, RewardRedeemed, channel_points_topic,
};
pub use session::{Channel, TopicEntry};
pub use transport::{Connector, Transport, WsConnector};
