//! Token refresh hook.

use async_trait::async_trait;

use crate::error::BoxError;

/// Caller-supplied hook invoked when the server rejects a request with
/// `ERR_BADAUTH`.
///
/// The handler receives the channel id and the rejected token and should
/// return a replacement token. Returning `Ok(None)` (or an empty string)
/// means no new token could be obtained; the pending request then fails
/// with [`PubSubError::TokenNotRefreshed`](crate::PubSubError::TokenNotRefreshed).
/// A handler error fails the request with
/// [`PubSubError::TokenRefresh`](crate::PubSubError::TokenRefresh).
///
/// The refresh-and-resend cycle runs at most once per request.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Obtain a replacement token for `channel_id`.
    async fn refresh(&self, channel_id: &str, old_auth: &str) -> Result<Option<String>, BoxError>;
}
