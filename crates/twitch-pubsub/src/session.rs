//! Session registry: channels, confirmed topics, and in-flight requests.
//!
//! Pure bookkeeping, no I/O. The three collections are locked independently;
//! operations that span the pending set and the confirmed set take both locks
//! in a fixed order (`pending` before `topics`) so a request is never
//! observable as removed before its effect on the confirmed set is applied.

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::PubSubResult;
use crate::nonce;

/// A channel registered with the client: a remote scope plus the auth token
/// used to authorize topic subscriptions under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Channel id.
    pub channel_id: String,
    /// Current auth token.
    pub auth: String,
}

/// A topic subscription the server has confirmed as active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicEntry {
    /// Channel the topic is scoped to.
    pub channel_id: String,
    /// Topic line.
    pub topic: String,
}

/// An in-flight LISTEN/UNLISTEN request awaiting its RESPONSE.
pub(crate) struct PendingRequest {
    pub channel_id: String,
    /// Auth token snapshot taken when the request was (last) sent.
    pub auth: String,
    pub topic: String,
    pub nonce: String,
    pub is_listen: bool,
    /// Set once the request has been resent after an `ERR_BADAUTH`; a second
    /// rejection is then terminal.
    pub retried: bool,
    /// `None` for internally generated resubscription requests.
    pub completion: Option<oneshot::Sender<PubSubResult<()>>>,
}

impl PendingRequest {
    pub(crate) fn kind(&self) -> &'static str {
        if self.is_listen { "LISTEN" } else { "UNLISTEN" }
    }

    /// Whether the issuing caller stopped waiting on this request.
    pub(crate) fn is_abandoned(&self) -> bool {
        self.completion.as_ref().is_some_and(|tx| tx.is_closed())
    }

    /// Resolve the caller-visible completion, if any.
    pub(crate) fn resolve(mut self, result: PubSubResult<()>) {
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(result);
        }
    }
}

/// Everything the actor needs to put a pending request on the wire.
#[derive(Debug, Clone)]
pub(crate) struct OutboundRequest {
    pub is_listen: bool,
    pub nonce: String,
    pub topic: String,
    pub auth: String,
}

/// Result of [`SessionState::resubscribe_reset`].
pub(crate) struct ResubscribePlan {
    /// Nonces of the requests to (re)send, in order.
    pub resend: Vec<String>,
    /// Pending requests dropped by the reconnect, to be resolved as cancelled.
    pub cancelled: Vec<PendingRequest>,
}

/// Thread-safe registry shared by the client handle and the connection actor.
pub(crate) struct SessionState {
    channels: Mutex<Vec<Channel>>,
    // Lock order for combined sections: `pending` before `topics`.
    pending: Mutex<Vec<PendingRequest>>,
    topics: Mutex<Vec<TopicEntry>>,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self {
            channels: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            topics: Mutex::new(Vec::new()),
        }
    }

    // -- channels ------------------------------------------------------------

    /// Add a channel, or update its auth token in place. Returns `true` when
    /// the channel was newly added.
    pub(crate) fn upsert_channel(&self, channel_id: &str, auth: &str) -> bool {
        let mut channels = self.channels.lock();
        match channels.iter_mut().find(|c| c.channel_id == channel_id) {
            Some(channel) => {
                channel.auth = auth.to_owned();
                false
            }
            None => {
                channels.push(Channel {
                    channel_id: channel_id.to_owned(),
                    auth: auth.to_owned(),
                });
                true
            }
        }
    }

    /// Remove a channel's bookkeeping. Returns whether it existed. Topics
    /// already confirmed on the server are not affected.
    pub(crate) fn remove_channel(&self, channel_id: &str) -> bool {
        let mut channels = self.channels.lock();
        let before = channels.len();
        channels.retain(|c| c.channel_id != channel_id);
        channels.len() != before
    }

    pub(crate) fn channel_auth(&self, channel_id: &str) -> Option<String> {
        self.channels
            .lock()
            .iter()
            .find(|c| c.channel_id == channel_id)
            .map(|c| c.auth.clone())
    }

    /// Store a refreshed auth token. Returns `false` if the channel is gone.
    pub(crate) fn set_channel_auth(&self, channel_id: &str, auth: &str) -> bool {
        let mut channels = self.channels.lock();
        match channels.iter_mut().find(|c| c.channel_id == channel_id) {
            Some(channel) => {
                channel.auth = auth.to_owned();
                true
            }
            None => false,
        }
    }

    pub(crate) fn channels(&self) -> Vec<Channel> {
        self.channels.lock().clone()
    }

    // -- confirmed topics ----------------------------------------------------

    pub(crate) fn topics(&self) -> Vec<TopicEntry> {
        self.topics.lock().clone()
    }

    // -- pending requests ----------------------------------------------------

    /// Register a caller-issued request. Generates a nonce unique among the
    /// live pending set and returns it with the completion receiver.
    pub(crate) fn add_pending(
        &self,
        channel_id: &str,
        auth: &str,
        topic: &str,
        is_listen: bool,
    ) -> (String, oneshot::Receiver<PubSubResult<()>>) {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock();
        let nonce = unique_nonce(&pending);
        pending.push(PendingRequest {
            channel_id: channel_id.to_owned(),
            auth: auth.to_owned(),
            topic: topic.to_owned(),
            nonce: nonce.clone(),
            is_listen,
            retried: false,
            completion: Some(tx),
        });
        (nonce, rx)
    }

    /// Put a request back into the pending set under its existing nonce,
    /// keeping its completion. Used by the auth-refresh resend.
    pub(crate) fn reinsert_pending(&self, request: PendingRequest) {
        self.pending.lock().push(request);
    }

    /// Remove a pending request without touching the confirmed set.
    pub(crate) fn take_pending(&self, nonce: &str) -> Option<PendingRequest> {
        let mut pending = self.pending.lock();
        let idx = pending.iter().position(|r| r.nonce == nonce)?;
        Some(pending.remove(idx))
    }

    /// The wire-facing fields of a pending request.
    pub(crate) fn outbound(&self, nonce: &str) -> Option<OutboundRequest> {
        self.pending
            .lock()
            .iter()
            .find(|r| r.nonce == nonce)
            .map(|r| OutboundRequest {
                is_listen: r.is_listen,
                nonce: r.nonce.clone(),
                topic: r.topic.clone(),
                auth: r.auth.clone(),
            })
    }

    /// Remove a pending request and apply its effect on the confirmed set:
    /// a listen confirms the topic, an unlisten removes it.
    pub(crate) fn resolve_ok(&self, nonce: &str) -> Option<PendingRequest> {
        let mut pending = self.pending.lock();
        let idx = pending.iter().position(|r| r.nonce == nonce)?;
        let request = pending.remove(idx);

        let mut topics = self.topics.lock();
        if request.is_listen {
            let exists = topics
                .iter()
                .any(|t| t.channel_id == request.channel_id && t.topic == request.topic);
            if !exists {
                topics.push(TopicEntry {
                    channel_id: request.channel_id.clone(),
                    topic: request.topic.clone(),
                });
            }
        } else {
            topics.retain(|t| !(t.channel_id == request.channel_id && t.topic == request.topic));
        }
        Some(request)
    }

    /// Rebuild the pending set for a fresh connection.
    ///
    /// Pending listens are kept (same nonce, same completion) with their auth
    /// snapshot refreshed; pending unlistens are dropped as cancelled — the
    /// state they reference may not exist on the new connection. Every
    /// previously confirmed topic, including any with an unconfirmed unlisten
    /// in flight, is queued as a fresh internal listen. The confirmed set is
    /// cleared and rebuilt from the server's responses.
    pub(crate) fn resubscribe_reset(&self) -> ResubscribePlan {
        let channels = self.channels.lock().clone();
        let auth_of =
            |id: &str| channels.iter().find(|c| c.channel_id == id).map(|c| c.auth.clone());

        let mut pending = self.pending.lock();
        let mut topics = self.topics.lock();
        let old_pending = std::mem::take(&mut *pending);
        let old_topics = std::mem::take(&mut *topics);
        drop(topics);

        let mut kept: Vec<PendingRequest> = Vec::new();
        let mut cancelled = Vec::new();
        for mut request in old_pending {
            if !request.is_listen {
                cancelled.push(request);
                continue;
            }
            match auth_of(&request.channel_id) {
                Some(auth) => {
                    request.auth = auth;
                    kept.push(request);
                }
                None => cancelled.push(request),
            }
        }
        for entry in old_topics {
            let already_queued = kept
                .iter()
                .any(|r| r.channel_id == entry.channel_id && r.topic == entry.topic);
            if already_queued {
                continue;
            }
            // A topic whose channel was removed cannot be re-authorized.
            let Some(auth) = auth_of(&entry.channel_id) else {
                continue;
            };
            let nonce = unique_nonce(&kept);
            kept.push(PendingRequest {
                channel_id: entry.channel_id,
                auth,
                topic: entry.topic,
                nonce,
                is_listen: true,
                retried: false,
                completion: None,
            });
        }

        let resend = kept.iter().map(|r| r.nonce.clone()).collect();
        *pending = kept;
        ResubscribePlan { resend, cancelled }
    }

    /// Drain every pending request. Used at disconnect and shutdown.
    pub(crate) fn drain_pending(&self) -> Vec<PendingRequest> {
        std::mem::take(&mut *self.pending.lock())
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Generate a nonce not currently present in `pending`.
fn unique_nonce(pending: &[PendingRequest]) -> String {
    loop {
        let candidate = nonce::generate();
        if !pending.iter().any(|r| r.nonce == candidate) {
            return candidate;
        }
    }
}
