//! Client event fan-out.
//!
//! Lifecycle transitions, inbound messages, and protocol warnings are
//! published on a broadcast channel. Any number of subscribers may listen;
//! a lagging or dropped subscriber never affects the others.

use tokio::sync::broadcast;

/// Events published by the client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A connection to the server was established.
    Connected,
    /// The active connection was lost or torn down.
    Disconnected,
    /// The client is attempting to (re)establish a connection.
    Reconnecting,
    /// A MESSAGE frame arrived for a subscribed topic. The payload is the
    /// opaque encoded string carried by the envelope.
    Message {
        /// Topic line the message was published on.
        topic: String,
        /// Raw encoded payload.
        payload: String,
    },
    /// A non-fatal protocol anomaly.
    Warning(Warning),
}

/// Non-fatal protocol anomalies, surfaced for observability.
#[derive(Debug, Clone)]
pub enum Warning {
    /// An inbound frame or payload could not be decoded.
    Decode {
        /// What failed to decode.
        detail: String,
    },
    /// The server sent a frame with an unrecognized type.
    UnknownMessage {
        /// The raw frame text.
        raw: String,
    },
    /// A RESPONSE arrived for a nonce with no pending request. Expected
    /// after requests are dropped across a reconnect.
    UnknownNonce {
        /// The orphaned nonce.
        nonce: String,
    },
}

/// Broadcast hub for [`ClientEvent`]s.
#[derive(Clone)]
pub(crate) struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. No subscribers is fine.
    pub(crate) fn emit(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }
}
