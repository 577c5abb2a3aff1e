//! Wire envelopes for the PubSub protocol.
//!
//! All envelopes are JSON objects tagged by a `type` field with snake_case
//! payload fields, e.g.
//! `{"type":"LISTEN","nonce":"...","data":{"topics":["..."],"auth_token":"..."}}`.

use serde::{Deserialize, Serialize};

/// Frames sent by the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub(crate) enum ClientFrame {
    #[serde(rename = "PING")]
    Ping,
    #[serde(rename = "LISTEN")]
    Listen { nonce: String, data: TopicData },
    #[serde(rename = "UNLISTEN")]
    Unlisten { nonce: String, data: TopicData },
}

/// Payload of a LISTEN/UNLISTEN frame.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct TopicData {
    pub topics: Vec<String>,
    pub auth_token: String,
}

impl ClientFrame {
    /// Build a LISTEN or UNLISTEN frame for a single topic.
    pub(crate) fn topic_request(
        is_listen: bool,
        nonce: impl Into<String>,
        topic: impl Into<String>,
        auth: impl Into<String>,
    ) -> Self {
        let nonce = nonce.into();
        let data = TopicData {
            topics: vec![topic.into()],
            auth_token: auth.into(),
        };
        if is_listen {
            Self::Listen { nonce, data }
        } else {
            Self::Unlisten { nonce, data }
        }
    }

    pub(crate) fn to_json(&self) -> String {
        // Serialization of these shapes cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Frames received from the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum ServerFrame {
    #[serde(rename = "PONG")]
    Pong,
    #[serde(rename = "RECONNECT")]
    Reconnect,
    #[serde(rename = "RESPONSE")]
    Response {
        #[serde(default)]
        nonce: String,
        /// Empty string denotes success.
        #[serde(default)]
        error: String,
    },
    #[serde(rename = "MESSAGE")]
    Message { data: MessageData },
    #[serde(other)]
    Unknown,
}

/// Payload of a MESSAGE frame: a topic line and an opaque encoded payload.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MessageData {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub message: String,
}
