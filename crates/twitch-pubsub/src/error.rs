//! Error handling for the PubSub client.

use std::fmt;

use thiserror::Error;

/// Boxed error type carried by refresh-handler failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main result type used throughout the crate.
pub type PubSubResult<T> = Result<T, PubSubError>;

/// Error type for all client operations.
#[derive(Error, Debug)]
pub enum PubSubError {
    /// Invalid argument passed to a public API call.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Configuration errors.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Topics were edited before `connect` or `delayed_connect` was called.
    #[error("call connect or delayed_connect before editing topics")]
    NotStarted,

    /// The channel is not registered with the client.
    #[error("unknown channel '{channel_id}'; call add_channel first")]
    UnknownChannel {
        /// Channel id the caller referenced.
        channel_id: String,
    },

    /// The server rejected a listen or unlisten request.
    #[error("server returned '{code}' for topic '{topic}' on channel '{channel_id}'")]
    Rejected {
        /// Channel the request was scoped to.
        channel_id: String,
        /// Topic line of the rejected request.
        topic: String,
        /// Error code from the response envelope.
        code: RejectCode,
    },

    /// The registered token refresh handler failed.
    #[error("token refresh handler failed for channel '{channel_id}'")]
    TokenRefresh {
        /// Channel whose token was being refreshed.
        channel_id: String,
        /// Error returned by the handler.
        #[source]
        source: BoxError,
    },

    /// The registered token refresh handler returned no token.
    #[error("token refresh handler returned no token for channel '{channel_id}'")]
    TokenNotRefreshed {
        /// Channel whose token was being refreshed.
        channel_id: String,
    },

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// The client's background task has shut down.
    #[error("client is shut down")]
    Closed,

    /// Transport-level failure (connect, send, receive).
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable failure description.
        message: String,
    },
}

impl PubSubError {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

/// Error codes the server may attach to a RESPONSE envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectCode {
    /// `ERR_BADMESSAGE`: the request was malformed.
    BadMessage,
    /// `ERR_BADAUTH`: the auth token was rejected.
    BadAuth,
    /// `ERR_SERVER`: the server failed internally.
    Server,
    /// `ERR_BADTOPIC`: the topic line is not recognized.
    BadTopic,
    /// Any error string the client does not recognize.
    Other(String),
}

impl RejectCode {
    /// Map a raw error string from a RESPONSE envelope.
    pub fn from_wire(error: &str) -> Self {
        match error {
            "ERR_BADMESSAGE" => Self::BadMessage,
            "ERR_BADAUTH" => Self::BadAuth,
            "ERR_SERVER" => Self::Server,
            "ERR_BADTOPIC" => Self::BadTopic,
            other => Self::Other(other.to_owned()),
        }
    }

    /// The wire representation of this code.
    pub fn as_str(&self) -> &str {
        match self {
            Self::BadMessage => "ERR_BADMESSAGE",
            Self::BadAuth => "ERR_BADAUTH",
            Self::Server => "ERR_SERVER",
            Self::BadTopic => "ERR_BADTOPIC",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_code_round_trip() {
        for raw in ["ERR_BADMESSAGE", "ERR_BADAUTH", "ERR_SERVER", "ERR_BADTOPIC"] {
            assert_eq!(RejectCode::from_wire(raw).as_str(), raw);
        }
        let other = RejectCode::from_wire("ERR_SOMETHING_NEW");
        assert_eq!(other, RejectCode::Other("ERR_SOMETHING_NEW".to_owned()));
        assert_eq!(other.as_str(), "ERR_SOMETHING_NEW");
    }

    #[test]
    fn rejected_error_display() {
        let err = PubSubError::Rejected {
            channel_id: "42".to_owned(),
            topic: "channel-points-channel-v1.42".to_owned(),
            code: RejectCode::BadTopic,
        };
        let text = err.to_string();
        assert!(text.contains("ERR_BADTOPIC"));
        assert!(text.contains("42"));
    }
}
