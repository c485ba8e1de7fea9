//! ZOCP error types.
//!
//! Comprehensive error handling for capability tree, codec and protocol
//! engine operations.

use thiserror::Error;

/// Main error type for ZOCP engine operations.
#[derive(Error, Debug)]
pub enum ZocpError {
    /// Malformed JSON or wrong frame shape on decode.
    #[error("decode error: {0}")]
    Decode(String),

    /// A verb outside the eight canonical ones with no registered
    /// `handle_<verb>` extension.
    #[error("unknown verb: {0}")]
    UnknownVerb(String),

    /// A SUB/UNSUB request where neither peer id is `self` and the
    /// sender does not match the alleged receiver.
    #[error("invalid subscription request: {0}")]
    InvalidSubscription(String),

    /// An unrecognized `typeHint` at registration time.
    #[error("unknown type hint: {0}")]
    UnknownTypeHint(String),

    /// An unrecognized access-flag letter.
    #[error("invalid access flags: {0}")]
    InvalidAccessFlags(String),

    /// Error surfaced by the `Presence` contract (whisper/shout/join
    /// failures, transport interrupts).
    #[error("presence error: {0}")]
    Presence(String),

    /// Error returned by a user-supplied `Dispatch` callback.
    #[error("dispatch error: {0}")]
    Dispatch(String),
}

/// Result type alias for ZOCP operations.
pub type Result<T> = std::result::Result<T, ZocpError>;

impl ZocpError {
    /// Create a decode error with a message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create an invalid-subscription error with a message.
    pub fn invalid_subscription(msg: impl Into<String>) -> Self {
        Self::InvalidSubscription(msg.into())
    }

    /// Whether this error should be logged and dropped rather than
    /// propagated out of the event loop (spec §7).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::InvalidSubscription(_))
    }

    /// Whether this error is fatal and must terminate `run`/`run_once`.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnknownVerb(_) | Self::Dispatch(_))
    }
}

impl From<serde_json::Error> for ZocpError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
