use serde::{Deserialize, Serialize};

/// Reason reported by [`Error::MissingHandler`].
pub const MISSING_HANDLER: &str = "MissingHandler";

/// Reason reported by [`Error::Timeout`].
pub const TIMEOUT: &str = "timeout";

/// Errors that travel through an interception chain.
///
/// Values are cloneable and serializable because a failed handling attempt
/// is carried back to the sender inside a [`Response`](crate::Response).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Error {
    /// No handler is registered for the resolved message type, or the
    /// handler factory produced no instance.
    #[error("Messaging error reason: MissingHandler. {comment}")]
    MissingHandler { comment: String },

    /// A timeout interceptor's deadline elapsed.
    #[error("Messaging error reason: timeout. {comment}")]
    Timeout { comment: String },

    /// Error raised by a handler or interceptor, passed through as-is.
    #[error("{message}")]
    Application { message: String },

    /// A handler or interceptor panicked while the chain was running.
    #[error("panicked: {message}")]
    Panicked { message: String },

    /// A message or result could not be converted to or from its wire form.
    #[error("payload codec error: {message}")]
    Codec { message: String },

    /// The transport has no listener for the channel.
    #[error("No listener was set for events: {channel}.")]
    NoListener { channel: String },

    /// The transport already has a listener for the channel.
    #[error("A listener has already been set for events: {channel}.")]
    ListenerExists { channel: String },

    /// The transport delivered an empty request.
    #[error("Received a null request.")]
    NullRequest,
}

impl Error {
    #[must_use]
    pub fn missing_handler(comment: impl Into<String>) -> Self {
        Self::MissingHandler {
            comment: comment.into(),
        }
    }

    #[must_use]
    pub fn timeout(comment: impl Into<String>) -> Self {
        Self::Timeout {
            comment: comment.into(),
        }
    }

    #[must_use]
    pub fn application(message: impl std::fmt::Display) -> Self {
        Self::Application {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn codec(message: impl std::fmt::Display) -> Self {
        Self::Codec {
            message: message.to_string(),
        }
    }

    /// Reason string for the built-in messaging kinds.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::MissingHandler { .. } => Some(MISSING_HANDLER),
            Self::Timeout { .. } => Some(TIMEOUT),
            _ => None,
        }
    }

    /// Human-readable comment attached to a built-in messaging kind.
    pub fn comment(&self) -> Option<&str> {
        match self {
            Self::MissingHandler { comment } | Self::Timeout { comment } => Some(comment),
            _ => None,
        }
    }

    pub fn is_missing_handler(&self) -> bool {
        matches!(self, Self::MissingHandler { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::codec(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
