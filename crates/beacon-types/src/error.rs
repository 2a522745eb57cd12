use thiserror::Error;

/// Errors from encoding or decoding an envelope.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode envelope: {0}")]
    Encode(String),

    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("unexpected envelope shape: {0}")]
    UnexpectedShape(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Errors from a command or broadcast connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection was torn down on purpose (shutdown in progress).
    #[error("connection terminated")]
    Terminated,

    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("failed to subscribe to '{topic}': {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),
}

impl TransportError {
    /// Whether this error signals an intentional shutdown rather than a fault.
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

/// Errors related to loading or validating the startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Fatal errors raised while the supervisor brings the bot up.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("command connection failed: {0}")]
    CommandConnect(#[source] TransportError),

    #[error("broadcast connection failed: {0}")]
    BroadcastConnect(#[source] TransportError),
}
