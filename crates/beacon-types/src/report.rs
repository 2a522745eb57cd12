//! Human-facing status events written to the output sink.
//!
//! Both loops and the supervisor describe what happened as a `Report`.
//! Sinks decide how to render it (styled console lines, JSON lines, or an
//! in-memory log for tests).

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single status event produced by the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Report {
    /// The bot connected both channels and is running.
    Started {
        bot_name: String,
        broker_address: String,
        distributor_address: String,
    },
    CommandLoopStarted { interval_secs: u64 },
    /// A decoded reply from the broker.
    Reply {
        command: String,
        status: String,
        message: String,
    },
    /// Reply bytes that did not decode; `raw` is the lossy text form.
    UnparsedReply { command: String, raw: String },
    SendFailed { command: String, error: String },
    ReceiveFailed { command: String, error: String },
    BroadcastLoopStarted { topic: String },
    /// A message on the recognised alert topic.
    Alert { topic: String, content: String },
    /// Any other well-formed broadcast message.
    Broadcast { topic: String, content: String },
    /// A frame with fewer than two parts.
    Malformed { parts: Vec<String> },
    BroadcastReceiveFailed { error: String },
    ShutdownRequested,
    ShutdownComplete,
}

impl Report {
    pub fn is_alert(&self) -> bool {
        matches!(self, Self::Alert { .. })
    }

    /// Whether this event describes a failure worth highlighting.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::UnparsedReply { .. }
                | Self::SendFailed { .. }
                | Self::ReceiveFailed { .. }
                | Self::Malformed { .. }
                | Self::BroadcastReceiveFailed { .. }
        )
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started {
                bot_name,
                broker_address,
                distributor_address,
            } => write!(
                f,
                "bot {bot_name} started (commands -> {broker_address}, broadcasts <- {distributor_address})"
            ),
            Self::CommandLoopStarted { interval_secs } => {
                write!(f, "sending commands every {interval_secs}s")
            }
            Self::Reply {
                status, message, ..
            } => write!(f, "[REPLY {status}] {message}"),
            Self::UnparsedReply { command, raw } => {
                write!(f, "invalid reply for {command}: {raw}")
            }
            Self::SendFailed { command, error } => {
                write!(f, "failed to send {command}: {error}")
            }
            Self::ReceiveFailed { command, error } => {
                write!(f, "failed to receive reply for {command}: {error}")
            }
            Self::BroadcastLoopStarted { topic } if topic.is_empty() => {
                write!(f, "listening for broadcasts on all topics")
            }
            Self::BroadcastLoopStarted { topic } => {
                write!(f, "listening for broadcasts on '{topic}'")
            }
            Self::Alert { content, .. } => write!(f, "[ALERT received] {content}"),
            Self::Broadcast { topic, content } => {
                write!(f, "[MESSAGE] topic: {topic}, content: {content}")
            }
            Self::Malformed { parts } => {
                write!(f, "malformed broadcast frame: {parts:?}")
            }
            Self::BroadcastReceiveFailed { error } => {
                write!(f, "failed to receive broadcast: {error}")
            }
            Self::ShutdownRequested => write!(f, "shutting down"),
            Self::ShutdownComplete => write!(f, "bot stopped"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
