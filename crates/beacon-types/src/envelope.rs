//! Envelopes exchanged with the broker and the distribution proxy.
//!
//! Two request shapes exist for different deployments: the plain
//! `{cmd, args}` command and the richer `{service, data, timestamp, clock}`
//! service request. They are separate types on purpose and are never merged.
//!
//! Neither request carries a correlation id. That is only safe while the
//! command channel has exactly one outstanding request at a time; running
//! commands concurrently on one connection would need an id added here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A plain command sent to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Logical command name (e.g. "LIST").
    #[serde(rename = "cmd")]
    pub command: String,
    /// Command arguments, serialized as a JSON object of strings.
    #[serde(rename = "args", default)]
    pub arguments: BTreeMap<String, String>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            arguments: BTreeMap::new(),
        }
    }

    /// Builder-style argument insertion.
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }
}

/// Service-style request used by deployments that route on a service name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub service: String,
    /// Free-form payload (for the bot: `user` and `content`).
    pub data: serde_json::Map<String, serde_json::Value>,
    /// RFC 3339 UTC timestamp of when the request was built.
    pub timestamp: String,
    /// Logical clock, incremented before every send.
    pub clock: u64,
}

/// Either request shape, as produced by the command loop for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundRequest {
    Command(CommandRequest),
    Service(ServiceRequest),
}

impl OutboundRequest {
    /// Short label used in logs and reports ("LIST", "publish", ...).
    pub fn label(&self) -> &str {
        match self {
            Self::Command(req) => &req.command,
            Self::Service(req) => &req.service,
        }
    }
}

/// The broker's answer to one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: String,
    pub message: String,
}

/// A topic-tagged frame received on the broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub content: Vec<u8>,
}

impl PublishedMessage {
    /// Interpret a multi-part frame as `[topic, content, ...]`.
    ///
    /// Returns `None` when fewer than two parts are present. Extra parts
    /// beyond the content are ignored.
    pub fn from_parts(parts: &[Vec<u8>]) -> Option<Self> {
        match parts {
            [topic, content, ..] => Some(Self {
                topic: String::from_utf8_lossy(topic).into_owned(),
                content: content.clone(),
            }),
            _ => None,
        }
    }

    /// Content decoded as text, replacing invalid UTF-8.
    pub fn content_text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_request_uses_wire_field_names() {
        let req = CommandRequest::new("LIST").with_arg("page", "2");
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value, json!({"cmd": "LIST", "args": {"page": "2"}}));
    }

    #[test]
    fn command_request_without_args_serializes_empty_object() {
        let value = serde_json::to_value(CommandRequest::new("LIST")).unwrap();
        assert_eq!(value["args"], json!({}));
    }

    #[test]
    fn outbound_request_is_untagged() {
        let mut data = serde_json::Map::new();
        data.insert("user".into(), json!("bot"));
        let req = OutboundRequest::Service(ServiceRequest {
            service: "publish".into(),
            data,
            timestamp: "2024-01-01T00:00:00Z".into(),
            clock: 3,
        });
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["service"], "publish");
        assert_eq!(value["clock"], 3);
        assert!(value.get("Service").is_none());
        assert_eq!(req.label(), "publish");
    }

    #[test]
    fn published_message_from_two_parts() {
        let parts = vec![b"ALERTA".to_vec(), b"disk full".to_vec()];
        let msg = PublishedMessage::from_parts(&parts).unwrap();
        assert_eq!(msg.topic, "ALERTA");
        assert_eq!(msg.content_text(), "disk full");
    }

    #[test]
    fn published_message_needs_two_parts() {
        assert!(PublishedMessage::from_parts(&[b"onlytopic".to_vec()]).is_none());
        assert!(PublishedMessage::from_parts(&[]).is_none());
    }

    #[test]
    fn published_message_ignores_extra_parts() {
        let parts = vec![b"metrics".to_vec(), b"cpu=10".to_vec(), b"tail".to_vec()];
        let msg = PublishedMessage::from_parts(&parts).unwrap();
        assert_eq!(msg.content, b"cpu=10");
    }
}
