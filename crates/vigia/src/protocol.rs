//! Message protocol envelopes.
//!
//! Everything crossing the socket is either a [`Message`] (inbound
//! commands and outbound event pushes) or a [`Response`] echoing a
//! request id. Inbound text that fails to parse is silently dropped; the
//! peer resends on timeout.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

/// Routing channel for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Connection lifecycle and engine activation
    System,
    /// DOM queries, inspection, highlighting
    Dom,
    /// Raw event watching and dispatch
    Events,
    /// Captured console output
    Console,
    /// Arbitrary code evaluation (escape hatch)
    Eval,
    /// Interaction recording and replay
    Recording,
    /// User-driven rectangular element selection
    Selection,
    /// Page navigation
    Navigation,
    /// Tab management (host shell)
    Tabs,
    /// Mutation watch
    Mutations,
    /// Semantic event engine
    Semantic,
    /// Synthetic interaction
    Interaction,
}

/// Wire envelope for commands and event pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Request/push identity, echoed in responses
    pub id: String,
    /// Routing channel
    pub channel: Channel,
    /// Channel-specific action name
    pub action: String,
    /// Action arguments or event body
    #[serde(default)]
    pub payload: Value,
    /// Sender timestamp in milliseconds
    pub timestamp: u64,
    /// Originating side (`operator` or `engine`)
    #[serde(default)]
    pub source: String,
}

impl Message {
    /// Parse an inbound frame; malformed JSON is dropped with no response.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(message) => Some(message),
            Err(err) => {
                trace!(%err, "dropping malformed frame");
                None
            }
        }
    }

    /// Build an engine-originated push.
    #[must_use]
    pub fn push(
        id: impl Into<String>,
        channel: Channel,
        action: impl Into<String>,
        payload: Value,
        timestamp: u64,
    ) -> Self {
        Self {
            id: id.into(),
            channel,
            action: action.into(),
            payload,
            timestamp,
            source: "engine".to_string(),
        }
    }
}

/// Wire envelope for request outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Matches the request id
    pub id: String,
    /// Whether the request succeeded
    pub success: bool,
    /// Success payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Engine timestamp in milliseconds
    pub timestamp: u64,
}

impl Response {
    /// A success response.
    #[must_use]
    pub fn ok(id: impl Into<String>, data: Value, timestamp: u64) -> Self {
        Self {
            id: id.into(),
            success: true,
            data: Some(data),
            error: None,
            timestamp,
        }
    }

    /// A failure response carrying a human-readable message.
    #[must_use]
    pub fn err(id: impl Into<String>, message: impl Into<String>, timestamp: u64) -> Self {
        Self {
            id: id.into(),
            success: false,
            data: None,
            error: Some(message.into()),
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod parse_tests {
        use super::*;

        #[test]
        fn inbound_frame_round_trips() {
            let text = r##"{
                "id": "req-1",
                "channel": "interaction",
                "action": "click",
                "payload": {"selector": "#go"},
                "timestamp": 1700000000000,
                "source": "operator"
            }"##;
            let message = Message::parse(text).unwrap();
            assert_eq!(message.channel, Channel::Interaction);
            assert_eq!(message.action, "click");
            assert_eq!(message.payload["selector"], "#go");
        }

        #[test]
        fn malformed_json_is_dropped() {
            assert!(Message::parse("{not json").is_none());
            assert!(Message::parse("").is_none());
            assert!(Message::parse(r#"{"id": "x"}"#).is_none(), "missing fields");
        }

        #[test]
        fn unknown_channel_is_dropped() {
            let text = r#"{
                "id": "req-2",
                "channel": "teleport",
                "action": "go",
                "timestamp": 0
            }"#;
            assert!(Message::parse(text).is_none());
        }

        #[test]
        fn payload_defaults_to_null() {
            let text = r#"{
                "id": "req-3",
                "channel": "system",
                "action": "version",
                "timestamp": 0
            }"#;
            let message = Message::parse(text).unwrap();
            assert!(message.payload.is_null());
        }
    }

    mod response_tests {
        use super::*;

        #[test]
        fn success_omits_error_field() {
            let response = Response::ok("req-1", json!({"found": 2}), 42);
            let wire = serde_json::to_value(&response).unwrap();
            assert_eq!(wire["success"], true);
            assert_eq!(wire["id"], "req-1");
            assert!(wire.get("error").is_none());
        }

        #[test]
        fn failure_carries_message_and_echoes_id() {
            let response = Response::err("req-9", "Element not found: #x", 42);
            let wire = serde_json::to_value(&response).unwrap();
            assert_eq!(wire["success"], false);
            assert_eq!(wire["id"], "req-9");
            assert_eq!(wire["error"], "Element not found: #x");
            assert!(wire.get("data").is_none());
        }
    }

    #[test]
    fn pushes_are_engine_sourced() {
        let push = Message::push("evt-1", Channel::Semantic, "event", json!({}), 7);
        assert_eq!(push.source, "engine");
        assert_eq!(push.channel, Channel::Semantic);
    }
}
