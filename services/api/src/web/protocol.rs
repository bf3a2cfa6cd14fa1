//! services/api/src/web/protocol.rs
//!
//! Defines the push protocol between the browser client and the API server.

use serde::{Deserialize, Serialize};

/// Sent once to a logged-in connection right after the handshake.
pub const WELCOME_EVENT: &str = "welcome";

/// Sent to a question author's room when someone answers their question.
pub const ANSWER_POSTED_EVENT: &str = "answer_posted";

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to a room. Clients send their own user id right after connecting.
    Join { room: String },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// A named event with a JSON payload, written as one text frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub event: String,
    pub data: serde_json::Value,
}

impl PushEvent {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_message_parses() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join","room":"abc"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Join { room: "abc".into() });
    }

    #[test]
    fn unknown_client_message_is_an_error() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"leave"}"#).is_err());
    }

    #[test]
    fn event_wire_shape() {
        let e = PushEvent::new(ANSWER_POSTED_EVENT, json!({"url": "/questions/1#2"}));
        assert_eq!(
            serde_json::to_value(&e).unwrap(),
            json!({"event": "answer_posted", "data": {"url": "/questions/1#2"}})
        );
    }
}
