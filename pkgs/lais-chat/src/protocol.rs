//! Realtime socket frames
//!
//! Every frame is a JSON object discriminated by its `type` field. Inbound
//! frames with a `type` this client does not know decode to
//! [`InboundFrame::Unknown`] and are ignored by the session.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Message;

/// Frames sent by the client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Message {
        message_text: String,
        sender_is_registered: bool,
    },
    Typing {
        is_typing: bool,
    },
    /// Server-side read marker; the session uses the REST receipt instead
    Read,
}

impl OutboundFrame {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Frames pushed by the server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Message {
        message: Message,
    },
    Typing {
        #[serde(deserialize_with = "user_id")]
        user_id: String,
        #[serde(default)]
        is_typing: bool,
    },
    OnlineUsers {
        #[serde(default)]
        users: Vec<Value>,
    },
    MessagesRead {
        #[serde(default)]
        count: u32,
        #[serde(default, deserialize_with = "optional_user_id")]
        user_id: Option<String>,
    },
    UserDisconnected {
        #[serde(deserialize_with = "user_id")]
        user_id: String,
    },
    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Normalise an online-user entry to its id string
pub fn user_id_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn user_id<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(user_id_of(&Value::deserialize(deserializer)?))
}

fn optional_user_id<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<Value>::deserialize(deserializer)?
        .filter(|v| !v.is_null())
        .map(|v| user_id_of(&v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_wire_shape() {
        let frame = OutboundFrame::Message {
            message_text: "Hello".to_string(),
            sender_is_registered: false,
        };
        let value: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "message", "message_text": "Hello", "sender_is_registered": false})
        );

        let typing: Value =
            serde_json::from_str(&OutboundFrame::Typing { is_typing: true }.encode().unwrap())
                .unwrap();
        assert_eq!(typing, json!({"type": "typing", "is_typing": true}));

        let read: Value = serde_json::from_str(&OutboundFrame::Read.encode().unwrap()).unwrap();
        assert_eq!(read, json!({"type": "read"}));
    }

    #[test]
    fn test_decode_message_frame() {
        let frame = InboundFrame::decode(
            r#"{"type":"message","message":{"id":5,"chat_id":1,"sender_id":"u1",
                "sender_is_registered":false,"message_text":"hi","is_read":false,
                "created_at":"2024-05-01T10:00:00"}}"#,
        )
        .unwrap();

        match frame {
            InboundFrame::Message { message } => {
                assert_eq!(message.text, "hi");
                assert_eq!(message.sender_id, "u1");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_decode_typing_with_numeric_user() {
        let frame = InboundFrame::decode(r#"{"type":"typing","user_id":12,"is_typing":true}"#)
            .unwrap();
        assert_eq!(
            frame,
            InboundFrame::Typing {
                user_id: "12".to_string(),
                is_typing: true
            }
        );
    }

    #[test]
    fn test_decode_read_and_presence_frames() {
        assert_eq!(
            InboundFrame::decode(r#"{"type":"messages_read","count":3}"#).unwrap(),
            InboundFrame::MessagesRead {
                count: 3,
                user_id: None
            }
        );
        assert_eq!(
            InboundFrame::decode(r#"{"type":"user_disconnected","user_id":"x"}"#).unwrap(),
            InboundFrame::UserDisconnected {
                user_id: "x".to_string()
            }
        );
        assert!(matches!(
            InboundFrame::decode(r#"{"type":"online_users","users":["a",1]}"#).unwrap(),
            InboundFrame::OnlineUsers { users } if users.len() == 2
        ));
    }

    #[test]
    fn test_unknown_type_is_tolerated() {
        assert_eq!(
            InboundFrame::decode(r#"{"type":"server_stats","load":0.4}"#).unwrap(),
            InboundFrame::Unknown
        );
    }

    #[test]
    fn test_malformed_frame_is_error() {
        assert!(InboundFrame::decode("not json").is_err());
        assert!(InboundFrame::decode(r#"{"no_type":true}"#).is_err());
    }
}
