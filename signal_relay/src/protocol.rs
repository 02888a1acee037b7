//! Wire messages exchanged between peers and the relay
//!
//! Every frame is a JSON object discriminated by its `type` field. Client
//! requests parse through [`ClientMessage`]'s `FromStr`, server events
//! serialize through [`ServerMessage`]'s `Display`.

use crate::error::ClientRequestError;
use crate::id::PeerId;
use crate::state::RoomId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Display name used when a peer joins without one.
pub const DEFAULT_USERNAME: &str = "Anon";

const CLIENT_KINDS: [&str; 5] = ["join", "offer", "answer", "ice", "leave"];

/// Negotiation payload routed between peers of a room.
///
/// Only `room` and `to` are interpreted; every other field is carried
/// through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub room: RoomId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<PeerId>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Signal {
    /// Target of a unicast delivery, if any. An empty `to` means broadcast.
    pub fn target(&self) -> Option<&PeerId> {
        self.to.as_ref().filter(|to| !to.as_str().is_empty())
    }
}

/// Requests sent by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    Join {
        room: RoomId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
    },
    Offer(Signal),
    Answer(Signal),
    Ice(Signal),
    Leave {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<RoomId>,
    },
}

impl FromStr for ClientMessage {
    type Err = ClientRequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let object: Map<String, Value> = serde_json::from_str(s)?;
        match object.get("type").and_then(Value::as_str) {
            Some(kind) if CLIENT_KINDS.contains(&kind) => {
                Ok(serde_json::from_value(Value::Object(object))?)
            }
            _ => Err(ClientRequestError::UnsupportedType),
        }
    }
}

/// A room member as listed in a `peers` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub username: String,
}

/// A signal on its way out, stamped with the sender's identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relayed {
    pub from: PeerId,
    #[serde(flatten)]
    pub signal: Signal,
}

impl Relayed {
    /// Stamp `signal` with its sender, replacing any `from` the client set.
    pub fn new(from: PeerId, mut signal: Signal) -> Self {
        signal.fields.remove("from");
        Self { from, signal }
    }
}

/// Events sent by the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Id { id: PeerId },
    PeerJoined { id: PeerId, username: String },
    Peers { peers: Vec<PeerInfo> },
    PeerLeft { id: PeerId },
    Offer(Relayed),
    Answer(Relayed),
    Ice(Relayed),
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_join_with_and_without_username() {
        let join: ClientMessage = r#"{"type":"join","room":"r1","username":"Alice"}"#
            .parse()
            .unwrap();
        assert_eq!(
            join,
            ClientMessage::Join {
                room: RoomId("r1".into()),
                username: Some("Alice".into()),
            }
        );

        let anon: ClientMessage = r#"{"type":"join","room":"r1"}"#.parse().unwrap();
        assert_eq!(
            anon,
            ClientMessage::Join {
                room: RoomId("r1".into()),
                username: None,
            }
        );
    }

    #[test]
    fn signal_keeps_passthrough_fields() {
        let msg: ClientMessage =
            r#"{"type":"ice","room":"r","to":"b","candidate":{"sdpMid":"0"},"n":3}"#
                .parse()
                .unwrap();
        let ClientMessage::Ice(signal) = msg else {
            panic!("expected ice");
        };
        assert_eq!(signal.room, RoomId("r".into()));
        assert_eq!(signal.target(), Some(&PeerId::from("b")));
        assert_eq!(signal.fields.get("candidate"), Some(&json!({"sdpMid": "0"})));
        assert_eq!(signal.fields.get("n"), Some(&json!(3)));
        assert!(!signal.fields.contains_key("type"));
    }

    #[test]
    fn empty_target_means_broadcast() {
        let msg: ClientMessage = r#"{"type":"offer","room":"r","to":""}"#.parse().unwrap();
        let ClientMessage::Offer(signal) = msg else {
            panic!("expected offer");
        };
        assert!(signal.target().is_none());
    }

    #[test]
    fn leave_room_is_optional() {
        let msg: ClientMessage = r#"{"type":"leave"}"#.parse().unwrap();
        assert_eq!(msg, ClientMessage::Leave { room: None });
    }

    #[test]
    fn rejects_malformed_frames() {
        for raw in ["not json", "[1,2]", "42", r#"{"type":"join"}"#, r#"{"type":"offer"}"#] {
            assert!(
                matches!(raw.parse::<ClientMessage>(), Err(ClientRequestError::Json(_))),
                "{raw} should be a json error"
            );
        }
    }

    #[test]
    fn rejects_unknown_kinds() {
        for raw in [r#"{"type":"chat","room":"r"}"#, r#"{"room":"r"}"#, r#"{"type":7}"#] {
            assert!(
                matches!(
                    raw.parse::<ClientMessage>(),
                    Err(ClientRequestError::UnsupportedType)
                ),
                "{raw} should be unsupported"
            );
        }
    }

    #[test]
    fn server_events_use_wire_names() {
        let id = PeerId::from("a");
        let event: Value =
            serde_json::from_str(&ServerMessage::Id { id: id.clone() }.to_string()).unwrap();
        assert_eq!(event, json!({"type": "id", "id": "a"}));

        let event: Value = serde_json::from_str(
            &ServerMessage::PeerJoined {
                id: id.clone(),
                username: "Alice".into(),
            }
            .to_string(),
        )
        .unwrap();
        assert_eq!(event, json!({"type": "peer-joined", "id": "a", "username": "Alice"}));

        let event: Value =
            serde_json::from_str(&ServerMessage::PeerLeft { id }.to_string()).unwrap();
        assert_eq!(event, json!({"type": "peer-left", "id": "a"}));
    }

    #[test]
    fn relayed_signal_overrides_client_from() {
        let msg: ClientMessage =
            r#"{"type":"answer","room":"r","from":"mallory","sdp":"X"}"#.parse().unwrap();
        let ClientMessage::Answer(signal) = msg else {
            panic!("expected answer");
        };
        let out = ServerMessage::Answer(Relayed::new(PeerId::from("a"), signal));
        let event: Value = serde_json::from_str(&out.to_string()).unwrap();
        assert_eq!(
            event,
            json!({"type": "answer", "room": "r", "from": "a", "sdp": "X"})
        );
    }
}
