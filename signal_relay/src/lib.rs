//! Room-based WebSocket signaling relay for WebRTC
//!
//! Peers connect over a WebSocket, join named rooms and exchange opaque
//! negotiation payloads (offers, answers, ICE candidates) with the other
//! members of their room. The relay never looks inside those payloads and
//! keeps nothing once the last member of a room leaves.
//!
//! # Protocol
//!
//! Every frame is a JSON object with a `type` field.
//!
//! ## Server → client
//!
//! - `{"type":"id","id":"<id>"}` - Your peer ID, sent on connect
//! - `{"type":"peers","peers":[{"id":"<id>","username":"<name>"}]}` - Members
//!   already in the room you just joined
//! - `{"type":"peer-joined","id":"<id>","username":"<name>"}` - New member
//! - `{"type":"peer-left","id":"<id>"}` - Member left or disconnected
//! - `offer` / `answer` / `ice` - Forwarded signal with `from` set to the sender
//!
//! ## Client → server
//!
//! - `{"type":"join","room":"<room>","username":"<name>"}` - `username` optional
//! - `{"type":"offer"|"answer"|"ice","room":"<room>","to":"<id>",...}` - Relay
//!   to `to`, or to every other member when `to` is absent
//! - `{"type":"leave"}` - Leave the current room
//!
//! Frames that fail to parse, or have an unknown `type`, are dropped without
//! reply.
//!
//! # Example
//!
//! ```bash
//! # Start the server
//! signal-relay --port 8080
//!
//! # Talk to it
//! websocat ws://127.0.0.1:8080/
//! {"type":"join","room":"my_room","username":"Alice"}
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod handler;
pub mod id;
pub mod protocol;
pub mod state;

pub use config::{RelayConfig, ServerConfig};
pub use error::{ClientRequestError, SignalingError};
pub use handler::router;
pub use id::PeerId;
pub use protocol::{ClientMessage, ServerMessage};
pub use state::{PeerSender, RoomId, ServerState, TransportEvent};
