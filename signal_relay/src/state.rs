//! Server state management for the signaling relay
//!
//! This module owns the connection registry and the room directory, and
//! routes parsed client messages between the members of a room.
//!
//! Both tables are sharded maps, so unrelated rooms and peers never contend
//! on one lock. A room's read-modify-write runs under that room's entry lock.
//! A peer's metadata is only ever mutated by the task serving that peer's
//! connection, which keeps per-connection handling sequential.

use crate::error::SignalingError;
use crate::id::PeerId;
use crate::protocol::{ClientMessage, DEFAULT_USERNAME, PeerInfo, Relayed, ServerMessage, Signal};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Room identifier
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(pub String);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outbound half of a peer's transport.
///
/// Frames are queued for the task that owns the socket. The peer counts as
/// open for as long as that task holds the receiving end.
#[derive(Debug, Clone)]
pub struct PeerSender(mpsc::Sender<String>);

impl PeerSender {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self(tx)
    }

    pub fn is_open(&self) -> bool {
        !self.0.is_closed()
    }

    /// Queue an already serialized frame without waiting.
    pub fn send_frame(&self, frame: String) -> Result<(), SignalingError> {
        self.0.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => SignalingError::QueueFull,
            TrySendError::Closed(_) => SignalingError::Closed,
        })
    }

    pub fn send(&self, message: &ServerMessage) -> Result<(), SignalingError> {
        self.send_frame(serde_json::to_string(message)?)
    }
}

/// Something the transport observed on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived
    Frame(String),
    /// The connection closed
    Closed,
    /// The connection failed
    Errored(String),
}

/// Registry metadata for a live connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerMetadata {
    /// Room the peer currently belongs to
    pub room: Option<RoomId>,
    pub username: String,
}

#[derive(Debug)]
struct PeerEntry {
    sender: PeerSender,
    meta: PeerMetadata,
}

/// A member resolved from the directory, ready for delivery
#[derive(Debug, Clone)]
struct Member {
    id: PeerId,
    username: String,
    sender: PeerSender,
}

#[derive(Default, Debug)]
struct InnerState {
    /// Map of peer ID -> registry entry
    peers: DashMap<PeerId, PeerEntry>,
    /// Map of room -> peers in that room. Never holds an empty set.
    rooms: DashMap<RoomId, HashSet<PeerId>>,
}

/// The relay service: registry, directory and router behind a shared handle
#[derive(Default, Clone, Debug)]
pub struct ServerState {
    inner: Arc<InnerState>,
}

impl ServerState {
    /// Create a new, empty relay
    pub fn new() -> Self {
        Self::default()
    }

    // Lifecycle

    /// Register a new connection and announce its identifier to it.
    pub fn connect(&self, sender: PeerSender) -> PeerId {
        let id = PeerId::generate();
        let announce = ServerMessage::Id { id: id.clone() };
        if let Err(err) = sender.send(&announce) {
            debug!(peer = %id, "failed to announce id: {err}");
        }
        self.inner.peers.insert(
            id.clone(),
            PeerEntry {
                sender,
                meta: PeerMetadata {
                    room: None,
                    username: DEFAULT_USERNAME.to_string(),
                },
            },
        );
        info!(peer = %id, "peer connected");
        id
    }

    /// Feed one transport event for `peer` through the relay.
    pub fn dispatch(&self, peer: &PeerId, event: TransportEvent) {
        match event {
            TransportEvent::Frame(raw) => self.handle_message(peer, &raw),
            TransportEvent::Closed => {
                info!(peer = %peer, "peer disconnected");
                self.disconnect(peer);
            }
            TransportEvent::Errored(reason) => {
                warn!(peer = %peer, "peer connection failed: {reason}");
                self.disconnect(peer);
            }
        }
    }

    /// Tear down a connection: leave its room, then forget it.
    ///
    /// Safe to call more than once and after an explicit leave.
    pub fn disconnect(&self, peer: &PeerId) {
        self.leave(peer);
        self.unregister(peer);
    }

    // Router

    /// Parse a raw frame and act on it. Malformed or unknown frames are dropped.
    pub fn handle_message(&self, peer: &PeerId, raw: &str) {
        let message = match raw.parse::<ClientMessage>() {
            Ok(message) => message,
            Err(err) => {
                debug!(peer = %peer, "dropping frame: {err}");
                return;
            }
        };

        match message {
            ClientMessage::Join { room, username } => self.join(peer, room, username),
            ClientMessage::Offer(signal) => self.relay(peer, signal, ServerMessage::Offer),
            ClientMessage::Answer(signal) => self.relay(peer, signal, ServerMessage::Answer),
            ClientMessage::Ice(signal) => self.relay(peer, signal, ServerMessage::Ice),
            ClientMessage::Leave { .. } => self.leave(peer),
        }
    }

    /// Put `peer` in `room`, announce it to the members already there and
    /// hand it the list of those members.
    pub fn join(&self, peer: &PeerId, room: RoomId, username: Option<String>) {
        let Some(meta) = self.lookup(peer) else {
            debug!(peer = %peer, "join from unregistered peer");
            return;
        };
        if meta.room.as_ref().is_some_and(|current| *current != room) {
            self.leave(peer);
        }

        let username = username
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_USERNAME.to_string());
        self.set_room(peer, Some(room.clone()));
        self.set_name(peer, username.clone());

        let existing: Vec<Member> = self
            .join_room(&room, peer)
            .into_iter()
            .filter(|id| id != peer)
            .filter_map(|id| self.open_member(&id))
            .collect();
        info!(peer = %peer, room = %room, %username, members = existing.len() + 1, "peer joined");

        let joined = ServerMessage::PeerJoined {
            id: peer.clone(),
            username,
        };
        self.broadcast(&existing, &joined);

        let peers = ServerMessage::Peers {
            peers: existing
                .into_iter()
                .map(|member| PeerInfo {
                    id: member.id,
                    username: member.username,
                })
                .collect(),
        };
        if let Some(sender) = self.sender(peer) {
            deliver(peer, &sender, &peers);
        }
    }

    /// Remove `peer` from the room it is recorded in and tell the remaining
    /// members. A peer with no room is left alone.
    pub fn leave(&self, peer: &PeerId) {
        let Some(room) = self.take_room(peer) else {
            debug!(peer = %peer, "leave without a room");
            return;
        };
        if !self.leave_room(&room, peer) {
            return;
        }
        info!(peer = %peer, room = %room, "peer left");
        let left = ServerMessage::PeerLeft { id: peer.clone() };
        self.broadcast(&self.members_except(&room, peer), &left);
    }

    /// Forward a negotiation message to one member, or to every other member.
    fn relay(&self, peer: &PeerId, signal: Signal, wrap: fn(Relayed) -> ServerMessage) {
        let in_room = self
            .lookup(peer)
            .is_some_and(|meta| meta.room.as_ref() == Some(&signal.room));
        if !in_room {
            debug!(peer = %peer, room = %signal.room, "signal for a room the peer is not in");
            return;
        }

        let room = signal.room.clone();
        let target = signal.target().cloned();
        match target {
            Some(target) => match self.find_member(&room, &target) {
                Some(sender) => {
                    let message = wrap(Relayed::new(peer.clone(), signal));
                    deliver(&target, &sender, &message);
                }
                None => debug!(peer = %peer, %target, room = %room, "signal target not found"),
            },
            None => {
                let message = wrap(Relayed::new(peer.clone(), signal));
                self.broadcast(&self.members_except(&room, peer), &message);
            }
        }
    }

    fn broadcast(&self, members: &[Member], message: &ServerMessage) {
        if members.is_empty() {
            return;
        }
        let frame = message.to_string();
        for member in members {
            if let Err(err) = member.sender.send_frame(frame.clone()) {
                debug!(peer = %member.id, "delivery failed: {err}");
            }
        }
    }

    // Connection registry

    /// Metadata recorded for `peer`, if it is registered
    pub fn lookup(&self, peer: &PeerId) -> Option<PeerMetadata> {
        self.inner.peers.get(peer).map(|entry| entry.meta.clone())
    }

    fn sender(&self, peer: &PeerId) -> Option<PeerSender> {
        self.inner.peers.get(peer).map(|entry| entry.sender.clone())
    }

    fn set_room(&self, peer: &PeerId, room: Option<RoomId>) {
        if let Some(mut entry) = self.inner.peers.get_mut(peer) {
            entry.meta.room = room;
        }
    }

    fn set_name(&self, peer: &PeerId, username: String) {
        if let Some(mut entry) = self.inner.peers.get_mut(peer) {
            entry.meta.username = username;
        }
    }

    /// Clear the peer's room and return what it was.
    fn take_room(&self, peer: &PeerId) -> Option<RoomId> {
        self.inner
            .peers
            .get_mut(peer)
            .and_then(|mut entry| entry.meta.room.take())
    }

    /// Forget `peer`. Unknown peers are ignored.
    pub fn unregister(&self, peer: &PeerId) {
        self.inner.peers.remove(peer);
    }

    fn open_member(&self, id: &PeerId) -> Option<Member> {
        let entry = self.inner.peers.get(id)?;
        entry.sender.is_open().then(|| Member {
            id: id.clone(),
            username: entry.meta.username.clone(),
            sender: entry.sender.clone(),
        })
    }

    // Room directory

    /// Add `peer` to `room`, creating the room if needed. Returns the members
    /// present before the insert.
    fn join_room(&self, room: &RoomId, peer: &PeerId) -> Vec<PeerId> {
        let mut members = self.inner.rooms.entry(room.clone()).or_default();
        let existing = members.iter().cloned().collect();
        members.insert(peer.clone());
        existing
    }

    /// Remove `peer` from `room`, dropping the room once it is empty.
    /// Returns whether the peer was a member.
    fn leave_room(&self, room: &RoomId, peer: &PeerId) -> bool {
        let removed = self
            .inner
            .rooms
            .get_mut(room)
            .map(|mut members| members.remove(peer))
            .unwrap_or(false);
        self.inner.rooms.remove_if(room, |_, members| members.is_empty());
        removed
    }

    /// Open members of `room` other than `peer`
    fn members_except(&self, room: &RoomId, peer: &PeerId) -> Vec<Member> {
        self.room_members(room)
            .iter()
            .filter(|id| *id != peer)
            .filter_map(|id| self.open_member(id))
            .collect()
    }

    /// Sender for the open member of `room` whose identifier is `target`
    fn find_member(&self, room: &RoomId, target: &PeerId) -> Option<PeerSender> {
        let is_member = self
            .inner
            .rooms
            .get(room)
            .is_some_and(|members| members.contains(target));
        if !is_member {
            return None;
        }
        self.open_member(target).map(|member| member.sender)
    }

    /// Get all peers in a room
    pub fn room_members(&self, room: &RoomId) -> Vec<PeerId> {
        self.inner
            .rooms
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_room(&self, room: &RoomId) -> bool {
        self.inner.rooms.contains_key(room)
    }

    pub fn room_count(&self) -> usize {
        self.inner.rooms.len()
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers.len()
    }
}

fn deliver(peer: &PeerId, sender: &PeerSender, message: &ServerMessage) {
    if let Err(err) = sender.send(message) {
        debug!(peer = %peer, "delivery failed: {err}");
    }
}
