//! Binary framing for deltas, presence and room events.
//!
//! Every frame is one bincode-encoded `SyncMessage`:
//! ```text
//! msg_type │ peer_id │ room_id │ clock  │ payload
//!  u8      │ 16 B    │ 16 B    │ varint │ len-prefixed bytes
//! ```
//!
//! Delta and sync payloads are opaque replica encodings. Presence, snapshot
//! and peer payloads are themselves bincode-encoded.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::presence::{CursorColor, PresenceMessage};
use crate::room::RoomSnapshot;

/// Frame kind. The discriminants are part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Encoded state vector; asks peers for missing updates
    SyncStep1 = 1,
    /// Missing updates answering a SyncStep1
    SyncStep2 = 2,
    /// Incremental or full-state replica update
    Delta = 3,
    /// Cursor/selection report or join/leave
    Presence = 4,
    /// Authoritative room code for late joiners
    Snapshot = 5,
    /// A link connected; payload is its `PeerInfo`
    PeerJoined = 6,
    /// A link disconnected; empty payload
    PeerLeft = 7,
}

/// Who is on the other end of a link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeerInfo {
    pub peer_id: Uuid,
    pub name: String,
    pub color: CursorColor,
}

impl PeerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name)
    }

    /// Color is derived from the id, so it is the same on every peer.
    pub fn with_id(peer_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            peer_id,
            name: name.into(),
            color: CursorColor::from_uuid(peer_id),
        }
    }
}

/// One frame on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
    pub msg_type: MessageType,
    pub peer_id: Uuid,
    pub room_id: Uuid,
    /// Lamport clock of the sending link
    pub clock: u64,
    pub payload: Vec<u8>,
}

impl SyncMessage {
    fn raw(msg_type: MessageType, peer_id: Uuid, room_id: Uuid, clock: u64, payload: Vec<u8>) -> Self {
        Self {
            msg_type,
            peer_id,
            room_id,
            clock,
            payload,
        }
    }

    pub fn delta(peer_id: Uuid, room_id: Uuid, clock: u64, update: Vec<u8>) -> Self {
        Self::raw(MessageType::Delta, peer_id, room_id, clock, update)
    }

    /// Ask peers for what the holder of `state_vector` is missing.
    pub fn sync_step1(peer_id: Uuid, room_id: Uuid, clock: u64, state_vector: Vec<u8>) -> Self {
        Self::raw(MessageType::SyncStep1, peer_id, room_id, clock, state_vector)
    }

    pub fn sync_step2(peer_id: Uuid, room_id: Uuid, clock: u64, state_diff: Vec<u8>) -> Self {
        Self::raw(MessageType::SyncStep2, peer_id, room_id, clock, state_diff)
    }

    pub fn presence(
        peer_id: Uuid,
        room_id: Uuid,
        clock: u64,
        message: &PresenceMessage,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::raw(MessageType::Presence, peer_id, room_id, clock, encode_payload(message)?))
    }

    pub fn snapshot(
        peer_id: Uuid,
        room_id: Uuid,
        clock: u64,
        snapshot: &RoomSnapshot,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::raw(MessageType::Snapshot, peer_id, room_id, clock, encode_payload(snapshot)?))
    }

    pub fn peer_joined(room_id: Uuid, clock: u64, info: &PeerInfo) -> Result<Self, ProtocolError> {
        Ok(Self::raw(MessageType::PeerJoined, info.peer_id, room_id, clock, encode_payload(info)?))
    }

    pub fn peer_left(peer_id: Uuid, room_id: Uuid, clock: u64) -> Self {
        Self::raw(MessageType::PeerLeft, peer_id, room_id, clock, Vec::new())
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        encode_payload(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode_payload(bytes)
    }

    /// Payload of a `Presence` frame.
    pub fn presence_message(&self) -> Result<PresenceMessage, ProtocolError> {
        self.expect_type(MessageType::Presence)?;
        decode_payload(&self.payload)
    }

    pub fn room_snapshot(&self) -> Result<RoomSnapshot, ProtocolError> {
        self.expect_type(MessageType::Snapshot)?;
        decode_payload(&self.payload)
    }

    /// Payload of a `PeerJoined` frame.
    pub fn peer_info(&self) -> Result<PeerInfo, ProtocolError> {
        self.expect_type(MessageType::PeerJoined)?;
        decode_payload(&self.payload)
    }

    fn expect_type(&self, expected: MessageType) -> Result<(), ProtocolError> {
        if self.msg_type == expected {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedType {
                expected,
                found: self.msg_type,
            })
        }
    }
}

fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ProtocolError::Encode(e.to_string()))
}

fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ProtocolError::Decode(e.to_string()))?;
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    Encode(String),
    Decode(String),
    /// A payload accessor was called on the wrong kind of frame.
    UnexpectedType { expected: MessageType, found: MessageType },
    /// The link is offline and its queue is full.
    QueueFull,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "failed to encode frame: {e}"),
            Self::Decode(e) => write!(f, "failed to decode frame: {e}"),
            Self::UnexpectedType { expected, found } => {
                write!(f, "expected a {expected:?} frame, got {found:?}")
            }
            Self::QueueFull => write!(f, "offline queue is full"),
        }
    }
}

impl std::error::Error for ProtocolError {}
