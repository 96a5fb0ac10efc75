//! Framing between one session and the room transport.
//!
//! Provides:
//! - Lamport-clocked `SyncMessage` frames for deltas, presence and sync
//! - Offline queue for deltas produced while disconnected
//! - Replay plus a sync request on reconnect
//! - Filtering of our own frames and other rooms' frames
//!
//! The transport itself (socket, relay) is external: the link only turns
//! session output into bytes and bytes into [`LinkEvent`]s.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::presence::PresenceMessage;
use crate::protocol::{MessageType, PeerInfo, ProtocolError, SyncMessage};
use crate::room::RoomSnapshot;

/// Link connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Decoded inbound frame addressed to this participant.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    RemoteDelta { peer_id: Uuid, clock: u64, update: Vec<u8> },
    /// A peer asks for the updates it is missing.
    SyncRequest { peer_id: Uuid, state_vector: Vec<u8> },
    /// Updates we were missing.
    SyncAnswer { peer_id: Uuid, update: Vec<u8> },
    Presence { peer_id: Uuid, message: PresenceMessage },
    Snapshot(RoomSnapshot),
    PeerJoined(PeerInfo),
    PeerLeft(Uuid),
}

/// Offline queue for deltas produced while disconnected.
///
/// Queued deltas are replayed in order on reconnection.
pub struct OfflineQueue {
    queue: VecDeque<QueuedDelta>,
    max_size: usize,
}

#[derive(Debug, Clone)]
struct QueuedDelta {
    clock: u64,
    payload: Vec<u8>,
}

impl OfflineQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Queue a delta for later replay. Returns `false` if full.
    pub fn enqueue(&mut self, clock: u64, payload: Vec<u8>) -> bool {
        if self.queue.len() >= self.max_size {
            return false;
        }
        self.queue.push_back(QueuedDelta { clock, payload });
        true
    }

    pub fn drain(&mut self) -> Vec<(u64, Vec<u8>)> {
        self.queue.drain(..).map(|d| (d.clock, d.payload)).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn total_bytes(&self) -> usize {
        self.queue.iter().map(|d| d.payload.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub offline_queue_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            offline_queue_capacity: 10_000,
        }
    }
}

pub struct PeerLink {
    peer: PeerInfo,
    room_id: Uuid,
    state: ConnectionState,
    /// Lamport clock, bumped on send and merged on receive
    clock: u64,
    offline_queue: OfflineQueue,
}

impl PeerLink {
    pub fn new(peer: PeerInfo, room_id: Uuid, config: &LinkConfig) -> Self {
        Self {
            peer,
            room_id,
            state: ConnectionState::Disconnected,
            clock: 0,
            offline_queue: OfflineQueue::new(config.offline_queue_capacity),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Mark the link connected and return the frames to send first: the
    /// join notice, every queued delta, then a sync request built from
    /// `state_vector`.
    pub fn connect(&mut self, state_vector: Vec<u8>) -> Result<Vec<Vec<u8>>, ProtocolError> {
        self.state = ConnectionState::Connected;

        let mut frames = Vec::with_capacity(self.offline_queue.len() + 2);
        let clock = self.tick();
        frames.push(SyncMessage::peer_joined(self.room_id, clock, &self.peer)?.encode()?);

        let queued = self.offline_queue.drain();
        if !queued.is_empty() {
            log::info!("Replaying {} queued deltas", queued.len());
        }
        for (clock, payload) in queued {
            frames.push(SyncMessage::delta(self.peer.peer_id, self.room_id, clock, payload).encode()?);
        }

        let clock = self.tick();
        frames.push(SyncMessage::sync_step1(self.peer.peer_id, self.room_id, clock, state_vector).encode()?);
        Ok(frames)
    }

    /// Mark the link disconnected. Returns a leave notice if it was
    /// connected.
    pub fn disconnect(&mut self) -> Option<Vec<u8>> {
        if self.state != ConnectionState::Connected {
            return None;
        }
        self.state = ConnectionState::Disconnected;
        let clock = self.tick();
        SyncMessage::peer_left(self.peer.peer_id, self.room_id, clock).encode().ok()
    }

    /// Frame a delta. While disconnected it is queued and `None` is
    /// returned.
    pub fn send_delta(&mut self, update: Vec<u8>) -> Result<Option<Vec<u8>>, ProtocolError> {
        let clock = self.tick();

        if self.state != ConnectionState::Connected {
            if !self.offline_queue.enqueue(clock, update) {
                log::warn!("Offline queue full, delta rejected");
                return Err(ProtocolError::QueueFull);
            }
            return Ok(None);
        }

        SyncMessage::delta(self.peer.peer_id, self.room_id, clock, update)
            .encode()
            .map(Some)
    }

    /// Frame a presence message. Dropped while disconnected.
    pub fn send_presence(&mut self, message: &PresenceMessage) -> Result<Option<Vec<u8>>, ProtocolError> {
        if self.state != ConnectionState::Connected {
            return Ok(None);
        }
        let clock = self.clock;
        SyncMessage::presence(self.peer.peer_id, self.room_id, clock, message)?
            .encode()
            .map(Some)
    }

    /// Frame a sync request for the updates `state_vector` is missing.
    pub fn send_sync_request(&mut self, state_vector: Vec<u8>) -> Result<Vec<u8>, ProtocolError> {
        let clock = self.tick();
        SyncMessage::sync_step1(self.peer.peer_id, self.room_id, clock, state_vector).encode()
    }

    /// Frame the answer to a sync request.
    pub fn send_sync_answer(&mut self, update: Vec<u8>) -> Result<Vec<u8>, ProtocolError> {
        let clock = self.tick();
        SyncMessage::sync_step2(self.peer.peer_id, self.room_id, clock, update).encode()
    }

    pub fn send_snapshot(&mut self, snapshot: &RoomSnapshot) -> Result<Vec<u8>, ProtocolError> {
        let clock = self.tick();
        SyncMessage::snapshot(self.peer.peer_id, self.room_id, clock, snapshot)?.encode()
    }

    /// Decode an inbound frame. Our own frames and frames for other rooms
    /// yield `Ok(None)`.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<Option<LinkEvent>, ProtocolError> {
        let msg = SyncMessage::decode(bytes)?;
        if msg.peer_id == self.peer.peer_id || msg.room_id != self.room_id {
            return Ok(None);
        }
        self.clock = self.clock.max(msg.clock);

        let event = match msg.msg_type {
            MessageType::Delta => LinkEvent::RemoteDelta {
                peer_id: msg.peer_id,
                clock: msg.clock,
                update: msg.payload,
            },
            MessageType::SyncStep1 => LinkEvent::SyncRequest {
                peer_id: msg.peer_id,
                state_vector: msg.payload,
            },
            MessageType::SyncStep2 => LinkEvent::SyncAnswer {
                peer_id: msg.peer_id,
                update: msg.payload,
            },
            MessageType::Presence => LinkEvent::Presence {
                peer_id: msg.peer_id,
                message: msg.presence_message()?,
            },
            MessageType::Snapshot => LinkEvent::Snapshot(msg.room_snapshot()?),
            MessageType::PeerJoined => LinkEvent::PeerJoined(msg.peer_info()?),
            MessageType::PeerLeft => LinkEvent::PeerLeft(msg.peer_id),
        };
        Ok(Some(event))
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer_info(&self) -> &PeerInfo {
        &self.peer
    }

    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn offline_queue_len(&self) -> usize {
        self.offline_queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::{PresenceReport, WirePosition};

    fn link(room: Uuid) -> PeerLink {
        PeerLink::new(PeerInfo::new("TestUser"), room, &LinkConfig::default())
    }

    #[test]
    fn test_initial_state() {
        let l = link(Uuid::new_v4());
        assert_eq!(l.connection_state(), ConnectionState::Disconnected);
        assert_eq!(l.clock(), 0);
        assert_eq!(l.offline_queue_len(), 0);
    }

    #[test]
    fn test_send_delta_offline_queues() {
        let mut l = link(Uuid::new_v4());
        assert_eq!(l.send_delta(vec![1, 2, 3]).unwrap(), None);
        assert_eq!(l.send_delta(vec![4, 5, 6]).unwrap(), None);
        assert_eq!(l.offline_queue_len(), 2);
        assert_eq!(l.clock(), 2);
    }

    #[test]
    fn test_presence_dropped_offline() {
        let mut l = link(Uuid::new_v4());
        let msg = PresenceMessage::Leave { participant_id: Uuid::new_v4() };
        assert_eq!(l.send_presence(&msg).unwrap(), None);
        assert_eq!(l.offline_queue_len(), 0);
    }

    #[test]
    fn test_connect_replays_then_requests_sync() {
        let room = Uuid::new_v4();
        let mut l = link(room);
        l.send_delta(vec![1]).unwrap();
        l.send_delta(vec![2]).unwrap();

        let frames = l.connect(vec![9, 9]).unwrap();
        assert_eq!(frames.len(), 4);
        assert_eq!(l.offline_queue_len(), 0);

        let types: Vec<MessageType> = frames
            .iter()
            .map(|f| SyncMessage::decode(f).unwrap().msg_type)
            .collect();
        assert_eq!(
            types,
            vec![MessageType::PeerJoined, MessageType::Delta, MessageType::Delta, MessageType::SyncStep1]
        );
        let first = SyncMessage::decode(&frames[1]).unwrap();
        let second = SyncMessage::decode(&frames[2]).unwrap();
        assert_eq!(first.payload, vec![1]);
        assert!(first.clock < second.clock);
    }

    #[test]
    fn test_queue_capacity() {
        let config = LinkConfig { offline_queue_capacity: 1 };
        let mut l = PeerLink::new(PeerInfo::new("a"), Uuid::new_v4(), &config);
        assert!(l.send_delta(vec![1]).is_ok());
        assert_eq!(l.send_delta(vec![2]), Err(ProtocolError::QueueFull));
    }

    #[test]
    fn test_receive_filters_self_and_other_rooms() {
        let room = Uuid::new_v4();
        let mut a = link(room);
        let mut b = link(room);
        let mut stranger = link(Uuid::new_v4());
        a.connect(Vec::new()).unwrap();
        stranger.connect(Vec::new()).unwrap();

        let frame = a.send_delta(vec![7]).unwrap().unwrap();
        assert_eq!(a.receive(&frame).unwrap(), None);
        assert_eq!(stranger.receive(&frame).unwrap(), None);

        match b.receive(&frame).unwrap() {
            Some(LinkEvent::RemoteDelta { update, peer_id, .. }) => {
                assert_eq!(update, vec![7]);
                assert_eq!(peer_id, a.peer_info().peer_id);
            }
            other => panic!("Expected RemoteDelta, got {other:?}"),
        }
    }

    #[test]
    fn test_sync_request_frame() {
        let room = Uuid::new_v4();
        let mut a = link(room);
        let mut b = link(room);

        let frame = a.send_sync_request(vec![1, 2]).unwrap();
        match b.receive(&frame).unwrap() {
            Some(LinkEvent::SyncRequest { state_vector, .. }) => assert_eq!(state_vector, vec![1, 2]),
            other => panic!("Expected SyncRequest, got {other:?}"),
        }
    }

    #[test]
    fn test_lamport_clock_advances_on_receive() {
        let room = Uuid::new_v4();
        let mut a = link(room);
        let mut b = link(room);
        a.connect(Vec::new()).unwrap();
        for _ in 0..10 {
            a.send_delta(vec![0]).unwrap();
        }
        let frame = a.send_delta(vec![0]).unwrap().unwrap();
        b.receive(&frame).unwrap();
        assert_eq!(b.clock(), a.clock());
    }

    #[test]
    fn test_presence_roundtrip_through_links() {
        let room = Uuid::new_v4();
        let mut a = link(room);
        let mut b = link(room);
        a.connect(Vec::new()).unwrap();

        let msg = PresenceMessage::Report {
            participant_id: a.peer_info().peer_id,
            report: PresenceReport::cursor(WirePosition::new(1, 2)),
        };
        let frame = a.send_presence(&msg).unwrap().unwrap();
        assert_eq!(
            b.receive(&frame).unwrap(),
            Some(LinkEvent::Presence {
                peer_id: a.peer_info().peer_id,
                message: msg
            })
        );
    }

    #[test]
    fn test_disconnect_sends_leave_once() {
        let mut l = link(Uuid::new_v4());
        assert!(l.disconnect().is_none());
        l.connect(Vec::new()).unwrap();
        let frame = l.disconnect().unwrap();
        assert_eq!(SyncMessage::decode(&frame).unwrap().msg_type, MessageType::PeerLeft);
        assert!(l.disconnect().is_none());
    }

    #[test]
    fn test_garbage_frame_is_error() {
        let mut l = link(Uuid::new_v4());
        assert!(l.receive(&[0xFF, 0xFE]).is_err());
    }

    #[test]
    fn test_offline_queue() {
        let mut queue = OfflineQueue::new(100);
        queue.enqueue(1, vec![1, 2, 3]);
        queue.enqueue(2, vec![4, 5, 6, 7]);
        assert_eq!(queue.total_bytes(), 7);

        let drained = queue.drain();
        assert_eq!(drained[0], (1, vec![1, 2, 3]));
        assert!(queue.is_empty());

        queue.enqueue(3, vec![1]);
        queue.clear();
        assert!(queue.is_empty());
    }
}
