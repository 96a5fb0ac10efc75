//! In-process fan-out of encoded frames to every participant of a room.
//!
//! Uses a tokio broadcast channel: one send reaches every subscriber, and
//! each subscriber buffers up to `capacity` frames before it starts
//! lagging. Senders receive their own frames too; `PeerLink::receive`
//! filters them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::protocol::{PeerInfo, ProtocolError, SyncMessage};

#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    pub frames_sent: u64,
    /// Frames sent while nobody was subscribed.
    pub frames_dropped: u64,
    pub active_peers: usize,
}

struct AtomicRelayStats {
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
}

/// A relay for one room.
pub struct RoomRelay {
    room_id: Uuid,
    sender: broadcast::Sender<Arc<Vec<u8>>>,
    peers: Arc<RwLock<HashMap<Uuid, PeerInfo>>>,
    capacity: usize,
    stats: Arc<AtomicRelayStats>,
}

impl RoomRelay {
    pub fn new(room_id: Uuid, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            room_id,
            sender,
            peers: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            stats: Arc::new(AtomicRelayStats {
                frames_sent: AtomicU64::new(0),
                frames_dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Register a participant and subscribe it to the room.
    pub async fn add_peer(&self, info: PeerInfo) -> broadcast::Receiver<Arc<Vec<u8>>> {
        log::debug!("Relay {}: {} joined", self.room_id, info.name);
        self.peers.write().await.insert(info.peer_id, info);
        self.sender.subscribe()
    }

    pub async fn remove_peer(&self, peer_id: &Uuid) -> Option<PeerInfo> {
        self.peers.write().await.remove(peer_id)
    }

    /// Relay an already-encoded frame. Returns the number of subscribers
    /// it reached.
    pub fn relay(&self, frame: Vec<u8>) -> usize {
        match self.sender.send(Arc::new(frame)) {
            Ok(count) => {
                self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                count
            }
            Err(_) => {
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    /// Encode and relay a message.
    pub fn broadcast(&self, msg: &SyncMessage) -> Result<usize, ProtocolError> {
        Ok(self.relay(msg.encode()?))
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn has_peer(&self, peer_id: &Uuid) -> bool {
        self.peers.read().await.contains_key(peer_id)
    }

    pub async fn peers(&self) -> Vec<PeerInfo> {
        self.peers.read().await.values().cloned().collect()
    }

    pub async fn stats(&self) -> RelayStats {
        RelayStats {
            frames_sent: self.stats.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.stats.frames_dropped.load(Ordering::Relaxed),
            active_peers: self.peers.read().await.len(),
        }
    }

    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
