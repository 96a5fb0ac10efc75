//! One-shot adoption of the room's authoritative code for late joiners.
//!
//! Inside a room, the default buffer (the task answer) must not race the
//! room snapshot: it is held back until the snapshot event has fired, and
//! dropped if the snapshot brings real content.

use codeshare_core::BoundaryConfig;
use serde::{Deserialize, Serialize};

/// The room's current code, as sent to a joining participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub last_code: String,
}

impl RoomSnapshot {
    pub fn new(last_code: impl Into<String>) -> Self {
        Self {
            last_code: last_code.into(),
        }
    }
}

/// Where the buffer's initial content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodeSource {
    #[default]
    None,
    Default,
    Room,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotDecision {
    /// A snapshot was already handled.
    Ignored,
    /// The snapshot equals the current buffer.
    Unchanged,
    /// Replace the buffer with `body` wrapped in the current scaffold.
    Adopt { body: String },
    /// The snapshot was blank; populate with the held-back default.
    ReleaseDefault { body: String },
}

#[derive(Debug, Clone, Default)]
pub struct RoomStateLoader {
    in_room: bool,
    source: CodeSource,
    snapshot_seen: bool,
    deferred: Option<String>,
}

impl RoomStateLoader {
    pub fn new(in_room: bool) -> Self {
        Self {
            in_room,
            ..Self::default()
        }
    }

    /// Offer the default body. Returns it if the buffer may be populated
    /// now; inside a room it is held back until the snapshot arrives.
    pub fn offer_default(&mut self, body: &str) -> Option<String> {
        if self.source == CodeSource::Room {
            log::debug!("Room code already loaded, ignoring default");
            return None;
        }
        if self.in_room && !self.snapshot_seen {
            log::debug!("Deferring default population until the room snapshot");
            self.deferred = Some(body.to_string());
            return None;
        }
        self.source = CodeSource::Default;
        Some(body.to_string())
    }

    /// Handle the snapshot event. Only the first call has an effect.
    pub fn on_snapshot(
        &mut self,
        snapshot: &RoomSnapshot,
        current_full: &str,
        boundary: &BoundaryConfig,
    ) -> SnapshotDecision {
        if self.snapshot_seen {
            return SnapshotDecision::Ignored;
        }
        self.snapshot_seen = true;

        if snapshot.last_code.trim().is_empty() {
            return match self.deferred.take() {
                Some(body) => {
                    log::info!("Room snapshot is blank, loading default code");
                    self.source = CodeSource::Default;
                    SnapshotDecision::ReleaseDefault { body }
                }
                None => SnapshotDecision::Unchanged,
            };
        }

        self.deferred = None;
        self.source = CodeSource::Room;
        if snapshot.last_code == current_full {
            return SnapshotDecision::Unchanged;
        }

        let body = boundary.strip(&snapshot.last_code).to_string();
        log::info!("Adopting room snapshot ({} bytes of body)", body.len());
        SnapshotDecision::Adopt { body }
    }

    pub fn source(&self) -> CodeSource {
        self.source
    }

    pub fn snapshot_seen(&self) -> bool {
        self.snapshot_seen
    }

    pub fn deferred_default(&self) -> Option<&str> {
        self.deferred.as_deref()
    }
}
