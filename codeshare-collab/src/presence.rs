//! Presence protocol for cursor & selection awareness.
//!
//! Presence is advisory: it is never part of the replicated document and
//! carries no ordering guarantee. Each participant's latest report simply
//! replaces the previous one.
//!
//! ## Flow
//!
//! ```text
//! Local selection change
//!       │
//!       ▼
//! SelectionTracker::selection_changed()   (overlay.rs)
//!       │
//!       ▼
//! PresenceMessage::Report { … }
//!       │
//!       ▼   (transport)
//! Remote PresenceRoom::handle_message()   (last write wins)
//!       │
//!       ▼
//! PresenceOverlay::rebuild()              (overlay.rs)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::protocol::ProtocolError;

// ───────────────────────────────────────────────────────────────────
// Colors
// ───────────────────────────────────────────────────────────────────

/// RGBA color for cursor/selection decorations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl CursorColor {
    /// Hue comes from the id bytes, so every peer picks the same color.
    /// Saturation and lightness are fixed.
    pub fn from_uuid(id: Uuid) -> Self {
        let hash = id.as_u128();
        let hue = ((hash % 360) as f32) / 360.0;
        let (r, g, b) = hsl_to_rgb(hue, 0.7, 0.6);
        Self { r, g, b, a: 1.0 }
    }

    pub fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// `#rrggbb`, alpha ignored.
    pub fn to_hex(&self) -> String {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02x}{:02x}{:02x}", channel(self.r), channel(self.g), channel(self.b))
    }
}

impl Default for CursorColor {
    fn default() -> Self {
        Self { r: 0.26, g: 0.52, b: 0.96, a: 1.0 }
    }
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l);
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

// ───────────────────────────────────────────────────────────────────
// Reports
// ───────────────────────────────────────────────────────────────────

/// A `{line, column}` pair as it travels on the wire.
///
/// Signed so that out-of-domain values from a misbehaving peer survive
/// decoding and can be rejected per render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePosition {
    pub line: i64,
    pub column: i64,
}

impl WirePosition {
    pub fn new(line: i64, column: i64) -> Self {
        Self { line, column }
    }
}

impl From<codeshare_core::Position> for WirePosition {
    fn from(pos: codeshare_core::Position) -> Self {
        Self::new(pos.line as i64, pos.column as i64)
    }
}

/// One cursor/selection report.
///
/// Any combination of the cursor fields, the selection fields and
/// `clear_selection` may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceReport {
    pub line: Option<i64>,
    pub column: Option<i64>,
    pub selection_start: Option<WirePosition>,
    pub selection_end: Option<WirePosition>,
    pub selected_text: Option<String>,
    #[serde(default)]
    pub clear_selection: bool,
}

impl PresenceReport {
    pub fn cursor(pos: WirePosition) -> Self {
        Self {
            line: Some(pos.line),
            column: Some(pos.column),
            ..Self::default()
        }
    }

    pub fn selection(start: WirePosition, end: WirePosition, text: impl Into<String>) -> Self {
        Self {
            selection_start: Some(start),
            selection_end: Some(end),
            selected_text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Focus loss: drop whatever peers render for us.
    pub fn clear() -> Self {
        Self {
            clear_selection: true,
            ..Self::default()
        }
    }

    /// Cursor after a selection collapsed.
    pub fn collapse(pos: WirePosition) -> Self {
        Self {
            clear_selection: true,
            ..Self::cursor(pos)
        }
    }

    /// Both endpoints and a non-empty selected text.
    pub fn has_selection(&self) -> bool {
        self.selection_start.is_some()
            && self.selection_end.is_some()
            && self.selected_text.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn cursor_position(&self) -> Option<WirePosition> {
        match (self.line, self.column) {
            (Some(line), Some(column)) => Some(WirePosition::new(line, column)),
            _ => None,
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Wire messages
// ───────────────────────────────────────────────────────────────────

/// Presence messages, carried inside `SyncMessage` presence payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PresenceMessage {
    Join {
        participant_id: Uuid,
        name: String,
        color: CursorColor,
    },
    Leave {
        participant_id: Uuid,
    },
    Report {
        participant_id: Uuid,
        report: PresenceReport,
    },
}

impl PresenceMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::Decode(e.to_string()))?;
        Ok(msg)
    }

    pub fn participant_id(&self) -> Uuid {
        match self {
            PresenceMessage::Join { participant_id, .. }
            | PresenceMessage::Leave { participant_id }
            | PresenceMessage::Report { participant_id, .. } => *participant_id,
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// Presence room
// ───────────────────────────────────────────────────────────────────

/// Latest known presence of one remote participant.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantPresence {
    pub participant_id: Uuid,
    pub name: String,
    pub color: CursorColor,
    pub report: PresenceReport,
}

impl ParticipantPresence {
    pub fn new(participant_id: Uuid, name: impl Into<String>, color: CursorColor) -> Self {
        Self {
            participant_id,
            name: name.into(),
            color,
            report: PresenceReport::default(),
        }
    }

    /// Entry for a participant whose join we never saw.
    pub fn placeholder(participant_id: Uuid) -> Self {
        Self::new(
            participant_id,
            format!("Peer-{}", &participant_id.simple().to_string()[..8]),
            CursorColor::from_uuid(participant_id),
        )
    }
}

/// Remote participants' presence, keyed by id, last write wins.
pub struct PresenceRoom {
    local_id: Uuid,
    peers: HashMap<Uuid, ParticipantPresence>,
}

impl PresenceRoom {
    pub fn new(local_id: Uuid) -> Self {
        Self {
            local_id,
            peers: HashMap::new(),
        }
    }

    /// Apply an incoming presence message. Returns `true` if the room
    /// changed.
    pub fn handle_message(&mut self, msg: &PresenceMessage) -> bool {
        if msg.participant_id() == self.local_id {
            return false;
        }

        match msg {
            PresenceMessage::Join {
                participant_id,
                name,
                color,
            } => {
                log::debug!("Participant {participant_id} joined as {name}");
                let entry = self
                    .peers
                    .entry(*participant_id)
                    .or_insert_with(|| ParticipantPresence::new(*participant_id, name.clone(), *color));
                entry.name = name.clone();
                entry.color = *color;
                true
            }

            PresenceMessage::Leave { participant_id } => {
                log::debug!("Participant {participant_id} left");
                self.peers.remove(participant_id).is_some()
            }

            PresenceMessage::Report {
                participant_id,
                report,
            } => {
                // A report can precede the join it belongs to.
                let entry = self
                    .peers
                    .entry(*participant_id)
                    .or_insert_with(|| ParticipantPresence::placeholder(*participant_id));
                entry.report = report.clone();
                true
            }
        }
    }

    pub fn join_message(&self, name: impl Into<String>) -> PresenceMessage {
        PresenceMessage::Join {
            participant_id: self.local_id,
            name: name.into(),
            color: CursorColor::from_uuid(self.local_id),
        }
    }

    pub fn leave_message(&self) -> PresenceMessage {
        PresenceMessage::Leave {
            participant_id: self.local_id,
        }
    }

    pub fn report_message(&self, report: PresenceReport) -> PresenceMessage {
        PresenceMessage::Report {
            participant_id: self.local_id,
            report,
        }
    }

    pub fn participant(&self, id: &Uuid) -> Option<&ParticipantPresence> {
        self.peers.get(id)
    }

    /// Participants in a stable order (by id).
    pub fn participants(&self) -> Vec<&ParticipantPresence> {
        let mut list: Vec<_> = self.peers.values().collect();
        list.sort_by_key(|p| p.participant_id);
        list
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn local_id(&self) -> Uuid {
        self.local_id
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }
}
