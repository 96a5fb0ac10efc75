//! Projection of remote presence onto the local buffer, and the local
//! selection reports sent the other way.
//!
//! ```text
//! PresenceRoom ──► PresenceOverlay::rebuild(text) ──► DecorationSet ──► surface
//!                     (resolve line/column,             (swapped whole)
//!                      clamp, skip malformed)
//!
//! surface selection ──► SelectionTracker ──► PresenceReport ──► peers
//! ```

use std::time::{Duration, Instant};

use codeshare_core::lines::floor_char_boundary;
use codeshare_core::LineTable;
use uuid::Uuid;

use crate::presence::{CursorColor, ParticipantPresence, PresenceReport, PresenceRoom, WirePosition};

/// Why a participant's report could not be rendered this pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceError {
    /// Line below 1.
    LineOutOfDomain(i64),
    /// Negative column.
    ColumnOutOfDomain(i64),
    /// Only one half of a `{line, column}` pair was sent.
    MissingPosition,
}

impl std::fmt::Display for PresenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LineOutOfDomain(l) => write!(f, "Line {l} out of domain"),
            Self::ColumnOutOfDomain(c) => write!(f, "Column {c} out of domain"),
            Self::MissingPosition => write!(f, "Incomplete position"),
        }
    }
}

impl std::error::Error for PresenceError {}

/// One rendered remote presence marker. Offsets are byte offsets into the
/// full buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoration {
    Caret {
        participant: Uuid,
        offset: usize,
        color: CursorColor,
        label: String,
    },
    Highlight {
        participant: Uuid,
        from: usize,
        to: usize,
        color: CursorColor,
        title: String,
    },
}

impl Decoration {
    pub fn participant(&self) -> Uuid {
        match self {
            Decoration::Caret { participant, .. } | Decoration::Highlight { participant, .. } => {
                *participant
            }
        }
    }

    /// Covered byte range; carets are empty ranges.
    pub fn range(&self) -> (usize, usize) {
        match self {
            Decoration::Caret { offset, .. } => (*offset, *offset),
            Decoration::Highlight { from, to, .. } => (*from, *to),
        }
    }
}

/// A complete set of decorations for one buffer revision, sorted by range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecorationSet {
    pub generation: u64,
    pub items: Vec<Decoration>,
}

impl DecorationSet {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn for_participant(&self, id: Uuid) -> impl Iterator<Item = &Decoration> {
        self.items.iter().filter(move |d| d.participant() == id)
    }
}

fn resolve(table: &LineTable<'_>, pos: WirePosition) -> Result<usize, PresenceError> {
    if pos.line < 1 {
        return Err(PresenceError::LineOutOfDomain(pos.line));
    }
    if pos.column < 0 {
        return Err(PresenceError::ColumnOutOfDomain(pos.column));
    }
    // Both checks passed, so offset_of clamps instead of refusing.
    table
        .offset_of(pos.line, pos.column)
        .ok_or(PresenceError::MissingPosition)
}

/// Resolve one participant's report against the current buffer.
///
/// `Ok(None)` means there is nothing to draw (no report yet, or a bare
/// clear).
pub fn decoration_for(
    participant: &ParticipantPresence,
    table: &LineTable<'_>,
) -> Result<Option<Decoration>, PresenceError> {
    let report = &participant.report;

    if report.has_selection() {
        if let (Some(start), Some(end)) = (report.selection_start, report.selection_end) {
            let a = resolve(table, start)?;
            let b = resolve(table, end)?;
            let selected = report.selected_text.as_deref().unwrap_or_default();
            return Ok(Some(Decoration::Highlight {
                participant: participant.participant_id,
                from: a.min(b),
                to: a.max(b),
                color: participant.color,
                title: format!("Selected by {}: \"{}\"", participant.name, selected),
            }));
        }
    }

    match (report.line, report.column) {
        (Some(line), Some(column)) => {
            let offset = resolve(table, WirePosition::new(line, column))?;
            Ok(Some(Decoration::Caret {
                participant: participant.participant_id,
                offset,
                color: participant.color,
                label: participant.name.clone(),
            }))
        }
        (None, None) => Ok(None),
        _ => Err(PresenceError::MissingPosition),
    }
}

/// Holds the decorations currently shown on the surface.
#[derive(Debug, Default)]
pub struct PresenceOverlay {
    current: DecorationSet,
}

impl PresenceOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild every participant's decorations against `text` and replace
    /// the current set. A participant whose report cannot be resolved is
    /// skipped for this pass only.
    pub fn rebuild(&mut self, room: &PresenceRoom, text: &str) -> &DecorationSet {
        let table = LineTable::new(text);
        let mut items = Vec::with_capacity(room.peer_count());

        for participant in room.participants() {
            match decoration_for(participant, &table) {
                Ok(Some(decoration)) => items.push(decoration),
                Ok(None) => {}
                Err(e) => log::warn!(
                    "Skipping presence of {} this pass: {e}",
                    participant.participant_id
                ),
            }
        }

        items.sort_by_key(|d| d.range());
        self.current = DecorationSet {
            generation: self.current.generation + 1,
            items,
        };
        &self.current
    }

    pub fn current(&self) -> &DecorationSet {
        &self.current
    }
}

// ───────────────────────────────────────────────────────────────────
// Outbound
// ───────────────────────────────────────────────────────────────────

/// Turns local selection changes into presence reports.
///
/// Cursor-only reports are throttled to `cursor_interval`; selection
/// reports and anything carrying `clear_selection` always go out. The last
/// throttled cursor is held until the next report or `flush`.
pub struct SelectionTracker {
    had_selection: bool,
    cursor_interval: Duration,
    last_cursor: Option<Instant>,
    pending: Option<WirePosition>,
}

impl SelectionTracker {
    pub fn new(cursor_interval: Duration) -> Self {
        Self {
            had_selection: false,
            cursor_interval,
            last_cursor: None,
            pending: None,
        }
    }

    /// Report for a new local selection `anchor..head` (byte offsets into
    /// `text`). Returns `None` when a cursor report is throttled.
    pub fn selection_changed(&mut self, text: &str, anchor: usize, head: usize) -> Option<PresenceReport> {
        let table = LineTable::new(text);
        let from = floor_char_boundary(text, anchor.min(head));
        let to = floor_char_boundary(text, anchor.max(head));

        if from != to {
            self.had_selection = true;
            self.pending = None;
            return Some(PresenceReport::selection(
                table.position_of(from).into(),
                table.position_of(to).into(),
                &text[from..to],
            ));
        }

        let pos: WirePosition = table.position_of(to).into();
        if self.had_selection {
            self.had_selection = false;
            self.pending = None;
            self.last_cursor = Some(Instant::now());
            return Some(PresenceReport::collapse(pos));
        }

        if let Some(last) = self.last_cursor {
            if last.elapsed() < self.cursor_interval {
                log::trace!("Cursor report throttled");
                self.pending = Some(pos);
                return None;
            }
        }
        self.pending = None;
        self.last_cursor = Some(Instant::now());
        Some(PresenceReport::cursor(pos))
    }

    /// Cursor report withheld by the throttle, if any.
    pub fn flush(&mut self) -> Option<PresenceReport> {
        let pos = self.pending.take()?;
        self.last_cursor = Some(Instant::now());
        Some(PresenceReport::cursor(pos))
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Report sent when the surface loses focus.
    pub fn focus_lost(&mut self) -> PresenceReport {
        self.had_selection = false;
        self.pending = None;
        PresenceReport::clear()
    }

    pub fn had_selection(&self) -> bool {
        self.had_selection
    }
}
