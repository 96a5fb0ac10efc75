//! One participant's editing session.
//!
//! `EditorSession` owns the surface and composes the boundary enforcer,
//! the replica, the reconciler, presence and the room loader. Every entry
//! point runs to completion before returning; outbound effects go to the
//! [`SessionHost`].

use std::time::Duration;

use codeshare_core::{BoundaryConfig, BoundaryEnforcer, DocumentError, ReplicatedDocument};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::language::{ContentSource, Language, LanguageSwitch, LanguageSwitchController, SwitchResolution};
use crate::overlay::{DecorationSet, PresenceOverlay, SelectionTracker};
use crate::presence::{PresenceMessage, PresenceReport, PresenceRoom};
use crate::reconciler::{DeltaEncoding, LocalOutcome, ReconcileState, RemoteOutcome, UpdateReconciler};
use crate::room::{CodeSource, RoomSnapshot, RoomStateLoader, SnapshotDecision};
use crate::surface::TextSurface;

/// Callbacks into the embedding application.
pub trait SessionHost {
    /// The editable body changed through a local edit.
    fn content_changed(&mut self, body: &str);

    /// A delta to broadcast to the room.
    fn emit_delta(&mut self, delta: Vec<u8>);

    /// A presence report to broadcast to the room.
    fn emit_presence(&mut self, report: PresenceReport);

    /// The full buffer changed, for any reason.
    fn buffer_changed(&mut self, _full_text: &str) {}

    /// The replica is behind the surface; ask the room for the updates
    /// `state_vector` is missing.
    fn request_sync(&mut self, _state_vector: Vec<u8>) {}
}

/// A host that records everything, for tests and relays.
#[derive(Debug, Clone, Default)]
pub struct QueuedHost {
    pub changes: Vec<String>,
    pub deltas: Vec<Vec<u8>>,
    pub presence: Vec<PresenceReport>,
    pub buffers: Vec<String>,
    pub sync_requests: Vec<Vec<u8>>,
}

impl QueuedHost {
    pub fn take_deltas(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.deltas)
    }

    pub fn take_presence(&mut self) -> Vec<PresenceReport> {
        std::mem::take(&mut self.presence)
    }

    pub fn take_changes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.changes)
    }

    pub fn take_sync_requests(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.sync_requests)
    }
}

impl SessionHost for QueuedHost {
    fn content_changed(&mut self, body: &str) {
        self.changes.push(body.to_string());
    }

    fn emit_delta(&mut self, delta: Vec<u8>) {
        self.deltas.push(delta);
    }

    fn emit_presence(&mut self, report: PresenceReport) {
        self.presence.push(report);
    }

    fn buffer_changed(&mut self, full_text: &str) {
        self.buffers.push(full_text.to_string());
    }

    fn request_sync(&mut self, state_vector: Vec<u8>) {
        self.sync_requests.push(state_vector);
    }
}

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub delta_encoding: DeltaEncoding,
    /// Minimum interval between cursor-only presence reports (ms). A
    /// throttled position is held and sent by `flush_presence`.
    pub cursor_interval_ms: u64,
    /// Defer default population until the room snapshot.
    pub in_room: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            delta_encoding: DeltaEncoding::Incremental,
            cursor_interval_ms: 0,
            in_room: false,
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn cursor_interval(&self) -> Duration {
        Duration::from_millis(self.cursor_interval_ms)
    }
}

pub struct EditorSession<S: TextSurface, H: SessionHost> {
    participant_id: Uuid,
    config: SessionConfig,
    reconciler: UpdateReconciler,
    presence: PresenceRoom,
    overlay: PresenceOverlay,
    tracker: SelectionTracker,
    language: LanguageSwitchController,
    loader: RoomStateLoader,
    surface: S,
    host: H,
}

impl<S: TextSurface, H: SessionHost> EditorSession<S, H> {
    /// Mount a session on `surface`.
    ///
    /// Outside a room the buffer is populated from `initial_body` at once.
    /// Inside a room it shows the bare scaffold until the snapshot arrives.
    pub fn mount(
        participant_id: Uuid,
        config: SessionConfig,
        language: Language,
        boundary: BoundaryConfig,
        initial_body: &str,
        surface: S,
        host: H,
    ) -> Self {
        let document = ReplicatedDocument::with_client_id(participant_id.as_u128() as u64);
        let enforcer = BoundaryEnforcer::new(boundary, "");
        let mut session = Self {
            participant_id,
            reconciler: UpdateReconciler::new(enforcer, document, config.delta_encoding),
            presence: PresenceRoom::new(participant_id),
            overlay: PresenceOverlay::new(),
            tracker: SelectionTracker::new(config.cursor_interval()),
            language: LanguageSwitchController::new(language),
            loader: RoomStateLoader::new(config.in_room),
            config,
            surface,
            host,
        };

        log::debug!("Mounting session {participant_id} ({language})");
        match session.loader.offer_default(initial_body) {
            Some(body) => session.populate(&body),
            None => {
                let scaffold = session.boundary().wrap("");
                session.reconciler.load_external(&scaffold, &mut session.surface);
            }
        }
        session
    }

    fn populate(&mut self, body: &str) {
        let full = self.boundary().wrap(body);

        if !self.reconciler.document().is_blank() {
            log::debug!("Replica already holds content, not loading default code");
            return;
        }
        if let Err(e) = self.reconciler.document_mut().seed(&full) {
            log::warn!("Failed to seed replica: {e}");
        }

        self.reconciler.load_external(&full, &mut self.surface);
        self.reconciler.enforcer_mut().commit(body);
        self.host.buffer_changed(&full);
    }

    fn release_held(&mut self) {
        if let Some(delta) = self.reconciler.release_held(&mut self.surface) {
            log::debug!("Releasing held local edit ({} bytes)", delta.len());
            self.host.emit_delta(delta);
        }
    }

    fn refresh_overlay(&mut self) {
        let text = self.surface.text();
        let set = self.overlay.rebuild(&self.presence, &text);
        self.surface.set_decorations(set);
    }

    // ─── Buffer ───

    /// Handle a change event from the surface.
    pub fn on_surface_edit(&mut self) -> LocalOutcome {
        let outcome = self.reconciler.on_surface_change(&mut self.surface);
        match &outcome {
            LocalOutcome::Changed { body, delta } => {
                self.host.content_changed(body);
                if let Some(delta) = delta {
                    self.host.emit_delta(delta.clone());
                }
                let text = self.surface.text();
                self.host.buffer_changed(&text);
                self.refresh_overlay();
            }
            LocalOutcome::Reverted { .. } => self.refresh_overlay(),
            LocalOutcome::Suppressed | LocalOutcome::Unchanged => {}
        }
        outcome
    }

    /// Merge a delta (or a sync answer) from a peer.
    pub fn receive_delta(&mut self, delta: &[u8]) -> RemoteOutcome {
        let outcome = self.reconciler.receive(delta, &mut self.surface);
        match &outcome {
            RemoteOutcome::Applied { text, .. } => {
                self.host.buffer_changed(text);
                self.refresh_overlay();
            }
            RemoteOutcome::Rebased { text, .. } => {
                self.host.buffer_changed(text);
                self.refresh_overlay();
                self.release_held();
            }
            RemoteOutcome::Deferred | RemoteOutcome::Dropped { .. } => {}
        }
        outcome
    }

    /// Replace the editable body from the host side.
    ///
    /// Goes through the local pipeline like typing would. The caret is kept
    /// inside the editable region.
    pub fn push_value(&mut self, body: &str) -> LocalOutcome {
        let full = self.boundary().wrap(body);
        let caret = self.surface.caret();
        self.surface.replace_all(&full);
        let clamped = self.boundary().clamp_caret(caret, full.len());
        self.surface.set_caret(clamped);
        self.on_surface_edit()
    }

    // ─── Sync ───

    /// Encoded state vector to send as a sync request.
    pub fn sync_request(&self) -> Vec<u8> {
        self.reconciler.document().state_vector()
    }

    /// Updates the holder of `state_vector` is missing.
    pub fn answer_sync(&self, state_vector: &[u8]) -> Result<Vec<u8>, DocumentError> {
        self.reconciler.document().encode_diff(state_vector)
    }

    // ─── Room state ───

    pub fn receive_snapshot(&mut self, snapshot: &RoomSnapshot) -> SnapshotDecision {
        let current = self.surface.text();
        let decision = self
            .loader
            .on_snapshot(snapshot, &current, self.reconciler.enforcer().config());

        match &decision {
            SnapshotDecision::Adopt { body } => {
                let full = self.boundary().wrap(body);
                self.reconciler.load_external(&full, &mut self.surface);
                self.reconciler.enforcer_mut().commit(body);
                self.host.content_changed(body);
                self.host.buffer_changed(&full);
                self.refresh_overlay();
                if self.reconciler.is_behind() {
                    let state_vector = self.sync_request();
                    self.host.request_sync(state_vector);
                }
            }
            SnapshotDecision::ReleaseDefault { body } => {
                let body = body.clone();
                self.populate(&body);
                self.refresh_overlay();
            }
            SnapshotDecision::Ignored | SnapshotDecision::Unchanged => {}
        }
        decision
    }

    pub fn switch_language(&mut self, switch: &LanguageSwitch) -> Option<SwitchResolution> {
        let surface_text = self.surface.text();
        let document_text = self.reconciler.document().current_text();
        let resolution = self.language.switch(
            switch,
            &surface_text,
            &document_text,
            self.reconciler.enforcer_mut(),
        )?;

        if resolution.source == ContentSource::Initial {
            // A fresh buffer for the new scaffold replaces the shared one.
            if let Some(delta) = self.reconciler.reset(&resolution.content, &mut self.surface) {
                self.host.emit_delta(delta);
            }
            self.host.buffer_changed(&resolution.content);
            self.refresh_overlay();
        } else if self.reconciler.load_external(&resolution.content, &mut self.surface) {
            self.host.buffer_changed(&resolution.content);
            self.refresh_overlay();
        }
        Some(resolution)
    }

    // ─── Presence ───

    pub fn receive_presence(&mut self, msg: &PresenceMessage) {
        if self.presence.handle_message(msg) {
            self.refresh_overlay();
        }
    }

    /// Local selection moved to `anchor..head` (byte offsets).
    pub fn selection_changed(&mut self, anchor: usize, head: usize) {
        let text = self.surface.text();
        if let Some(report) = self.tracker.selection_changed(&text, anchor, head) {
            self.host.emit_presence(report);
        }
    }

    /// Send the cursor position the throttle held back, if any. Call on
    /// the host's timer tick or before going idle.
    pub fn flush_presence(&mut self) {
        if let Some(report) = self.tracker.flush() {
            self.host.emit_presence(report);
        }
    }

    pub fn focus_lost(&mut self) {
        let report = self.tracker.focus_lost();
        self.host.emit_presence(report);
    }

    pub fn join_message(&self, name: impl Into<String>) -> PresenceMessage {
        self.presence.join_message(name)
    }

    pub fn leave_message(&self) -> PresenceMessage {
        self.presence.leave_message()
    }

    // ─── Accessors ───

    pub fn participant_id(&self) -> Uuid {
        self.participant_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn language(&self) -> Language {
        self.language.language()
    }

    pub fn boundary(&self) -> &BoundaryConfig {
        self.reconciler.enforcer().config()
    }

    /// The last editable body that carried the scaffold.
    pub fn body(&self) -> &str {
        self.reconciler.enforcer().last_known_good()
    }

    pub fn text(&self) -> String {
        self.surface.text()
    }

    pub fn document(&self) -> &ReplicatedDocument {
        self.reconciler.document()
    }

    pub fn state(&self) -> ReconcileState {
        self.reconciler.state()
    }

    pub fn code_source(&self) -> CodeSource {
        self.loader.source()
    }

    pub fn decorations(&self) -> &DecorationSet {
        self.overlay.current()
    }

    pub fn presence_room(&self) -> &PresenceRoom {
        &self.presence
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Tear down, handing back the surface and host.
    pub fn unmount(self) -> (S, H) {
        log::debug!("Unmounting session {}", self.participant_id);
        (self.surface, self.host)
    }
}
