//! Mediates between surface edits, the replica and the delta channel.
//!
//! ```text
//!              surface change                 inbound delta
//!                    │                              │
//!                    ▼                              ▼
//!   Idle ──► EmittingLocal ──► Idle    Idle ──► ApplyingRemote ──► Idle
//!             │ enforce scaffold                │ apply to replica
//!             │ commit body                     │ refresh surface
//!             │ encode delta                    │ (never emits)
//! ```
//!
//! Both passes complete synchronously. A surface change observed while a
//! pass is running is the engine's own write and is suppressed.
//!
//! Content loaded from outside the delta channel (a room snapshot, the bare
//! scaffold before one) puts the surface ahead of the replica. Until the
//! replica holds that baseline, local edits are held instead of being
//! diffed against it. When remote content arrives the held edit is rebased
//! onto the merged text and released by [`UpdateReconciler::release_held`]
//! as a delta of its own.

use codeshare_core::{BoundaryEnforcer, DocumentError, Enforcement, ReplicatedDocument, TextSplice};
use serde::{Deserialize, Serialize};

use crate::surface::TextSurface;

/// Reconciliation pass currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileState {
    #[default]
    Idle,
    ApplyingRemote,
    EmittingLocal,
}

/// What a local change puts on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaEncoding {
    /// Only the update of the local transaction.
    #[default]
    Incremental,
    /// The whole document state after the transaction.
    FullState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalOutcome {
    /// The change was caused by the engine itself.
    Suppressed,
    /// The editable body did not change.
    Unchanged,
    /// The edit touched the scaffold; the surface now shows `restored`.
    Reverted { restored: String },
    /// A genuine edit. `delta` is `None` if the replica already held the
    /// candidate, or if the replica is behind the surface and the edit is
    /// held until it catches up.
    Changed { body: String, delta: Option<Vec<u8>> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// Merged. `body` is `None` when the merged buffer does not carry the
    /// scaffold.
    Applied { text: String, body: Option<String> },
    /// Merged, and a held local edit was replayed on top. The surface shows
    /// `text`; `release_held` produces the delta for the local part.
    Rebased { text: String, body: Option<String> },
    /// Merged, but the replica is still empty; the surface is untouched.
    Deferred,
    /// The delta was discarded; nothing changed.
    Dropped { reason: DocumentError },
}

pub struct UpdateReconciler {
    state: ReconcileState,
    enforcer: BoundaryEnforcer,
    document: ReplicatedDocument,
    encoding: DeltaEncoding,
    /// Surface text the replica has not caught up with yet.
    baseline: Option<String>,
    /// The surface carries a local edit the replica has not seen.
    held: bool,
}

impl UpdateReconciler {
    pub fn new(enforcer: BoundaryEnforcer, document: ReplicatedDocument, encoding: DeltaEncoding) -> Self {
        Self {
            state: ReconcileState::Idle,
            enforcer,
            document,
            encoding,
            baseline: None,
            held: false,
        }
    }

    pub fn state(&self) -> ReconcileState {
        self.state
    }

    pub fn enforcer(&self) -> &BoundaryEnforcer {
        &self.enforcer
    }

    pub fn enforcer_mut(&mut self) -> &mut BoundaryEnforcer {
        &mut self.enforcer
    }

    pub fn document(&self) -> &ReplicatedDocument {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut ReplicatedDocument {
        &mut self.document
    }

    /// Whether the surface shows content the replica does not hold yet.
    pub fn is_behind(&self) -> bool {
        self.baseline.is_some()
    }

    /// Whether a local edit is waiting for `release_held`.
    pub fn has_held_edit(&self) -> bool {
        self.held
    }

    fn check_caught_up(&mut self) {
        if self
            .baseline
            .as_deref()
            .is_some_and(|baseline| baseline == self.document.current_text())
        {
            log::debug!("Replica caught up with the surface");
            self.baseline = None;
        }
    }

    fn encode(&self, update: Vec<u8>) -> Vec<u8> {
        match self.encoding {
            DeltaEncoding::Incremental => update,
            DeltaEncoding::FullState => self.document.encode_full_state(),
        }
    }

    /// Handle a change event from the surface.
    pub fn on_surface_change<S: TextSurface>(&mut self, surface: &mut S) -> LocalOutcome {
        if self.state != ReconcileState::Idle {
            log::trace!("Surface change during {:?}, suppressed", self.state);
            return LocalOutcome::Suppressed;
        }

        self.state = ReconcileState::EmittingLocal;
        let outcome = self.emit_local(surface);
        self.state = ReconcileState::Idle;
        outcome
    }

    fn emit_local<S: TextSurface>(&mut self, surface: &mut S) -> LocalOutcome {
        let candidate = surface.text();

        let body = match self.enforcer.enforce(&candidate) {
            Enforcement::Valid { body } => body,
            Enforcement::Revert { restore } => {
                surface.replace_all(&restore);
                return LocalOutcome::Reverted { restored: restore };
            }
        };

        if !self.enforcer.commit(body) {
            return LocalOutcome::Unchanged;
        }

        self.check_caught_up();
        if self.baseline.is_some() {
            log::debug!("Replica is behind the surface, holding local edit");
            self.held = true;
            return LocalOutcome::Changed {
                body: body.to_string(),
                delta: None,
            };
        }

        self.held = false;
        let delta = self
            .document
            .replace_text(&candidate)
            .map(|update| self.encode(update));

        LocalOutcome::Changed {
            body: body.to_string(),
            delta,
        }
    }

    /// Merge an inbound delta and refresh the surface. Never emits.
    pub fn receive<S: TextSurface>(&mut self, delta: &[u8], surface: &mut S) -> RemoteOutcome {
        self.state = ReconcileState::ApplyingRemote;
        let outcome = self.apply_remote(delta, surface);
        self.state = ReconcileState::Idle;
        outcome
    }

    fn apply_remote<S: TextSurface>(&mut self, delta: &[u8], surface: &mut S) -> RemoteOutcome {
        if let Err(reason) = self.document.apply_delta(delta) {
            log::warn!("Dropping inbound delta of {} bytes: {reason}", delta.len());
            return RemoteOutcome::Dropped { reason };
        }

        if let Some(baseline) = self.baseline.take() {
            if self.document.is_empty() {
                self.baseline = Some(baseline);
                return RemoteOutcome::Deferred;
            }
            if self.held {
                return self.rebase_held(&baseline, surface);
            }
        }

        let text = self.document.current_text();
        self.render(text, surface)
    }

    fn render<S: TextSurface>(&mut self, text: String, surface: &mut S) -> RemoteOutcome {
        if surface.text() != text {
            surface.replace_all(&text);
        }

        let body = self.enforcer.config().extract(&text).map(str::to_string);
        match &body {
            Some(body) => {
                self.enforcer.commit(body);
            }
            None => log::warn!(
                "Merged buffer of {} bytes does not carry the scaffold; rendering as-is",
                text.len()
            ),
        }

        RemoteOutcome::Applied { text, body }
    }

    /// Replay the held edit, made against `baseline`, on the merged text.
    fn rebase_held<S: TextSurface>(&mut self, baseline: &str, surface: &mut S) -> RemoteOutcome {
        let merged = self.document.current_text();
        let Some(local) = TextSplice::between(baseline, &surface.text()) else {
            self.held = false;
            return self.render(merged, surface);
        };
        let local = match TextSplice::between(baseline, &merged) {
            Some(remote) => rebase_splice(local, &remote),
            None => local,
        };

        let mut target = merged.clone();
        target.replace_range(local.start..local.start + local.removed, &local.inserted);
        let Some(body) = self.enforcer.config().extract(&target).map(str::to_string) else {
            log::warn!("Held local edit no longer fits the scaffold after merge; discarding it");
            self.held = false;
            return self.render(merged, surface);
        };

        surface.replace_all(&target);
        self.enforcer.commit(&body);
        RemoteOutcome::Rebased {
            text: target,
            body: Some(body),
        }
    }

    /// Feed a held local edit into the replica once it has caught up.
    /// Returns the delta to broadcast, or `None` if nothing is held or the
    /// replica is still behind.
    pub fn release_held<S: TextSurface>(&mut self, surface: &mut S) -> Option<Vec<u8>> {
        self.check_caught_up();
        if !self.held || self.baseline.is_some() {
            return None;
        }

        self.state = ReconcileState::EmittingLocal;
        self.held = false;
        let delta = self
            .document
            .replace_text(&surface.text())
            .map(|update| self.encode(update));
        self.state = ReconcileState::Idle;
        delta
    }

    /// Replace the whole buffer as a local edit, e.g. on a scaffold change.
    ///
    /// An empty replica is seeded instead, so participants resetting to the
    /// same content merge it idempotently and nothing is emitted.
    pub fn reset<S: TextSurface>(&mut self, full: &str, surface: &mut S) -> Option<Vec<u8>> {
        self.state = ReconcileState::EmittingLocal;
        if surface.text() != full {
            surface.replace_all(full);
        }
        self.baseline = None;
        self.held = false;

        let delta = if self.document.is_empty() {
            if let Err(e) = self.document.seed(full) {
                log::warn!("Failed to seed replica: {e}");
            }
            None
        } else {
            self.document
                .replace_text(full)
                .map(|update| self.encode(update))
        };
        self.state = ReconcileState::Idle;
        delta
    }

    /// Show `full` on the surface without touching the replica or emitting.
    ///
    /// Used for content that arrives from outside the delta channel (room
    /// snapshots, the scaffold shown before one). Any held edit is dropped.
    /// If the replica does not hold `full`, the reconciler is behind until
    /// it does. Returns `true` if the surface changed.
    pub fn load_external<S: TextSurface>(&mut self, full: &str, surface: &mut S) -> bool {
        if surface.text() == full {
            self.check_caught_up();
            return false;
        }
        self.state = ReconcileState::ApplyingRemote;
        surface.replace_all(full);
        self.held = false;
        self.baseline = (self.document.current_text() != full).then(|| full.to_string());
        self.state = ReconcileState::Idle;
        true
    }
}

/// Move `local`, computed against a common base, past `remote` made
/// against the same base. An edit overlapping `remote` keeps only its
/// insertion, placed after the remote text.
fn rebase_splice(local: TextSplice, remote: &TextSplice) -> TextSplice {
    let remote_end = remote.start + remote.removed;
    if local.start + local.removed <= remote.start {
        local
    } else if local.start >= remote_end {
        TextSplice {
            start: local.start - remote.removed + remote.inserted.len(),
            ..local
        }
    } else {
        log::warn!("Held local edit overlaps a remote change; keeping only its insertion");
        TextSplice {
            start: remote.start + remote.inserted.len(),
            removed: 0,
            inserted: local.inserted,
        }
    }
}
