//! Scaffold protection for the full buffer.
//!
//! A full buffer is always `prefix ⧺ body ⧺ suffix`. Only the body may be
//! edited; an edit that reaches into the scaffold is discarded as a whole
//! and the buffer is restored from the last body that passed the check.
//!
//! ```text
//! ┌──────────────┬─────────────────────────┬──────────────┐
//! │ prefix       │ editable body           │ suffix       │
//! │ (immutable)  │ (last_known_good cache) │ (immutable)  │
//! └──────────────┴─────────────────────────┴──────────────┘
//! ```

use serde::{Deserialize, Serialize};

/// Immutable scaffold around the editable body.
///
/// Supplied by the host per editing session; replaced only on a
/// language switch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundaryConfig {
    pub prefix: String,
    pub suffix: String,
}

impl BoundaryConfig {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// A config with no scaffold: the whole buffer is editable.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Build the full buffer for `body`.
    pub fn wrap(&self, body: &str) -> String {
        let mut full = String::with_capacity(self.prefix.len() + body.len() + self.suffix.len());
        full.push_str(&self.prefix);
        full.push_str(body);
        full.push_str(&self.suffix);
        full
    }

    /// Minimum length of any conforming buffer.
    pub fn scaffold_len(&self) -> usize {
        self.prefix.len() + self.suffix.len()
    }

    /// Whether `candidate` carries the scaffold intact.
    ///
    /// A candidate shorter than prefix + suffix is rejected even if both
    /// checks pass on their own: the two would overlap.
    pub fn is_valid(&self, candidate: &str) -> bool {
        candidate.len() >= self.scaffold_len()
            && candidate.starts_with(&self.prefix)
            && candidate.ends_with(&self.suffix)
    }

    /// Extract the editable body from a conforming candidate.
    ///
    /// Slicing is by scaffold length, not by search, so a body that itself
    /// contains the prefix or suffix text round-trips unchanged.
    pub fn extract<'a>(&self, candidate: &'a str) -> Option<&'a str> {
        if !self.is_valid(candidate) {
            return None;
        }
        Some(&candidate[self.prefix.len()..candidate.len() - self.suffix.len()])
    }

    /// Tolerant extraction for snapshots from the room.
    ///
    /// The prefix is removed when present (otherwise the whole text is taken
    /// as body) and the suffix is removed when present. A body that really
    /// ends with the suffix text while the snapshot lacks its suffix loses
    /// that tail; there is no way to tell the two apart.
    pub fn strip<'a>(&self, snapshot: &'a str) -> &'a str {
        let body = snapshot.strip_prefix(self.prefix.as_str()).unwrap_or(snapshot);
        if self.suffix.is_empty() {
            return body;
        }
        body.strip_suffix(self.suffix.as_str()).unwrap_or(body)
    }

    /// Clamp a caret offset into the editable region of a buffer of
    /// `full_len` bytes.
    pub fn clamp_caret(&self, caret: usize, full_len: usize) -> usize {
        let upper = full_len.saturating_sub(self.suffix.len()).max(self.prefix.len());
        caret.clamp(self.prefix.len(), upper)
    }
}

/// Result of checking a candidate buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enforcement<'a> {
    /// The scaffold is intact; `body` is the editable region.
    Valid { body: &'a str },
    /// The candidate touched the scaffold; the surface must be restored.
    Revert { restore: String },
}

/// Owns the prefix/suffix contract and the last conforming body.
#[derive(Debug, Clone)]
pub struct BoundaryEnforcer {
    config: BoundaryConfig,
    last_known_good: String,
}

impl BoundaryEnforcer {
    pub fn new(config: BoundaryConfig, initial_body: impl Into<String>) -> Self {
        Self {
            config,
            last_known_good: initial_body.into(),
        }
    }

    pub fn config(&self) -> &BoundaryConfig {
        &self.config
    }

    pub fn last_known_good(&self) -> &str {
        &self.last_known_good
    }

    /// The buffer the surface is restored to on a violation.
    pub fn repaired(&self) -> String {
        self.config.wrap(&self.last_known_good)
    }

    /// Check a candidate buffer. Does not mutate the cached body.
    pub fn enforce<'a>(&self, candidate: &'a str) -> Enforcement<'a> {
        match self.config.extract(candidate) {
            Some(body) => Enforcement::Valid { body },
            None => {
                log::warn!(
                    "Boundary violation: candidate of {} bytes does not carry the scaffold, reverting",
                    candidate.len()
                );
                Enforcement::Revert {
                    restore: self.repaired(),
                }
            }
        }
    }

    /// Record a new conforming body. Returns `true` if it differs from the
    /// cached one.
    pub fn commit(&mut self, body: &str) -> bool {
        if self.last_known_good == body {
            return false;
        }
        self.last_known_good.clear();
        self.last_known_good.push_str(body);
        true
    }

    /// Adopt `content` as the new cached body if it conforms to the current
    /// scaffold. Returns the extracted body on success.
    pub fn adopt_if_conforming(&mut self, content: &str) -> Option<String> {
        let body = self.config.extract(content)?.to_string();
        self.last_known_good = body.clone();
        Some(body)
    }

    /// Swap the scaffold (language switch). The cached body is kept.
    pub fn set_config(&mut self, config: BoundaryConfig) {
        self.config = config;
    }
}
