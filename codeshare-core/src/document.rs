//! Replicated text buffer backed by a Yrs document.
//!
//! Every participant owns one replica. Local text changes go in through
//! [`ReplicatedDocument::replace_text`], which returns the encoded update to
//! broadcast; remote updates come in through
//! [`ReplicatedDocument::apply_delta`]. Updates are commutative and
//! idempotent, so replicas that saw the same set of updates hold the same
//! text regardless of delivery order or duplication.

use uuid::Uuid;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, ReadTxn, StateVector, Text, TextRef, Transact, Update};

/// Name of the shared text inside the Yrs document.
pub const TEXT_NAME: &str = "codemirror";

/// Yrs client ids are kept within 53 bits for interop with JS peers.
const CLIENT_ID_MASK: u64 = (1 << 53) - 1;

/// Errors from decoding or applying replica updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// The bytes are not a valid update / state vector encoding.
    Decode(String),
    /// The update decoded but could not be integrated.
    Apply(String),
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "Delta decode error: {e}"),
            Self::Apply(e) => write!(f, "Delta apply error: {e}"),
        }
    }
}

impl std::error::Error for DocumentError {}

impl From<yrs::encoding::read::Error> for DocumentError {
    fn from(e: yrs::encoding::read::Error) -> Self {
        DocumentError::Decode(e.to_string())
    }
}

/// Minimal single-span edit turning one string into another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSplice {
    /// Byte offset where the edit starts.
    pub start: usize,
    /// Number of bytes removed at `start`.
    pub removed: usize,
    /// Text inserted at `start`.
    pub inserted: String,
}

impl TextSplice {
    /// Compute the splice from `old` to `new`, or `None` if they are equal.
    ///
    /// Common prefix and suffix are trimmed on char boundaries.
    pub fn between(old: &str, new: &str) -> Option<Self> {
        if old == new {
            return None;
        }

        let prefix = old
            .char_indices()
            .zip(new.chars())
            .take_while(|((_, a), b)| a == b)
            .last()
            .map(|((i, c), _)| i + c.len_utf8())
            .unwrap_or(0);

        let old_rest = &old[prefix..];
        let new_rest = &new[prefix..];
        let suffix: usize = old_rest
            .chars()
            .rev()
            .zip(new_rest.chars().rev())
            .take_while(|(a, b)| a == b)
            .map(|(c, _)| c.len_utf8())
            .sum();

        Some(Self {
            start: prefix,
            removed: old_rest.len() - suffix,
            inserted: new_rest[..new_rest.len() - suffix].to_string(),
        })
    }
}

/// One participant's replica of the shared buffer.
pub struct ReplicatedDocument {
    doc: Doc,
    text: TextRef,
}

impl ReplicatedDocument {
    /// Create an empty replica with a random client id.
    pub fn new() -> Self {
        Self::from_doc(Doc::new())
    }

    /// Create an empty replica with an explicit client id.
    pub fn with_client_id(client_id: u64) -> Self {
        Self::from_doc(Doc::with_client_id(client_id & CLIENT_ID_MASK))
    }

    fn from_doc(doc: Doc) -> Self {
        let text = doc.get_or_insert_text(TEXT_NAME);
        Self { doc, text }
    }

    pub fn client_id(&self) -> u64 {
        self.doc.client_id()
    }

    /// Current merged text.
    pub fn current_text(&self) -> String {
        let txn = self.doc.transact();
        self.text.get_string(&txn)
    }

    /// Length of the merged text in bytes.
    pub fn len(&self) -> usize {
        let txn = self.doc.transact();
        self.text.len(&txn) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the merged text is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.current_text().trim().is_empty()
    }

    /// Merge a remote update into this replica.
    ///
    /// Applying the same update twice is a no-op. Updates whose causal
    /// dependencies have not arrived yet are held by Yrs until they do.
    pub fn apply_delta(&mut self, delta: &[u8]) -> Result<(), DocumentError> {
        let update = Update::decode_v1(delta)?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(update)
            .map_err(|e| DocumentError::Apply(e.to_string()))
    }

    /// Feed a local text change into the replica.
    ///
    /// The replica is brought to `new_text` with a single splice and the
    /// encoded update of that transaction is returned. Returns `None` when
    /// the replica already holds `new_text`.
    pub fn replace_text(&mut self, new_text: &str) -> Option<Vec<u8>> {
        let current = self.current_text();
        let splice = TextSplice::between(&current, new_text)?;
        log::trace!(
            "Local splice at {}: -{} +{}",
            splice.start,
            splice.removed,
            splice.inserted.len()
        );

        let mut txn = self.doc.transact_mut();
        if splice.removed > 0 {
            self.text
                .remove_range(&mut txn, splice.start as u32, splice.removed as u32);
        }
        if !splice.inserted.is_empty() {
            self.text
                .insert(&mut txn, splice.start as u32, &splice.inserted);
        }
        Some(txn.encode_update_v1())
    }

    /// Encode the whole document state as a single update.
    pub fn encode_full_state(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Encoded state vector, sent to a peer to request missing updates.
    pub fn state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// Encode every update the holder of `remote_state_vector` is missing.
    pub fn encode_diff(&self, remote_state_vector: &[u8]) -> Result<Vec<u8>, DocumentError> {
        let sv = StateVector::decode_v1(remote_state_vector)?;
        let txn = self.doc.transact();
        Ok(txn.encode_state_as_update_v1(&sv))
    }

    /// Seed the replica with an initial buffer.
    ///
    /// The seed is written under a client id derived from the content, so
    /// replicas seeded with the same text hold byte-identical seed items and
    /// merge them idempotently. Nothing is emitted. Returns `false` for an
    /// empty seed.
    pub fn seed(&mut self, text: &str) -> Result<bool, DocumentError> {
        if text.is_empty() {
            return Ok(false);
        }
        self.apply_delta(&seed_update(text))?;
        Ok(true)
    }
}

impl Default for ReplicatedDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic client id for seeding `text`.
pub fn seed_client_id(text: &str) -> u64 {
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, text.as_bytes());
    // Never 0, and never colliding with the masked range boundary.
    ((id.as_u128() as u64) & CLIENT_ID_MASK) | 1
}

/// Encoded update inserting `text` into an empty document under
/// [`seed_client_id`].
pub fn seed_update(text: &str) -> Vec<u8> {
    let doc = Doc::with_client_id(seed_client_id(text));
    let ytext = doc.get_or_insert_text(TEXT_NAME);
    let mut txn = doc.transact_mut();
    ytext.insert(&mut txn, 0, text);
    txn.encode_update_v1()
}
