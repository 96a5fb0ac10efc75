//! # codeshare-collab: synchronization engine for scaffolded code buffers
//!
//! ## Architecture
//!
//! ```text
//!  TextSurface (host widget)
//!        │ edits / selection                  ▲ text, decorations
//!        ▼                                    │
//! ┌──────────────────────── EditorSession ────────────────────────┐
//! │ UpdateReconciler ── BoundaryEnforcer ── ReplicatedDocument    │
//! │ PresenceRoom ── PresenceOverlay ── SelectionTracker           │
//! │ LanguageSwitchController        RoomStateLoader               │
//! └───────────────┬───────────────────────────────────────────────┘
//!                 │ SessionHost (deltas, presence, callbacks)
//!                 ▼
//!            PeerLink  ── bincode SyncMessage frames ──►  transport
//!                                                         (RoomRelay)
//! ```
//!
//! ## Modules
//!
//! - [`session`]: per-participant composition root
//! - [`reconciler`]: local/remote update state machine (no echo)
//! - [`presence`] / [`overlay`]: presence messages and decorations
//! - [`language`]: languages and buffer hand-over on a switch
//! - [`room`]: late-join snapshot adoption
//! - [`protocol`] / [`link`]: wire frames, offline queue
//! - [`broadcast`]: in-process room relay

pub mod broadcast;
pub mod language;
pub mod link;
pub mod overlay;
pub mod presence;
pub mod protocol;
pub mod reconciler;
pub mod room;
pub mod session;
pub mod surface;

pub use broadcast::{RelayStats, RoomRelay};
pub use language::{ContentSource, Language, LanguageSwitch, LanguageSwitchController, SwitchResolution};
pub use link::{ConnectionState, LinkConfig, LinkEvent, OfflineQueue, PeerLink};
pub use overlay::{Decoration, DecorationSet, PresenceError, PresenceOverlay, SelectionTracker};
pub use presence::{
    CursorColor, ParticipantPresence, PresenceMessage, PresenceReport, PresenceRoom, WirePosition,
};
pub use protocol::{MessageType, PeerInfo, ProtocolError, SyncMessage};
pub use reconciler::{DeltaEncoding, LocalOutcome, ReconcileState, RemoteOutcome, UpdateReconciler};
pub use room::{CodeSource, RoomSnapshot, RoomStateLoader, SnapshotDecision};
pub use session::{EditorSession, QueuedHost, SessionConfig, SessionHost};
pub use surface::{MemorySurface, TextSurface};
