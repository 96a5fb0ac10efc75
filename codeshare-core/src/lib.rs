//! # codeshare-core: buffer primitives for scaffolded collaborative editing
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ full buffer = prefix ⧺ editable body ⧺ suffix │
//! └───────────────┬──────────────────────────────┘
//!                 │
//!     ┌───────────┴───────────┐
//!     ▼                       ▼
//! BoundaryEnforcer      ReplicatedDocument
//! (scaffold check,      (Yrs text, binary
//!  last known good)      update deltas)
//! ```
//!
//! - [`boundary`]: prefix/suffix contract and revert-on-violation
//! - [`document`]: convergent replica with delta encode/apply
//! - [`lines`]: `{line, column}` ↔ byte offset resolution

pub mod boundary;
pub mod document;
pub mod lines;

pub use boundary::{BoundaryConfig, BoundaryEnforcer, Enforcement};
pub use document::{DocumentError, ReplicatedDocument, TextSplice, TEXT_NAME};
pub use lines::{LineTable, Position};
