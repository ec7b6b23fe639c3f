//! Ledger Module
//!
//! Batch lifecycle, confidential record intake, access control and events.
//!
//! ## Module Structure
//!
//! - `access`: Owner, providers, relay, pause flag, cooldowns
//! - `record`: Confidential record layout
//! - `batch`: Batch lifecycle and per-batch record index
//! - `events`: Audit events

pub mod access;
pub mod record;
pub mod batch;
pub mod events;

// Re-export key types
pub use access::{AccessControl, AccessUpdate, ActionKind};
pub use record::{PactInput, PactKind, PactRecord, FIELDS_PER_RECORD, FIELD_WIDTH, RECORD_PLAINTEXT_WIDTH};
pub use batch::BatchLedger;
pub use events::LedgerEvent;
