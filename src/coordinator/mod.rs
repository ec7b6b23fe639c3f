//! Decryption Coordination
//!
//! - `request`: Request records and states
//! - `decryption`: Request issuance and callback verification

pub mod request;
pub mod decryption;

pub use request::{DecryptionRequest, DecryptionTicket, RequestState};
pub use decryption::DecryptionCoordinator;
