//! Core primitives.
//!
//! Identifiers, confidential value handles, integrity hashing and time.
//! Nothing here knows about batches or decryption requests.

pub mod ids;
pub mod cipher;
pub mod hash;
pub mod clock;

// Re-export core types
pub use ids::{ActorId, InstanceId, BatchId, RecordId, RequestId};
pub use cipher::{CipherHandle, ConfidentialBackend, EncryptedBool, EncryptedU32, SimulatedBackend};
pub use hash::{Commitment, IntegrityHasher, commit_handles};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
