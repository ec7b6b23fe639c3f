//! # Sealed Pacts
//!
//! Confidential pact records submitted into time-boxed batches, revealed
//! later by an external decryption oracle whose answer is checked against
//! a commitment captured at request time.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SEALED PACTS                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Primitives                                │
//! │  ├── ids.rs      - Actor, instance, batch, record, request   │
//! │  ├── cipher.rs   - Confidential value capability             │
//! │  ├── hash.rs     - Integrity commitment                      │
//! │  └── clock.rs    - Time source                               │
//! │                                                              │
//! │  ledger/         - Intake (synchronous)                      │
//! │  ├── access.rs   - Roles, pause flag, cooldowns              │
//! │  ├── record.rs   - Confidential pact records                 │
//! │  ├── batch.rs    - Batch lifecycle and record index          │
//! │  └── events.rs   - Ledger events                             │
//! │                                                              │
//! │  proof/          - Reveal verification                       │
//! │  oracle/         - Oracle dispatch and simulated relayer     │
//! │  coordinator/    - Decryption requests and callbacks         │
//! │  state.rs        - Aggregate store for one instance          │
//! │                                                              │
//! │  network/        - Async front (non-deterministic)           │
//! │  ├── service.rs  - Mutex-guarded state + event broadcast     │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  └── auth.rs     - JWT caller identity                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reveal Guarantees
//!
//! - A request commits to the ordered ciphertext handles of its batch
//!   and the instance identity
//! - A callback is accepted only if the commitment recomputed from current
//!   state still matches and the oracle proof verifies
//! - A request resolves at most once; rejected callbacks change nothing

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod coordinator;
pub mod core;
pub mod error;
pub mod ledger;
pub mod network;
pub mod oracle;
pub mod proof;
pub mod state;

// Re-export commonly used types
pub use config::CoordinatorConfig;
pub use coordinator::{DecryptionCoordinator, DecryptionTicket, RequestState};
pub use core::{ActorId, BatchId, InstanceId, RecordId, RequestId};
pub use error::{ErrorClass, PactError};
pub use ledger::{AccessUpdate, BatchLedger, LedgerEvent, PactInput, PactKind};
pub use proof::RevealedBatch;
pub use state::PactState;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
