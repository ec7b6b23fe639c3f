//! Ledger Events
//!
//! Emitted on every successful state change, for off-system audit.

use serde::{Serialize, Deserialize};
use crate::core::ids::{ActorId, BatchId, RecordId, RequestId};

/// Audit event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A new batch was opened.
    BatchOpened {
        /// Opened batch.
        batch_id: BatchId,
    },

    /// The open batch was closed.
    BatchClosed {
        /// Closed batch.
        batch_id: BatchId,
    },

    /// A record was accepted into the open batch.
    RecordSubmitted {
        /// New record.
        record_id: RecordId,
        /// Public batch membership.
        batch_id: BatchId,
        /// Submitting provider.
        submitter: ActorId,
    },

    /// A decryption request was dispatched to the oracle.
    DecryptionRequested {
        /// Oracle-issued id.
        request_id: RequestId,
        /// Batch being revealed.
        batch_id: BatchId,
    },

    /// An oracle callback was accepted.
    DecryptionCompleted {
        /// Resolved request.
        request_id: RequestId,
        /// Revealed batch.
        batch_id: BatchId,
    },
}

impl LedgerEvent {
    /// Batch the event concerns.
    pub fn batch_id(&self) -> BatchId {
        match self {
            Self::BatchOpened { batch_id }
            | Self::BatchClosed { batch_id }
            | Self::RecordSubmitted { batch_id, .. }
            | Self::DecryptionRequested { batch_id, .. }
            | Self::DecryptionCompleted { batch_id, .. } => *batch_id,
        }
    }
}
