//! Decryption Requests
//!
//! `Requested` → `Resolved`, exactly once. Requests are never deleted.

use serde::{Serialize, Deserialize};

use crate::core::clock::Timestamp;
use crate::core::hash::Commitment;
use crate::core::ids::{ActorId, BatchId, RecordId, RequestId};
use crate::error::PactError;

/// Request state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Commitment captured and oracle dispatched.
    Requested,
    /// Callback accepted. Terminal.
    Resolved,
}

/// A dispatched decryption request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecryptionRequest {
    /// Oracle-issued id.
    pub request_id: RequestId,
    /// Batch being revealed.
    pub batch_id: BatchId,
    /// Records snapshotted at request time, in index order.
    pub record_ids: Vec<RecordId>,
    /// Commitment over the snapshotted handles.
    pub commitment: Commitment,
    /// Caller who asked for the reveal.
    pub requested_by: ActorId,
    /// Request time. No expiry is enforced.
    pub requested_at: Timestamp,
    /// Current state.
    pub state: RequestState,
}

impl DecryptionRequest {
    /// Has the callback been accepted?
    pub fn is_resolved(&self) -> bool {
        self.state == RequestState::Resolved
    }

    /// Flip to `Resolved`. Fails if already resolved.
    pub(crate) fn resolve(&mut self) -> Result<(), PactError> {
        if self.is_resolved() {
            return Err(PactError::ReplayDetected(self.request_id));
        }
        self.state = RequestState::Resolved;
        Ok(())
    }
}

/// Returned to the caller of `request_decryption`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionTicket {
    /// Oracle-issued id.
    pub request_id: RequestId,
    /// Batch being revealed.
    pub batch_id: BatchId,
    /// Commitment captured at request time.
    pub commitment: Commitment,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_once() {
        let mut request = DecryptionRequest {
            request_id: RequestId(1),
            batch_id: BatchId(2),
            record_ids: vec![RecordId(1)],
            commitment: [0; 32],
            requested_by: ActorId::default(),
            requested_at: 0,
            state: RequestState::Requested,
        };

        assert!(request.resolve().is_ok());
        assert!(request.is_resolved());
        assert_eq!(request.resolve(), Err(PactError::ReplayDetected(RequestId(1))));
        assert_eq!(request.state, RequestState::Resolved);
    }
}
