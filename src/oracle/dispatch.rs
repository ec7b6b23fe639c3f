//! Oracle Dispatch
//!
//! Hands ordered ciphertext handles to the external decryption oracle and
//! receives an opaque request id. Dispatch is enqueue-only; the reveal
//! arrives later through the callback path.

use std::sync::atomic::{AtomicU64, Ordering};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::cipher::CipherHandle;
use crate::core::ids::RequestId;

/// Entry point the oracle must call back into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackSelector {
    /// `on_decryption_callback` for pact batches.
    PactReveal,
}

/// A job handed to the oracle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDecryption {
    /// Id the oracle assigned.
    pub request_id: RequestId,
    /// Handles to decrypt, in plaintext order.
    pub handles: Vec<CipherHandle>,
    /// Where to deliver the reveal.
    pub callback: CallbackSelector,
}

/// Oracle dispatch errors.
#[derive(Debug, Error)]
pub enum OracleError {
    /// Nobody is consuming decryption jobs.
    #[error("oracle queue closed")]
    QueueClosed,

    /// Request id space exhausted.
    #[error("request id space exhausted")]
    Exhausted,
}

/// External decryption oracle.
pub trait DecryptionOracle: Send + Sync {
    /// Dispatch a decryption job. Must not block on the reveal.
    fn dispatch(
        &self,
        handles: &[CipherHandle],
        callback: CallbackSelector,
    ) -> Result<RequestId, OracleError>;
}

/// Oracle front that assigns sequential ids and queues jobs for a relayer.
pub struct QueuedOracle {
    next_id: AtomicU64,
    jobs: mpsc::UnboundedSender<PendingDecryption>,
}

impl QueuedOracle {
    /// Create the oracle and the receiving end of its job queue.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PendingDecryption>) {
        let (jobs, rx) = mpsc::unbounded_channel();
        (Self { next_id: AtomicU64::new(1), jobs }, rx)
    }
}

impl DecryptionOracle for QueuedOracle {
    fn dispatch(
        &self,
        handles: &[CipherHandle],
        callback: CallbackSelector,
    ) -> Result<RequestId, OracleError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if id == u64::MAX {
            return Err(OracleError::Exhausted);
        }
        let request_id = RequestId(id);

        self.jobs
            .send(PendingDecryption {
                request_id,
                handles: handles.to_vec(),
                callback,
            })
            .map_err(|_| OracleError::QueueClosed)?;

        debug!("Dispatched request {} ({} handles)", request_id, handles.len());
        Ok(request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_ids_and_queue() {
        let (oracle, mut rx) = QueuedOracle::new();
        let first = oracle.dispatch(&[[1; 32]], CallbackSelector::PactReveal).unwrap();
        let second = oracle.dispatch(&[[2; 32], [3; 32]], CallbackSelector::PactReveal).unwrap();

        assert_eq!(first, RequestId(1));
        assert_eq!(second, RequestId(2));

        let job = rx.try_recv().unwrap();
        assert_eq!(job.request_id, first);
        assert_eq!(job.handles, vec![[1; 32]]);
        assert_eq!(rx.try_recv().unwrap().handles.len(), 2);
    }

    #[test]
    fn test_closed_queue() {
        let (oracle, rx) = QueuedOracle::new();
        drop(rx);
        assert!(matches!(
            oracle.dispatch(&[[1; 32]], CallbackSelector::PactReveal),
            Err(OracleError::QueueClosed)
        ));
    }
}
