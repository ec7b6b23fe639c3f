//! Pact State
//!
//! The explicit store for one instance: access control, batch ledger and
//! decryption coordinator, plus the injected confidential backend. Every
//! operation borrows the whole store mutably, so callers serialize access
//! through a single lock.

use std::sync::Arc;

use crate::config::CoordinatorConfig;
use crate::coordinator::{DecryptionCoordinator, DecryptionRequest, DecryptionTicket};
use crate::core::cipher::{ConfidentialBackend, EncryptedU32};
use crate::core::clock::Timestamp;
use crate::core::ids::{ActorId, BatchId, RecordId, RequestId};
use crate::error::PactError;
use crate::ledger::{AccessControl, AccessUpdate, BatchLedger, LedgerEvent, PactInput, PactRecord};
use crate::oracle::DecryptionOracle;
use crate::proof::{ProofVerifier, RevealedBatch};

/// Aggregate state of one sealed-pacts instance.
pub struct PactState {
    access: AccessControl,
    ledger: BatchLedger,
    coordinator: DecryptionCoordinator,
    backend: Arc<dyn ConfidentialBackend>,
}

impl PactState {
    /// Create a fresh instance owned by `owner`.
    pub fn new(
        owner: ActorId,
        config: &CoordinatorConfig,
        backend: Arc<dyn ConfidentialBackend>,
        oracle: Arc<dyn DecryptionOracle>,
        verifier: Arc<dyn ProofVerifier>,
    ) -> Result<Self, PactError> {
        Ok(Self {
            access: AccessControl::new(owner, config.cooldown_secs)?,
            ledger: BatchLedger::new(),
            coordinator: DecryptionCoordinator::new(config.instance_id, oracle, verifier),
            backend,
        })
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Encrypt client inputs under the instance's backend.
    pub fn encrypt_inputs(&self, values: &[u32]) -> Vec<EncryptedU32> {
        values.iter().map(|v| self.backend.encrypt_input(*v)).collect()
    }

    /// Apply an owner-gated access-control change.
    pub fn update_access(&mut self, caller: &ActorId, update: AccessUpdate) -> Result<(), PactError> {
        self.access.apply(caller, update)
    }

    /// Open a new batch.
    pub fn open_batch(&mut self, caller: &ActorId) -> Result<BatchId, PactError> {
        self.ledger.open_batch(&self.access, caller)
    }

    /// Close the open batch.
    pub fn close_batch(&mut self, caller: &ActorId) -> Result<BatchId, PactError> {
        self.ledger.close_batch(&self.access, caller)
    }

    /// Submit a record into the open batch.
    pub fn submit(&mut self, caller: ActorId, input: PactInput, now: Timestamp) -> Result<RecordId, PactError> {
        self.ledger
            .submit(&mut self.access, self.backend.as_ref(), caller, input, now)
    }

    /// Request a reveal of a closed batch.
    pub fn request_decryption(
        &mut self,
        caller: ActorId,
        batch: BatchId,
        now: Timestamp,
    ) -> Result<DecryptionTicket, PactError> {
        self.coordinator.request_decryption(
            &mut self.access,
            &self.ledger,
            self.backend.as_ref(),
            caller,
            batch,
            now,
        )
    }

    /// Apply an oracle callback.
    pub fn on_decryption_callback(
        &mut self,
        caller: &ActorId,
        request_id: RequestId,
        plaintext: &[u8],
        proof: &[u8],
    ) -> Result<RevealedBatch, PactError> {
        self.coordinator.on_decryption_callback(
            &self.access,
            &self.ledger,
            self.backend.as_ref(),
            caller,
            request_id,
            plaintext,
            proof,
        )
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Roles, pause flag and cooldowns.
    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    /// Batches and records.
    pub fn ledger(&self) -> &BatchLedger {
        &self.ledger
    }

    /// Records of a batch, in submission order.
    pub fn batch_records(&self, batch: BatchId) -> Vec<&PactRecord> {
        self.ledger.batch_records(batch)
    }

    /// Look up a request.
    pub fn request(&self, id: RequestId) -> Option<&DecryptionRequest> {
        self.coordinator.request(id)
    }

    /// Drain events from every component, ledger first.
    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        let mut events = self.ledger.take_events();
        events.extend(self.coordinator.take_events());
        events
    }
}
