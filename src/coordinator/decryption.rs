//! Decryption Coordinator
//!
//! Issues decryption requests bound to a snapshot commitment of a closed
//! batch, and accepts each oracle callback at most once.
//!
//! ## Callback checks
//!
//! A callback is accepted only if, in order:
//! 1. it came through the trusted relay
//! 2. the request exists and is not yet resolved
//! 3. the plaintext has exactly the expected length
//! 4. the commitment recomputed from *current* ledger state matches
//! 5. the oracle proof verifies
//!
//! Any failure leaves the request untouched in `Requested`.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::cipher::ConfidentialBackend;
use crate::core::clock::Timestamp;
use crate::core::ids::{ActorId, BatchId, InstanceId, RequestId};
use crate::coordinator::request::{DecryptionRequest, DecryptionTicket, RequestState};
use crate::error::PactError;
use crate::ledger::access::{AccessControl, ActionKind};
use crate::ledger::batch::BatchLedger;
use crate::ledger::events::LedgerEvent;
use crate::oracle::dispatch::{CallbackSelector, DecryptionOracle};
use crate::proof::commitment::HandleSnapshot;
use crate::proof::plaintext::{decode_records, expected_len, RevealedBatch};
use crate::proof::verify::ProofVerifier;

/// Owns decryption requests and their lifecycle.
pub struct DecryptionCoordinator {
    /// Identity bound into every commitment.
    instance: InstanceId,
    /// External oracle.
    oracle: Arc<dyn DecryptionOracle>,
    /// External proof verifier.
    verifier: Arc<dyn ProofVerifier>,
    /// All requests ever dispatched.
    requests: BTreeMap<RequestId, DecryptionRequest>,
    /// Events not yet drained.
    events: Vec<LedgerEvent>,
}

impl DecryptionCoordinator {
    /// Create a coordinator for one instance.
    pub fn new(
        instance: InstanceId,
        oracle: Arc<dyn DecryptionOracle>,
        verifier: Arc<dyn ProofVerifier>,
    ) -> Self {
        Self {
            instance,
            oracle,
            verifier,
            requests: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    /// Ask the oracle to reveal a closed batch.
    pub fn request_decryption(
        &mut self,
        access: &mut AccessControl,
        ledger: &BatchLedger,
        backend: &dyn ConfidentialBackend,
        caller: ActorId,
        target: BatchId,
        now: Timestamp,
    ) -> Result<DecryptionTicket, PactError> {
        access.require_not_paused()?;
        access.check_cooldown(&caller, ActionKind::DecryptionRequest, now)?;

        let current = ledger.current_batch();
        if target > current {
            return Err(PactError::InvalidBatch { batch: target, reason: "batch has not been opened" });
        }
        if target == current && ledger.is_batch_open() {
            return Err(PactError::InvalidBatch { batch: target, reason: "batch is still open" });
        }

        let snapshot = HandleSnapshot::capture(backend, ledger.batch_records(target));
        if snapshot.is_empty() {
            return Err(PactError::InvalidBatch { batch: target, reason: "batch has no records" });
        }
        let commitment = snapshot.commitment(&self.instance);

        let request_id = self
            .oracle
            .dispatch(&snapshot.handles, CallbackSelector::PactReveal)
            .map_err(|e| PactError::OracleUnavailable(e.to_string()))?;
        if self.requests.contains_key(&request_id) {
            // The job is already queued and cannot be recalled
            warn!(
                "Oracle reissued request id {} for batch {}; its queued job is orphaned",
                request_id, target
            );
            return Err(PactError::OracleUnavailable(format!(
                "oracle reissued request id {request_id}"
            )));
        }

        self.requests.insert(request_id, DecryptionRequest {
            request_id,
            batch_id: target,
            record_ids: snapshot.record_ids,
            commitment,
            requested_by: caller,
            requested_at: now,
            state: RequestState::Requested,
        });
        access.record_action(caller, ActionKind::DecryptionRequest, now);

        self.events.push(LedgerEvent::DecryptionRequested { request_id, batch_id: target });
        info!(
            "Decryption request {} for batch {} (commitment {})",
            request_id,
            target,
            hex::encode(commitment)
        );

        Ok(DecryptionTicket { request_id, batch_id: target, commitment })
    }

    /// Verify and apply an oracle callback.
    #[allow(clippy::too_many_arguments)]
    pub fn on_decryption_callback(
        &mut self,
        access: &AccessControl,
        ledger: &BatchLedger,
        backend: &dyn ConfidentialBackend,
        caller: &ActorId,
        request_id: RequestId,
        plaintext: &[u8],
        proof: &[u8],
    ) -> Result<RevealedBatch, PactError> {
        access.require_relay(caller)?;

        let request = self
            .requests
            .get_mut(&request_id)
            .ok_or(PactError::RequestNotFound(request_id))?;
        if request.is_resolved() {
            warn!("Replay rejected for request {}", request_id);
            return Err(PactError::ReplayDetected(request_id));
        }

        let expected = expected_len(request.record_ids.len());
        if plaintext.len() != expected {
            warn!("Request {}: plaintext {} bytes, expected {}", request_id, plaintext.len(), expected);
            return Err(PactError::InvalidProof(format!(
                "plaintext is {} bytes, expected {}",
                plaintext.len(),
                expected
            )));
        }

        let current = HandleSnapshot::capture(backend, ledger.batch_records(request.batch_id))
            .commitment(&self.instance);
        if current != request.commitment {
            warn!(
                "Request {}: state drifted (requested {}, now {})",
                request_id,
                hex::encode(request.commitment),
                hex::encode(current)
            );
            return Err(PactError::StateMismatch(request_id));
        }

        self.verifier
            .verify(request_id, plaintext, proof)
            .map_err(|e| {
                warn!("Request {}: proof rejected: {}", request_id, e);
                PactError::InvalidProof(e.to_string())
            })?;

        let records = decode_records(&request.record_ids, plaintext).ok_or_else(|| {
            PactError::InvalidProof(format!("plaintext is not {expected} bytes"))
        })?;
        request.resolve()?;

        let batch_id = request.batch_id;
        self.events.push(LedgerEvent::DecryptionCompleted { request_id, batch_id });
        info!("Decryption request {} resolved ({} records)", request_id, records.len());

        Ok(RevealedBatch { request_id, batch_id, records })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Identity bound into commitments.
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Look up a request.
    pub fn request(&self, id: RequestId) -> Option<&DecryptionRequest> {
        self.requests.get(&id)
    }

    /// Requests still awaiting a callback.
    pub fn pending_requests(&self) -> impl Iterator<Item = &DecryptionRequest> {
        self.requests.values().filter(|r| !r.is_resolved())
    }

    /// Total requests ever dispatched.
    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    /// Drain pending events.
    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        debug!("Draining {} coordinator events", self.events.len());
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use crate::core::cipher::{CipherHandle, EncryptedU32, SimulatedBackend};
    use crate::core::ids::RecordId;
    use crate::ledger::record::{PactInput, PactKind};
    use crate::oracle::dispatch::{OracleError, PendingDecryption, QueuedOracle};
    use crate::oracle::relayer::SimulatedRelayer;
    use crate::proof::verify::SignerSetVerifier;
    use tokio::sync::mpsc::UnboundedReceiver;

    const OWNER: ActorId = ActorId::new([1; 16]);
    const PROVIDER: ActorId = ActorId::new([2; 16]);
    const RELAY: ActorId = ActorId::new([3; 16]);
    const REQUESTER: ActorId = ActorId::new([4; 16]);

    struct Harness {
        access: AccessControl,
        ledger: BatchLedger,
        backend: Arc<SimulatedBackend>,
        coordinator: DecryptionCoordinator,
        jobs: UnboundedReceiver<PendingDecryption>,
        relayer: SimulatedRelayer,
    }

    impl Harness {
        fn new() -> Self {
            let mut access = AccessControl::new(OWNER, 60).unwrap();
            access.add_provider(&OWNER, PROVIDER).unwrap();
            access.set_relay(&OWNER, RELAY).unwrap();

            let backend = Arc::new(SimulatedBackend::new());
            let key = SigningKey::from_bytes(&[42; 32]);
            let verifier = SignerSetVerifier::new(vec![key.verifying_key()], 1).unwrap();
            let (oracle, jobs) = QueuedOracle::new();
            let coordinator = DecryptionCoordinator::new(
                InstanceId::new([7; 16]),
                Arc::new(oracle),
                Arc::new(verifier),
            );
            let relayer = SimulatedRelayer::new(backend.clone(), vec![key]);

            Self { access, ledger: BatchLedger::new(), backend, coordinator, jobs, relayer }
        }

        fn submit(&mut self, values: [u32; 3], now: Timestamp) -> RecordId {
            let batch = self.ledger.open_batch_id().unwrap();
            let input = PactInput {
                subject_a: self.backend.encrypt(values[0]),
                subject_b: self.backend.encrypt(values[1]),
                kind: self.backend.encrypt(values[2]),
                declared_batch: self.backend.encrypt(batch.0),
            };
            self.ledger
                .submit(&mut self.access, self.backend.as_ref(), PROVIDER, input, now)
                .unwrap()
        }

        /// Batch 2 with two records, closed.
        fn closed_batch(&mut self) -> BatchId {
            let batch = self.ledger.open_batch(&self.access, &OWNER).unwrap();
            self.submit([100, 200, PactKind::NonAggression.as_u32()], 0);
            self.submit([300, 400, PactKind::MutualDefense.as_u32()], 60);
            self.ledger.close_batch(&self.access, &OWNER).unwrap();
            batch
        }

        fn request(&mut self, batch: BatchId, now: Timestamp) -> Result<DecryptionTicket, PactError> {
            self.coordinator.request_decryption(
                &mut self.access,
                &self.ledger,
                self.backend.as_ref(),
                REQUESTER,
                batch,
                now,
            )
        }

        fn callback(&mut self, caller: ActorId, id: RequestId, plaintext: &[u8], proof: &[u8]) -> Result<RevealedBatch, PactError> {
            self.coordinator.on_decryption_callback(
                &self.access,
                &self.ledger,
                self.backend.as_ref(),
                &caller,
                id,
                plaintext,
                proof,
            )
        }
    }

    #[test]
    fn test_round_trip() {
        let mut h = Harness::new();
        let batch = h.closed_batch();

        let ticket = h.request(batch, 1000).unwrap();
        assert_eq!(ticket.batch_id, BatchId(2));

        let job = h.jobs.try_recv().unwrap();
        assert_eq!(job.request_id, ticket.request_id);
        assert_eq!(job.handles.len(), 8);

        let payload = h.relayer.fulfil(&job).unwrap();
        let revealed = h.callback(RELAY, payload.request_id, &payload.plaintext, &payload.proof).unwrap();

        assert_eq!(revealed.batch_id, batch);
        assert_eq!(revealed.records.len(), 2);
        assert_eq!(revealed.records[0].subject_a, 100);
        assert_eq!(revealed.records[0].subject_b, 200);
        assert_eq!(revealed.records[0].pact_kind(), Some(PactKind::NonAggression));
        assert_eq!(revealed.records[1].subject_a, 300);
        assert_eq!(revealed.records[1].origin_batch, 2);
        assert!(h.coordinator.request(ticket.request_id).unwrap().is_resolved());
        assert_eq!(h.coordinator.pending_requests().count(), 0);

        let events = h.coordinator.take_events();
        assert_eq!(events, vec![
            LedgerEvent::DecryptionRequested { request_id: ticket.request_id, batch_id: batch },
            LedgerEvent::DecryptionCompleted { request_id: ticket.request_id, batch_id: batch },
        ]);
    }

    #[test]
    fn test_replay_rejected() {
        let mut h = Harness::new();
        let batch = h.closed_batch();
        h.request(batch, 1000).unwrap();
        let payload = h.relayer.fulfil(&h.jobs.try_recv().unwrap()).unwrap();

        h.callback(RELAY, payload.request_id, &payload.plaintext, &payload.proof).unwrap();
        assert_eq!(
            h.callback(RELAY, payload.request_id, &payload.plaintext, &payload.proof),
            Err(PactError::ReplayDetected(payload.request_id))
        );
        // Replay is checked before anything about the payload
        assert_eq!(
            h.callback(RELAY, payload.request_id, &[], &[]),
            Err(PactError::ReplayDetected(payload.request_id))
        );
    }

    #[test]
    fn test_state_drift_rejected_then_retryable() {
        let mut h = Harness::new();
        let batch = h.closed_batch();
        let ticket = h.request(batch, 1000).unwrap();
        let payload = h.relayer.fulfil(&h.jobs.try_recv().unwrap()).unwrap();

        let record_id = h.ledger.batch_record_ids(batch)[0];
        let original = h.ledger.record(record_id).unwrap().clone();
        let mut drifted = original.clone();
        drifted.subject_b = h.backend.encrypt(200);
        h.ledger.replace_record(drifted);

        assert_eq!(
            h.callback(RELAY, ticket.request_id, &payload.plaintext, &payload.proof),
            Err(PactError::StateMismatch(ticket.request_id))
        );
        assert!(!h.coordinator.request(ticket.request_id).unwrap().is_resolved());

        h.ledger.replace_record(original);
        assert!(h.callback(RELAY, ticket.request_id, &payload.plaintext, &payload.proof).is_ok());
    }

    #[test]
    fn test_callback_rejections_leave_request_pending() {
        let mut h = Harness::new();
        let batch = h.closed_batch();
        let ticket = h.request(batch, 1000).unwrap();
        let payload = h.relayer.fulfil(&h.jobs.try_recv().unwrap()).unwrap();
        let id = ticket.request_id;

        assert_eq!(
            h.callback(REQUESTER, id, &payload.plaintext, &payload.proof),
            Err(PactError::UntrustedRelay(REQUESTER))
        );
        assert_eq!(
            h.callback(RELAY, RequestId(99), &payload.plaintext, &payload.proof),
            Err(PactError::RequestNotFound(RequestId(99)))
        );
        assert!(matches!(
            h.callback(RELAY, id, &payload.plaintext[..31], &payload.proof),
            Err(PactError::InvalidProof(_))
        ));

        let mut forged = payload.plaintext.clone();
        forged[3] ^= 1;
        assert!(matches!(
            h.callback(RELAY, id, &forged, &payload.proof),
            Err(PactError::InvalidProof(_))
        ));

        assert_eq!(h.coordinator.pending_requests().count(), 1);
        assert!(h.callback(RELAY, id, &payload.plaintext, &payload.proof).is_ok());
    }

    #[test]
    fn test_request_batch_validation() {
        let mut h = Harness::new();

        // Never opened
        assert!(matches!(h.request(BatchId(1), 0), Err(PactError::InvalidBatch { .. })));
        assert!(matches!(h.request(BatchId(5), 0), Err(PactError::InvalidBatch { .. })));

        h.ledger.open_batch(&h.access, &OWNER).unwrap();
        h.submit([1, 2, 0], 0);
        assert_eq!(
            h.request(BatchId(2), 0),
            Err(PactError::InvalidBatch { batch: BatchId(2), reason: "batch is still open" })
        );
        assert_eq!(
            h.request(BatchId(3), 0),
            Err(PactError::InvalidBatch { batch: BatchId(3), reason: "batch has not been opened" })
        );

        h.ledger.close_batch(&h.access, &OWNER).unwrap();
        h.ledger.open_batch(&h.access, &OWNER).unwrap();
        // Batch 3 is open and empty; batch 2 is closed and decryptable
        assert!(h.request(BatchId(3), 0).is_err());
        assert!(h.request(BatchId(2), 0).is_ok());
        // Nothing was dispatched for the rejected requests
        assert_eq!(h.coordinator.request_count(), 1);
    }

    #[test]
    fn test_empty_closed_batch_rejected() {
        let mut h = Harness::new();
        h.ledger.open_batch(&h.access, &OWNER).unwrap();
        h.ledger.close_batch(&h.access, &OWNER).unwrap();
        assert_eq!(
            h.request(BatchId(2), 0),
            Err(PactError::InvalidBatch { batch: BatchId(2), reason: "batch has no records" })
        );
    }

    #[test]
    fn test_request_cooldown_and_pause() {
        let mut h = Harness::new();
        let batch = h.closed_batch();

        h.request(batch, 1000).unwrap();
        assert_eq!(h.request(batch, 1010), Err(PactError::CooldownActive { remaining: 50 }));
        assert!(h.request(batch, 1060).is_ok());

        h.access.set_paused(&OWNER, true).unwrap();
        assert_eq!(h.request(batch, 5000), Err(PactError::Paused));
    }

    #[test]
    fn test_uninitialized_fields_never_reach_ledger() {
        let mut h = Harness::new();
        h.ledger.open_batch(&h.access, &OWNER).unwrap();
        let input = PactInput {
            subject_a: EncryptedU32::UNINITIALIZED,
            subject_b: h.backend.encrypt(1),
            kind: h.backend.encrypt(0),
            declared_batch: h.backend.encrypt(2),
        };
        assert_eq!(
            h.ledger.submit(&mut h.access, h.backend.as_ref(), PROVIDER, input, 0),
            Err(PactError::UninitializedInput("subject_a"))
        );
        h.ledger.close_batch(&h.access, &OWNER).unwrap();
        assert!(h.request(BatchId(2), 0).is_err());
    }

    /// Oracle that answers every dispatch with the same id.
    struct ReissuingOracle;

    impl DecryptionOracle for ReissuingOracle {
        fn dispatch(&self, _handles: &[CipherHandle], _callback: CallbackSelector) -> Result<RequestId, OracleError> {
            Ok(RequestId(1))
        }
    }

    #[test]
    fn test_reissued_request_id_keeps_original() {
        let mut h = Harness::new();
        let key = SigningKey::from_bytes(&[42; 32]);
        h.coordinator = DecryptionCoordinator::new(
            InstanceId::new([7; 16]),
            Arc::new(ReissuingOracle),
            Arc::new(SignerSetVerifier::new(vec![key.verifying_key()], 1).unwrap()),
        );

        let first = h.closed_batch();
        let ticket = h.request(first, 0).unwrap();

        h.ledger.open_batch(&h.access, &OWNER).unwrap();
        h.submit([7, 8, 0], 120);
        let second = h.ledger.close_batch(&h.access, &OWNER).unwrap();

        assert!(matches!(h.request(second, 120), Err(PactError::OracleUnavailable(_))));
        assert_eq!(h.coordinator.request_count(), 1);

        let stored = h.coordinator.request(ticket.request_id).unwrap();
        assert_eq!(stored.batch_id, first);
        assert_eq!(stored.commitment, ticket.commitment);
        assert!(!stored.is_resolved());
        // The failed request did not consume the caller's cooldown
        assert_eq!(h.access.last_action_time(&REQUESTER, ActionKind::DecryptionRequest), Some(0));
    }

    #[test]
    fn test_commitment_bound_to_instance() {
        let mut h = Harness::new();
        let batch = h.closed_batch();
        let ticket = h.request(batch, 0).unwrap();

        let other = InstanceId::new([8; 16]);
        let foreign = HandleSnapshot::capture(h.backend.as_ref(), h.ledger.batch_records(batch))
            .commitment(&other);
        assert_ne!(ticket.commitment, foreign);
        assert_eq!(h.coordinator.instance(), InstanceId::new([7; 16]));
    }
}
