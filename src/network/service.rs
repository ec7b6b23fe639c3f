//! Pact Service
//!
//! Async front for one [`PactState`]. A single mutex linearizes every
//! operation; events drained after each operation are broadcast in order
//! while the lock is still held.

use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, instrument};

use crate::coordinator::DecryptionTicket;
use crate::core::cipher::EncryptedU32;
use crate::core::clock::Clock;
use crate::core::ids::{ActorId, BatchId, RecordId, RequestId};
use crate::error::PactError;
use crate::ledger::{AccessUpdate, LedgerEvent, PactInput};
use crate::network::protocol::{BatchInfo, RequestInfo};
use crate::proof::RevealedBatch;
use crate::state::PactState;

/// Event channel capacity.
pub const EVENT_BUFFER: usize = 256;

/// Shared, lock-guarded pact state.
pub struct PactService {
    state: Mutex<PactState>,
    clock: Arc<dyn Clock>,
    event_tx: broadcast::Sender<LedgerEvent>,
}

impl PactService {
    /// Wrap a state.
    pub fn new(state: PactState, clock: Arc<dyn Clock>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Mutex::new(state),
            clock,
            event_tx,
        }
    }

    /// Subscribe to ledger events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<LedgerEvent> {
        self.event_tx.subscribe()
    }

    fn publish(&self, state: &mut PactState) {
        for event in state.take_events() {
            // No subscribers is fine
            if self.event_tx.send(event).is_err() {
                debug!("No event subscribers");
            }
        }
    }

    /// Open a new batch.
    #[instrument(skip(self))]
    pub async fn open_batch(&self, caller: ActorId) -> Result<BatchId, PactError> {
        let mut state = self.state.lock().await;
        let batch = state.open_batch(&caller)?;
        self.publish(&mut state);
        Ok(batch)
    }

    /// Close the open batch.
    #[instrument(skip(self))]
    pub async fn close_batch(&self, caller: ActorId) -> Result<BatchId, PactError> {
        let mut state = self.state.lock().await;
        let batch = state.close_batch(&caller)?;
        self.publish(&mut state);
        Ok(batch)
    }

    /// Submit a confidential record.
    #[instrument(skip(self, input))]
    pub async fn submit(&self, caller: ActorId, input: PactInput) -> Result<RecordId, PactError> {
        let mut state = self.state.lock().await;
        let record = state.submit(caller, input, self.clock.now())?;
        self.publish(&mut state);
        Ok(record)
    }

    /// Request a reveal.
    #[instrument(skip(self))]
    pub async fn request_decryption(&self, caller: ActorId, batch: BatchId) -> Result<DecryptionTicket, PactError> {
        let mut state = self.state.lock().await;
        let ticket = state.request_decryption(caller, batch, self.clock.now())?;
        self.publish(&mut state);
        Ok(ticket)
    }

    /// Apply an oracle callback.
    #[instrument(skip(self, plaintext, proof), fields(plaintext_len = plaintext.len()))]
    pub async fn on_decryption_callback(
        &self,
        caller: ActorId,
        request_id: RequestId,
        plaintext: &[u8],
        proof: &[u8],
    ) -> Result<RevealedBatch, PactError> {
        let mut state = self.state.lock().await;
        let revealed = state.on_decryption_callback(&caller, request_id, plaintext, proof)?;
        self.publish(&mut state);
        Ok(revealed)
    }

    /// Apply an access-control change.
    #[instrument(skip(self))]
    pub async fn update_access(&self, caller: ActorId, update: AccessUpdate) -> Result<(), PactError> {
        let mut state = self.state.lock().await;
        state.update_access(&caller, update)
    }

    /// Encrypt client inputs so they can be submitted.
    #[instrument(skip(self, values), fields(count = values.len()))]
    pub async fn encrypt_inputs(&self, values: &[u32]) -> Vec<EncryptedU32> {
        let state = self.state.lock().await;
        state.encrypt_inputs(values)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Snapshot of a batch.
    pub async fn batch_info(&self, batch: BatchId) -> BatchInfo {
        let state = self.state.lock().await;
        BatchInfo {
            batch_id: batch,
            current: state.ledger().current_batch(),
            open: state.ledger().open_batch_id() == Some(batch),
            record_ids: state.ledger().batch_record_ids(batch).to_vec(),
        }
    }

    /// Snapshot of a request.
    pub async fn request_info(&self, id: RequestId) -> Option<RequestInfo> {
        let state = self.state.lock().await;
        state.request(id).map(|request| RequestInfo {
            request_id: request.request_id,
            batch_id: request.batch_id,
            state: request.state,
            commitment: hex::encode(request.commitment),
            record_ids: request.record_ids.clone(),
            requested_at: request.requested_at,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use crate::config::CoordinatorConfig;
    use crate::core::cipher::SimulatedBackend;
    use crate::core::clock::ManualClock;
    use crate::core::ids::InstanceId;
    use crate::coordinator::RequestState;
    use crate::oracle::{PendingDecryption, QueuedOracle, SimulatedRelayer};
    use crate::proof::SignerSetVerifier;
    use tokio::sync::mpsc::UnboundedReceiver;

    pub(crate) const OWNER: ActorId = ActorId::new([1; 16]);
    pub(crate) const PROVIDER: ActorId = ActorId::new([2; 16]);
    pub(crate) const RELAY: ActorId = ActorId::new([3; 16]);

    pub(crate) struct Fixture {
        pub service: Arc<PactService>,
        pub backend: Arc<SimulatedBackend>,
        pub clock: Arc<ManualClock>,
        pub jobs: UnboundedReceiver<PendingDecryption>,
        pub relayer: SimulatedRelayer,
    }

    pub(crate) async fn fixture() -> Fixture {
        let backend = Arc::new(SimulatedBackend::new());
        let key = SigningKey::from_bytes(&[5; 32]);
        let verifier = SignerSetVerifier::new(vec![key.verifying_key()], 1).unwrap();
        let (oracle, jobs) = QueuedOracle::new();
        let config = CoordinatorConfig {
            cooldown_secs: 10,
            instance_id: InstanceId::new([6; 16]),
            signer_threshold: 1,
        };
        let state = PactState::new(OWNER, &config, backend.clone(), Arc::new(oracle), Arc::new(verifier)).unwrap();
        let clock = Arc::new(ManualClock::new(1_000));
        let service = Arc::new(PactService::new(state, clock.clone()));

        service.update_access(OWNER, AccessUpdate::AddProvider(PROVIDER)).await.unwrap();
        service.update_access(OWNER, AccessUpdate::SetRelay(RELAY)).await.unwrap();

        let relayer = SimulatedRelayer::new(backend.clone(), vec![key]);
        Fixture { service, backend, clock, jobs, relayer }
    }

    pub(crate) fn input(backend: &SimulatedBackend, tag: u32) -> PactInput {
        PactInput {
            subject_a: backend.encrypt(10),
            subject_b: backend.encrypt(20),
            kind: backend.encrypt(1),
            declared_batch: backend.encrypt(tag),
        }
    }

    #[tokio::test]
    async fn test_service_round_trip_broadcasts_events() {
        let mut f = fixture().await;
        let mut events = f.service.subscribe_events();

        let batch = f.service.open_batch(OWNER).await.unwrap();
        f.service.submit(PROVIDER, input(&f.backend, batch.0)).await.unwrap();
        f.service.close_batch(OWNER).await.unwrap();
        let ticket = f.service.request_decryption(PROVIDER, batch).await.unwrap();

        let payload = f.relayer.fulfil(&f.jobs.recv().await.unwrap()).unwrap();
        let revealed = f
            .service
            .on_decryption_callback(RELAY, payload.request_id, &payload.plaintext, &payload.proof)
            .await
            .unwrap();
        assert_eq!(revealed.records[0].subject_b, 20);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[0], LedgerEvent::BatchOpened { batch_id: batch });
        assert_eq!(seen[4], LedgerEvent::DecryptionCompleted { request_id: ticket.request_id, batch_id: batch });

        let info = f.service.request_info(ticket.request_id).await.unwrap();
        assert_eq!(info.state, RequestState::Resolved);
        assert_eq!(info.requested_at, 1_000);
        assert_eq!(info.commitment, hex::encode(ticket.commitment));
    }

    #[tokio::test]
    async fn test_service_uses_clock_for_cooldown() {
        let f = fixture().await;
        f.service.open_batch(OWNER).await.unwrap();

        f.service.submit(PROVIDER, input(&f.backend, 2)).await.unwrap();
        assert_eq!(
            f.service.submit(PROVIDER, input(&f.backend, 2)).await,
            Err(PactError::CooldownActive { remaining: 10 })
        );
        f.clock.advance(10);
        f.service.submit(PROVIDER, input(&f.backend, 2)).await.unwrap();

        let info = f.service.batch_info(BatchId(2)).await;
        assert!(info.open);
        assert_eq!(info.record_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callbacks_resolve_once() {
        let mut f = fixture().await;
        let batch = f.service.open_batch(OWNER).await.unwrap();
        f.service.submit(PROVIDER, input(&f.backend, batch.0)).await.unwrap();
        f.service.close_batch(OWNER).await.unwrap();
        f.service.request_decryption(PROVIDER, batch).await.unwrap();
        let payload = Arc::new(f.relayer.fulfil(&f.jobs.recv().await.unwrap()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = f.service.clone();
                let payload = payload.clone();
                tokio::spawn(async move {
                    service
                        .on_decryption_callback(RELAY, payload.request_id, &payload.plaintext, &payload.proof)
                        .await
                })
            })
            .collect();

        let mut accepted = 0;
        let mut replays = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(PactError::ReplayDetected(_)) => replays += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(replays, 7);
    }

    #[tokio::test]
    async fn test_admin_requires_owner() {
        let f = fixture().await;
        assert_eq!(
            f.service.update_access(PROVIDER, AccessUpdate::SetPaused(true)).await,
            Err(PactError::NotOwner(PROVIDER))
        );
        f.service.update_access(OWNER, AccessUpdate::SetPaused(true)).await.unwrap();
        assert_eq!(f.service.open_batch(OWNER).await, Err(PactError::Paused));
        f.service.update_access(OWNER, AccessUpdate::SetPaused(false)).await.unwrap();
        assert_eq!(f.service.open_batch(OWNER).await, Ok(BatchId(2)));
    }
}
