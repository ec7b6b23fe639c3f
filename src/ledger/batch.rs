//! Batch Ledger
//!
//! Owns the batch lifecycle, record intake and the per-batch ordered record
//! index. Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::core::cipher::ConfidentialBackend;
use crate::core::clock::Timestamp;
use crate::core::ids::{ActorId, BatchId, RecordId};
use crate::error::PactError;
use crate::ledger::access::{AccessControl, ActionKind};
use crate::ledger::events::LedgerEvent;
use crate::ledger::record::{PactInput, PactRecord};

/// Batch lifecycle and record store.
#[derive(Debug)]
pub struct BatchLedger {
    /// Highest batch id issued (or the initial counter).
    current: BatchId,
    /// Is `current` open for submissions?
    open: bool,
    /// Next record id to allocate.
    next_record_id: u64,
    /// All records ever submitted.
    records: BTreeMap<RecordId, PactRecord>,
    /// Record ids per batch, in submission order.
    batch_index: BTreeMap<BatchId, Vec<RecordId>>,
    /// Events not yet drained.
    events: Vec<LedgerEvent>,
}

impl Default for BatchLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchLedger {
    /// Counter at 1, no batch open, no records.
    pub fn new() -> Self {
        Self {
            current: BatchId::INITIAL,
            open: false,
            next_record_id: 1,
            records: BTreeMap::new(),
            batch_index: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open a new batch. No-op if one is already open.
    pub fn open_batch(&mut self, access: &AccessControl, caller: &ActorId) -> Result<BatchId, PactError> {
        access.require_owner(caller)?;
        access.require_not_paused()?;

        if self.open {
            debug!("Batch {} already open", self.current);
            return Ok(self.current);
        }

        let next = self.current.next().ok_or(PactError::InvalidBatch {
            batch: self.current,
            reason: "batch counter exhausted",
        })?;
        self.current = next;
        self.open = true;
        self.events.push(LedgerEvent::BatchOpened { batch_id: next });
        info!("Batch {} opened", next);
        Ok(next)
    }

    /// Close the open batch. No-op if already closed.
    pub fn close_batch(&mut self, access: &AccessControl, caller: &ActorId) -> Result<BatchId, PactError> {
        access.require_owner(caller)?;
        access.require_not_paused()?;

        if !self.open {
            debug!("Batch {} already closed", self.current);
            return Ok(self.current);
        }

        self.open = false;
        self.events.push(LedgerEvent::BatchClosed { batch_id: self.current });
        info!(
            "Batch {} closed with {} records",
            self.current,
            self.batch_record_ids(self.current).len()
        );
        Ok(self.current)
    }

    // =========================================================================
    // Intake
    // =========================================================================

    /// Accept a confidential record into the open batch.
    ///
    /// The batch tag is checked with confidential equality; the ledger never
    /// sees any plaintext.
    pub fn submit(
        &mut self,
        access: &mut AccessControl,
        backend: &dyn ConfidentialBackend,
        caller: ActorId,
        input: PactInput,
        now: Timestamp,
    ) -> Result<RecordId, PactError> {
        access.require_provider(&caller)?;
        access.require_not_paused()?;
        access.check_cooldown(&caller, ActionKind::Submission, now)?;

        let batch = self.open_batch_id().ok_or(PactError::NoOpenBatch)?;

        for (name, value) in input.named_fields() {
            if !backend.is_initialized(value) {
                warn!("Rejected submission from {}: `{}` uninitialized", caller, name);
                return Err(PactError::UninitializedInput(name));
            }
        }

        let expected_tag = backend.trivial_encrypt(batch.0);
        let tag_matches = backend.eq(&input.declared_batch, &expected_tag);
        if !backend.require(tag_matches) {
            warn!("Rejected submission from {}: batch tag mismatch", caller);
            return Err(PactError::BatchTagMismatch { open: batch });
        }

        let id = RecordId(self.next_record_id);
        self.next_record_id += 1;

        self.records.insert(id, PactRecord {
            id,
            subject_a: input.subject_a,
            subject_b: input.subject_b,
            kind: input.kind,
            origin_batch: input.declared_batch,
            batch,
            submitter: caller,
            submitted_at: now,
        });
        self.batch_index.entry(batch).or_default().push(id);
        access.record_action(caller, ActionKind::Submission, now);

        self.events.push(LedgerEvent::RecordSubmitted {
            record_id: id,
            batch_id: batch,
            submitter: caller,
        });
        info!("Record {} submitted to batch {} by {}", id, batch, caller);
        Ok(id)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Highest batch id issued.
    pub fn current_batch(&self) -> BatchId {
        self.current
    }

    /// Is a batch open?
    pub fn is_batch_open(&self) -> bool {
        self.open
    }

    /// The open batch, if any.
    pub fn open_batch_id(&self) -> Option<BatchId> {
        self.open.then_some(self.current)
    }

    /// Look up a record.
    pub fn record(&self, id: RecordId) -> Option<&PactRecord> {
        self.records.get(&id)
    }

    /// Total records stored.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Record ids of a batch, in submission order.
    pub fn batch_record_ids(&self, batch: BatchId) -> &[RecordId] {
        self.batch_index.get(&batch).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Records of a batch, in submission order.
    pub fn batch_records(&self, batch: BatchId) -> Vec<&PactRecord> {
        self.batch_record_ids(batch)
            .iter()
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    /// Drain pending events.
    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    /// Overwrite a stored record, simulating ciphertext drift.
    #[cfg(test)]
    pub(crate) fn replace_record(&mut self, record: PactRecord) {
        self.records.insert(record.id, record);
    }
}
