//! Decryption Commitments
//!
//! Snapshot the ciphertext handles of a batch and bind them to the instance.
//! The same snapshot is taken at request time and again at callback time;
//! the two commitments must be equal for the reveal to be accepted.

use serde::{Serialize, Deserialize};

use crate::core::cipher::{CipherHandle, ConfidentialBackend};
use crate::core::hash::{commit_handles, Commitment};
use crate::core::ids::{InstanceId, RecordId};
use crate::ledger::record::PactRecord;

/// Ordered ciphertext handles of a record set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleSnapshot {
    /// Records in batch-index order.
    pub record_ids: Vec<RecordId>,
    /// Canonical handles, `FIELDS_PER_RECORD` per record, in field order.
    pub handles: Vec<CipherHandle>,
}

impl HandleSnapshot {
    /// Capture handles of `records` in the order given.
    pub fn capture<'a, I>(backend: &dyn ConfidentialBackend, records: I) -> Self
    where
        I: IntoIterator<Item = &'a PactRecord>,
    {
        let mut record_ids = Vec::new();
        let mut handles = Vec::new();
        for record in records {
            record_ids.push(record.id);
            handles.extend(record.fields().into_iter().map(|field| backend.to_bytes32(field)));
        }
        Self { record_ids, handles }
    }

    /// Commitment over the handles, bound to `instance`.
    pub fn commitment(&self, instance: &InstanceId) -> Commitment {
        commit_handles(&self.handles, instance)
    }

    /// True when no records were captured.
    pub fn is_empty(&self) -> bool {
        self.record_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cipher::{EncryptedU32, SimulatedBackend};
    use crate::core::ids::{ActorId, BatchId};

    const INSTANCE: InstanceId = InstanceId::new([5; 16]);

    fn record(id: u64, backend: &SimulatedBackend) -> PactRecord {
        PactRecord {
            id: RecordId(id),
            subject_a: backend.encrypt(1),
            subject_b: backend.encrypt(2),
            kind: backend.encrypt(0),
            origin_batch: backend.encrypt(2),
            batch: BatchId(2),
            submitter: ActorId::default(),
            submitted_at: 0,
        }
    }

    #[test]
    fn test_snapshot_layout() {
        let backend = SimulatedBackend::new();
        let records = [record(1, &backend), record(2, &backend)];
        let snapshot = HandleSnapshot::capture(&backend, &records);

        assert_eq!(snapshot.record_ids, vec![RecordId(1), RecordId(2)]);
        assert_eq!(snapshot.handles.len(), 8);
        assert_eq!(snapshot.handles[4], *records[1].subject_a.handle());
    }

    #[test]
    fn test_record_order_changes_commitment() {
        let backend = SimulatedBackend::new();
        let a = record(1, &backend);
        let b = record(2, &backend);

        let forward = HandleSnapshot::capture(&backend, [&a, &b]);
        let reversed = HandleSnapshot::capture(&backend, [&b, &a]);
        assert_ne!(forward.commitment(&INSTANCE), reversed.commitment(&INSTANCE));
    }

    #[test]
    fn test_field_order_changes_commitment() {
        let backend = SimulatedBackend::new();
        let original = record(1, &backend);
        let mut swapped = original.clone();
        std::mem::swap(&mut swapped.subject_a, &mut swapped.subject_b);

        let c1 = HandleSnapshot::capture(&backend, [&original]).commitment(&INSTANCE);
        let c2 = HandleSnapshot::capture(&backend, [&swapped]).commitment(&INSTANCE);
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_handle_drift_changes_commitment() {
        let backend = SimulatedBackend::new();
        let original = record(1, &backend);
        let mut drifted = original.clone();
        drifted.kind = EncryptedU32::from_handle([0xAB; 32]);

        let c1 = HandleSnapshot::capture(&backend, [&original]).commitment(&INSTANCE);
        let c2 = HandleSnapshot::capture(&backend, [&drifted]).commitment(&INSTANCE);
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_empty_snapshot() {
        let backend = SimulatedBackend::new();
        let snapshot = HandleSnapshot::capture(&backend, std::iter::empty::<&PactRecord>());
        assert!(snapshot.is_empty());
        assert!(snapshot.handles.is_empty());
    }
}
