//! Revealed Plaintext
//!
//! Layout: for each record in batch-index order, the four fields in
//! commitment order, each a big-endian `u32`.

use serde::{Serialize, Deserialize};

use crate::core::ids::{BatchId, RecordId, RequestId};
use crate::ledger::record::{PactKind, FIELDS_PER_RECORD, FIELD_WIDTH, RECORD_PLAINTEXT_WIDTH};

/// One revealed record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedRecord {
    /// Record the values belong to.
    pub record_id: RecordId,
    /// First subject.
    pub subject_a: u32,
    /// Second subject.
    pub subject_b: u32,
    /// Raw kind value.
    pub kind: u32,
    /// Batch tag as submitted.
    pub origin_batch: u32,
}

impl RevealedRecord {
    /// Decode the kind, if it is a known one.
    pub fn pact_kind(&self) -> Option<PactKind> {
        PactKind::from_u32(self.kind)
    }
}

/// Authenticated, fresh plaintext for a resolved request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedBatch {
    /// Resolved request.
    pub request_id: RequestId,
    /// Revealed batch.
    pub batch_id: BatchId,
    /// Records in batch-index order.
    pub records: Vec<RevealedRecord>,
}

/// Expected plaintext length for `records` records.
pub fn expected_len(records: usize) -> usize {
    records * RECORD_PLAINTEXT_WIDTH
}

/// Encode field values in plaintext layout.
pub fn encode_fields(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// Decode plaintext into records.
///
/// Returns `None` unless `plaintext` is exactly `expected_len(record_ids.len())`.
pub fn decode_records(record_ids: &[RecordId], plaintext: &[u8]) -> Option<Vec<RevealedRecord>> {
    if plaintext.len() != expected_len(record_ids.len()) {
        return None;
    }

    let records = record_ids
        .iter()
        .zip(plaintext.chunks_exact(RECORD_PLAINTEXT_WIDTH))
        .map(|(id, chunk)| {
            let mut fields = [0u32; FIELDS_PER_RECORD];
            for (field, bytes) in fields.iter_mut().zip(chunk.chunks_exact(FIELD_WIDTH)) {
                *field = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            RevealedRecord {
                record_id: *id,
                subject_a: fields[0],
                subject_b: fields[1],
                kind: fields[2],
                origin_batch: fields[3],
            }
        })
        .collect();

    Some(records)
}
