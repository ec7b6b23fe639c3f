//! Pact Records
//!
//! A record is four confidential 32-bit fields, immutable after submission.

use serde::{Serialize, Deserialize};

use crate::core::cipher::EncryptedU32;
use crate::core::clock::Timestamp;
use crate::core::ids::{ActorId, BatchId, RecordId};

/// Confidential fields per record.
pub const FIELDS_PER_RECORD: usize = 4;

/// Plaintext width of one field in bytes.
pub const FIELD_WIDTH: usize = 4;

/// Plaintext width of one revealed record in bytes.
pub const RECORD_PLAINTEXT_WIDTH: usize = FIELDS_PER_RECORD * FIELD_WIDTH;

/// Field names in commitment and plaintext order.
pub const FIELD_NAMES: [&str; FIELDS_PER_RECORD] = ["subject_a", "subject_b", "kind", "origin_batch"];

/// Kind of pact between two subjects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum PactKind {
    /// Neither subject attacks the other.
    NonAggression = 0,
    /// Each subject defends the other.
    MutualDefense = 1,
}

impl PactKind {
    /// Plaintext encoding.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Decode a revealed kind value.
    pub fn from_u32(value: u32) -> Option<PactKind> {
        match value {
            0 => Some(PactKind::NonAggression),
            1 => Some(PactKind::MutualDefense),
            _ => None,
        }
    }
}

/// Confidential submission input.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PactInput {
    /// First subject.
    pub subject_a: EncryptedU32,
    /// Second subject.
    pub subject_b: EncryptedU32,
    /// Encrypted [`PactKind`].
    pub kind: EncryptedU32,
    /// Encrypted batch tag; must equal the open batch.
    pub declared_batch: EncryptedU32,
}

impl PactInput {
    /// Fields in commitment order, paired with their names.
    pub fn named_fields(&self) -> [(&'static str, &EncryptedU32); FIELDS_PER_RECORD] {
        [
            (FIELD_NAMES[0], &self.subject_a),
            (FIELD_NAMES[1], &self.subject_b),
            (FIELD_NAMES[2], &self.kind),
            (FIELD_NAMES[3], &self.declared_batch),
        ]
    }
}

/// A stored record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PactRecord {
    /// Unique id.
    pub id: RecordId,
    /// First subject.
    pub subject_a: EncryptedU32,
    /// Second subject.
    pub subject_b: EncryptedU32,
    /// Encrypted [`PactKind`].
    pub kind: EncryptedU32,
    /// Encrypted batch tag.
    pub origin_batch: EncryptedU32,
    /// Public batch membership.
    pub batch: BatchId,
    /// Submitting provider.
    pub submitter: ActorId,
    /// Submission time.
    pub submitted_at: Timestamp,
}

impl PactRecord {
    /// Confidential fields in commitment order.
    pub fn fields(&self) -> [&EncryptedU32; FIELDS_PER_RECORD] {
        [&self.subject_a, &self.subject_b, &self.kind, &self.origin_batch]
    }
}
