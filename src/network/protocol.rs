//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket. All messages
//! are JSON; byte strings (ciphertext handles, plaintext, proofs,
//! commitments) travel hex-encoded and actor ids as UUID strings.

use serde::{Serialize, Deserialize};

use crate::core::cipher::{CipherHandle, EncryptedU32};
use crate::core::ids::{BatchId, RecordId, RequestId};
use crate::coordinator::RequestState;
use crate::error::ErrorClass;
use crate::ledger::{LedgerEvent, PactInput};
use crate::proof::RevealedBatch;

/// Most values one `Encrypt` message may carry.
pub const MAX_ENCRYPT_VALUES: usize = 16;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate with a JWT.
    Auth {
        /// Bearer token.
        token: String,
    },

    /// Encrypt input values under the instance key.
    Encrypt {
        /// Plaintext values, at most [`MAX_ENCRYPT_VALUES`].
        values: Vec<u32>,
    },

    /// Open a new batch (owner).
    OpenBatch,

    /// Close the open batch (owner).
    CloseBatch,

    /// Submit a confidential record (provider).
    Submit(SubmitRequest),

    /// Request a reveal of a closed batch.
    RequestDecryption {
        /// Target batch.
        batch_id: BatchId,
    },

    /// Oracle callback (trusted relay).
    Callback(CallbackRequest),

    /// Owner-only administration.
    Admin(AdminAction),

    /// Query a batch.
    GetBatch {
        /// Target batch.
        batch_id: BatchId,
    },

    /// Query a decryption request.
    GetRequest {
        /// Target request.
        request_id: RequestId,
    },

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp.
        timestamp: u64,
    },
}

/// Confidential record submission. Each field is a hex ciphertext handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// First subject.
    pub subject_a: String,
    /// Second subject.
    pub subject_b: String,
    /// Pact kind.
    pub kind: String,
    /// Declared batch tag.
    pub declared_batch: String,
}

impl SubmitRequest {
    /// Build from ciphertext handles.
    pub fn from_input(input: &PactInput) -> Self {
        Self {
            subject_a: hex::encode(input.subject_a.handle()),
            subject_b: hex::encode(input.subject_b.handle()),
            kind: hex::encode(input.kind.handle()),
            declared_batch: hex::encode(input.declared_batch.handle()),
        }
    }

    /// Parse the hex handles. The error names the first malformed field.
    pub fn to_input(&self) -> Result<PactInput, &'static str> {
        let field = |raw: &str, name: &'static str| {
            decode_handle(raw).map(EncryptedU32::from_handle).ok_or(name)
        };
        Ok(PactInput {
            subject_a: field(&self.subject_a, "subject_a")?,
            subject_b: field(&self.subject_b, "subject_b")?,
            kind: field(&self.kind, "kind")?,
            declared_batch: field(&self.declared_batch, "declared_batch")?,
        })
    }
}

/// Oracle callback payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackRequest {
    /// Request being answered.
    pub request_id: RequestId,
    /// Hex plaintext.
    pub plaintext: String,
    /// Hex proof.
    pub proof: String,
}

/// Owner-only administration actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminAction {
    /// Allow-list a provider.
    AddProvider {
        /// Actor UUID.
        actor: String,
    },
    /// Remove a provider.
    RemoveProvider {
        /// Actor UUID.
        actor: String,
    },
    /// Set the trusted oracle relay.
    SetRelay {
        /// Actor UUID.
        actor: String,
    },
    /// Pause or resume.
    SetPaused {
        /// New pause flag.
        paused: bool,
    },
    /// Change the global cooldown.
    SetCooldown {
        /// Seconds, > 0.
        seconds: u64,
    },
    /// Hand ownership to another actor.
    TransferOwnership {
        /// Actor UUID.
        actor: String,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// Hex ciphertext handles, in request order.
    Encrypted {
        /// One handle per value.
        handles: Vec<String>,
    },

    /// Batch lifecycle result.
    Batch {
        /// Current batch id.
        batch_id: BatchId,
        /// Whether it is open.
        open: bool,
    },

    /// Submission accepted.
    Submitted {
        /// New record.
        record_id: RecordId,
    },

    /// Decryption request dispatched.
    DecryptionRequested {
        /// Oracle-issued id.
        request_id: RequestId,
        /// Target batch.
        batch_id: BatchId,
        /// Hex commitment.
        commitment: String,
    },

    /// Callback accepted; plaintext revealed.
    Revealed(RevealedBatch),

    /// Admin action applied.
    Done,

    /// Batch query result.
    BatchInfo(BatchInfo),

    /// Request query result.
    RequestInfo(RequestInfo),

    /// Broadcast ledger event.
    Event(LedgerEvent),

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server time (ms).
        server_time: u64,
    },

    /// Error.
    Error(ErrorBody),

    /// Server is shutting down.
    Shutdown {
        /// Reason.
        reason: String,
    },
}

/// Authentication result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether authentication succeeded.
    pub success: bool,
    /// Actor UUID on success.
    pub actor_id: Option<String>,
    /// Failure reason.
    pub error: Option<String>,
}

/// Batch snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInfo {
    /// Queried batch.
    pub batch_id: BatchId,
    /// Highest batch issued.
    pub current: BatchId,
    /// Whether the queried batch is the open one.
    pub open: bool,
    /// Records in index order.
    pub record_ids: Vec<RecordId>,
}

/// Request snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    /// Request id.
    pub request_id: RequestId,
    /// Target batch.
    pub batch_id: BatchId,
    /// Lifecycle state.
    pub state: RequestState,
    /// Hex commitment.
    pub commitment: String,
    /// Records snapshotted.
    pub record_ids: Vec<RecordId>,
    /// Request timestamp.
    pub requested_at: i64,
}

/// Error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code.
    pub code: ErrorCode,
    /// Failure class for rejected operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<ErrorClass>,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed message.
    InvalidInput,
    /// Operation requires authentication.
    NotAuthenticated,
    /// Token rejected.
    AuthFailed,
    /// Operation rejected by the ledger or coordinator.
    Rejected,
    /// Lookup miss.
    NotFound,
}

impl ServerMessage {
    /// Build an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorBody { code, class: None, message: message.into() })
    }
}

// =============================================================================
// SERIALIZATION
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Decode a 32-byte hex ciphertext handle.
pub fn decode_handle(raw: &str) -> Option<CipherHandle> {
    let bytes = hex::decode(raw.trim_start_matches("0x")).ok()?;
    bytes.try_into().ok()
}

/// Decode an arbitrary hex byte string.
pub fn decode_bytes(raw: &str) -> Option<Vec<u8>> {
    hex::decode(raw.trim_start_matches("0x")).ok()
}
