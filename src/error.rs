//! Error Taxonomy
//!
//! Every failure surfaced by the ledger and coordinator. All are returned
//! synchronously to the caller of the failing operation; none are retried.

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::ids::{ActorId, BatchId, RequestId};

/// Broad class of a [`PactError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Caller lacks the required role.
    Authorization,
    /// System paused or a collaborator is unreachable.
    Availability,
    /// Per-actor cooldown has not elapsed.
    RateLimit,
    /// Malformed or out-of-range input.
    Validation,
    /// Ciphertext state drifted between request and callback.
    Integrity,
    /// Callback for an already resolved request.
    Replay,
    /// Oracle proof rejected.
    Proof,
}

/// Ledger and coordinator errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PactError {
    /// Caller is not the owner.
    #[error("caller {0} is not the owner")]
    NotOwner(ActorId),

    /// Caller is not an allow-listed provider.
    #[error("caller {0} is not a provider")]
    NotProvider(ActorId),

    /// Callback did not arrive through the trusted relay.
    #[error("caller {0} is not the trusted oracle relay")]
    UntrustedRelay(ActorId),

    /// System is paused.
    #[error("system is paused")]
    Paused,

    /// Oracle dispatch failed.
    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// Cooldown has not elapsed.
    #[error("cooldown active: {remaining}s remaining")]
    CooldownActive {
        /// Seconds until the action is allowed again.
        remaining: u64,
    },

    /// Cooldown parameter must be positive.
    #[error("cooldown must be greater than zero")]
    InvalidCooldown,

    /// Submission while no batch is open.
    #[error("no batch is open")]
    NoOpenBatch,

    /// Declared batch tag is not the open batch (confidential comparison).
    #[error("declared batch does not match open batch {open}")]
    BatchTagMismatch {
        /// Batch that was open at submission time.
        open: BatchId,
    },

    /// A confidential input was the zero/default handle.
    #[error("confidential input `{0}` is not initialized")]
    UninitializedInput(&'static str),

    /// Batch cannot be decrypted (open, future, or empty).
    #[error("batch {batch} cannot be decrypted: {reason}")]
    InvalidBatch {
        /// Requested batch.
        batch: BatchId,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Unknown decryption request id.
    #[error("decryption request {0} not found")]
    RequestNotFound(RequestId),

    /// Recomputed commitment differs from the one captured at request time.
    #[error("integrity commitment mismatch for request {0}")]
    StateMismatch(RequestId),

    /// Request was already resolved.
    #[error("decryption request {0} already resolved")]
    ReplayDetected(RequestId),

    /// Plaintext length or oracle proof rejected.
    #[error("invalid proof: {0}")]
    InvalidProof(String),
}

impl PactError {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotOwner(_) | Self::NotProvider(_) | Self::UntrustedRelay(_) => {
                ErrorClass::Authorization
            }
            Self::Paused | Self::OracleUnavailable(_) => ErrorClass::Availability,
            Self::CooldownActive { .. } => ErrorClass::RateLimit,
            Self::InvalidCooldown
            | Self::NoOpenBatch
            | Self::BatchTagMismatch { .. }
            | Self::UninitializedInput(_)
            | Self::InvalidBatch { .. }
            | Self::RequestNotFound(_) => ErrorClass::Validation,
            Self::StateMismatch(_) => ErrorClass::Integrity,
            Self::ReplayDetected(_) => ErrorClass::Replay,
            Self::InvalidProof(_) => ErrorClass::Proof,
        }
    }
}
