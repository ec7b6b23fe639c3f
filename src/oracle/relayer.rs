//! Simulated Relayer
//!
//! Stands in for the off-system oracle: decrypts queued jobs through the
//! simulated backend and signs the reveal with a key-management signer set.

use std::sync::Arc;
use ed25519_dalek::SigningKey;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::cipher::SimulatedBackend;
use crate::core::ids::RequestId;
use crate::oracle::dispatch::PendingDecryption;
use crate::proof::plaintext::encode_fields;
use crate::proof::verify::sign_reveal;

/// Inbound callback: plaintext plus proof for one request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    /// Request being answered.
    pub request_id: RequestId,
    /// Revealed plaintext.
    pub plaintext: Vec<u8>,
    /// Concatenated signer signatures.
    pub proof: Vec<u8>,
}

impl CallbackPayload {
    /// Binary encoding for relay transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Decode from binary.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// Relayer errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayerError {
    /// A handle in the job is not known to the backend.
    #[error("unknown ciphertext handle {0}")]
    UnknownHandle(String),

    /// The payload could not be framed.
    #[error("callback encoding failed: {0}")]
    Encoding(String),
}

/// Decrypts and signs queued jobs.
pub struct SimulatedRelayer {
    backend: Arc<SimulatedBackend>,
    signers: Vec<SigningKey>,
}

impl SimulatedRelayer {
    /// Create a relayer signing with every key in `signers`.
    pub fn new(backend: Arc<SimulatedBackend>, signers: Vec<SigningKey>) -> Self {
        Self { backend, signers }
    }

    /// Produce the callback payload for a job.
    pub fn fulfil(&self, job: &PendingDecryption) -> Result<CallbackPayload, RelayerError> {
        let values = job
            .handles
            .iter()
            .map(|handle| {
                self.backend
                    .reveal(handle)
                    .ok_or_else(|| RelayerError::UnknownHandle(hex::encode(handle)))
            })
            .collect::<Result<Vec<u32>, _>>()?;

        let plaintext = encode_fields(&values);
        let proof = self
            .signers
            .iter()
            .flat_map(|key| sign_reveal(key, job.request_id, &plaintext))
            .collect();

        Ok(CallbackPayload {
            request_id: job.request_id,
            plaintext,
            proof,
        })
    }

    /// Fulfil a job and frame the payload for relay transport.
    pub fn fulfil_frame(&self, job: &PendingDecryption) -> Result<Vec<u8>, RelayerError> {
        self.fulfil(job)?
            .to_bytes()
            .map_err(|e| RelayerError::Encoding(e.to_string()))
    }
}
