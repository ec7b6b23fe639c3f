//! Proof Verification
//!
//! Interface for authenticating oracle reveals, plus a signer-set verifier
//! for ed25519 key-management signers.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use sha2::{Sha256, Digest};
use thiserror::Error;

use crate::core::ids::RequestId;

/// Domain separator for reveal signatures.
const REVEAL_DOMAIN: &[u8] = b"SEALED_PACTS_REVEAL_V1";

/// Length of one ed25519 signature in a proof.
pub const SIGNATURE_LEN: usize = 64;

/// Authenticates that `plaintext` is the correct decryption for `request_id`.
pub trait ProofVerifier: Send + Sync {
    /// Verify an oracle proof.
    fn verify(
        &self,
        request_id: RequestId,
        plaintext: &[u8],
        proof: &[u8],
    ) -> Result<(), ProofVerificationError>;
}

/// Errors during proof verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofVerificationError {
    /// Proof is not a whole number of signatures.
    #[error("invalid proof format")]
    InvalidProofFormat,

    /// Too few distinct signers signed this reveal.
    #[error("insufficient signatures: {valid} valid, {required} required")]
    InsufficientSignatures {
        /// Distinct signers that verified.
        valid: usize,
        /// Threshold.
        required: usize,
    },

    /// Threshold is zero or exceeds the signer count.
    #[error("invalid threshold {threshold} for {signers} signers")]
    InvalidThreshold {
        /// Requested threshold.
        threshold: usize,
        /// Configured signers.
        signers: usize,
    },
}

/// Message every signer signs for a reveal.
pub fn reveal_digest(request_id: RequestId, plaintext: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(REVEAL_DOMAIN);
    hasher.update(request_id.0.to_be_bytes());
    hasher.update((plaintext.len() as u64).to_be_bytes());
    hasher.update(plaintext);
    hasher.finalize().into()
}

/// Sign a reveal as one signer.
pub fn sign_reveal(key: &SigningKey, request_id: RequestId, plaintext: &[u8]) -> [u8; SIGNATURE_LEN] {
    key.sign(&reveal_digest(request_id, plaintext)).to_bytes()
}

/// Stub verifier for testing (accepts any non-empty proof).
pub struct StubProofVerifier;

impl ProofVerifier for StubProofVerifier {
    fn verify(
        &self,
        _request_id: RequestId,
        _plaintext: &[u8],
        proof: &[u8],
    ) -> Result<(), ProofVerificationError> {
        if proof.is_empty() {
            return Err(ProofVerificationError::InvalidProofFormat);
        }
        Ok(())
    }
}

/// Threshold verifier over a fixed set of ed25519 signers.
///
/// A proof is a concatenation of 64-byte signatures over [`reveal_digest`].
/// Each configured signer counts at most once.
pub struct SignerSetVerifier {
    signers: Vec<VerifyingKey>,
    threshold: usize,
}

impl SignerSetVerifier {
    /// Create a verifier requiring `threshold` of `signers`.
    pub fn new(signers: Vec<VerifyingKey>, threshold: usize) -> Result<Self, ProofVerificationError> {
        if threshold == 0 || threshold > signers.len() {
            return Err(ProofVerificationError::InvalidThreshold {
                threshold,
                signers: signers.len(),
            });
        }
        Ok(Self { signers, threshold })
    }
}

impl ProofVerifier for SignerSetVerifier {
    fn verify(
        &self,
        request_id: RequestId,
        plaintext: &[u8],
        proof: &[u8],
    ) -> Result<(), ProofVerificationError> {
        if proof.is_empty() || proof.len() % SIGNATURE_LEN != 0 {
            return Err(ProofVerificationError::InvalidProofFormat);
        }

        let digest = reveal_digest(request_id, plaintext);
        let mut matched = vec![false; self.signers.len()];

        for chunk in proof.chunks_exact(SIGNATURE_LEN) {
            let bytes: [u8; SIGNATURE_LEN] = chunk
                .try_into()
                .map_err(|_| ProofVerificationError::InvalidProofFormat)?;
            let signature = Signature::from_bytes(&bytes);

            let hit = self.signers.iter().enumerate().find(|(i, key)| {
                !matched[*i] && key.verify_strict(&digest, &signature).is_ok()
            });
            if let Some((i, _)) = hit {
                matched[i] = true;
            }
        }

        let valid = matched.iter().filter(|m| **m).count();
        if valid < self.threshold {
            return Err(ProofVerificationError::InsufficientSignatures {
                valid,
                required: self.threshold,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> Vec<SigningKey> {
        (1u8..=3).map(|i| SigningKey::from_bytes(&[i; 32])).collect()
    }

    fn verifier(threshold: usize) -> SignerSetVerifier {
        let public = keys().iter().map(SigningKey::verifying_key).collect();
        SignerSetVerifier::new(public, threshold).unwrap()
    }

    #[test]
    fn test_stub_verifier() {
        let stub = StubProofVerifier;
        assert!(stub.verify(RequestId(1), &[], &[]).is_err());
        assert!(stub.verify(RequestId(1), &[], &[1, 2, 3]).is_ok());
    }

    #[test]
    fn test_threshold_met() {
        let keys = keys();
        let plaintext = [1u8, 2, 3, 4];
        let mut proof = Vec::new();
        proof.extend_from_slice(&sign_reveal(&keys[0], RequestId(7), &plaintext));
        proof.extend_from_slice(&sign_reveal(&keys[2], RequestId(7), &plaintext));

        assert!(verifier(2).verify(RequestId(7), &plaintext, &proof).is_ok());
        assert_eq!(
            verifier(3).verify(RequestId(7), &plaintext, &proof),
            Err(ProofVerificationError::InsufficientSignatures { valid: 2, required: 3 })
        );
    }

    #[test]
    fn test_duplicate_signatures_count_once() {
        let keys = keys();
        let sig = sign_reveal(&keys[0], RequestId(1), b"x");
        let proof = [sig, sig].concat();

        assert_eq!(
            verifier(2).verify(RequestId(1), b"x", &proof),
            Err(ProofVerificationError::InsufficientSignatures { valid: 1, required: 2 })
        );
    }

    #[test]
    fn test_signature_bound_to_request_and_plaintext() {
        let keys = keys();
        let proof = sign_reveal(&keys[1], RequestId(1), b"plain");

        assert!(verifier(1).verify(RequestId(1), b"plain", &proof).is_ok());
        assert!(verifier(1).verify(RequestId(2), b"plain", &proof).is_err());
        assert!(verifier(1).verify(RequestId(1), b"other", &proof).is_err());
    }

    #[test]
    fn test_malformed_proof() {
        assert_eq!(
            verifier(1).verify(RequestId(1), b"x", &[0u8; 63]),
            Err(ProofVerificationError::InvalidProofFormat)
        );
        assert_eq!(
            verifier(1).verify(RequestId(1), b"x", &[]),
            Err(ProofVerificationError::InvalidProofFormat)
        );
    }

    #[test]
    fn test_invalid_threshold() {
        let public: Vec<VerifyingKey> = keys().iter().map(SigningKey::verifying_key).collect();
        assert!(SignerSetVerifier::new(public.clone(), 0).is_err());
        assert!(SignerSetVerifier::new(public, 4).is_err());
    }
}
