//! Integrity Hashing
//!
//! Deterministic SHA-256 commitments over ordered ciphertext handles.
//! Used to bind a decryption request to the exact ciphertext state it
//! targeted, and to derive simulated handles.

use sha2::{Sha256, Digest};
use super::ids::InstanceId;

/// Hash output type (256 bits / 32 bytes).
pub type Commitment = [u8; 32];

/// Domain separator for decryption integrity commitments.
pub const INTEGRITY_DOMAIN: &[u8] = b"SEALED_PACTS_INTEGRITY_V1";

/// Order-sensitive hasher over ciphertext handles.
///
/// Handles are absorbed in the order they are fed; the instance identity is
/// absorbed last, on finalize.
pub struct IntegrityHasher {
    hasher: Sha256,
    handles: u64,
}

impl IntegrityHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher, handles: 0 }
    }

    /// Create hasher for decryption request commitments.
    pub fn for_decryption() -> Self {
        Self::new(INTEGRITY_DOMAIN)
    }

    /// Absorb one canonical 32-byte ciphertext handle.
    #[inline]
    pub fn update_handle(&mut self, handle: &[u8; 32]) {
        self.hasher.update(handle);
        self.handles += 1;
    }

    /// Number of handles absorbed so far.
    pub fn handle_count(&self) -> u64 {
        self.handles
    }

    /// Bind to the instance identity and return the commitment.
    pub fn finalize(mut self, instance: &InstanceId) -> Commitment {
        self.hasher.update(instance.as_bytes());
        self.hasher.finalize().into()
    }
}

/// Compute the commitment for an ordered handle list.
pub fn commit_handles<'a, I>(handles: I, instance: &InstanceId) -> Commitment
where
    I: IntoIterator<Item = &'a [u8; 32]>,
{
    let mut hasher = IntegrityHasher::for_decryption();
    for handle in handles {
        hasher.update_handle(handle);
    }
    hasher.finalize(instance)
}

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

// =============================================================================
// TESTS
// =============================================================================
