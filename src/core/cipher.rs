//! Confidential Values
//!
//! Opaque encrypted 32-bit integers and the capability trait used to operate
//! on them. The ledger never sees plaintext: it can only ask whether a handle
//! is initialized, serialize it, and compare two values confidentially.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use serde::{Serialize, Deserialize};

use super::hash::hash_with_domain;

/// Domain separator for simulated handle derivation.
const HANDLE_DOMAIN: &[u8] = b"SEALED_PACTS_HANDLE_V1";

/// Canonical 32-byte ciphertext handle.
pub type CipherHandle = [u8; 32];

/// Encrypted 32-bit unsigned integer.
///
/// The all-zero handle is the uninitialized value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub struct EncryptedU32 {
    handle: CipherHandle,
}

impl EncryptedU32 {
    /// The uninitialized (zero) value.
    pub const UNINITIALIZED: EncryptedU32 = EncryptedU32 { handle: [0; 32] };

    /// Wrap a raw handle.
    pub const fn from_handle(handle: CipherHandle) -> Self {
        Self { handle }
    }

    /// Raw handle bytes.
    pub fn handle(&self) -> &CipherHandle {
        &self.handle
    }
}

/// Encrypted boolean, produced by confidential comparisons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncryptedBool {
    handle: CipherHandle,
}

impl EncryptedBool {
    /// Wrap a raw handle.
    pub const fn from_handle(handle: CipherHandle) -> Self {
        Self { handle }
    }

    /// Raw handle bytes.
    pub fn handle(&self) -> &CipherHandle {
        &self.handle
    }
}

/// Capability supplied by a confidential-computing library.
pub trait ConfidentialBackend: Send + Sync {
    /// Encrypt a client input under the instance key.
    fn encrypt_input(&self, value: u32) -> EncryptedU32;

    /// Is this a well-formed ciphertext rather than the zero/default value?
    fn is_initialized(&self, value: &EncryptedU32) -> bool;

    /// Canonical 32-byte serialization of the ciphertext handle.
    fn to_bytes32(&self, value: &EncryptedU32) -> CipherHandle;

    /// Encrypt a public constant so it can be compared confidentially.
    /// The same constant may map to the same handle.
    fn trivial_encrypt(&self, value: u32) -> EncryptedU32;

    /// Confidential equality. The result stays encrypted.
    fn eq(&self, a: &EncryptedU32, b: &EncryptedU32) -> EncryptedBool;

    /// Require an encrypted condition to hold, evaluated inside the library.
    /// The condition is consumed.
    fn require(&self, condition: EncryptedBool) -> bool;
}

// =============================================================================
// SIMULATED BACKEND
// =============================================================================

#[derive(Default)]
struct SimulatedStore {
    nonce: u64,
    values: BTreeMap<CipherHandle, u32>,
    bools: BTreeMap<CipherHandle, bool>,
    /// Cached handles of trivially encrypted constants.
    constants: BTreeMap<u32, CipherHandle>,
}

impl SimulatedStore {
    fn mint(&mut self, tag: u8, value: u32) -> CipherHandle {
        self.nonce += 1;
        let mut preimage = Vec::with_capacity(13);
        preimage.push(tag);
        preimage.extend_from_slice(&self.nonce.to_le_bytes());
        preimage.extend_from_slice(&value.to_le_bytes());
        hash_with_domain(HANDLE_DOMAIN, &preimage)
    }
}

/// In-process stand-in for a confidential-computing library.
///
/// Handles are SHA-256 derived and never reveal their plaintext. The
/// plaintext table is only reachable through [`SimulatedBackend::reveal`],
/// which models the off-system decryption performed by the oracle.
#[derive(Default)]
pub struct SimulatedBackend {
    store: Mutex<SimulatedStore>,
}

impl SimulatedBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Client-side encryption of an input value.
    pub fn encrypt(&self, value: u32) -> EncryptedU32 {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = store.mint(0, value);
        store.values.insert(handle, value);
        EncryptedU32::from_handle(handle)
    }

    /// Off-system decryption. Only the oracle path may call this.
    pub fn reveal(&self, handle: &CipherHandle) -> Option<u32> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.values.get(handle).copied()
    }

    /// Number of live ciphertexts, unconsumed conditions included.
    pub fn len(&self) -> usize {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.values.len() + store.bools.len()
    }

    /// True when no ciphertexts have been minted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConfidentialBackend for SimulatedBackend {
    fn encrypt_input(&self, value: u32) -> EncryptedU32 {
        self.encrypt(value)
    }

    fn is_initialized(&self, value: &EncryptedU32) -> bool {
        if value.handle == [0; 32] {
            return false;
        }
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.values.contains_key(&value.handle)
    }

    fn to_bytes32(&self, value: &EncryptedU32) -> CipherHandle {
        value.handle
    }

    fn trivial_encrypt(&self, value: u32) -> EncryptedU32 {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = store.constants.get(&value) {
            return EncryptedU32::from_handle(*handle);
        }
        let handle = store.mint(2, value);
        store.values.insert(handle, value);
        store.constants.insert(value, handle);
        EncryptedU32::from_handle(handle)
    }

    fn eq(&self, a: &EncryptedU32, b: &EncryptedU32) -> EncryptedBool {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let result = match (store.values.get(&a.handle), store.values.get(&b.handle)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        };
        let handle = store.mint(1, result as u32);
        store.bools.insert(handle, result);
        EncryptedBool::from_handle(handle)
    }

    fn require(&self, condition: EncryptedBool) -> bool {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.bools.remove(&condition.handle).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_produces_fresh_handles() {
        let backend = SimulatedBackend::new();
        let a = backend.encrypt(5);
        let b = backend.encrypt(5);
        assert_ne!(a, b);
        assert_eq!(backend.reveal(a.handle()), Some(5));
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn test_uninitialized_detection() {
        let backend = SimulatedBackend::new();
        assert!(!backend.is_initialized(&EncryptedU32::UNINITIALIZED));
        assert!(!backend.is_initialized(&EncryptedU32::from_handle([3; 32])));
        assert!(backend.is_initialized(&backend.encrypt(0)));
    }

    #[test]
    fn test_confidential_equality() {
        let backend = SimulatedBackend::new();
        let a = backend.encrypt(2);
        let b = backend.trivial_encrypt(2);
        let c = backend.encrypt(3);

        assert!(backend.require(backend.eq(&a, &b)));
        assert!(!backend.require(backend.eq(&a, &c)));
        assert!(!backend.require(backend.eq(&a, &EncryptedU32::UNINITIALIZED)));
    }

    #[test]
    fn test_constants_are_cached() {
        let backend = SimulatedBackend::new();
        let first = backend.trivial_encrypt(7);
        assert_eq!(backend.trivial_encrypt(7), first);
        assert_ne!(backend.trivial_encrypt(8), first);
        assert_eq!(backend.reveal(first.handle()), Some(7));
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn test_condition_consumed_by_require() {
        let backend = SimulatedBackend::new();
        let a = backend.encrypt(4);
        let condition = backend.eq(&a, &backend.trivial_encrypt(4));
        assert_eq!(backend.len(), 3);

        assert!(backend.require(condition));
        assert_eq!(backend.len(), 2);
        // A spent condition no longer holds
        assert!(!backend.require(condition));
    }

    #[test]
    fn test_encrypt_input_is_known_to_backend() {
        let backend = SimulatedBackend::new();
        let value = backend.encrypt_input(12);
        assert!(backend.is_initialized(&value));
        assert_eq!(backend.reveal(value.handle()), Some(12));
    }

    #[test]
    fn test_unknown_condition_fails_closed() {
        let backend = SimulatedBackend::new();
        assert!(!backend.require(EncryptedBool::from_handle([1; 32])));
    }
}
