//! Reveal Integrity
//!
//! Everything needed to decide whether an oracle reveal is acceptable:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PROOF SYSTEM                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  commitment.rs   - Handle snapshots and their commitments   │
//! │  plaintext.rs    - Revealed plaintext layout and decoding   │
//! │  verify.rs       - Oracle proof verification                │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;
pub mod plaintext;
pub mod verify;

// Re-export key types
pub use commitment::HandleSnapshot;
pub use plaintext::{RevealedBatch, RevealedRecord};
pub use verify::{
    ProofVerifier, ProofVerificationError, SignerSetVerifier, StubProofVerifier,
    reveal_digest, sign_reveal,
};
