//! Decryption Oracle
//!
//! The external oracle is reached through [`DecryptionOracle`]. The queued
//! implementation and the simulated relayer run the oracle side in-process.

pub mod dispatch;
pub mod relayer;

pub use dispatch::{CallbackSelector, DecryptionOracle, OracleError, PendingDecryption, QueuedOracle};
pub use relayer::{CallbackPayload, RelayerError, SimulatedRelayer};
