//! Network Layer
//!
//! WebSocket front for a pact instance. This layer is **non-deterministic**:
//! wall-clock time, connection order and task scheduling live here, while
//! all ledger and coordinator logic stays in the synchronous core.

pub mod auth;
pub mod protocol;
pub mod service;
pub mod server;

pub use auth::{actor_for_subject, AuthConfig, TokenClaims, AuthError, validate_token};
pub use protocol::{
    AdminAction, AuthResult, BatchInfo, CallbackRequest, ClientMessage, ErrorBody, ErrorCode,
    RequestInfo, ServerMessage, SubmitRequest, MAX_ENCRYPT_VALUES,
};
pub use service::PactService;
pub use server::{handle_client_message, ClientSession, PactServer, ServerConfig, ServerError};
