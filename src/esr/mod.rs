//! Signing-request protocol engine.
//!
//! This module implements the full lifecycle of third-party signing requests:
//! parsing the compact request URI, resolving it into a concrete transaction
//! (fetching ABIs and building display lines along the way), signing it with a
//! vault-held key, and dispatching the result by broadcast and/or callback.
//! Identity proofs additionally create durable, revocable sessions.
//!
//! The requester never sees the private key; it only ever receives signatures
//! through the callback channel it named in the request.

/// Accept/decline state machine and callback dispatch
pub mod engine;
/// Request URI parsing
pub mod request;
/// ABI resolution and transaction construction
pub mod resolver;
/// Durable identity-proof sessions
pub mod sessions;

pub use engine::{
    AlwaysAllowGate, AuthenticationGate, RequestDisposition, RequestEngine, substitute_sid,
};
pub use request::{REQUEST_SCHEME, RequestAction, RequestCallback, SigningRequest};
pub use resolver::{ActionDisplay, RequestResolver, ResolvedRequest};
pub use sessions::SessionManager;
