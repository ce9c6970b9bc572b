//! Session establishment protocol
//!
//! - [`ephemeral`]: short-lived ECDH keypairs
//! - [`handshake`]: the signed `INIT` / `RESPONSE` / `ROTATION` payload
//! - [`verifier`]: signature checking, ECDH and the safety number
//! - [`session`]: the per-connection state machine tying them together

pub mod ephemeral;
pub mod handshake;
pub mod session;
pub mod verifier;

pub use ephemeral::EphemeralKeyPair;
pub use handshake::{create_handshake_payload, HandshakeKind, HandshakeMessage};
pub use session::{
    HandshakeOutcome, IgnoreReason, Rotation, SecureSession, SecurityContext, SessionState,
};
pub use verifier::{
    authenticate, compute_safety_number, derive_session, safety_input, verify_and_derive_session,
    AuthenticatedPeer, SessionResult, FINGERPRINT_SEPARATOR,
};
