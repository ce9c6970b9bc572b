//! SecureCall Core Protocol Implementation
//!
//! Sans-IO building blocks for authenticating a peer-to-peer call and deriving
//! a human-comparable safety number from an ephemeral ECDH exchange:
//! - a persistent ECDSA P-256 long-term identity and its fingerprint
//! - ephemeral P-256 key-agreement pairs
//! - the signed handshake payload and its verification
//! - the per-connection session state machine with push-only key rotation
//!
//! Driving a session over a real connection lives in `securecall-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod crypto;
pub mod errors;
pub mod identity;
pub mod protocol;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{IdentityConfig, SecureCallConfig, SessionConfig};
pub use crypto::SessionKey;
pub use errors::{
    CryptographicError, HandshakeError, Result, SecureCallError, SecureCallResult, SessionError,
    StorageError, TransportError,
};
pub use identity::{
    FileStorage, Identity, IdentityProvenance, IdentityStore, KeyStorage, MemoryStorage,
};
pub use protocol::{
    create_handshake_payload, verify_and_derive_session, EphemeralKeyPair, HandshakeKind,
    HandshakeMessage, HandshakeOutcome, IgnoreReason, Rotation, SecureSession, SecurityContext,
    SessionResult, SessionState,
};
pub use transport::{Envelope, Transport};
pub use types::{IdentityFingerprint, SafetyNumber, SystemTimeSource, TimeSource, Timestamp};
