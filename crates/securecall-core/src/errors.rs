//! Error types for the SecureCall protocol
//!
//! Specific error enums for each layer (cryptographic primitives, handshake
//! verification, session lifecycle, key storage, transport) unified under
//! [`SecureCallError`].

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Failures of the underlying cryptographic primitives
#[derive(Debug, thiserror::Error)]
pub enum CryptographicError {
    #[error("Random number generation failed")]
    RandomGenerationFailed,
    #[error("Signing failed")]
    SigningFailed,
    #[error("Key encoding failed")]
    KeyEncodingFailed,
}

/// Reasons an incoming handshake is refused.
///
/// Every variant is handled the same way by callers: the connection is closed
/// and a security alert is raised. The variants only exist for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("Remote identity key could not be decoded")]
    MalformedIdentityKey,
    #[error("Remote ephemeral key could not be decoded")]
    MalformedEphemeralKey,
    #[error("Handshake signature could not be decoded")]
    MalformedSignature,
    #[error("Handshake signature does not match the claimed identity")]
    InvalidSignature,
    #[error("Remote identity changed from {expected} to {actual}")]
    IdentityChanged { expected: String, actual: String },
}

/// Session lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session state invalid: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
    #[error("Handshake rejected: {0}")]
    Rejected(#[from] HandshakeError),
}

/// Durable key storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage not available")]
    NotAvailable,
    #[error("Invalid storage key: {key}")]
    InvalidKey { key: String },
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport errors reported by [`crate::transport::Transport`] implementations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport is closed")]
    Closed,
    #[error("Send failed: {reason}")]
    SendFailed { reason: String },
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Core error type for the SecureCall protocol
#[derive(Debug, thiserror::Error)]
pub enum SecureCallError {
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptographicError),

    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// Connection task failure
    #[error("Runtime error: {reason}")]
    Runtime { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl SecureCallError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        SecureCallError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a runtime error with a reason
    pub fn runtime_error<T: Into<String>>(reason: T) -> Self {
        SecureCallError::Runtime {
            reason: reason.into(),
        }
    }

    /// Create an invalid session state error
    pub fn invalid_state<E: Into<String>, A: Into<String>>(expected: E, actual: A) -> Self {
        SecureCallError::Session(SessionError::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        })
    }

    /// Create a handshake rejection error
    pub fn rejected(reason: HandshakeError) -> Self {
        SecureCallError::Session(SessionError::Rejected(reason))
    }

    /// Create a transport send error
    pub fn send_failed<R: Into<String>>(reason: R) -> Self {
        SecureCallError::Transport(TransportError::SendFailed {
            reason: reason.into(),
        })
    }

    /// Whether this error means the remote peer failed authentication
    pub fn is_security_alert(&self) -> bool {
        matches!(
            self,
            SecureCallError::Handshake(_) | SecureCallError::Session(SessionError::Rejected(_))
        )
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, SecureCallError>;
pub type SecureCallResult<T> = Result<T>;
