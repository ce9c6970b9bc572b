//! Handshake wire payload
//!
//! A handshake binds an ephemeral key-agreement key to the sender's long-term
//! identity: the identity key signs the exact bytes of the encoded ephemeral
//! public key.

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::crypto::encode_signature;
use crate::identity::Identity;
use crate::protocol::ephemeral::EphemeralKeyPair;
use crate::types::Timestamp;
use crate::Result;

// ----------------------------------------------------------------------------
// Handshake Kind
// ----------------------------------------------------------------------------

/// Handshake discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandshakeKind {
    /// Opens a session; answered with a `Response`
    Init,
    /// Answer to an `Init`
    Response,
    /// Unsolicited re-key; never answered
    Rotation,
}

impl fmt::Display for HandshakeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeKind::Init => write!(f, "INIT"),
            HandshakeKind::Response => write!(f, "RESPONSE"),
            HandshakeKind::Rotation => write!(f, "ROTATION"),
        }
    }
}

// ----------------------------------------------------------------------------
// Handshake Message
// ----------------------------------------------------------------------------

/// The handshake datum placed on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeMessage {
    #[serde(rename = "type")]
    pub kind: HandshakeKind,
    /// Sender's long-term public key (base64 SPKI DER)
    pub identity_public_key: String,
    /// Sender's ephemeral public key (base64 SPKI DER)
    pub ephemeral_public_key: String,
    /// Base64 ECDSA/SHA-256 signature over `ephemeral_public_key`'s bytes
    pub signature: String,
    /// Milliseconds since epoch at creation
    pub timestamp: Timestamp,
}

impl HandshakeMessage {
    /// The exact bytes covered by `signature`
    pub fn signed_bytes(&self) -> &[u8] {
        self.ephemeral_public_key.as_bytes()
    }
}

/// Build a signed handshake payload announcing `ephemeral` under `identity`
pub fn create_handshake_payload(
    identity: &Identity,
    ephemeral: &EphemeralKeyPair,
    kind: HandshakeKind,
    timestamp: Timestamp,
) -> Result<HandshakeMessage> {
    let ephemeral_public_key = ephemeral.encoded_public_key().to_string();
    let signature = identity.sign(ephemeral_public_key.as_bytes())?;

    Ok(HandshakeMessage {
        kind,
        identity_public_key: identity.encoded_public_key().to_string(),
        ephemeral_public_key,
        signature: encode_signature(&signature),
        timestamp,
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
