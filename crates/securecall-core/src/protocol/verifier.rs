//! Handshake verification and session derivation
//!
//! Verification runs in two stages. [`authenticate`] checks that the remote
//! ephemeral key was signed by the claimed remote identity. [`derive_session`]
//! then performs ECDH and computes the safety number. The safety number hashes
//! both identity fingerprints in sorted order, so initiator and responder always
//! arrive at the same value for the same shared secret.

use p256::ecdsa::signature::Verifier;
use p256::ecdsa::VerifyingKey;
use p256::PublicKey;
use sha2::{Digest, Sha256};

use crate::crypto::{decode_public_key, decode_signature, generate_fingerprint, SessionKey};
use crate::errors::HandshakeError;
use crate::identity::Identity;
use crate::protocol::ephemeral::EphemeralKeyPair;
use crate::protocol::handshake::HandshakeMessage;
use crate::types::{IdentityFingerprint, SafetyNumber};

/// Joins the sorted fingerprints in the safety number input
pub const FINGERPRINT_SEPARATOR: char = ':';

// ----------------------------------------------------------------------------
// Authenticated Peer
// ----------------------------------------------------------------------------

/// A remote ephemeral key whose signature checked out against the remote identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedPeer {
    /// Fingerprint of the remote long-term identity
    pub identity: IdentityFingerprint,
    /// Remote ephemeral key-agreement key
    pub ephemeral_public_key: PublicKey,
}

/// Decode a handshake and check its signature.
///
/// This is the only authentication step: it proves the ephemeral key was
/// vouched for by the embedded identity, not that the identity belongs to whom
/// the user believes. Users confirm that by comparing safety numbers.
pub fn authenticate(message: &HandshakeMessage) -> Result<AuthenticatedPeer, HandshakeError> {
    let identity_key = decode_public_key(&message.identity_public_key)
        .ok_or(HandshakeError::MalformedIdentityKey)?;
    let ephemeral_public_key = decode_public_key(&message.ephemeral_public_key)
        .ok_or(HandshakeError::MalformedEphemeralKey)?;
    let signature = decode_signature(&message.signature)?;

    VerifyingKey::from(&identity_key)
        .verify(message.signed_bytes(), &signature)
        .map_err(|_| HandshakeError::InvalidSignature)?;

    let identity =
        generate_fingerprint(&identity_key).map_err(|_| HandshakeError::MalformedIdentityKey)?;

    Ok(AuthenticatedPeer {
        identity,
        ephemeral_public_key,
    })
}

// ----------------------------------------------------------------------------
// Session Derivation
// ----------------------------------------------------------------------------

/// Output of a successful verification
#[derive(Debug, Clone)]
pub struct SessionResult {
    /// Safety number both users compare out of band
    pub session_fingerprint: SafetyNumber,
    /// Fingerprint of the remote identity
    pub remote_identity_fingerprint: IdentityFingerprint,
    /// Shared secret backing the session
    pub session_key: SessionKey,
    /// The authenticated remote key material
    pub peer: AuthenticatedPeer,
}

/// ECDH against an authenticated peer and compute the safety number
pub fn derive_session(
    local_identity: &Identity,
    local_ephemeral: &EphemeralKeyPair,
    peer: &AuthenticatedPeer,
) -> SessionResult {
    let session_key = local_ephemeral.diffie_hellman(&peer.ephemeral_public_key);
    let session_fingerprint =
        compute_safety_number(local_identity.fingerprint(), peer.identity, &session_key);

    SessionResult {
        session_fingerprint,
        remote_identity_fingerprint: peer.identity,
        session_key,
        peer: peer.clone(),
    }
}

/// Verify a remote handshake and derive the session from it.
///
/// Every decoding or verification problem collapses into a [`HandshakeError`];
/// callers must close the connection on any of them.
pub fn verify_and_derive_session(
    local_identity: &Identity,
    local_ephemeral: &EphemeralKeyPair,
    remote_message: &HandshakeMessage,
) -> Result<SessionResult, HandshakeError> {
    let peer = authenticate(remote_message)?;
    Ok(derive_session(local_identity, local_ephemeral, &peer))
}

// ----------------------------------------------------------------------------
// Safety Number
// ----------------------------------------------------------------------------

/// The string hashed into the safety number.
///
/// `min(a, b) + ':' + max(a, b) + secret`; sorting makes it independent of
/// which side computes it.
pub fn safety_input(fingerprint_a: &str, fingerprint_b: &str, secret_b64: &str) -> String {
    let (low, high) = if fingerprint_a <= fingerprint_b {
        (fingerprint_a, fingerprint_b)
    } else {
        (fingerprint_b, fingerprint_a)
    };

    let mut input = String::with_capacity(low.len() + high.len() + secret_b64.len() + 1);
    input.push_str(low);
    input.push(FINGERPRINT_SEPARATOR);
    input.push_str(high);
    input.push_str(secret_b64);
    input
}

/// Safety number for two identities sharing `session_key`
pub fn compute_safety_number(
    local: IdentityFingerprint,
    remote: IdentityFingerprint,
    session_key: &SessionKey,
) -> SafetyNumber {
    let secret_b64 = session_key.to_base64();
    let input = zeroize::Zeroizing::new(safety_input(
        &local.to_hex(),
        &remote.to_hex(),
        &secret_b64,
    ));
    let digest: [u8; 32] = Sha256::digest(input.as_bytes()).into();
    SafetyNumber::from_digest(&digest)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
