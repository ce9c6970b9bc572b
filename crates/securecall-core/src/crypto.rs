//! Cryptographic primitives for SecureCall
//!
//! Thin wrappers over the P-256 primitives the protocol needs: secret key
//! generation from a CSPRNG, the interchange encoding of public keys (base64 of
//! SPKI DER), identity fingerprints and the session key type.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use p256::ecdsa::Signature;
use p256::pkcs8::{DecodePublicKey, EncodePublicKey};
use p256::{PublicKey, SecretKey};
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::errors::{CryptographicError, HandshakeError};
use crate::types::IdentityFingerprint;

// ----------------------------------------------------------------------------
// Key Generation
// ----------------------------------------------------------------------------

/// Attempts before a random source that keeps yielding invalid scalars is
/// declared broken.
const MAX_SCALAR_ATTEMPTS: usize = 16;

/// Draw a P-256 secret scalar from `rng`.
///
/// Errors from the random source are fatal and never retried against another
/// source.
pub(crate) fn random_secret_key<R: RngCore + CryptoRng>(
    rng: &mut R,
) -> Result<SecretKey, CryptographicError> {
    for _ in 0..MAX_SCALAR_ATTEMPTS {
        let mut bytes = Zeroizing::new([0u8; 32]);
        rng.try_fill_bytes(&mut bytes[..])
            .map_err(|_| CryptographicError::RandomGenerationFailed)?;

        // Zero or >= group order; astronomically rare from a healthy source
        if let Ok(secret) = SecretKey::from_slice(&bytes[..]) {
            return Ok(secret);
        }
    }
    Err(CryptographicError::RandomGenerationFailed)
}

// ----------------------------------------------------------------------------
// Public Key Encoding
// ----------------------------------------------------------------------------

/// SPKI DER export of a public key
pub fn public_key_der(key: &PublicKey) -> Result<Vec<u8>, CryptographicError> {
    key.to_public_key_der()
        .map(|document| document.as_bytes().to_vec())
        .map_err(|_| CryptographicError::KeyEncodingFailed)
}

/// Interchange encoding of a public key: base64 of the SPKI DER export
pub fn encode_public_key(key: &PublicKey) -> Result<String, CryptographicError> {
    public_key_der(key).map(|der| STANDARD.encode(der))
}

/// Decode an interchange-encoded public key
pub(crate) fn decode_public_key(encoded: &str) -> Option<PublicKey> {
    let der = STANDARD.decode(encoded).ok()?;
    PublicKey::from_public_key_der(&der).ok()
}

// ----------------------------------------------------------------------------
// Fingerprints
// ----------------------------------------------------------------------------

/// Fingerprint of an SPKI DER public key export
pub fn fingerprint_der(der: &[u8]) -> IdentityFingerprint {
    let digest = Sha256::digest(der);
    IdentityFingerprint::from_digest(&digest)
}

/// Fingerprint of a public key
pub fn generate_fingerprint(key: &PublicKey) -> Result<IdentityFingerprint, CryptographicError> {
    public_key_der(key).map(|der| fingerprint_der(&der))
}

// ----------------------------------------------------------------------------
// Signatures
// ----------------------------------------------------------------------------

/// Base64 of the fixed-size (r || s) signature encoding
pub(crate) fn encode_signature(signature: &Signature) -> String {
    STANDARD.encode(signature.to_bytes())
}

pub(crate) fn decode_signature(encoded: &str) -> Result<Signature, HandshakeError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|_| HandshakeError::MalformedSignature)?;
    Signature::from_slice(&bytes).map_err(|_| HandshakeError::MalformedSignature)
}

// ----------------------------------------------------------------------------
// Session Key
// ----------------------------------------------------------------------------

/// 256-bit ECDH shared secret backing the active session.
///
/// Zeroized on drop; `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey(Zeroizing<[u8; 32]>);

impl SessionKey {
    /// Wrap an existing 32-byte secret
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Raw key bytes, for keying media encryption
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub(crate) fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(STANDARD.encode(&self.0[..]))
    }
}

impl core::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
