//! Ephemeral key-agreement keys

use p256::ecdh::diffie_hellman;
use p256::{PublicKey, SecretKey};
use rand_core::{CryptoRng, OsRng, RngCore};

use crate::crypto::{encode_public_key, random_secret_key, SessionKey};
use crate::Result;

/// Short-lived P-256 ECDH keypair.
///
/// Only key agreement is exposed, never signing. The
/// private scalar is zeroized when the pair is dropped, which is how a
/// superseded pair is discarded.
pub struct EphemeralKeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
    encoded_public_key: String,
}

impl EphemeralKeyPair {
    /// Generate a fresh pair from the OS random source
    pub fn generate() -> Result<Self> {
        Self::generate_with_rng(&mut OsRng)
    }

    /// Generate a fresh pair with a caller-supplied CSPRNG
    pub fn generate_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        let secret_key = random_secret_key(rng)?;
        let public_key = secret_key.public_key();
        let encoded_public_key = encode_public_key(&public_key)?;

        Ok(Self {
            secret_key,
            public_key,
            encoded_public_key,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Interchange-encoded public key as carried in handshakes
    pub fn encoded_public_key(&self) -> &str {
        &self.encoded_public_key
    }

    /// ECDH with a remote public key; the 32-byte x-coordinate of the shared point
    pub fn diffie_hellman(&self, remote: &PublicKey) -> SessionKey {
        let shared = diffie_hellman(self.secret_key.to_nonzero_scalar(), remote.as_affine());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(shared.raw_secret_bytes());
        SessionKey::from_bytes(bytes)
    }
}

impl core::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public_key", &self.encoded_public_key)
            .finish_non_exhaustive()
    }
}
