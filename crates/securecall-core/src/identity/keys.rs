//! Long-term identity keypair

use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey};
use p256::{PublicKey, SecretKey};
use rand_core::{CryptoRng, OsRng, RngCore};
use zeroize::Zeroizing;

use crate::crypto::{encode_public_key, fingerprint_der, public_key_der, random_secret_key};
use crate::errors::CryptographicError;
use crate::types::IdentityFingerprint;
use crate::Result;

/// Long-term ECDSA P-256 signing identity of one installation.
///
/// Immutable once constructed. The private half is only reachable through
/// [`Identity::sign`]; the PKCS#8 export exists solely for the identity store.
pub struct Identity {
    secret_key: SecretKey,
    signing_key: SigningKey,
    public_key: PublicKey,
    encoded_public_key: String,
    fingerprint: IdentityFingerprint,
}

impl Identity {
    /// Generate a new identity from the OS random source
    pub fn generate() -> Result<Self> {
        Self::generate_with_rng(&mut OsRng)
    }

    /// Generate a new identity with a caller-supplied CSPRNG
    pub fn generate_with_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self> {
        let secret_key = random_secret_key(rng)?;
        Self::from_secret_key(secret_key)
    }

    fn from_secret_key(secret_key: SecretKey) -> Result<Self> {
        let public_key = secret_key.public_key();
        let der = public_key_der(&public_key)?;
        let encoded_public_key = encode_public_key(&public_key)?;

        Ok(Self {
            signing_key: SigningKey::from(&secret_key),
            secret_key,
            public_key,
            encoded_public_key,
            fingerprint: fingerprint_der(&der),
        })
    }

    /// Rebuild a persisted identity from its SPKI and PKCS#8 DER halves.
    ///
    /// Returns `None` when either half fails to decode or the halves do not
    /// belong together.
    pub(crate) fn from_der(public_der: &[u8], private_der: &[u8]) -> Option<Self> {
        let stored_public = PublicKey::from_public_key_der(public_der).ok()?;
        let secret_key = SecretKey::from_pkcs8_der(private_der).ok()?;
        if secret_key.public_key() != stored_public {
            return None;
        }
        Self::from_secret_key(secret_key).ok()
    }

    /// PKCS#8 DER export of the private half, for persistence only
    pub(crate) fn private_key_der(&self) -> Result<Zeroizing<Vec<u8>>> {
        let document = self
            .secret_key
            .to_pkcs8_der()
            .map_err(|_| CryptographicError::KeyEncodingFailed)?;
        Ok(Zeroizing::new(document.as_bytes().to_vec()))
    }

    /// SPKI DER export of the public half
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        Ok(public_key_der(&self.public_key)?)
    }

    /// Interchange-encoded public key as carried in handshakes
    pub fn encoded_public_key(&self) -> &str {
        &self.encoded_public_key
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Short fingerprint of the public key
    pub fn fingerprint(&self) -> IdentityFingerprint {
        self.fingerprint
    }

    /// ECDSA/SHA-256 signature over `data`
    pub fn sign<T: AsRef<[u8]>>(&self, data: T) -> Result<Signature> {
        let signature: Signature = self
            .signing_key
            .try_sign(data.as_ref())
            .map_err(|_| CryptographicError::SigningFailed)?;
        Ok(signature)
    }
}

impl core::fmt::Debug for Identity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Identity")
            .field("fingerprint", &format_args!("{}", self.fingerprint))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::VerifyingKey;

    #[test]
    fn test_sign_and_verify() {
        let identity = Identity::generate().unwrap();
        let signature = identity.sign(b"ephemeral key bytes").unwrap();

        let verifying_key = VerifyingKey::from(identity.public_key());
        verifying_key
            .verify(b"ephemeral key bytes", &signature)
            .unwrap();
        assert!(verifying_key.verify(b"other bytes", &signature).is_err());
    }

    #[test]
    fn test_der_roundtrip_preserves_fingerprint() {
        let identity = Identity::generate().unwrap();
        let public_der = identity.public_key_der().unwrap();
        let private_der = identity.private_key_der().unwrap();

        let restored = Identity::from_der(&public_der, &private_der).unwrap();
        assert_eq!(restored.fingerprint(), identity.fingerprint());
        assert_eq!(restored.encoded_public_key(), identity.encoded_public_key());
    }

    #[test]
    fn test_mismatched_halves_are_refused() {
        let first = Identity::generate().unwrap();
        let second = Identity::generate().unwrap();

        let public_der = first.public_key_der().unwrap();
        let private_der = second.private_key_der().unwrap();
        assert!(Identity::from_der(&public_der, &private_der).is_none());
        assert!(Identity::from_der(b"garbage", &private_der).is_none());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let identity = Identity::generate().unwrap();
        let debug = format!("{:?}", identity);
        assert!(debug.contains(&identity.fingerprint().to_hex()));
        assert!(!debug.contains("secret"));
    }
}
