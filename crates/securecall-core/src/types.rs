//! Core types for the SecureCall protocol
//!
//! Newtypes for the values that cross module boundaries: timestamps, identity
//! fingerprints and the human-comparable safety number.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::SecureCallError;

// ----------------------------------------------------------------------------
// Identity Fingerprint
// ----------------------------------------------------------------------------

/// Short fingerprint of a long-term identity key.
///
/// First 8 bytes of SHA-256 over the SPKI DER export of the public key,
/// displayed as 16 lowercase hex characters. Byte order and hex order agree,
/// so `Ord` sorts the same way as comparing the display strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentityFingerprint([u8; 8]);

impl IdentityFingerprint {
    /// Create a fingerprint from 8 raw bytes
    pub fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Create a fingerprint from the leading bytes of a digest
    pub fn from_digest(digest: &[u8]) -> Self {
        let mut bytes = [0u8; 8];
        let len = core::cmp::min(digest.len(), 8);
        bytes[..len].copy_from_slice(&digest[..len]);
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Hex display form (16 characters)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for IdentityFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for IdentityFingerprint {
    type Err = SecureCallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)
            .map_err(|_| SecureCallError::config_error("Invalid hex in identity fingerprint"))?;
        let bytes: [u8; 8] = bytes
            .try_into()
            .map_err(|_| SecureCallError::config_error("Identity fingerprint must be 8 bytes"))?;
        Ok(Self(bytes))
    }
}

impl Serialize for IdentityFingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for IdentityFingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ----------------------------------------------------------------------------
// Safety Number
// ----------------------------------------------------------------------------

/// Human-comparable digest of a session.
///
/// Four 16-bit blocks rendered as zero-padded 5-digit decimals, e.g.
/// `"05123 48811 09920 33410"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SafetyNumber([u16; 4]);

impl SafetyNumber {
    /// Number of digest bytes consumed
    pub const DIGEST_BYTES: usize = 8;

    /// Build from the first 8 bytes of a digest, big-endian per block
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        let mut blocks = [0u16; 4];
        for (block, chunk) in blocks
            .iter_mut()
            .zip(digest[..Self::DIGEST_BYTES].chunks_exact(2))
        {
            *block = u16::from_be_bytes([chunk[0], chunk[1]]);
        }
        Self(blocks)
    }

    /// The four numeric blocks
    pub fn blocks(&self) -> [u16; 4] {
        self.0
    }
}

impl fmt::Display for SafetyNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{:05} {:05} {:05} {:05}", a, b, c, d)
    }
}

impl FromStr for SafetyNumber {
    type Err = SecureCallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(' ').collect();
        if parts.len() != 4 {
            return Err(SecureCallError::config_error(
                "Safety number must have four blocks",
            ));
        }

        let mut blocks = [0u16; 4];
        for (block, part) in blocks.iter_mut().zip(parts) {
            if part.len() != 5 || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(SecureCallError::config_error(
                    "Safety number blocks must be five digits",
                ));
            }
            *block = part
                .parse()
                .map_err(|_| SecureCallError::config_error("Safety number block out of range"))?;
        }
        Ok(Self(blocks))
    }
}

impl Serialize for SafetyNumber {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SafetyNumber {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a new timestamp
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    /// Get the raw milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Get duration since another timestamp (zero if `other` is later)
    pub fn duration_since(&self, other: Self) -> core::time::Duration {
        core::time::Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

// ----------------------------------------------------------------------------
// Time Source Trait
// ----------------------------------------------------------------------------

/// Source of timestamps, injectable so tests can control time
pub trait TimeSource: Send + Sync {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

/// Wall-clock implementation of TimeSource
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
