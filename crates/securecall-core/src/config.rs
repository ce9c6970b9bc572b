//! Centralized configuration
//!
//! Serializable configuration structures with defaults and named presets for
//! the session state machine and the identity store.

use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::{Result, SecureCallError};

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Per-connection session behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Interval between unsolicited ephemeral key rotations
    pub rotation_interval_secs: u64,
    /// How long a session may stay unverified after opening (None = forever)
    pub handshake_timeout_ms: Option<u64>,
    /// Capacity of the runtime's event channel
    pub event_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            rotation_interval_secs: 60,
            handshake_timeout_ms: Some(30_000),
            event_buffer_size: 64,
        }
    }
}

impl SessionConfig {
    /// Short intervals for tests
    pub fn testing() -> Self {
        Self {
            rotation_interval_secs: 1,
            handshake_timeout_ms: Some(500),
            event_buffer_size: 16,
        }
    }

    /// Never expire an unverified session
    pub fn without_handshake_timeout() -> Self {
        Self {
            handshake_timeout_ms: None,
            ..Self::default()
        }
    }

    /// Rotation interval as a Duration
    pub fn rotation_interval(&self) -> Duration {
        Duration::from_secs(self.rotation_interval_secs)
    }

    /// Handshake timeout as a Duration
    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_ms.map(Duration::from_millis)
    }

    /// Reject values the runtime cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.rotation_interval_secs == 0 {
            return Err(SecureCallError::config_error(
                "rotation_interval_secs must be greater than zero",
            ));
        }
        if self.handshake_timeout_ms == Some(0) {
            return Err(SecureCallError::config_error(
                "handshake_timeout_ms must be greater than zero when set",
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(SecureCallError::config_error(
                "event_buffer_size must be greater than zero",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Identity Configuration
// ----------------------------------------------------------------------------

/// Storage slots used by the identity store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Slot holding the SPKI DER public key
    pub public_key_slot: String,
    /// Slot holding the PKCS#8 DER private key
    pub private_key_slot: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            public_key_slot: "identity_public_key".to_string(),
            private_key_slot: "identity_private_key".to_string(),
        }
    }
}

impl IdentityConfig {
    pub fn validate(&self) -> Result<()> {
        if self.public_key_slot.is_empty() || self.private_key_slot.is_empty() {
            return Err(SecureCallError::config_error(
                "identity storage slots must not be empty",
            ));
        }
        if self.public_key_slot == self.private_key_slot {
            return Err(SecureCallError::config_error(
                "public and private identity slots must differ",
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Top-level Configuration
// ----------------------------------------------------------------------------

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureCallConfig {
    pub session: SessionConfig,
    pub identity: IdentityConfig,
}

impl SecureCallConfig {
    /// Configuration for tests
    pub fn testing() -> Self {
        Self {
            session: SessionConfig::testing(),
            identity: IdentityConfig::default(),
        }
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        self.identity.validate()
    }
}
