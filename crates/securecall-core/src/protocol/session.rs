//! Per-connection session state machine
//!
//! `SecureSession` owns every piece of mutable protocol state for one
//! connection: the current local ephemeral pair, the last authenticated remote
//! key, and the security context derived from them. All transitions go through
//! `&mut self`, so reading the current ephemeral pair, verifying against it and
//! replacing it is a single step that a rotation tick cannot interleave with.
//!
//! The session is sans-IO. It returns the payloads to send and leaves delivery,
//! timers and closing the transport to the caller.
//!
//! ```text
//! Uninitialized --open--> AwaitingVerification --verified--> Verified <--+
//!                                   |                           |        |
//!                                   +--> Rejected / TimedOut    +--------+
//!                                                        rotate / re-key
//! ```

use core::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::crypto::SessionKey;
use crate::errors::HandshakeError;
use crate::identity::Identity;
use crate::protocol::ephemeral::EphemeralKeyPair;
use crate::protocol::handshake::{create_handshake_payload, HandshakeKind, HandshakeMessage};
use crate::protocol::verifier::{authenticate, derive_session, AuthenticatedPeer, SessionResult};
use crate::types::{IdentityFingerprint, SafetyNumber, SystemTimeSource, TimeSource, Timestamp};
use crate::{Result, SecureCallError};

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Session states in the connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Nothing sent or received yet
    Uninitialized,
    /// `INIT` sent, no handshake verified yet
    AwaitingVerification,
    /// At least one handshake verified; re-entered on every re-key
    Verified,
    /// A handshake failed verification; the connection must be closed
    Rejected,
    /// No handshake verified within the configured timeout
    TimedOut,
    /// Closed locally; key material discarded
    Closed,
}

impl SessionState {
    /// Whether the session can no longer make progress
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Rejected | SessionState::TimedOut | SessionState::Closed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "Uninitialized",
            SessionState::AwaitingVerification => "AwaitingVerification",
            SessionState::Verified => "Verified",
            SessionState::Rejected => "Rejected",
            SessionState::TimedOut => "TimedOut",
            SessionState::Closed => "Closed",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Security Context
// ----------------------------------------------------------------------------

/// Derived security state of a verified session.
///
/// Replaced wholesale on every re-key, never mutated. Anything that shows the
/// connection as secure must gate on `is_verified` of the current context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityContext {
    pub is_verified: bool,
    /// Safety number both users compare out of band
    pub safety_number: SafetyNumber,
    /// Fingerprint of the remote long-term identity
    pub remote_identity: IdentityFingerprint,
    /// When the current shared secret was adopted
    pub last_rotation: Timestamp,
}

// ----------------------------------------------------------------------------
// Outcomes
// ----------------------------------------------------------------------------

/// Why an incoming handshake was dropped without effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// `RESPONSE`/`ROTATION` arrived while no local ephemeral pair is held
    NoEphemeralKey,
    /// The session is rejected, timed out or closed
    SessionEnded,
}

/// Result of feeding one handshake into the session
#[derive(Debug, Clone)]
pub enum HandshakeOutcome {
    /// First successful verification; `response` must be sent if present
    Verified {
        context: SecurityContext,
        response: Option<HandshakeMessage>,
    },
    /// An already verified session adopted a new shared secret
    Rekeyed {
        context: SecurityContext,
        response: Option<HandshakeMessage>,
    },
    /// Nothing changed
    Ignored(IgnoreReason),
}

impl HandshakeOutcome {
    /// Payload to send back, if any
    pub fn response(&self) -> Option<&HandshakeMessage> {
        match self {
            HandshakeOutcome::Verified { response, .. }
            | HandshakeOutcome::Rekeyed { response, .. } => response.as_ref(),
            HandshakeOutcome::Ignored(_) => None,
        }
    }

    /// New security context, if the session changed
    pub fn context(&self) -> Option<&SecurityContext> {
        match self {
            HandshakeOutcome::Verified { context, .. }
            | HandshakeOutcome::Rekeyed { context, .. } => Some(context),
            HandshakeOutcome::Ignored(_) => None,
        }
    }
}

/// A local rotation: the payload to push and the context it produced
#[derive(Debug, Clone)]
pub struct Rotation {
    pub message: HandshakeMessage,
    pub context: SecurityContext,
}

// ----------------------------------------------------------------------------
// Secure Session
// ----------------------------------------------------------------------------

/// Protocol state of one logical connection
pub struct SecureSession<T: TimeSource = SystemTimeSource> {
    identity: Arc<Identity>,
    config: SessionConfig,
    time_source: T,
    state: SessionState,
    /// Current local ephemeral pair; superseded pairs are dropped immediately
    ephemeral: Option<EphemeralKeyPair>,
    /// Last authenticated remote key material
    peer: Option<AuthenticatedPeer>,
    context: Option<SecurityContext>,
    session_key: Option<SessionKey>,
    opened_at: Option<Timestamp>,
    rejection: Option<HandshakeError>,
}

impl SecureSession<SystemTimeSource> {
    /// Session on the system clock
    pub fn new(identity: Arc<Identity>, config: SessionConfig) -> Self {
        Self::with_time_source(identity, config, SystemTimeSource)
    }
}

impl<T: TimeSource> SecureSession<T> {
    pub fn with_time_source(identity: Arc<Identity>, config: SessionConfig, time_source: T) -> Self {
        Self {
            identity,
            config,
            time_source,
            state: SessionState::Uninitialized,
            ephemeral: None,
            peer: None,
            context: None,
            session_key: None,
            opened_at: None,
            rejection: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current security context (None until verified and after close)
    pub fn context(&self) -> Option<&SecurityContext> {
        self.context.as_ref()
    }

    pub fn is_verified(&self) -> bool {
        self.state == SessionState::Verified
            && self.context.as_ref().is_some_and(|c| c.is_verified)
    }

    /// Active shared secret
    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    pub fn local_fingerprint(&self) -> IdentityFingerprint {
        self.identity.fingerprint()
    }

    /// Why the session was rejected, if it was
    pub fn rejection(&self) -> Option<&HandshakeError> {
        self.rejection.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start the protocol: generate the first ephemeral pair and return `INIT`
    pub fn open(&mut self) -> Result<HandshakeMessage> {
        if self.state != SessionState::Uninitialized {
            return Err(SecureCallError::invalid_state(
                SessionState::Uninitialized.to_string(),
                self.state.to_string(),
            ));
        }

        let now = self.time_source.now();
        let ephemeral = EphemeralKeyPair::generate()?;
        let message = create_handshake_payload(&self.identity, &ephemeral, HandshakeKind::Init, now)?;

        self.ephemeral = Some(ephemeral);
        self.opened_at = Some(now);
        self.state = SessionState::AwaitingVerification;
        debug!(fingerprint = %self.identity.fingerprint(), "Session opened, INIT prepared");
        Ok(message)
    }

    /// Process one incoming handshake.
    ///
    /// Handshakes are applied in the order they arrive. The sender's timestamp
    /// is informational only and never used for ordering.
    ///
    /// A verification failure moves the session to `Rejected` and returns an
    /// error for which [`SecureCallError::is_security_alert`] holds; the caller
    /// must close the connection. Messages that cannot be acted on are reported
    /// as [`HandshakeOutcome::Ignored`] rather than as errors.
    pub fn handle_handshake(&mut self, message: &HandshakeMessage) -> Result<HandshakeOutcome> {
        if self.state.is_terminal() {
            return Ok(HandshakeOutcome::Ignored(IgnoreReason::SessionEnded));
        }
        if message.kind != HandshakeKind::Init && self.ephemeral.is_none() {
            debug!(kind = %message.kind, "No ephemeral key held, ignoring handshake");
            return Ok(HandshakeOutcome::Ignored(IgnoreReason::NoEphemeralKey));
        }

        let peer = match authenticate(message) {
            Ok(peer) => peer,
            Err(err) => return Err(self.reject(err)),
        };

        if let Some(previous) = &self.peer {
            if previous.identity != peer.identity {
                let err = HandshakeError::IdentityChanged {
                    expected: previous.identity.to_hex(),
                    actual: peer.identity.to_hex(),
                };
                return Err(self.reject(err));
            }
        }

        let (result, response) = match message.kind {
            HandshakeKind::Init => {
                // Answer with a fresh pair; the one that derives is the one announced
                let fresh = EphemeralKeyPair::generate()?;
                let result = derive_session(&self.identity, &fresh, &peer);
                let response = create_handshake_payload(
                    &self.identity,
                    &fresh,
                    HandshakeKind::Response,
                    self.time_source.now(),
                )?;
                self.ephemeral = Some(fresh);
                (result, Some(response))
            }
            HandshakeKind::Response | HandshakeKind::Rotation => {
                let Some(ephemeral) = self.ephemeral.as_ref() else {
                    return Ok(HandshakeOutcome::Ignored(IgnoreReason::NoEphemeralKey));
                };
                (derive_session(&self.identity, ephemeral, &peer), None)
            }
        };

        let was_verified = self.state == SessionState::Verified;
        let context = self.install(result);

        if was_verified {
            debug!(kind = %message.kind, safety_number = %context.safety_number, "Session re-keyed");
            Ok(HandshakeOutcome::Rekeyed { context, response })
        } else {
            info!(
                remote = %context.remote_identity,
                safety_number = %context.safety_number,
                "Session verified"
            );
            Ok(HandshakeOutcome::Verified { context, response })
        }
    }

    /// Replace the local ephemeral pair and return the `ROTATION` to push.
    ///
    /// Only acts while `Verified`; otherwise returns `Ok(None)`. The new secret
    /// is derived immediately against the peer's latest ephemeral key, so this
    /// side shows the same safety number the peer will compute on receipt.
    pub fn rotate(&mut self) -> Result<Option<Rotation>> {
        if self.state != SessionState::Verified {
            return Ok(None);
        }
        let Some(peer) = self.peer.clone() else {
            return Ok(None);
        };

        let fresh = EphemeralKeyPair::generate()?;
        let message = create_handshake_payload(
            &self.identity,
            &fresh,
            HandshakeKind::Rotation,
            self.time_source.now(),
        )?;
        let result = derive_session(&self.identity, &fresh, &peer);
        self.ephemeral = Some(fresh);
        let context = self.install(result);

        debug!(safety_number = %context.safety_number, "Local rotation");
        Ok(Some(Rotation { message, context }))
    }

    /// Time out an unverified session if the configured deadline has passed
    pub fn check_handshake_timeout(&mut self) -> bool {
        let (Some(timeout), Some(opened_at)) = (self.config.handshake_timeout(), self.opened_at)
        else {
            return false;
        };
        if self.state == SessionState::AwaitingVerification
            && self.time_source.now().duration_since(opened_at) >= timeout
        {
            return self.expire_handshake();
        }
        false
    }

    /// Time out the session now if it is still awaiting verification
    pub fn expire_handshake(&mut self) -> bool {
        if self.state != SessionState::AwaitingVerification {
            return false;
        }
        warn!("Handshake timed out before verification");
        self.wipe();
        self.state = SessionState::TimedOut;
        true
    }

    /// End the session and discard all key material
    pub fn close(&mut self) {
        self.wipe();
        self.state = SessionState::Closed;
    }

    fn install(&mut self, result: SessionResult) -> SecurityContext {
        let now = self.time_source.now();
        let last_rotation = match &self.context {
            Some(previous) => previous.last_rotation.max(now),
            None => now,
        };

        let context = SecurityContext {
            is_verified: true,
            safety_number: result.session_fingerprint,
            remote_identity: result.remote_identity_fingerprint,
            last_rotation,
        };

        self.context = Some(context.clone());
        self.session_key = Some(result.session_key);
        self.peer = Some(result.peer);
        self.state = SessionState::Verified;
        context
    }

    fn reject(&mut self, reason: HandshakeError) -> SecureCallError {
        warn!(%reason, "Handshake rejected");
        self.wipe();
        self.state = SessionState::Rejected;
        self.rejection = Some(reason.clone());
        SecureCallError::rejected(reason)
    }

    fn wipe(&mut self) {
        self.ephemeral = None;
        self.peer = None;
        self.context = None;
        self.session_key = None;
    }
}

impl<T: TimeSource> fmt::Debug for SecureSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureSession")
            .field("local", &format_args!("{}", self.identity.fingerprint()))
            .field("state", &self.state)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> SecureSession {
        let identity = Arc::new(Identity::generate().unwrap());
        SecureSession::new(identity, SessionConfig::default())
    }

    #[test]
    fn test_open_only_once() {
        let mut alice = session();
        assert_eq!(alice.state(), SessionState::Uninitialized);

        let init = alice.open().unwrap();
        assert_eq!(init.kind, HandshakeKind::Init);
        assert_eq!(alice.state(), SessionState::AwaitingVerification);
        assert!(!alice.is_verified());

        assert!(alice.open().is_err());
    }

    #[test]
    fn test_init_response_exchange() {
        let mut alice = session();
        let mut bob = session();

        let init = alice.open().unwrap();
        let at_bob = bob.handle_handshake(&init).unwrap();
        let response = at_bob.response().cloned().unwrap();
        assert_eq!(response.kind, HandshakeKind::Response);
        assert!(matches!(at_bob, HandshakeOutcome::Verified { .. }));

        let at_alice = alice.handle_handshake(&response).unwrap();
        assert!(at_alice.response().is_none());

        assert!(alice.is_verified());
        assert!(bob.is_verified());
        assert_eq!(
            alice.context().unwrap().safety_number,
            bob.context().unwrap().safety_number
        );
        assert_eq!(alice.session_key(), bob.session_key());
        assert_eq!(alice.context().unwrap().remote_identity, bob.local_fingerprint());
    }

    #[test]
    fn test_response_without_ephemeral_is_ignored() {
        let mut alice = session();
        let mut bob = session();

        let init = alice.open().unwrap();
        let response = bob.handle_handshake(&init).unwrap().response().cloned().unwrap();

        // A fresh session that never opened holds no ephemeral pair
        let mut carol = session();
        let outcome = carol.handle_handshake(&response).unwrap();
        assert!(matches!(
            outcome,
            HandshakeOutcome::Ignored(IgnoreReason::NoEphemeralKey)
        ));
        assert_eq!(carol.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_tampered_init_rejects() {
        let mut alice = session();
        let mut bob = session();

        let mut init = alice.open().unwrap();
        init.signature = bob.open().unwrap().signature;

        let err = bob.handle_handshake(&init).unwrap_err();
        assert!(err.is_security_alert());
        assert_eq!(bob.state(), SessionState::Rejected);
        assert!(bob.context().is_none());
        assert_eq!(bob.rejection(), Some(&HandshakeError::InvalidSignature));

        // Nothing further is processed
        let fresh_init = session().open().unwrap();
        let outcome = bob.handle_handshake(&fresh_init).unwrap();
        assert!(matches!(
            outcome,
            HandshakeOutcome::Ignored(IgnoreReason::SessionEnded)
        ));
    }

    #[test]
    fn test_rotate_requires_verified() {
        let mut alice = session();
        assert!(alice.rotate().unwrap().is_none());
        alice.open().unwrap();
        assert!(alice.rotate().unwrap().is_none());
    }

    #[test]
    fn test_close_discards_state() {
        let mut alice = session();
        let mut bob = session();
        let init = alice.open().unwrap();
        let response = bob.handle_handshake(&init).unwrap().response().cloned().unwrap();
        alice.handle_handshake(&response).unwrap();

        alice.close();
        assert_eq!(alice.state(), SessionState::Closed);
        assert!(alice.context().is_none());
        assert!(alice.session_key().is_none());
        assert!(!alice.is_verified());
        assert!(alice.rotate().unwrap().is_none());
    }

    #[test]
    fn test_expire_only_while_awaiting() {
        let mut alice = session();
        assert!(!alice.expire_handshake());
        alice.open().unwrap();
        assert!(alice.expire_handshake());
        assert_eq!(alice.state(), SessionState::TimedOut);
        assert!(!alice.expire_handshake());
    }
}
