//! Test utilities for deterministic testing of SecureCall sessions
//!
//! Controllable clock, seeded RNG and a helper for driving two sessions
//! against each other without a transport.

#![allow(dead_code)]

use rand_chacha::ChaCha8Rng;
use rand_core::{CryptoRng, RngCore, SeedableRng};
use securecall_core::{
    HandshakeMessage, HandshakeOutcome, Identity, SecureSession, SessionConfig, TimeSource,
    Timestamp,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ----------------------------------------------------------------------------
// Mock Time Source
// ----------------------------------------------------------------------------

/// Mock time source shared by both ends of a test conversation
#[derive(Debug, Clone)]
pub struct MockTimeSource {
    current_time: Arc<AtomicU64>,
}

impl MockTimeSource {
    /// Start at a fixed, realistic epoch time
    pub fn new() -> Self {
        Self::new_at(1_700_000_000_000)
    }

    pub fn new_at(start_time: u64) -> Self {
        Self {
            current_time: Arc::new(AtomicU64::new(start_time)),
        }
    }

    /// Advance time by the specified number of milliseconds
    pub fn advance(&self, millis: u64) {
        self.current_time.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set_time(&self, millis: u64) {
        self.current_time.store(millis, Ordering::SeqCst);
    }

    pub fn current_time(&self) -> u64 {
        self.current_time.load(Ordering::SeqCst)
    }
}

impl Default for MockTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.current_time.load(Ordering::SeqCst))
    }
}

// ----------------------------------------------------------------------------
// Deterministic RNG
// ----------------------------------------------------------------------------

/// Seeded CSPRNG so key generation repeats across runs
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    rng: ChaCha8Rng,
}

impl DeterministicRng {
    pub fn new() -> Self {
        Self::with_seed([42u8; 32])
    }

    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            rng: ChaCha8Rng::from_seed(seed),
        }
    }
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new()
    }
}

impl RngCore for DeterministicRng {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.rng.try_fill_bytes(dest)
    }
}

impl CryptoRng for DeterministicRng {}

// ----------------------------------------------------------------------------
// Session Helpers
// ----------------------------------------------------------------------------

/// Identity generated from a fixed seed
pub fn seeded_identity(seed: u8) -> Arc<Identity> {
    let mut rng = DeterministicRng::with_seed([seed; 32]);
    Arc::new(Identity::generate_with_rng(&mut rng).unwrap())
}

/// Session on the shared mock clock
pub fn session_with(
    identity: Arc<Identity>,
    clock: &MockTimeSource,
) -> SecureSession<MockTimeSource> {
    SecureSession::with_time_source(identity, SessionConfig::testing(), clock.clone())
}

/// Deliver a handshake and return the reply it produced, if any
pub fn deliver(
    to: &mut SecureSession<MockTimeSource>,
    message: &HandshakeMessage,
) -> Option<HandshakeMessage> {
    let outcome: HandshakeOutcome = to.handle_handshake(message).unwrap();
    outcome.response().cloned()
}

/// Run a full INIT / RESPONSE exchange from `initiator` to `responder`
pub fn establish(
    initiator: &mut SecureSession<MockTimeSource>,
    responder: &mut SecureSession<MockTimeSource>,
) {
    let init = initiator.open().unwrap();
    let response = deliver(responder, &init).expect("INIT is always answered");
    assert!(deliver(initiator, &response).is_none());
}
