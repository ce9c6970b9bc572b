//! Transport abstraction for SecureCall
//!
//! The protocol only needs an ordered, bidirectional channel of JSON documents
//! to the one remote peer. Anything that can carry an [`Envelope`] in both
//! directions can host a session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::protocol::HandshakeMessage;
use crate::Result;

// ----------------------------------------------------------------------------
// Envelope
// ----------------------------------------------------------------------------

/// A document on the connection's data channel, tagged by `channel`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
pub enum Envelope {
    /// `{"channel":"handshake","type":...,"identityPublicKey":...}`
    Handshake(HandshakeMessage),
    /// `{"channel":"status","body":...}`; opaque to the protocol
    Status { body: serde_json::Value },
}

impl Envelope {
    pub fn handshake(message: HandshakeMessage) -> Self {
        Envelope::Handshake(message)
    }

    pub fn status(body: serde_json::Value) -> Self {
        Envelope::Status { body }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<HandshakeMessage> for Envelope {
    fn from(message: HandshakeMessage) -> Self {
        Envelope::Handshake(message)
    }
}

// ----------------------------------------------------------------------------
// Transport Trait
// ----------------------------------------------------------------------------

/// Point-to-point delivery of opaque envelopes to a single remote peer.
///
/// Implementations may drop, duplicate or reorder envelopes; the session
/// tolerates that and assumes no delivery guarantee.
#[async_trait]
pub trait Transport: Send {
    /// Send one envelope
    async fn send(&mut self, envelope: Envelope) -> Result<()>;

    /// Receive the next envelope; `Ok(None)` once the channel is closed.
    ///
    /// Must be cancel safe: the runtime polls it inside `tokio::select!` and
    /// drops the future whenever a timer fires first.
    async fn receive(&mut self) -> Result<Option<Envelope>>;

    /// Whether the channel can still carry data
    fn is_open(&self) -> bool;

    /// Close the channel; further sends fail and `receive` returns `None`
    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(&mut self, envelope: Envelope) -> Result<()> {
        (**self).send(envelope).await
    }

    async fn receive(&mut self) -> Result<Option<Envelope>> {
        (**self).receive().await
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    async fn close(&mut self) -> Result<()> {
        (**self).close().await
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
