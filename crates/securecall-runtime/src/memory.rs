//! In-process transport
//!
//! Two connected endpoints over tokio channels, carrying envelopes as JSON
//! text so the wire encoding is exercised exactly as on a real data channel.

use async_trait::async_trait;
use securecall_core::{Envelope, Result, SecureCallError, Transport, TransportError};
use tokio::sync::mpsc;
use tracing::warn;

/// One end of an in-memory duplex channel
#[derive(Debug)]
pub struct MemoryTransport {
    outgoing: Option<mpsc::UnboundedSender<String>>,
    incoming: mpsc::UnboundedReceiver<String>,
    open: bool,
}

impl MemoryTransport {
    /// Create two endpoints connected to each other
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Self::new(a_tx, b_rx), Self::new(b_tx, a_rx))
    }

    fn new(outgoing: mpsc::UnboundedSender<String>, incoming: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            outgoing: Some(outgoing),
            incoming,
            open: true,
        }
    }

    /// Push raw text to the peer, bypassing envelope encoding
    pub fn send_raw(&mut self, text: impl Into<String>) -> Result<()> {
        let outgoing = self
            .outgoing
            .as_ref()
            .ok_or(SecureCallError::Transport(TransportError::Closed))?;
        outgoing
            .send(text.into())
            .map_err(|_| SecureCallError::send_failed("peer endpoint is gone"))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, envelope: Envelope) -> Result<()> {
        if !self.open {
            return Err(SecureCallError::Transport(TransportError::Closed));
        }
        let json = envelope.to_json()?;
        self.send_raw(json)
    }

    async fn receive(&mut self) -> Result<Option<Envelope>> {
        loop {
            if !self.open {
                return Ok(None);
            }
            let Some(text) = self.incoming.recv().await else {
                self.open = false;
                return Ok(None);
            };
            match Envelope::from_json(&text) {
                Ok(envelope) => return Ok(Some(envelope)),
                Err(err) => warn!(error = %err, "Dropping undecodable envelope"),
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        self.outgoing = None;
        self.incoming.close();
        Ok(())
    }
}
