//! Connection Builder API
//!
//! Builder-style setup for a single secured connection: pick the identity,
//! session configuration, optional local status document and clock, then
//! hand over a transport to spawn the connection task.

use std::sync::Arc;

use securecall_core::{
    Identity, Result, SecureSession, SessionConfig, SystemTimeSource, TimeSource, Transport,
};
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::connection::ConnectionTask;
use crate::handle::ConnectionHandle;

// ----------------------------------------------------------------------------
// Connection Builder
// ----------------------------------------------------------------------------

/// Builder for a connection task
pub struct ConnectionBuilder<C: TimeSource = SystemTimeSource> {
    identity: Arc<Identity>,
    config: SessionConfig,
    local_status: Option<serde_json::Value>,
    time_source: C,
}

impl ConnectionBuilder<SystemTimeSource> {
    /// Create a new connection builder for `identity`
    pub fn new(identity: Arc<Identity>) -> Self {
        Self {
            identity,
            config: SessionConfig::default(),
            local_status: None,
            time_source: SystemTimeSource,
        }
    }
}

impl<C: TimeSource + 'static> ConnectionBuilder<C> {
    /// Set the session configuration
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Status document sent to the peer right after `INIT`
    pub fn with_local_status(mut self, status: serde_json::Value) -> Self {
        self.local_status = Some(status);
        self
    }

    /// Clock used for handshake timestamps
    pub fn with_time_source<C2: TimeSource + 'static>(self, time_source: C2) -> ConnectionBuilder<C2> {
        ConnectionBuilder {
            identity: self.identity,
            config: self.config,
            local_status: self.local_status,
            time_source,
        }
    }

    /// Spawn the connection task on the current tokio runtime.
    ///
    /// The task immediately sends `INIT` (and the local status, if any) and
    /// then runs until closed. Must be called from within a tokio runtime.
    pub fn spawn<T: Transport + 'static>(self, transport: T) -> Result<ConnectionHandle> {
        self.config.validate()?;

        let (command_sender, command_receiver) = mpsc::channel(4);
        let (event_sender, event_receiver) = mpsc::channel(self.config.event_buffer_size);
        let (context_sender, context_receiver) = watch::channel(None);

        let local_fingerprint = self.identity.fingerprint();
        let session = SecureSession::with_time_source(self.identity, self.config, self.time_source);

        let task = ConnectionTask {
            session,
            transport,
            commands: command_receiver,
            events: event_sender,
            context: context_sender,
            local_status: self.local_status,
        };
        let join = tokio::spawn(task.run());

        info!(fingerprint = %local_fingerprint, "Connection task spawned");

        Ok(ConnectionHandle::new(
            local_fingerprint,
            command_sender,
            event_receiver,
            context_receiver,
            join,
        ))
    }
}

// ----------------------------------------------------------------------------
// Convenience Functions
// ----------------------------------------------------------------------------

/// Spawn a connection with default configuration
pub fn connect<T: Transport + 'static>(
    identity: Arc<Identity>,
    transport: T,
) -> Result<ConnectionHandle> {
    ConnectionBuilder::new(identity).spawn(transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTransport;

    #[tokio::test]
    async fn test_invalid_config_is_refused() {
        let identity = Arc::new(Identity::generate().unwrap());
        let (transport, _peer) = MemoryTransport::pair();

        let config = SessionConfig {
            rotation_interval_secs: 0,
            ..SessionConfig::default()
        };
        let result = ConnectionBuilder::new(identity)
            .with_config(config)
            .spawn(transport);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_spawn_sends_init_and_status() {
        let identity = Arc::new(Identity::generate().unwrap());
        let (transport, mut peer) = MemoryTransport::pair();

        let mut handle = ConnectionBuilder::new(identity.clone())
            .with_local_status(serde_json::json!({ "video": false }))
            .spawn(transport)
            .unwrap();
        assert_eq!(handle.local_fingerprint(), identity.fingerprint());

        let first = peer.receive().await.unwrap().unwrap();
        let securecall_core::Envelope::Handshake(init) = first else {
            panic!("expected INIT first, got {:?}", first);
        };
        assert_eq!(init.kind, securecall_core::HandshakeKind::Init);
        assert_eq!(init.identity_public_key, identity.encoded_public_key());

        let second = peer.receive().await.unwrap().unwrap();
        assert_eq!(
            second,
            securecall_core::Envelope::status(serde_json::json!({ "video": false }))
        );

        handle.close().await.unwrap();
    }
}
