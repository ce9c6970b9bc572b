//! Connection task
//!
//! One task per connection owns the [`SecureSession`] and the transport and
//! multiplexes incoming envelopes, the rotation timer, the handshake deadline
//! and close commands. Because the session is only ever touched from this
//! loop, a rotation tick can never interleave with verification of an incoming
//! handshake.

use securecall_core::{
    Envelope, HandshakeMessage, HandshakeOutcome, SecureSession, SecurityContext, TimeSource,
    Transport,
};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

// ----------------------------------------------------------------------------
// Events and Commands
// ----------------------------------------------------------------------------

/// Why a connection task stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called or the handle was dropped
    Local,
    /// The transport reported end of stream
    RemoteClosed,
    /// A handshake failed verification
    SecurityAlert,
    /// No handshake verified before the deadline
    HandshakeTimeout,
    /// Sending or receiving failed
    TransportFailed(String),
    /// The protocol could not continue (e.g. the random source failed)
    Failed(String),
}

/// Notifications published by a connection task
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// First successful verification; the safety number can be shown
    Verified(SecurityContext),
    /// The shared secret changed; the displayed safety number must be replaced
    Rekeyed(SecurityContext),
    /// Status document sent by the remote peer
    PeerStatus(serde_json::Value),
    /// The remote failed authentication; the connection is being closed
    SecurityAlert { reason: String },
    /// The handshake did not complete in time
    HandshakeTimedOut,
    /// The task has stopped; nothing is emitted after it.
    ///
    /// Like every event it is dropped if the buffer is full, so use
    /// [`crate::ConnectionHandle::wait`] when the close reason must be observed.
    Closed(CloseReason),
}

#[derive(Debug)]
pub(crate) enum ConnectionCommand {
    Close,
}

// ----------------------------------------------------------------------------
// Connection Task
// ----------------------------------------------------------------------------

pub(crate) struct ConnectionTask<T: Transport, C: TimeSource> {
    pub(crate) session: SecureSession<C>,
    pub(crate) transport: T,
    pub(crate) commands: mpsc::Receiver<ConnectionCommand>,
    pub(crate) events: mpsc::Sender<ConnectionEvent>,
    pub(crate) context: watch::Sender<Option<SecurityContext>>,
    pub(crate) local_status: Option<serde_json::Value>,
}

impl<T: Transport, C: TimeSource> ConnectionTask<T, C> {
    /// Drive the connection until it closes
    pub(crate) async fn run(mut self) -> CloseReason {
        let local = self.session.local_fingerprint();
        info!(fingerprint = %local, "Connection task starting");

        let reason = match self.start().await {
            Ok(()) => self.event_loop().await,
            Err(reason) => reason,
        };

        self.shutdown(reason).await
    }

    async fn start(&mut self) -> Result<(), CloseReason> {
        let init = self
            .session
            .open()
            .map_err(|err| CloseReason::Failed(err.to_string()))?;
        self.send_handshake(init).await?;

        if let Some(status) = self.local_status.clone() {
            self.send(Envelope::status(status)).await?;
        }
        Ok(())
    }

    async fn event_loop(&mut self) -> CloseReason {
        let period = self.session.config().rotation_interval();
        let mut rotation = interval_at(Instant::now() + period, period);
        rotation.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let deadline = self
            .session
            .config()
            .handshake_timeout()
            .map(|timeout| Instant::now() + timeout);

        loop {
            let awaiting = !self.session.is_verified();

            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(ConnectionCommand::Close) | None => return CloseReason::Local,
                },

                _ = wait_until(deadline), if awaiting => {
                    if self.session.expire_handshake() {
                        self.emit(ConnectionEvent::HandshakeTimedOut);
                        return CloseReason::HandshakeTimeout;
                    }
                }

                received = self.transport.receive() => match received {
                    Ok(Some(envelope)) => {
                        if let Err(reason) = self.handle_envelope(envelope).await {
                            return reason;
                        }
                    }
                    Ok(None) => {
                        debug!("Transport closed by remote");
                        return CloseReason::RemoteClosed;
                    }
                    Err(err) => {
                        warn!(error = %err, "Transport receive failed");
                        return CloseReason::TransportFailed(err.to_string());
                    }
                },

                _ = rotation.tick() => {
                    if let Err(reason) = self.rotate().await {
                        return reason;
                    }
                }
            }
        }
    }

    async fn handle_envelope(&mut self, envelope: Envelope) -> Result<(), CloseReason> {
        let message = match envelope {
            Envelope::Status { body } => {
                self.emit(ConnectionEvent::PeerStatus(body));
                return Ok(());
            }
            Envelope::Handshake(message) => message,
        };

        match self.session.handle_handshake(&message) {
            Ok(HandshakeOutcome::Verified { context, response }) => {
                if let Some(response) = response {
                    self.send_handshake(response).await?;
                }
                self.publish(context.clone());
                self.emit(ConnectionEvent::Verified(context));
                Ok(())
            }
            Ok(HandshakeOutcome::Rekeyed { context, response }) => {
                if let Some(response) = response {
                    self.send_handshake(response).await?;
                }
                self.publish(context.clone());
                self.emit(ConnectionEvent::Rekeyed(context));
                Ok(())
            }
            Ok(HandshakeOutcome::Ignored(reason)) => {
                debug!(kind = %message.kind, ?reason, "Handshake ignored");
                Ok(())
            }
            Err(err) if err.is_security_alert() => {
                error!(error = %err, "Handshake verification failed, closing connection");
                self.emit(ConnectionEvent::SecurityAlert {
                    reason: err.to_string(),
                });
                Err(CloseReason::SecurityAlert)
            }
            Err(err) => {
                error!(error = %err, "Handshake processing failed");
                Err(CloseReason::Failed(err.to_string()))
            }
        }
    }

    async fn rotate(&mut self) -> Result<(), CloseReason> {
        if !self.transport.is_open() {
            debug!("Transport not open, skipping rotation");
            return Ok(());
        }

        match self.session.rotate() {
            Ok(Some(rotation)) => {
                self.send_handshake(rotation.message).await?;
                self.publish(rotation.context.clone());
                self.emit(ConnectionEvent::Rekeyed(rotation.context));
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => {
                error!(error = %err, "Key rotation failed");
                Err(CloseReason::Failed(err.to_string()))
            }
        }
    }

    async fn shutdown(mut self, reason: CloseReason) -> CloseReason {
        self.session.close();
        self.context.send_replace(None);

        if let Err(err) = self.transport.close().await {
            warn!(error = %err, "Failed to close transport");
        }

        info!(?reason, "Connection closed");
        self.emit(ConnectionEvent::Closed(reason.clone()));
        reason
    }

    // ---- Helpers ----

    async fn send_handshake(&mut self, message: HandshakeMessage) -> Result<(), CloseReason> {
        debug!(kind = %message.kind, "Sending handshake");
        self.send(Envelope::handshake(message)).await
    }

    async fn send(&mut self, envelope: Envelope) -> Result<(), CloseReason> {
        self.transport
            .send(envelope)
            .await
            .map_err(|err| {
                warn!(error = %err, "Transport send failed");
                CloseReason::TransportFailed(err.to_string())
            })
    }

    fn publish(&self, context: SecurityContext) {
        self.context.send_replace(Some(context));
    }

    fn emit(&self, event: ConnectionEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "Event buffer full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Resolve at `deadline`, or never when there is none
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_none_never_fires() {
        let never = wait_until(None);
        let result = tokio::time::timeout(Duration::from_secs(3600), never).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_deadline() {
        let start = Instant::now();
        wait_until(Some(start + Duration::from_millis(250))).await;
        assert!(Instant::now() >= start + Duration::from_millis(250));
    }
}
