//! Handle to a running connection task

use securecall_core::{IdentityFingerprint, Result, SecureCallError, SecurityContext};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::connection::{CloseReason, ConnectionCommand, ConnectionEvent};

/// Owner-side view of one connection.
///
/// Dropping the handle closes the connection: the task sees its command
/// channel close and shuts down exactly as if [`ConnectionHandle::close`] had
/// been called.
pub struct ConnectionHandle {
    local_fingerprint: IdentityFingerprint,
    commands: mpsc::Sender<ConnectionCommand>,
    events: Option<mpsc::Receiver<ConnectionEvent>>,
    context: watch::Receiver<Option<SecurityContext>>,
    task: Option<JoinHandle<CloseReason>>,
    close_reason: Option<CloseReason>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        local_fingerprint: IdentityFingerprint,
        commands: mpsc::Sender<ConnectionCommand>,
        events: mpsc::Receiver<ConnectionEvent>,
        context: watch::Receiver<Option<SecurityContext>>,
        task: JoinHandle<CloseReason>,
    ) -> Self {
        Self {
            local_fingerprint,
            commands,
            events: Some(events),
            context,
            task: Some(task),
            close_reason: None,
        }
    }

    /// Fingerprint of the local identity
    pub fn local_fingerprint(&self) -> IdentityFingerprint {
        self.local_fingerprint
    }

    /// Latest security context (None until verified and after close)
    pub fn security_context(&self) -> Option<SecurityContext> {
        self.context.borrow().clone()
    }

    /// Whether the connection currently has a verified session
    pub fn is_verified(&self) -> bool {
        self.context
            .borrow()
            .as_ref()
            .is_some_and(|context| context.is_verified)
    }

    /// Watch the security context as it is replaced on every re-key
    pub fn subscribe_context(&self) -> watch::Receiver<Option<SecurityContext>> {
        self.context.clone()
    }

    /// Take the event receiver (can only be called once)
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.events.take()
    }

    /// Next event, unless the receiver was taken or the task is gone
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        match self.events.as_mut() {
            Some(events) => events.recv().await,
            None => None,
        }
    }

    /// Check if the connection task is still running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Close the connection and wait for the task to stop.
    ///
    /// Once this returns, no further rotation can fire and all session key
    /// material has been dropped. Calling it again returns the same reason.
    pub async fn close(&mut self) -> Result<CloseReason> {
        if self.task.is_some() && self.commands.send(ConnectionCommand::Close).await.is_err() {
            debug!("Connection task already stopped");
        }
        self.wait().await
    }

    /// Wait for the connection to stop on its own
    pub async fn wait(&mut self) -> Result<CloseReason> {
        if let Some(task) = self.task.take() {
            let reason = task.await.map_err(|err| {
                SecureCallError::runtime_error(format!("Connection task panicked: {}", err))
            })?;
            self.close_reason = Some(reason);
        }

        self.close_reason
            .clone()
            .ok_or_else(|| SecureCallError::runtime_error("Connection task result unavailable"))
    }
}

impl core::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("local", &format_args!("{}", self.local_fingerprint))
            .field("verified", &self.is_verified())
            .field("running", &self.is_running())
            .finish()
    }
}
