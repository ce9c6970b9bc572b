//! SecureCall Runtime
//!
//! Tokio driver for the session protocol in `securecall-core`:
//! - `ConnectionBuilder`: configures and spawns one connection task
//! - `ConnectionHandle`: close the connection, read the security context, receive events
//! - `MemoryTransport`: an in-process transport pair for tests and demos
//!
//! The task sends `INIT` on start, answers and verifies handshakes, pushes a
//! `ROTATION` every rotation interval, and closes the transport on any
//! verification failure or handshake timeout.

mod connection;
mod handle;

pub mod builder;
pub mod memory;

pub use builder::{connect, ConnectionBuilder};
pub use connection::{CloseReason, ConnectionEvent};
pub use handle::ConnectionHandle;
pub use memory::MemoryTransport;

// Re-export core types for convenience
pub use securecall_core::{
    Envelope, HandshakeKind, HandshakeMessage, Identity, IdentityFingerprint, IdentityStore,
    SafetyNumber, SecureCallError, SecureCallResult, SecurityContext, SessionConfig, Transport,
};
