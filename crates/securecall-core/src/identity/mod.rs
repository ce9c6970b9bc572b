//! Long-term identity management
//!
//! The installation's ECDSA P-256 identity, the storage it persists to, and the
//! store that loads or generates it.

pub mod keys;
pub mod storage;
pub mod store;

pub use keys::Identity;
pub use storage::{FileStorage, KeyStorage, MemoryStorage};
pub use store::{IdentityProvenance, IdentityStore};
