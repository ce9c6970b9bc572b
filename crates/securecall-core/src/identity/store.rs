//! Identity store: load-or-generate the installation's long-term identity

use std::sync::Arc;

use rand_core::{CryptoRng, OsRng, RngCore};
use tracing::{debug, info, warn};

use super::keys::Identity;
use super::storage::KeyStorage;
use crate::config::IdentityConfig;
use crate::Result;

// ----------------------------------------------------------------------------
// Provenance
// ----------------------------------------------------------------------------

/// Where the identity returned by [`IdentityStore::get_or_create_identity`]
/// came from.
///
/// `Regenerated` means a previously persisted identity could not be used and
/// the installation's identity changed. Operators should treat unexpected
/// occurrences as a signal worth investigating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityProvenance {
    /// Decoded from storage
    Loaded,
    /// No identity was stored; a new one was generated and persisted
    Generated,
    /// A stored identity was unusable and has been replaced
    Regenerated { reason: String },
    /// Generated, but persisting it failed; the identity lives only in memory
    Ephemeral { reason: String },
}

// ----------------------------------------------------------------------------
// Identity Store
// ----------------------------------------------------------------------------

/// Owns the installation's identity and its backing storage.
///
/// Storage is consulted at most once; subsequent calls return the cached
/// identity, which is immutable and can be shared across connections.
pub struct IdentityStore<S: KeyStorage> {
    storage: S,
    config: IdentityConfig,
    identity: Option<Arc<Identity>>,
    provenance: Option<IdentityProvenance>,
}

impl<S: KeyStorage> IdentityStore<S> {
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, IdentityConfig::default())
    }

    pub fn with_config(storage: S, config: IdentityConfig) -> Self {
        Self {
            storage,
            config,
            identity: None,
            provenance: None,
        }
    }

    /// Return the installation identity, loading or generating it on first use.
    ///
    /// Storage problems never surface here: an unreadable or corrupt identity is
    /// replaced by a fresh one and reported through [`Self::provenance`]. Only a
    /// failing random source is returned as an error.
    pub fn get_or_create_identity(&mut self) -> Result<Arc<Identity>> {
        self.get_or_create_identity_with_rng(&mut OsRng)
    }

    pub fn get_or_create_identity_with_rng<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<Arc<Identity>> {
        if let Some(identity) = &self.identity {
            return Ok(Arc::clone(identity));
        }

        let (identity, provenance) = match self.load_persisted() {
            LoadOutcome::Found(identity) => {
                info!(fingerprint = %identity.fingerprint(), "Loaded persisted identity");
                (identity, IdentityProvenance::Loaded)
            }
            LoadOutcome::Missing => {
                let identity = Identity::generate_with_rng(rng)?;
                let provenance = match self.persist(&identity) {
                    Ok(()) => IdentityProvenance::Generated,
                    Err(reason) => IdentityProvenance::Ephemeral { reason },
                };
                info!(fingerprint = %identity.fingerprint(), "Generated new identity");
                (identity, provenance)
            }
            LoadOutcome::Unusable(reason) => {
                let identity = Identity::generate_with_rng(rng)?;
                let provenance = match self.persist(&identity) {
                    Ok(()) => IdentityProvenance::Regenerated { reason },
                    Err(persist_reason) => IdentityProvenance::Ephemeral {
                        reason: format!("{}; {}", reason, persist_reason),
                    },
                };
                warn!(
                    fingerprint = %identity.fingerprint(),
                    ?provenance,
                    "Identity regenerated, long-term identity has changed"
                );
                (identity, provenance)
            }
        };

        let identity = Arc::new(identity);
        self.identity = Some(Arc::clone(&identity));
        self.provenance = Some(provenance);
        Ok(identity)
    }

    /// How the current identity was obtained (None before the first call)
    pub fn provenance(&self) -> Option<&IdentityProvenance> {
        self.provenance.as_ref()
    }

    /// Give back the storage backend
    pub fn into_storage(self) -> S {
        self.storage
    }

    fn load_persisted(&self) -> LoadOutcome {
        let public = self.storage.load(&self.config.public_key_slot);
        let private = self.storage.load(&self.config.private_key_slot);

        match (public, private) {
            (Ok(None), Ok(None)) => {
                debug!("No persisted identity found");
                LoadOutcome::Missing
            }
            (Ok(Some(public_der)), Ok(Some(private_der))) => {
                match Identity::from_der(&public_der, &private_der) {
                    Some(identity) => LoadOutcome::Found(identity),
                    None => LoadOutcome::Unusable("persisted identity could not be decoded".into()),
                }
            }
            (Ok(_), Ok(_)) => LoadOutcome::Unusable("persisted identity is incomplete".into()),
            (Err(err), _) | (_, Err(err)) => {
                LoadOutcome::Unusable(format!("identity storage unreadable: {}", err))
            }
        }
    }

    fn persist(&mut self, identity: &Identity) -> core::result::Result<(), String> {
        let public_der = identity.public_key_der().map_err(|e| e.to_string())?;
        let private_der = identity.private_key_der().map_err(|e| e.to_string())?;

        let result = self
            .storage
            .save(&self.config.public_key_slot, &public_der)
            .and_then(|()| {
                self.storage
                    .save(&self.config.private_key_slot, &private_der)
            });

        result.map_err(|err| {
            warn!(error = %err, "Failed to persist identity");
            format!("identity could not be persisted: {}", err)
        })
    }
}

enum LoadOutcome {
    Found(Identity),
    Missing,
    Unusable(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::storage::MemoryStorage;

    #[test]
    fn test_generates_and_persists_once() {
        let mut store = IdentityStore::new(MemoryStorage::new());
        let first = store.get_or_create_identity().unwrap();
        let second = store.get_or_create_identity().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.provenance(), Some(&IdentityProvenance::Generated));
        // One save per half, and only on generation
        assert_eq!(store.into_storage().write_count(), 2);
    }

    #[test]
    fn test_reload_keeps_fingerprint() {
        let mut store = IdentityStore::new(MemoryStorage::new());
        let original = store.get_or_create_identity().unwrap();
        let storage = store.into_storage();

        let mut reloaded_store = IdentityStore::new(storage);
        let reloaded = reloaded_store.get_or_create_identity().unwrap();

        assert_eq!(reloaded.fingerprint(), original.fingerprint());
        assert_eq!(reloaded_store.provenance(), Some(&IdentityProvenance::Loaded));
        assert_eq!(reloaded_store.into_storage().write_count(), 2);
    }

    #[test]
    fn test_corrupt_storage_regenerates() {
        let config = IdentityConfig::default();
        let mut storage = MemoryStorage::new();
        storage.insert_raw(&config.public_key_slot, b"not a key".to_vec());
        storage.insert_raw(&config.private_key_slot, b"also not a key".to_vec());

        let mut store = IdentityStore::new(storage);
        let identity = store.get_or_create_identity().unwrap();

        assert!(matches!(
            store.provenance(),
            Some(IdentityProvenance::Regenerated { .. })
        ));

        // The replacement is what gets loaded next time
        let mut reloaded = IdentityStore::new(store.into_storage());
        assert_eq!(
            reloaded.get_or_create_identity().unwrap().fingerprint(),
            identity.fingerprint()
        );
    }

    #[test]
    fn test_incomplete_storage_regenerates() {
        let config = IdentityConfig::default();
        let donor = Identity::generate().unwrap();
        let mut storage = MemoryStorage::new();
        storage.insert_raw(&config.public_key_slot, donor.public_key_der().unwrap());

        let mut store = IdentityStore::new(storage);
        let identity = store.get_or_create_identity().unwrap();
        assert_ne!(identity.fingerprint(), donor.fingerprint());
        assert!(matches!(
            store.provenance(),
            Some(IdentityProvenance::Regenerated { reason }) if reason.contains("incomplete")
        ));
    }

    #[test]
    fn test_unavailable_storage_yields_memory_only_identity() {
        let mut store = IdentityStore::new(MemoryStorage::unavailable());
        let identity = store.get_or_create_identity().unwrap();

        assert_eq!(identity.fingerprint().to_hex().len(), 16);
        assert!(matches!(
            store.provenance(),
            Some(IdentityProvenance::Ephemeral { .. })
        ));
    }
}
