//! Whole-state persistence for the ledger.
//!
//! The entire [`StoreState`] lives under a single storage key and is rewritten
//! after every mutation. Loading repairs the seed accounts so the demo logins
//! always work, and falls back to the seed dataset when nothing usable is
//! stored.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::model::{KycImages, Uid, UserRecord};

mod backend;
pub use backend::{FileStorage, KeyValueStore, MemoryStorage, StorageError};

mod seed;
pub use seed::seed_users;

/// Every account (keyed by email) and every KYC submission (keyed by uid).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
    #[serde(default)]
    pub kyc_images: BTreeMap<Uid, KycImages>,
}

impl StoreState {
    /// Fresh state holding only the seed accounts.
    pub fn seeded() -> Self {
        Self {
            users: seed_users(Utc::now()),
            kyc_images: BTreeMap::new(),
        }
    }

    pub fn find_by_uid(&self, uid: &Uid) -> Option<&UserRecord> {
        self.users.values().find(|record| &record.user.uid == uid)
    }

    pub fn find_by_uid_mut(&mut self, uid: &Uid) -> Option<&mut UserRecord> {
        self.users.values_mut().find(|record| &record.user.uid == uid)
    }

    /// Restore seed credentials and reinsert missing seed accounts.
    fn repair_seed_accounts(&mut self) {
        for (email, seed) in seed_users(Utc::now()) {
            match self.users.get_mut(&email) {
                Some(existing) => existing.password = seed.password,
                None => {
                    debug!(email, "restoring missing seed account");
                    self.users.insert(email, seed);
                }
            }
        }
    }
}

/// Loads and saves [`StoreState`] under one key of a [`KeyValueStore`].
#[derive(Clone)]
pub struct PersistentStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
}

impl PersistentStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn backend(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.backend)
    }

    /// Load the stored state.
    ///
    /// - nothing stored, unreadable or malformed: the seed dataset
    /// - otherwise the stored state, with seed credentials restored and
    ///   missing seed accounts reinserted
    pub fn load(&self) -> StoreState {
        let raw = match self.backend.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return StoreState::seeded(),
            Err(e) => {
                error!(key = %self.key, error = %e, "failed to read store, using seed data");
                return StoreState::seeded();
            }
        };

        match serde_json::from_str::<StoreState>(&raw) {
            Ok(mut state) => {
                state.repair_seed_accounts();
                state
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "stored state is malformed, using seed data");
                StoreState::seeded()
            }
        }
    }

    /// Serialize and write the whole state. Failures are logged, never returned.
    pub fn save(&self, state: &StoreState) {
        let json = match serde_json::to_string(state) {
            Ok(json) => json,
            Err(e) => {
                error!(key = %self.key, error = %e, "failed to serialize store");
                return;
            }
        };

        if let Err(e) = self.backend.set(&self.key, &json) {
            error!(key = %self.key, error = %e, "failed to persist store");
        }
    }
}
