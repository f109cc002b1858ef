//! CredentialStore — redb-backed lookup of cluster credentials.
//!
//! Supports both on-disk and in-memory backends (the latter for testing).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::tables::{CLUSTER, CLUSTER_CREDS_KEY};

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Username/password of the cluster's administrative RPC interface.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterCredentials {
    pub key: String,
    pub username: String,
    pub password: String,
}

impl ClusterCredentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            key: CLUSTER_CREDS_KEY.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl fmt::Debug for ClusterCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterCredentials")
            .field("key", &self.key)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Thread-safe credential store backed by redb.
#[derive(Clone)]
pub struct CredentialStore {
    db: Arc<Database>,
}

impl CredentialStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "credential store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory credential store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(CLUSTER).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Store (or replace) the cluster credentials.
    pub fn put_credentials(&self, creds: &ClusterCredentials) -> StoreResult<()> {
        let value = serde_json::to_vec(creds).map_err(map_err!(Codec))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CLUSTER).map_err(map_err!(Table))?;
            table
                .insert(CLUSTER_CREDS_KEY, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(username = %creds.username, "cluster credentials stored");
        Ok(())
    }

    /// Read the cluster credentials.
    ///
    /// A missing record is an error: without credentials no RPC call can
    /// be made.
    pub fn get_credentials(&self) -> StoreResult<ClusterCredentials> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTER).map_err(map_err!(Table))?;
        match table.get(CLUSTER_CREDS_KEY).map_err(map_err!(Read))? {
            Some(guard) => {
                serde_json::from_slice(guard.value()).map_err(map_err!(Codec))
            }
            None => Err(StoreError::NotFound(CLUSTER_CREDS_KEY.to_string())),
        }
    }
}
