//! Key/value persistence for flow state across the redirect boundary.
//!
//! Interactive hosts hand the broker two independently-failing backends: a
//! primary store scoped to the current session and a longer-lived backup.
//! A value that was `set` and not yet `remove`d stays retrievable as long
//! as either backend retains it; the broker mirrors writes into the backup
//! and repairs the primary from it on read. Non-interactive hosts get a
//! single in-memory backend behind the same contract.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;

use crate::error::Error;

/// Suffix distinguishing the backup copy of each persisted key.
pub const BACKUP_SUFFIX: &str = "_backup";

/// One persistent key/value backend. Implementations map onto whatever the
/// embedding offers (session store, local store, a file, a map).
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<(), Error>;
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;
    async fn remove(&self, key: &str) -> Result<(), Error>;
}

/// Private in-memory backend for hosts without persistent storage. State is
/// scoped to the broker instance and never crosses a process boundary.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Mediates between the primary backend and an optional backup.
pub struct StorageBroker {
    primary: Arc<dyn StorageBackend>,
    backup: Option<Arc<dyn StorageBackend>>,
}

impl StorageBroker {
    pub fn new(primary: Arc<dyn StorageBackend>, backup: Option<Arc<dyn StorageBackend>>) -> Self {
        StorageBroker { primary, backup }
    }

    /// Broker over a single private in-memory map, for non-interactive hosts.
    pub fn in_memory() -> Self {
        StorageBroker::new(Arc::new(MemoryBackend::new()), None)
    }

    /// Writes to the primary backend and mirrors to the backup. A primary
    /// failure is fatal; a mirroring failure is logged and swallowed.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.primary
            .set(key, value)
            .await
            .map_err(|e| Error::StorageUnavailable(format!("failed to store '{key}': {e}")))?;
        if let Some(backup) = &self.backup {
            let backup_key = format!("{key}{BACKUP_SUFFIX}");
            if let Err(e) = backup.set(&backup_key, value).await {
                warn!(key = %key, error = %e, "failed to mirror value to backup storage");
            }
        }
        Ok(())
    }

    /// Reads the primary backend first; on a miss, falls back to the backup
    /// and repairs the primary with the recovered value. Backend errors are
    /// treated as misses.
    pub async fn get(&self, key: &str) -> Option<String> {
        match self.primary.get(key).await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "primary storage read failed"),
        }
        let backup = self.backup.as_ref()?;
        let backup_key = format!("{key}{BACKUP_SUFFIX}");
        match backup.get(&backup_key).await {
            Ok(Some(value)) => {
                if let Err(e) = self.primary.set(key, &value).await {
                    warn!(key = %key, error = %e, "failed to repair primary storage from backup");
                }
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "backup storage read failed");
                None
            }
        }
    }

    /// Removes the value from both backends, best effort.
    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.primary.remove(key).await {
            warn!(key = %key, error = %e, "failed to remove value from primary storage");
        }
        if let Some(backup) = &self.backup {
            let backup_key = format!("{key}{BACKUP_SUFFIX}");
            if let Err(e) = backup.remove(&backup_key).await {
                warn!(key = %key, error = %e, "failed to remove value from backup storage");
            }
        }
    }
}
