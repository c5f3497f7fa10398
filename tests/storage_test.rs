use std::sync::Arc;

use async_trait::async_trait;
use maestro_sdk::{Error, MemoryBackend, StorageBackend, StorageBroker};

/// Backend that fails every operation, standing in for a storage area the
/// embedding has disabled.
struct FailingBackend;

#[async_trait]
impl StorageBackend for FailingBackend {
    async fn set(&self, _key: &str, _value: &str) -> Result<(), Error> {
        Err(Error::StorageUnavailable("backend disabled".into()))
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, Error> {
        Err(Error::StorageUnavailable("backend disabled".into()))
    }

    async fn remove(&self, _key: &str) -> Result<(), Error> {
        Err(Error::StorageUnavailable("backend disabled".into()))
    }
}

#[tokio::test]
async fn test_in_memory_round_trip() {
    let broker = StorageBroker::in_memory();
    broker.set("k", "v").await.unwrap();
    assert_eq!(broker.get("k").await.as_deref(), Some("v"));
    broker.remove("k").await;
    assert_eq!(broker.get("k").await, None);
}

#[tokio::test]
async fn test_value_survives_primary_loss() {
    let primary = Arc::new(MemoryBackend::new());
    let backup = Arc::new(MemoryBackend::new());
    let broker = StorageBroker::new(primary.clone(), Some(backup.clone()));

    broker.set("k", "v").await.unwrap();
    // Session storage cleared mid-flow; the backup still has the value.
    primary.remove("k").await.unwrap();

    assert_eq!(broker.get("k").await.as_deref(), Some("v"));
}

#[tokio::test]
async fn test_repair_on_read_restores_primary() {
    let primary = Arc::new(MemoryBackend::new());
    let backup = Arc::new(MemoryBackend::new());
    let broker = StorageBroker::new(primary.clone(), Some(backup.clone()));

    broker.set("k", "v").await.unwrap();
    primary.remove("k").await.unwrap();
    assert_eq!(broker.get("k").await.as_deref(), Some("v"));

    // The recovered value was written back to the primary.
    assert_eq!(primary.get("k").await.unwrap().as_deref(), Some("v"));
}

#[tokio::test]
async fn test_remove_clears_both_backends() {
    let primary = Arc::new(MemoryBackend::new());
    let backup = Arc::new(MemoryBackend::new());
    let broker = StorageBroker::new(primary.clone(), Some(backup.clone()));

    broker.set("k", "v").await.unwrap();
    broker.remove("k").await;

    assert_eq!(primary.get("k").await.unwrap(), None);
    assert_eq!(backup.get("k_backup").await.unwrap(), None);
    assert_eq!(broker.get("k").await, None);
}

#[tokio::test]
async fn test_backup_failure_does_not_fail_writes() {
    let primary = Arc::new(MemoryBackend::new());
    let broker = StorageBroker::new(primary.clone(), Some(Arc::new(FailingBackend)));

    broker.set("k", "v").await.unwrap();
    assert_eq!(broker.get("k").await.as_deref(), Some("v"));
    broker.remove("k").await;
    assert_eq!(broker.get("k").await, None);
}

#[tokio::test]
async fn test_primary_failure_is_fatal_for_writes() {
    let broker = StorageBroker::new(Arc::new(FailingBackend), Some(Arc::new(MemoryBackend::new())));
    let err = broker.set("k", "v").await.unwrap_err();
    assert!(matches!(err, Error::StorageUnavailable(_)));
}

#[tokio::test]
async fn test_failing_primary_falls_back_to_backup_on_read() {
    let backup = Arc::new(MemoryBackend::new());
    backup.set("k_backup", "v").await.unwrap();
    let broker = StorageBroker::new(Arc::new(FailingBackend), Some(backup));
    assert_eq!(broker.get("k").await.as_deref(), Some("v"));
}
