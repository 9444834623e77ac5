use async_trait::async_trait;
use petsflow_entitlements::{ActionType, SubscriptionRecord, SubscriptionSource, UsageSource};
use thiserror::Error;
use uuid::Uuid;

use crate::records::{NewRecord, StoredRecord};
use crate::remote::BackendError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Storage(StorageError),
    #[error(transparent)]
    Backend(BackendError),
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidRecord(reason) => StoreError::InvalidRecord(reason),
            StorageError::NotFound(what) => StoreError::NotFound(what),
            other => StoreError::Storage(other),
        }
    }
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::NotFound(what) => StoreError::NotFound(what),
            other => StoreError::Backend(other),
        }
    }
}

/// Persistence for tenant records and subscriptions. Implementations also
/// answer the entitlement queries so the gate counts what the store holds.
#[async_trait]
pub trait RecordStore: UsageSource + SubscriptionSource {
    async fn insert_record(&self, tenant_id: &str, record: NewRecord)
        -> Result<StoredRecord, StoreError>;

    async fn delete_record(
        &self,
        tenant_id: &str,
        action_type: ActionType,
        record_id: Uuid,
    ) -> Result<bool, StoreError>;

    async fn save_subscription(&self, record: &SubscriptionRecord) -> Result<(), StoreError>;

    async fn cancel_subscription(&self, tenant_id: &str) -> Result<bool, StoreError>;
}
