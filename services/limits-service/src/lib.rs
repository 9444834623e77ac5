pub mod api;
pub mod backend;
pub mod config;
pub mod records;
pub mod remote;
pub mod storage;

pub use api::{create_router, ApiState};
pub use backend::{RecordStore, StoreError};
pub use config::{BackendKind, LimitsServiceConfig};
pub use records::{NewRecord, StoredRecord};
pub use remote::{BackendClient, BackendError};
pub use storage::{LimitsDatabase, StorageError};
