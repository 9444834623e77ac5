use chrono::{DateTime, Utc};
use petsflow_entitlements::LimitDecision;
use serde::{Deserialize, Serialize};

use crate::records::StoredRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub package_name: String,
    pub max_clients: u64,
    pub max_pets: u64,
    pub max_services: u64,
    pub max_specializations: u64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// Stored record plus the decision it was admitted on, so clients can warn
/// when `limit_check.is_at_soft_limit` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecordResponse {
    #[serde(flatten)]
    pub record: StoredRecord,
    pub limit_check: LimitDecision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRecordResponse {
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelSubscriptionResponse {
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub details: Option<serde_json::Value>,
}
