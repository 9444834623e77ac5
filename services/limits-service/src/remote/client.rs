use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use petsflow_entitlements::{
    ActionType, SourceError, SubscriptionRecord, SubscriptionSource, SubscriptionStatus,
    UsageSource,
};
use reqwest::header::CONTENT_RANGE;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::backend::{RecordStore, StoreError};
use crate::records::{NewRecord, StoredRecord};

use super::error::BackendError;
use super::{SUBSCRIPTIONS_TABLE, TENANT_COLUMN};

const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Client for a PostgREST-style hosted database holding tenant rows.
pub struct BackendClient {
    http_client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubscriptionRow {
    user_id: String,
    package_name: String,
    max_clients: u64,
    max_pets: u64,
    max_services: u64,
    max_specializations: u64,
    status: SubscriptionStatus,
    starts_at: DateTime<Utc>,
    ends_at: Option<DateTime<Utc>>,
}

impl From<SubscriptionRow> for SubscriptionRecord {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            tenant_id: row.user_id,
            package_name: row.package_name,
            max_clients: row.max_clients,
            max_pets: row.max_pets,
            max_services: row.max_services,
            max_specializations: row.max_specializations,
            status: row.status,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
        }
    }
}

impl From<&SubscriptionRecord> for SubscriptionRow {
    fn from(record: &SubscriptionRecord) -> Self {
        Self {
            user_id: record.tenant_id.clone(),
            package_name: record.package_name.clone(),
            max_clients: record.max_clients,
            max_pets: record.max_pets,
            max_services: record.max_services,
            max_specializations: record.max_specializations,
            status: record.status,
            starts_at: record.starts_at,
            ends_at: record.ends_at,
        }
    }
}

impl BackendClient {
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build backend client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    pub async fn count_rows(
        &self,
        tenant_id: &str,
        action_type: ActionType,
    ) -> Result<u64, BackendError> {
        let url = self.table_url(action_type.as_str());
        let tenant_filter = format!("eq.{tenant_id}");
        let response = self
            .request(Method::GET, &url)
            .query(&[("select", "id"), (TENANT_COLUMN, tenant_filter.as_str())])
            .header("Prefer", "count=exact")
            .header("Range", "0-0")
            .send()
            .await?;
        let response = ensure_success("GET", &url, response).await?;

        let range = response
            .headers()
            .get(CONTENT_RANGE)
            .ok_or_else(|| BackendError::InvalidResponse("missing Content-Range header".into()))?
            .to_str()
            .map_err(|_| BackendError::InvalidResponse("non-ascii Content-Range header".into()))?;
        let count = parse_content_range(range)?;

        debug!(tenant_id, %action_type, count, "counted remote rows");
        Ok(count)
    }

    pub async fn fetch_active_subscription(
        &self,
        tenant_id: &str,
    ) -> Result<Option<SubscriptionRecord>, BackendError> {
        let url = self.table_url(SUBSCRIPTIONS_TABLE);
        let tenant_filter = format!("eq.{tenant_id}");
        let response = self
            .request(Method::GET, &url)
            .query(&[
                (TENANT_COLUMN, tenant_filter.as_str()),
                ("status", "eq.active"),
                ("select", "*"),
                ("limit", "1"),
            ])
            .send()
            .await?;
        let response = ensure_success("GET", &url, response).await?;

        let rows: Vec<SubscriptionRow> = response.json().await?;
        Ok(rows.into_iter().next().map(SubscriptionRecord::from))
    }

    pub async fn create_record(
        &self,
        tenant_id: &str,
        record: NewRecord,
    ) -> Result<StoredRecord, BackendError> {
        if let NewRecord::Pet { client_id, .. } = &record {
            if !self.client_belongs_to(tenant_id, *client_id).await? {
                return Err(BackendError::NotFound(format!("client {client_id}")));
            }
        }

        let stored = StoredRecord::new(tenant_id, record);
        let url = self.table_url(stored.record.action_type().as_str());

        let mut row = serde_json::to_value(&stored.record)?;
        if let Some(fields) = row.as_object_mut() {
            fields.remove("resource");
            fields.insert("id".to_string(), json!(stored.id));
            fields.insert(TENANT_COLUMN.to_string(), json!(tenant_id));
            fields.insert("created_at".to_string(), json!(stored.created_at));
        }

        let response = self
            .request(Method::POST, &url)
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            let body = response.text().await.unwrap_or_default();
            if let NewRecord::Pet { client_id, .. } = &stored.record {
                if body.contains(FOREIGN_KEY_VIOLATION) {
                    return Err(BackendError::NotFound(format!("client {client_id}")));
                }
            }
            return Err(BackendError::Status {
                method: "POST",
                url,
                status: StatusCode::CONFLICT,
                body,
            });
        }
        ensure_success("POST", &url, response).await?;

        Ok(stored)
    }

    /// The service key bypasses row-level security, so pet owners are checked here.
    async fn client_belongs_to(
        &self,
        tenant_id: &str,
        client_id: Uuid,
    ) -> Result<bool, BackendError> {
        let url = self.table_url(ActionType::Clients.as_str());
        let id_filter = format!("eq.{client_id}");
        let tenant_filter = format!("eq.{tenant_id}");
        let response = self
            .request(Method::GET, &url)
            .query(&[
                ("id", id_filter.as_str()),
                (TENANT_COLUMN, tenant_filter.as_str()),
                ("select", "id"),
                ("limit", "1"),
            ])
            .send()
            .await?;
        let response = ensure_success("GET", &url, response).await?;

        let rows: Vec<Value> = response.json().await?;
        Ok(!rows.is_empty())
    }

    pub async fn remove_record(
        &self,
        tenant_id: &str,
        action_type: ActionType,
        record_id: Uuid,
    ) -> Result<bool, BackendError> {
        let url = self.table_url(action_type.as_str());
        let id_filter = format!("eq.{record_id}");
        let tenant_filter = format!("eq.{tenant_id}");
        let response = self
            .request(Method::DELETE, &url)
            .query(&[
                ("id", id_filter.as_str()),
                (TENANT_COLUMN, tenant_filter.as_str()),
            ])
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let response = ensure_success("DELETE", &url, response).await?;

        let deleted: Vec<Value> = response.json().await?;
        Ok(!deleted.is_empty())
    }

    pub async fn upsert_subscription(&self, record: &SubscriptionRecord) -> Result<(), BackendError> {
        let url = self.table_url(SUBSCRIPTIONS_TABLE);
        let response = self
            .request(Method::POST, &url)
            .query(&[("on_conflict", TENANT_COLUMN)])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&SubscriptionRow::from(record))
            .send()
            .await?;
        ensure_success("POST", &url, response).await?;
        Ok(())
    }

    pub async fn mark_subscription_cancelled(&self, tenant_id: &str) -> Result<bool, BackendError> {
        let url = self.table_url(SUBSCRIPTIONS_TABLE);
        let tenant_filter = format!("eq.{tenant_id}");
        let response = self
            .request(Method::PATCH, &url)
            .query(&[
                (TENANT_COLUMN, tenant_filter.as_str()),
                ("status", "eq.active"),
            ])
            .header("Prefer", "return=representation")
            .json(&json!({ "status": SubscriptionStatus::Cancelled }))
            .send()
            .await?;
        let response = ensure_success("PATCH", &url, response).await?;

        let updated: Vec<Value> = response.json().await?;
        Ok(!updated.is_empty())
    }
}

async fn ensure_success(
    method: &'static str,
    url: &str,
    response: Response,
) -> Result<Response, BackendError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read error body".to_string());
    Err(BackendError::Status {
        method,
        url: url.to_string(),
        status,
        body,
    })
}

/// Parses the total from `0-0/42` or `*/0`.
fn parse_content_range(value: &str) -> Result<u64, BackendError> {
    let total = value
        .rsplit_once('/')
        .map(|(_, total)| total.trim())
        .ok_or_else(|| BackendError::InvalidResponse(format!("malformed Content-Range '{value}'")))?;

    total.parse().map_err(|_| {
        BackendError::InvalidResponse(format!("Content-Range '{value}' carries no exact count"))
    })
}

#[async_trait]
impl UsageSource for BackendClient {
    async fn count(&self, tenant_id: &str, action_type: ActionType) -> Result<u64, SourceError> {
        Ok(self.count_rows(tenant_id, action_type).await?)
    }
}

#[async_trait]
impl SubscriptionSource for BackendClient {
    async fn active_subscription(
        &self,
        tenant_id: &str,
    ) -> Result<Option<SubscriptionRecord>, SourceError> {
        Ok(self.fetch_active_subscription(tenant_id).await?)
    }
}

#[async_trait]
impl RecordStore for BackendClient {
    async fn insert_record(
        &self,
        tenant_id: &str,
        record: NewRecord,
    ) -> Result<StoredRecord, StoreError> {
        record.validate().map_err(StoreError::InvalidRecord)?;
        Ok(self.create_record(tenant_id, record).await?)
    }

    async fn delete_record(
        &self,
        tenant_id: &str,
        action_type: ActionType,
        record_id: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(self.remove_record(tenant_id, action_type, record_id).await?)
    }

    async fn save_subscription(&self, record: &SubscriptionRecord) -> Result<(), StoreError> {
        Ok(self.upsert_subscription(record).await?)
    }

    async fn cancel_subscription(&self, tenant_id: &str) -> Result<bool, StoreError> {
        Ok(self.mark_subscription_cancelled(tenant_id).await?)
    }
}
