use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{CountError, SourceError};
use crate::tenant::validate_tenant_id_format;
use crate::types::{ActionType, UsageStats};

/// Tenant-scoped row counts from the persistence collaborator.
#[async_trait]
pub trait UsageSource: Send + Sync {
    async fn count(&self, tenant_id: &str, action_type: ActionType) -> Result<u64, SourceError>;
}

#[derive(Clone)]
pub struct UsageCounter {
    source: Arc<dyn UsageSource>,
}

impl UsageCounter {
    pub fn new(source: Arc<dyn UsageSource>) -> Self {
        Self { source }
    }

    /// Counts every gated resource owned by `tenant_id`. A failed query is
    /// returned as an error, never as a zero count.
    pub async fn count_usage(&self, tenant_id: &str) -> Result<UsageStats, CountError> {
        validate_tenant_id_format(tenant_id)?;

        let (clients_count, pets_count, services_count, specializations_count) = tokio::try_join!(
            self.count_one(tenant_id, ActionType::Clients),
            self.count_one(tenant_id, ActionType::Pets),
            self.count_one(tenant_id, ActionType::Services),
            self.count_one(tenant_id, ActionType::Specializations),
        )?;

        let usage = UsageStats {
            clients_count,
            pets_count,
            services_count,
            specializations_count,
        };
        debug!(tenant_id, ?usage, "counted tenant usage");
        Ok(usage)
    }

    async fn count_one(&self, tenant_id: &str, action_type: ActionType) -> Result<u64, CountError> {
        self.source
            .count(tenant_id, action_type)
            .await
            .map_err(|source| {
                warn!(tenant_id, %action_type, error = %source, "usage count failed");
                CountError::Query {
                    tenant_id: tenant_id.to_string(),
                    action_type,
                    source,
                }
            })
    }
}
