use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{ResolutionError, SourceError};
use crate::tenant::validate_tenant_id_format;
use crate::types::PackageLimits;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown subscription status '{0}'")]
pub struct UnknownSubscriptionStatus(pub String);

impl FromStr for SubscriptionStatus {
    type Err = UnknownSubscriptionStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            "expired" => Ok(SubscriptionStatus::Expired),
            _ => Err(UnknownSubscriptionStatus(s.to_string())),
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tenant's paid subscription as stored by the billing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub tenant_id: String,
    pub package_name: String,
    pub max_clients: u64,
    pub max_pets: u64,
    pub max_services: u64,
    pub max_specializations: u64,
    pub status: SubscriptionStatus,
    pub starts_at: DateTime<Utc>,
    /// `None` for open-ended subscriptions.
    pub ends_at: Option<DateTime<Utc>>,
}

impl SubscriptionRecord {
    pub fn is_current_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active
            && self.starts_at <= now
            && self.ends_at.map_or(true, |ends_at| ends_at > now)
    }

    pub fn limits(&self) -> PackageLimits {
        PackageLimits {
            package_name: self.package_name.clone(),
            max_clients: self.max_clients,
            max_pets: self.max_pets,
            max_services: self.max_services,
            max_specializations: self.max_specializations,
        }
    }
}

/// Tenant-scoped active subscription lookup.
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    async fn active_subscription(
        &self,
        tenant_id: &str,
    ) -> Result<Option<SubscriptionRecord>, SourceError>;
}

#[derive(Clone)]
pub struct PackageResolver {
    source: Arc<dyn SubscriptionSource>,
    trial: PackageLimits,
}

impl PackageResolver {
    pub fn new(source: Arc<dyn SubscriptionSource>, trial: PackageLimits) -> Self {
        Self { source, trial }
    }

    pub fn trial_limits(&self) -> &PackageLimits {
        &self.trial
    }

    pub async fn resolve(&self, tenant_id: &str) -> PackageLimits {
        self.resolve_at(tenant_id, Utc::now()).await
    }

    /// Resolves the package in force at `now`. Expired subscriptions and
    /// failed lookups both fall back to the trial package.
    pub async fn resolve_at(&self, tenant_id: &str, now: DateTime<Utc>) -> PackageLimits {
        match self.lookup(tenant_id).await {
            Ok(Some(record)) if record.is_current_at(now) => {
                debug!(
                    tenant_id,
                    package = %record.package_name,
                    "resolved active subscription"
                );
                record.limits()
            }
            Ok(Some(record)) => {
                info!(
                    tenant_id,
                    package = %record.package_name,
                    status = %record.status,
                    ends_at = ?record.ends_at,
                    "subscription no longer current, using trial package"
                );
                self.trial.clone()
            }
            Ok(None) => self.trial.clone(),
            Err(err) => {
                warn!(tenant_id, error = %err, "package resolution failed, using trial package");
                self.trial.clone()
            }
        }
    }

    async fn lookup(&self, tenant_id: &str) -> Result<Option<SubscriptionRecord>, ResolutionError> {
        validate_tenant_id_format(tenant_id)?;
        self.source
            .active_subscription(tenant_id)
            .await
            .map_err(|source| ResolutionError::Lookup {
                tenant_id: tenant_id.to_string(),
                source,
            })
    }
}
