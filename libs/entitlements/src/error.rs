use thiserror::Error;

use crate::tenant::TenantValidationError;
use crate::types::{ActionType, LimitDecision};

/// Error type returned by persistence collaborators.
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Usage could not be counted; the gate treats this as "cannot verify".
#[derive(Debug, Error)]
pub enum CountError {
    #[error(transparent)]
    InvalidTenant(#[from] TenantValidationError),
    #[error("failed to count {action_type} for tenant {tenant_id}: {source}")]
    Query {
        tenant_id: String,
        action_type: ActionType,
        #[source]
        source: SourceError,
    },
}

/// Subscription lookup failed. Never surfaced to callers of the resolver,
/// which fall back to trial limits instead.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error(transparent)]
    InvalidTenant(#[from] TenantValidationError),
    #[error("failed to look up subscription for tenant {tenant_id}: {source}")]
    Lookup {
        tenant_id: String,
        #[source]
        source: SourceError,
    },
}

/// Why a guarded action did not complete.
#[derive(Debug, Error)]
pub enum GateError<E> {
    #[error(
        "{} limit reached for package {}: {}/{}",
        .0.action_type,
        .0.package_name,
        .0.current_count,
        .0.max_allowed
    )]
    LimitExceeded(Box<LimitDecision>),
    #[error("usage could not be verified: {0}")]
    UsageUnavailable(CountError),
    #[error("action failed: {0}")]
    Execution(E),
}

impl<E> GateError<E> {
    pub fn decision(&self) -> Option<&LimitDecision> {
        match self {
            GateError::LimitExceeded(decision) => Some(decision),
            _ => None,
        }
    }
}
