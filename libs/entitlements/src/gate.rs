use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CountError, GateError};
use crate::evaluator::evaluate;
use crate::package::{PackageResolver, SubscriptionSource};
use crate::types::{ActionType, LimitDecision, PackageLimits, UsageStats};
use crate::usage::{UsageCounter, UsageSource};

/// Progress of a single gated action attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    Evaluating,
    Allowed,
    Executing,
    Succeeded,
    Failed,
    Blocked,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptState::Succeeded | AttemptState::Failed | AttemptState::Blocked
        )
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AttemptState::Idle => "idle",
            AttemptState::Evaluating => "evaluating",
            AttemptState::Allowed => "allowed",
            AttemptState::Executing => "executing",
            AttemptState::Succeeded => "succeeded",
            AttemptState::Failed => "failed",
            AttemptState::Blocked => "blocked",
        };
        f.write_str(label)
    }
}

impl<E> GateError<E> {
    pub fn terminal_state(&self) -> AttemptState {
        match self {
            GateError::LimitExceeded(_) | GateError::UsageUnavailable(_) => AttemptState::Blocked,
            GateError::Execution(_) => AttemptState::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    LimitExceeded,
    UsageUnavailable,
}

/// Pre-flight answer for a create action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionValidation {
    pub can_proceed: bool,
    pub reason: Option<BlockReason>,
}

/// One decision per gated resource, sharing a single usage snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageOverview {
    pub tenant_id: String,
    pub package_name: String,
    pub usage: UsageStats,
    pub decisions: Vec<LimitDecision>,
}

#[derive(Clone)]
pub struct ActionGate {
    counter: UsageCounter,
    resolver: PackageResolver,
}

impl ActionGate {
    pub fn new(counter: UsageCounter, resolver: PackageResolver) -> Self {
        Self { counter, resolver }
    }

    /// Builds a gate over a backend that answers both collaborator queries.
    pub fn from_backend<B>(backend: Arc<B>, trial: PackageLimits) -> Self
    where
        B: UsageSource + SubscriptionSource + 'static,
    {
        let usage: Arc<dyn UsageSource> = backend.clone();
        let subscriptions: Arc<dyn SubscriptionSource> = backend;
        Self::new(
            UsageCounter::new(usage),
            PackageResolver::new(subscriptions, trial),
        )
    }

    pub fn resolver(&self) -> &PackageResolver {
        &self.resolver
    }

    /// Current decision for `action_type`, computed from fresh counts.
    pub async fn can_perform_action(
        &self,
        tenant_id: &str,
        action_type: ActionType,
    ) -> Result<LimitDecision, CountError> {
        let (limits, usage) = tokio::join!(
            self.resolver.resolve(tenant_id),
            self.counter.count_usage(tenant_id)
        );
        let decision = evaluate(action_type, &usage?, &limits);
        debug!(
            tenant_id,
            %action_type,
            current = decision.current_count,
            max = decision.max_allowed,
            package = %decision.package_name,
            "evaluated limit"
        );
        Ok(decision)
    }

    /// Fails closed: a usage count that cannot be obtained blocks the action.
    pub async fn validate_action(&self, tenant_id: &str, action_type: ActionType) -> ActionValidation {
        match self.can_perform_action(tenant_id, action_type).await {
            Ok(decision) if decision.can_perform => ActionValidation {
                can_proceed: true,
                reason: None,
            },
            Ok(_) => ActionValidation {
                can_proceed: false,
                reason: Some(BlockReason::LimitExceeded),
            },
            Err(err) => {
                warn!(tenant_id, %action_type, error = %err, "cannot verify usage");
                ActionValidation {
                    can_proceed: false,
                    reason: Some(BlockReason::UsageUnavailable),
                }
            }
        }
    }

    pub async fn usage_overview(&self, tenant_id: &str) -> Result<UsageOverview, CountError> {
        let (limits, usage) = tokio::join!(
            self.resolver.resolve(tenant_id),
            self.counter.count_usage(tenant_id)
        );
        let usage = usage?;
        let decisions = ActionType::ALL
            .iter()
            .map(|action_type| evaluate(*action_type, &usage, &limits))
            .collect();

        Ok(UsageOverview {
            tenant_id: tenant_id.to_string(),
            package_name: limits.package_name,
            usage,
            decisions,
        })
    }

    /// Runs `action` only if the tenant is under its limit for `action_type`
    /// at the moment of the call.
    ///
    /// The check and the action are separate round trips, so concurrent
    /// attempts may overshoot the limit.
    pub async fn guard<F, Fut, T, E>(
        &self,
        tenant_id: &str,
        action_type: ActionType,
        action: F,
    ) -> Result<T, GateError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.guard_with_decision(tenant_id, action_type, action)
            .await
            .map(|(value, _)| value)
    }

    /// Like [`ActionGate::guard`], but also returns the decision the action
    /// was admitted on so callers can surface soft-limit warnings.
    pub async fn guard_with_decision<F, Fut, T, E>(
        &self,
        tenant_id: &str,
        action_type: ActionType,
        action: F,
    ) -> Result<(T, LimitDecision), GateError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        trace_state(tenant_id, action_type, AttemptState::Idle);
        trace_state(tenant_id, action_type, AttemptState::Evaluating);

        let decision = match self.can_perform_action(tenant_id, action_type).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!(tenant_id, %action_type, error = %err, "blocking action, usage unavailable");
                trace_state(tenant_id, action_type, AttemptState::Blocked);
                return Err(GateError::UsageUnavailable(err));
            }
        };

        if !decision.can_perform {
            info!(
                tenant_id,
                %action_type,
                current = decision.current_count,
                max = decision.max_allowed,
                package = %decision.package_name,
                "limit reached, action blocked"
            );
            trace_state(tenant_id, action_type, AttemptState::Blocked);
            return Err(GateError::LimitExceeded(Box::new(decision)));
        }

        if decision.is_at_soft_limit {
            info!(
                tenant_id,
                %action_type,
                usage_percentage = decision.usage_percentage,
                "approaching package limit"
            );
        }

        trace_state(tenant_id, action_type, AttemptState::Allowed);
        trace_state(tenant_id, action_type, AttemptState::Executing);

        match action().await {
            Ok(value) => {
                trace_state(tenant_id, action_type, AttemptState::Succeeded);
                Ok((value, decision))
            }
            Err(err) => {
                warn!(tenant_id, %action_type, error = %err, "gated action failed");
                trace_state(tenant_id, action_type, AttemptState::Failed);
                Err(GateError::Execution(err))
            }
        }
    }
}

fn trace_state(tenant_id: &str, action_type: ActionType, state: AttemptState) {
    debug!(tenant_id, %action_type, %state, terminal = state.is_terminal(), "gate attempt");
}
