use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use petsflow_entitlements::{
    evaluate, ActionGate, ActionType, AttemptState, BlockReason, GateError, PackageLimits,
    SourceError, SubscriptionRecord, SubscriptionSource, SubscriptionStatus, UsageSource,
    UsageStats,
};

#[derive(Default)]
struct InMemoryBackend {
    counts: Mutex<HashMap<(String, ActionType), u64>>,
    subscriptions: Mutex<HashMap<String, SubscriptionRecord>>,
    counts_unavailable: AtomicBool,
}

impl InMemoryBackend {
    fn set_count(&self, tenant_id: &str, action_type: ActionType, count: u64) {
        self.counts
            .lock()
            .unwrap()
            .insert((tenant_id.to_string(), action_type), count);
    }

    fn increment(&self, tenant_id: &str, action_type: ActionType) {
        *self
            .counts
            .lock()
            .unwrap()
            .entry((tenant_id.to_string(), action_type))
            .or_insert(0) += 1;
    }

    fn subscribe(&self, record: SubscriptionRecord) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(record.tenant_id.clone(), record);
    }
}

#[async_trait]
impl UsageSource for InMemoryBackend {
    async fn count(&self, tenant_id: &str, action_type: ActionType) -> Result<u64, SourceError> {
        if self.counts_unavailable.load(Ordering::SeqCst) {
            return Err("count query timed out".into());
        }
        Ok(self
            .counts
            .lock()
            .unwrap()
            .get(&(tenant_id.to_string(), action_type))
            .copied()
            .unwrap_or(0))
    }
}

#[async_trait]
impl SubscriptionSource for InMemoryBackend {
    async fn active_subscription(
        &self,
        tenant_id: &str,
    ) -> Result<Option<SubscriptionRecord>, SourceError> {
        Ok(self.subscriptions.lock().unwrap().get(tenant_id).cloned())
    }
}

fn gate(backend: &Arc<InMemoryBackend>) -> ActionGate {
    ActionGate::from_backend(Arc::clone(backend), PackageLimits::trial())
}

fn subscription(tenant_id: &str, ends_in: Duration) -> SubscriptionRecord {
    SubscriptionRecord {
        tenant_id: tenant_id.to_string(),
        package_name: "professional".to_string(),
        max_clients: 100,
        max_pets: 40,
        max_services: 20,
        max_specializations: 5,
        status: SubscriptionStatus::Active,
        starts_at: Utc::now() - Duration::days(30),
        ends_at: Some(Utc::now() + ends_in),
    }
}

#[tokio::test]
async fn guard_runs_action_under_limit() {
    let backend = Arc::new(InMemoryBackend::default());
    backend.set_count("tenant-a", ActionType::Clients, 2);

    let ran = gate(&backend)
        .guard("tenant-a", ActionType::Clients, || async {
            Ok::<_, Infallible>("client-created")
        })
        .await
        .expect("action should be allowed");
    assert_eq!(ran, "client-created");
}

#[tokio::test]
async fn guard_blocks_at_limit_with_full_decision() {
    let backend = Arc::new(InMemoryBackend::default());
    backend.set_count("tenant-a", ActionType::Clients, 5);
    let executed = AtomicBool::new(false);
    let executed_flag = &executed;

    let result = gate(&backend)
        .guard("tenant-a", ActionType::Clients, || async move {
            executed_flag.store(true, Ordering::SeqCst);
            Ok::<_, Infallible>(())
        })
        .await;

    let err = result.expect_err("action should be blocked");
    assert_eq!(err.terminal_state(), AttemptState::Blocked);
    let decision = err.decision().expect("decision payload");
    assert_eq!(decision.action_type, ActionType::Clients);
    assert_eq!(decision.current_count, 5);
    assert_eq!(decision.max_allowed, 5);
    assert_eq!(decision.package_name, "trial");
    assert_eq!(decision.usage_percentage, 100);
    assert!(!executed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn guard_with_decision_reports_soft_limit_on_success() {
    let backend = Arc::new(InMemoryBackend::default());
    backend.set_count("tenant-a", ActionType::Pets, 8);

    let (value, decision) = gate(&backend)
        .guard_with_decision("tenant-a", ActionType::Pets, || async {
            Ok::<_, Infallible>("pet-created")
        })
        .await
        .expect("action should be allowed");
    assert_eq!(value, "pet-created");
    assert!(decision.can_perform);
    assert!(decision.is_at_soft_limit);
    assert_eq!(decision.current_count, 8);
    assert_eq!(decision.usage_percentage, 80);
}

#[tokio::test]
async fn guard_blocks_when_usage_cannot_be_counted() {
    let backend = Arc::new(InMemoryBackend::default());
    backend.counts_unavailable.store(true, Ordering::SeqCst);

    let result = gate(&backend)
        .guard("tenant-a", ActionType::Pets, || async { Ok::<_, Infallible>(()) })
        .await;

    assert!(matches!(result, Err(GateError::UsageUnavailable(_))));
}

#[tokio::test]
async fn guard_propagates_execution_errors_unchanged() {
    let backend = Arc::new(InMemoryBackend::default());

    let result = gate(&backend)
        .guard("tenant-a", ActionType::Services, || async {
            Err::<(), _>("duplicate service name")
        })
        .await;

    match result {
        Err(GateError::Execution(message)) => assert_eq!(message, "duplicate service name"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn guard_reevaluates_on_every_attempt() {
    let backend = Arc::new(InMemoryBackend::default());
    backend.set_count("tenant-a", ActionType::Specializations, 0);
    let gate = gate(&backend);

    let early = gate
        .can_perform_action("tenant-a", ActionType::Specializations)
        .await
        .unwrap();
    assert!(early.can_perform);

    backend.increment("tenant-a", ActionType::Specializations);

    let result = gate
        .guard("tenant-a", ActionType::Specializations, || async {
            Ok::<_, Infallible>(())
        })
        .await;
    assert!(matches!(result, Err(GateError::LimitExceeded(_))));
}

#[tokio::test]
async fn validate_action_reports_reason_codes() {
    let backend = Arc::new(InMemoryBackend::default());
    backend.set_count("tenant-a", ActionType::Services, 3);
    let gate = gate(&backend);

    let blocked = gate.validate_action("tenant-a", ActionType::Services).await;
    assert!(!blocked.can_proceed);
    assert_eq!(blocked.reason, Some(BlockReason::LimitExceeded));

    let allowed = gate.validate_action("tenant-a", ActionType::Pets).await;
    assert!(allowed.can_proceed);
    assert_eq!(allowed.reason, None);

    backend.counts_unavailable.store(true, Ordering::SeqCst);
    let unverified = gate.validate_action("tenant-a", ActionType::Pets).await;
    assert!(!unverified.can_proceed);
    assert_eq!(unverified.reason, Some(BlockReason::UsageUnavailable));
}

#[tokio::test]
async fn paid_subscription_raises_limits() {
    let backend = Arc::new(InMemoryBackend::default());
    backend.subscribe(subscription("tenant-a", Duration::days(30)));
    backend.set_count("tenant-a", ActionType::Pets, 10);

    let decision = gate(&backend)
        .can_perform_action("tenant-a", ActionType::Pets)
        .await
        .unwrap();
    assert!(decision.can_perform);
    assert_eq!(decision.max_allowed, 40);
    assert_eq!(decision.usage_percentage, 25);
    assert!(!decision.is_at_soft_limit);
    assert_eq!(decision.package_name, "professional");
}

#[tokio::test]
async fn expired_subscription_falls_back_to_trial() {
    let backend = Arc::new(InMemoryBackend::default());
    backend.subscribe(subscription("tenant-a", -Duration::days(1)));
    backend.set_count("tenant-a", ActionType::Pets, 10);

    let decision = gate(&backend)
        .can_perform_action("tenant-a", ActionType::Pets)
        .await
        .unwrap();
    assert_eq!(decision.package_name, "trial");
    assert_eq!(decision.max_allowed, 10);
    assert!(!decision.can_perform);
}

#[tokio::test]
async fn usage_overview_covers_every_resource() {
    let backend = Arc::new(InMemoryBackend::default());
    backend.set_count("tenant-a", ActionType::Clients, 4);
    backend.set_count("tenant-a", ActionType::Specializations, 1);

    let overview = gate(&backend).usage_overview("tenant-a").await.unwrap();
    assert_eq!(overview.package_name, "trial");
    assert_eq!(overview.decisions.len(), 4);

    let clients = &overview.decisions[0];
    assert_eq!(clients.action_type, ActionType::Clients);
    assert!(clients.is_at_soft_limit);

    let specializations = &overview.decisions[3];
    assert!(specializations.is_at_limit);
}

#[tokio::test]
async fn tenants_are_evaluated_independently() {
    let backend = Arc::new(InMemoryBackend::default());
    backend.set_count("tenant-a", ActionType::Clients, 5);
    backend.set_count("tenant-b", ActionType::Clients, 1);
    let gate = gate(&backend);

    let a = gate.validate_action("tenant-a", ActionType::Clients).await;
    let b = gate.validate_action("tenant-b", ActionType::Clients).await;
    assert!(!a.can_proceed);
    assert!(b.can_proceed);
}

#[tokio::test]
async fn concurrent_attempts_are_each_evaluated_on_their_snapshot() {
    let backend = Arc::new(InMemoryBackend::default());
    backend.set_count("tenant-a", ActionType::Clients, 4);
    let gate = gate(&backend);

    let attempt = |gate: ActionGate, backend: Arc<InMemoryBackend>| async move {
        gate.guard("tenant-a", ActionType::Clients, || async move {
            backend.increment("tenant-a", ActionType::Clients);
            Ok::<_, Infallible>(())
        })
        .await
    };

    let (first, second) = tokio::join!(
        attempt(gate.clone(), Arc::clone(&backend)),
        attempt(gate.clone(), Arc::clone(&backend))
    );

    // Each outcome must match the snapshot its own evaluation saw; the race
    // itself is allowed to let both through.
    for outcome in [first, second] {
        match outcome {
            Ok(()) => {}
            Err(GateError::LimitExceeded(decision)) => {
                let snapshot = UsageStats::default()
                    .with_count(ActionType::Clients, decision.current_count);
                assert_eq!(
                    *decision,
                    evaluate(ActionType::Clients, &snapshot, &PackageLimits::trial())
                );
                assert!(decision.current_count >= 5);
            }
            Err(other) => panic!("unexpected gate error: {other}"),
        }
    }

    let total = backend
        .count("tenant-a", ActionType::Clients)
        .await
        .unwrap();
    assert!((5..=6).contains(&total));
}

#[test]
fn attempt_states_start_idle_and_end_terminal() {
    assert!(!AttemptState::Idle.is_terminal());
    assert!(!AttemptState::Evaluating.is_terminal());
    assert!(!AttemptState::Executing.is_terminal());
    for state in [AttemptState::Succeeded, AttemptState::Failed, AttemptState::Blocked] {
        assert!(state.is_terminal(), "{state} should be terminal");
    }
    assert_eq!(AttemptState::Idle.to_string(), "idle");
}
