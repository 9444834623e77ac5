use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use petsflow_entitlements::{
    ActionGate, ActionType, PackageLimits, SourceError, SubscriptionRecord, SubscriptionSource,
    UsageSource, UsageStats,
};
use rand::Rng;

/// Backend holding counts and subscriptions in memory.
#[derive(Default)]
pub struct InMemoryBackend {
    counts: DashMap<(String, ActionType), u64>,
    subscriptions: DashMap<String, SubscriptionRecord>,
}

impl InMemoryBackend {
    pub fn set_usage(&self, tenant_id: &str, usage: UsageStats) {
        for action_type in ActionType::ALL {
            self.counts.insert(
                (tenant_id.to_string(), action_type),
                usage.count_for(action_type),
            );
        }
    }

    pub fn subscribe(&self, record: SubscriptionRecord) {
        self.subscriptions.insert(record.tenant_id.clone(), record);
    }
}

#[async_trait]
impl UsageSource for InMemoryBackend {
    async fn count(&self, tenant_id: &str, action_type: ActionType) -> Result<u64, SourceError> {
        Ok(self
            .counts
            .get(&(tenant_id.to_string(), action_type))
            .map(|count| *count)
            .unwrap_or(0))
    }
}

#[async_trait]
impl SubscriptionSource for InMemoryBackend {
    async fn active_subscription(
        &self,
        tenant_id: &str,
    ) -> Result<Option<SubscriptionRecord>, SourceError> {
        Ok(self
            .subscriptions
            .get(tenant_id)
            .map(|record| record.clone()))
    }
}

pub struct GateBenchFixture {
    pub gate: ActionGate,
    pub backend: Arc<InMemoryBackend>,
    pub tenant_ids: Vec<String>,
}

impl GateBenchFixture {
    /// Seeds `tenants` tenants with random usage under the trial package.
    pub fn new(tenants: usize) -> Self {
        let backend = Arc::new(InMemoryBackend::default());
        let mut rng = rand::thread_rng();
        let tenant_ids: Vec<String> = (0..tenants).map(|_| random_tenant_id()).collect();

        for tenant_id in &tenant_ids {
            backend.set_usage(tenant_id, random_usage(&mut rng, &PackageLimits::trial()));
        }

        let gate = ActionGate::from_backend(Arc::clone(&backend), PackageLimits::trial());
        Self {
            gate,
            backend,
            tenant_ids,
        }
    }
}

pub fn random_tenant_id() -> String {
    let suffix: u64 = rand::thread_rng().gen();
    format!("tenant-{suffix:016x}")
}

/// Usage spread from empty to slightly over each limit.
pub fn random_usage<R: Rng>(rng: &mut R, limits: &PackageLimits) -> UsageStats {
    ActionType::ALL
        .iter()
        .fold(UsageStats::default(), |usage, action_type| {
            let max = limits.max_for(*action_type);
            usage.with_count(*action_type, rng.gen_range(0..=max + 1))
        })
}
