use std::sync::Arc;

pub mod handlers;
pub mod router;
pub mod types;

pub use router::create_router;
pub use types::*;

use petsflow_entitlements::ActionGate;

use crate::backend::RecordStore;
use crate::config::LimitsServiceConfig;

pub struct ApiState {
    pub gate: ActionGate,
    pub store: Arc<dyn RecordStore>,
    pub config: Arc<LimitsServiceConfig>,
}

impl ApiState {
    /// Wires the gate and the record store to the same backend so limits are
    /// evaluated against the rows the store writes.
    pub fn new<B>(backend: Arc<B>, config: LimitsServiceConfig) -> Self
    where
        B: RecordStore + 'static,
    {
        let gate = ActionGate::from_backend(Arc::clone(&backend), config.trial_limits.clone());
        Self {
            gate,
            store: backend,
            config: Arc::new(config),
        }
    }
}
