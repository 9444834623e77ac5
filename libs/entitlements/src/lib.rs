//! PetsFlow package-limit enforcement.
//!
//! Every create-type action a tenant performs on a gated resource (clients,
//! pets, services, specializations) passes through an [`ActionGate`]. The gate
//! counts the tenant's current usage, resolves the tenant's active package and
//! asks the pure [`evaluate`] function for a [`LimitDecision`] before running
//! the action.
//!
//! Persistence is an external collaborator reached through the
//! [`UsageSource`] and [`SubscriptionSource`] traits. The tenant identifier is
//! always passed explicitly.
//!
//! The count-then-create sequence is not atomic: two concurrent attempts from
//! the same tenant may both pass the gate when the tenant sits one below its
//! limit. Strict enforcement needs a constraint in the backing store.

pub mod error;
pub mod evaluator;
pub mod gate;
pub mod package;
pub mod tenant;
pub mod types;
pub mod usage;

pub use error::{CountError, GateError, ResolutionError, SourceError};
pub use evaluator::{evaluate, usage_percentage, SOFT_LIMIT_THRESHOLD};
pub use gate::{ActionGate, ActionValidation, AttemptState, BlockReason, UsageOverview};
pub use package::{
    PackageResolver, SubscriptionRecord, SubscriptionSource, SubscriptionStatus,
    UnknownSubscriptionStatus,
};
pub use tenant::{validate_tenant_id_format, TenantValidationError};
pub use types::{ActionType, LimitDecision, PackageLimits, UnknownActionType, UsageStats};
pub use usage::{UsageCounter, UsageSource};
