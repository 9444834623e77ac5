use crate::types::{ActionType, LimitDecision, PackageLimits, UsageStats};

/// Percentage of the limit at which a non-blocking warning is raised.
pub const SOFT_LIMIT_THRESHOLD: u8 = 80;

/// Rounded share of `max` used by `current`, clamped to 100.
///
/// A package granting zero of a resource is always fully used.
pub fn usage_percentage(current: u64, max: u64) -> u8 {
    if max == 0 {
        return 100;
    }
    let pct = (current as f64 / max as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Decides whether `action_type` may be performed given a usage snapshot and
/// the tenant's package. Equality with the maximum blocks.
pub fn evaluate(action_type: ActionType, usage: &UsageStats, limits: &PackageLimits) -> LimitDecision {
    let current_count = usage.count_for(action_type);
    let max_allowed = limits.max_for(action_type);

    let usage_percentage = usage_percentage(current_count, max_allowed);
    let is_at_limit = max_allowed == 0 || current_count >= max_allowed;
    let is_at_soft_limit = usage_percentage >= SOFT_LIMIT_THRESHOLD && !is_at_limit;

    LimitDecision {
        action_type,
        can_perform: !is_at_limit,
        current_count,
        max_allowed,
        package_name: limits.package_name.clone(),
        usage_percentage,
        is_at_limit,
        is_at_soft_limit,
    }
}
