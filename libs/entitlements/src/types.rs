use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resource a limit check applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Clients,
    Pets,
    Services,
    Specializations,
}

impl ActionType {
    pub const ALL: [ActionType; 4] = [
        ActionType::Clients,
        ActionType::Pets,
        ActionType::Services,
        ActionType::Specializations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Clients => "clients",
            ActionType::Pets => "pets",
            ActionType::Services => "services",
            ActionType::Specializations => "specializations",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown action type '{0}'")]
pub struct UnknownActionType(pub String);

impl FromStr for ActionType {
    type Err = UnknownActionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clients" => Ok(ActionType::Clients),
            "pets" => Ok(ActionType::Pets),
            "services" => Ok(ActionType::Services),
            "specializations" => Ok(ActionType::Specializations),
            _ => Err(UnknownActionType(s.to_string())),
        }
    }
}

/// Per-package maximums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageLimits {
    pub package_name: String,
    pub max_clients: u64,
    pub max_pets: u64,
    pub max_services: u64,
    pub max_specializations: u64,
}

impl PackageLimits {
    pub const TRIAL_PACKAGE_NAME: &'static str = "trial";

    /// Limits granted to tenants without an active paid subscription.
    pub fn trial() -> Self {
        Self {
            package_name: Self::TRIAL_PACKAGE_NAME.to_string(),
            max_clients: 5,
            max_pets: 10,
            max_services: 3,
            max_specializations: 1,
        }
    }

    pub fn max_for(&self, action_type: ActionType) -> u64 {
        match action_type {
            ActionType::Clients => self.max_clients,
            ActionType::Pets => self.max_pets,
            ActionType::Services => self.max_services,
            ActionType::Specializations => self.max_specializations,
        }
    }
}

impl Default for PackageLimits {
    fn default() -> Self {
        Self::trial()
    }
}

/// Live per-tenant counts, valid for a single evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub clients_count: u64,
    pub pets_count: u64,
    pub services_count: u64,
    pub specializations_count: u64,
}

impl UsageStats {
    pub fn count_for(&self, action_type: ActionType) -> u64 {
        match action_type {
            ActionType::Clients => self.clients_count,
            ActionType::Pets => self.pets_count,
            ActionType::Services => self.services_count,
            ActionType::Specializations => self.specializations_count,
        }
    }

    pub fn with_count(mut self, action_type: ActionType, count: u64) -> Self {
        match action_type {
            ActionType::Clients => self.clients_count = count,
            ActionType::Pets => self.pets_count = count,
            ActionType::Services => self.services_count = count,
            ActionType::Specializations => self.specializations_count = count,
        }
        self
    }
}

/// Outcome of evaluating one action type against a usage snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitDecision {
    pub action_type: ActionType,
    pub can_perform: bool,
    pub current_count: u64,
    pub max_allowed: u64,
    pub package_name: String,
    pub usage_percentage: u8,
    pub is_at_limit: bool,
    pub is_at_soft_limit: bool,
}
