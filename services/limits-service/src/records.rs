use chrono::{DateTime, Utc};
use petsflow_entitlements::ActionType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A gated entity a tenant asks to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource", rename_all = "snake_case")]
pub enum NewRecord {
    Client {
        name: String,
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        phone: Option<String>,
    },
    Pet {
        client_id: Uuid,
        name: String,
        #[serde(default)]
        species: Option<String>,
        #[serde(default)]
        breed: Option<String>,
    },
    Service {
        name: String,
        #[serde(default)]
        price_cents: Option<i64>,
        #[serde(default)]
        duration_minutes: Option<u32>,
    },
    Specialization {
        name: String,
    },
}

impl NewRecord {
    pub fn action_type(&self) -> ActionType {
        match self {
            NewRecord::Client { .. } => ActionType::Clients,
            NewRecord::Pet { .. } => ActionType::Pets,
            NewRecord::Service { .. } => ActionType::Services,
            NewRecord::Specialization { .. } => ActionType::Specializations,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NewRecord::Client { name, .. }
            | NewRecord::Pet { name, .. }
            | NewRecord::Service { name, .. }
            | NewRecord::Specialization { name } => name,
        }
    }

    /// Returns a human-readable reason when the record cannot be stored.
    pub fn validate(&self) -> Result<(), String> {
        if self.name().trim().is_empty() {
            return Err(format!("{} name cannot be empty", self.action_type()));
        }
        if self.name().len() > 200 {
            return Err(format!("{} name is too long", self.action_type()));
        }
        match self {
            NewRecord::Service {
                price_cents: Some(price),
                ..
            } if *price < 0 => Err("price_cents cannot be negative".to_string()),
            NewRecord::Service {
                duration_minutes: Some(0),
                ..
            } => Err("duration_minutes must be greater than zero".to_string()),
            _ => Ok(()),
        }
    }
}

/// A record as persisted for a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: Uuid,
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub record: NewRecord,
}

impl StoredRecord {
    pub fn new(tenant_id: &str, record: NewRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            created_at: Utc::now(),
            record,
        }
    }
}
