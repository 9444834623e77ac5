mod client;
mod error;

pub use client::BackendClient;
pub use error::BackendError;

pub const SUBSCRIPTIONS_TABLE: &str = "subscriptions";
pub const TENANT_COLUMN: &str = "user_id";
