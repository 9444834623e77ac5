pub mod database;
pub mod error;
pub mod schema;

pub use database::LimitsDatabase;
pub use error::StorageError;

pub const LIMITS_DB_FILENAME: &str = "limits.db";
