use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use petsflow_entitlements::{
    ActionType, SourceError, SubscriptionRecord, SubscriptionSource, SubscriptionStatus,
    UsageSource,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::{RecordStore, StoreError};
use crate::records::{NewRecord, StoredRecord};

use super::error::StorageError;
use super::schema::init_database;
use super::LIMITS_DB_FILENAME;

const SUBSCRIPTION_COLUMNS: &str = "tenant_id, package_name, max_clients, max_pets, max_services, \
     max_specializations, status, starts_at, ends_at";

pub struct LimitsDatabase {
    conn: Mutex<Connection>,
}

impl LimitsDatabase {
    pub fn new(data_dir: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(data_dir)?;
        let conn = Connection::open(data_dir.join(LIMITS_DB_FILENAME))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        init_database(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    pub fn count_records(&self, tenant_id: &str, action_type: ActionType) -> Result<u64, StorageError> {
        let conn = self.conn()?;
        // Table names come from the closed ActionType set.
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE tenant_id = ?1",
            action_type.as_str()
        );
        let count: i64 = conn.query_row(&sql, params![tenant_id], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn insert_record(
        &self,
        tenant_id: &str,
        record: NewRecord,
    ) -> Result<StoredRecord, StorageError> {
        record.validate().map_err(StorageError::InvalidRecord)?;

        let stored = StoredRecord::new(tenant_id, record);
        let id = stored.id.to_string();
        let conn = self.conn()?;

        match &stored.record {
            NewRecord::Client { name, email, phone } => {
                conn.execute(
                    r#"
                    INSERT INTO clients (id, tenant_id, name, email, phone, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                    params![id, tenant_id, name.trim(), email, phone, stored.created_at],
                )?;
            }
            NewRecord::Pet {
                client_id,
                name,
                species,
                breed,
            } => {
                let owner_exists = conn
                    .query_row(
                        "SELECT 1 FROM clients WHERE id = ?1 AND tenant_id = ?2",
                        params![client_id.to_string(), tenant_id],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();
                if !owner_exists {
                    return Err(StorageError::NotFound(format!("client {client_id}")));
                }

                conn.execute(
                    r#"
                    INSERT INTO pets (id, tenant_id, client_id, name, species, breed, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    "#,
                    params![
                        id,
                        tenant_id,
                        client_id.to_string(),
                        name.trim(),
                        species,
                        breed,
                        stored.created_at
                    ],
                )?;
            }
            NewRecord::Service {
                name,
                price_cents,
                duration_minutes,
            } => {
                conn.execute(
                    r#"
                    INSERT INTO services (id, tenant_id, name, price_cents, duration_minutes, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                    params![
                        id,
                        tenant_id,
                        name.trim(),
                        price_cents,
                        duration_minutes,
                        stored.created_at
                    ],
                )?;
            }
            NewRecord::Specialization { name } => {
                conn.execute(
                    r#"
                    INSERT INTO specializations (id, tenant_id, name, created_at)
                    VALUES (?1, ?2, ?3, ?4)
                    "#,
                    params![id, tenant_id, name.trim(), stored.created_at],
                )?;
            }
        }

        debug!(
            tenant_id,
            record_id = %stored.id,
            resource = %stored.record.action_type(),
            "stored record"
        );
        Ok(stored)
    }

    /// Deleting a client also removes its pets.
    pub fn delete_record(
        &self,
        tenant_id: &str,
        action_type: ActionType,
        record_id: Uuid,
    ) -> Result<bool, StorageError> {
        let conn = self.conn()?;
        let sql = format!(
            "DELETE FROM {} WHERE id = ?1 AND tenant_id = ?2",
            action_type.as_str()
        );
        let deleted = conn.execute(&sql, params![record_id.to_string(), tenant_id])?;
        Ok(deleted > 0)
    }

    pub fn upsert_subscription(&self, record: &SubscriptionRecord) -> Result<(), StorageError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO subscriptions (tenant_id, package_name, max_clients, max_pets, max_services,
                                       max_specializations, status, starts_at, ends_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(tenant_id) DO UPDATE SET
                package_name = excluded.package_name,
                max_clients = excluded.max_clients,
                max_pets = excluded.max_pets,
                max_services = excluded.max_services,
                max_specializations = excluded.max_specializations,
                status = excluded.status,
                starts_at = excluded.starts_at,
                ends_at = excluded.ends_at,
                updated_at = excluded.updated_at
            "#,
            params![
                record.tenant_id,
                record.package_name,
                record.max_clients as i64,
                record.max_pets as i64,
                record.max_services as i64,
                record.max_specializations as i64,
                record.status.as_str(),
                record.starts_at,
                record.ends_at,
                Utc::now()
            ],
        )?;

        info!(
            tenant_id = %record.tenant_id,
            package = %record.package_name,
            status = %record.status,
            "saved subscription"
        );
        Ok(())
    }

    pub fn get_subscription(&self, tenant_id: &str) -> Result<Option<SubscriptionRecord>, StorageError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE tenant_id = ?1");
        let record = conn
            .query_row(&sql, params![tenant_id], subscription_from_row)
            .optional()?;
        Ok(record)
    }

    /// Only rows marked active; end dates are judged by the resolver.
    pub fn get_active_subscription(
        &self,
        tenant_id: &str,
    ) -> Result<Option<SubscriptionRecord>, StorageError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE tenant_id = ?1 AND status = 'active'"
        );
        let record = conn
            .query_row(&sql, params![tenant_id], subscription_from_row)
            .optional()?;
        Ok(record)
    }

    pub fn cancel_subscription(&self, tenant_id: &str) -> Result<bool, StorageError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE subscriptions
            SET status = 'cancelled', updated_at = ?2
            WHERE tenant_id = ?1 AND status = 'active'
            "#,
            params![tenant_id, Utc::now()],
        )?;
        Ok(updated > 0)
    }
}

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<SubscriptionRecord> {
    let status: String = row.get(6)?;
    let status: SubscriptionStatus = status
        .parse()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(err)))?;

    Ok(SubscriptionRecord {
        tenant_id: row.get(0)?,
        package_name: row.get(1)?,
        max_clients: row.get::<_, i64>(2)? as u64,
        max_pets: row.get::<_, i64>(3)? as u64,
        max_services: row.get::<_, i64>(4)? as u64,
        max_specializations: row.get::<_, i64>(5)? as u64,
        status,
        starts_at: row.get::<_, DateTime<Utc>>(7)?,
        ends_at: row.get::<_, Option<DateTime<Utc>>>(8)?,
    })
}

#[async_trait]
impl UsageSource for LimitsDatabase {
    async fn count(&self, tenant_id: &str, action_type: ActionType) -> Result<u64, SourceError> {
        Ok(self.count_records(tenant_id, action_type)?)
    }
}

#[async_trait]
impl SubscriptionSource for LimitsDatabase {
    async fn active_subscription(
        &self,
        tenant_id: &str,
    ) -> Result<Option<SubscriptionRecord>, SourceError> {
        Ok(self.get_active_subscription(tenant_id)?)
    }
}

#[async_trait]
impl RecordStore for LimitsDatabase {
    async fn insert_record(
        &self,
        tenant_id: &str,
        record: NewRecord,
    ) -> Result<StoredRecord, StoreError> {
        Ok(LimitsDatabase::insert_record(self, tenant_id, record)?)
    }

    async fn delete_record(
        &self,
        tenant_id: &str,
        action_type: ActionType,
        record_id: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(LimitsDatabase::delete_record(self, tenant_id, action_type, record_id)?)
    }

    async fn save_subscription(&self, record: &SubscriptionRecord) -> Result<(), StoreError> {
        Ok(self.upsert_subscription(record)?)
    }

    async fn cancel_subscription(&self, tenant_id: &str) -> Result<bool, StoreError> {
        Ok(LimitsDatabase::cancel_subscription(self, tenant_id)?)
    }
}
