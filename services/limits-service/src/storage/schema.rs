use rusqlite::Connection;

pub const SUBSCRIPTIONS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS subscriptions (
    tenant_id TEXT PRIMARY KEY,
    package_name TEXT NOT NULL,
    max_clients INTEGER NOT NULL,
    max_pets INTEGER NOT NULL,
    max_services INTEGER NOT NULL,
    max_specializations INTEGER NOT NULL,
    status TEXT NOT NULL,
    starts_at TEXT NOT NULL,
    ends_at TEXT,
    updated_at TEXT NOT NULL
);
"#;

pub const RECORD_TABLES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS clients (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    email TEXT,
    phone TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pets (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    client_id TEXT NOT NULL REFERENCES clients(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    species TEXT,
    breed TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS services (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    price_cents INTEGER,
    duration_minutes INTEGER,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS specializations (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

pub const RECORD_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_clients_tenant ON clients(tenant_id);
CREATE INDEX IF NOT EXISTS idx_pets_tenant ON pets(tenant_id);
CREATE INDEX IF NOT EXISTS idx_pets_client ON pets(client_id);
CREATE INDEX IF NOT EXISTS idx_services_tenant ON services(tenant_id);
CREATE INDEX IF NOT EXISTS idx_specializations_tenant ON specializations(tenant_id);
"#;

pub fn init_database(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SUBSCRIPTIONS_TABLE_SCHEMA)?;
    conn.execute_batch(RECORD_TABLES_SCHEMA)?;
    conn.execute_batch(RECORD_INDEXES)?;
    Ok(())
}
