// svckit/src/migration/history.rs
//
// Migration history - the record of applied migrations kept inside the
// target keyspace, plus the advisory lock row that keeps two runs from
// migrating the same keyspace at once.
//

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::query_builder::quote_literal;
use crate::database::{CqlConnection, QueryOutcome};
use crate::errors::MigratorError;
use crate::types::MigrationId;

pub const HISTORY_TABLE: &str = "schema_migrations";
pub const LOCK_TABLE: &str = "schema_migrations_lock";
const LOCK_NAME: &str = "migrate";
const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(600);

/// One row of the history table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub id: MigrationId,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

impl AppliedMigration {
    pub fn new(id: MigrationId, name: impl Into<String>, applied_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            applied_at,
        }
    }
}

/// Storage for the applied set. Writes are conditional so an identifier
/// can only ever be recorded once.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Create the backing tables if they are missing
    async fn ensure_schema(&self) -> Result<(), MigratorError>;
    /// Whether the history table has been created yet
    async fn schema_exists(&self) -> Result<bool, MigratorError>;
    async fn applied(&self) -> Result<Vec<AppliedMigration>, MigratorError>;
    async fn record(&self, entry: &AppliedMigration) -> Result<(), MigratorError>;
    async fn remove(&self, id: MigrationId) -> Result<(), MigratorError>;
    /// `false` when another owner holds the lock
    async fn acquire_lock(&self, owner: Uuid) -> Result<bool, MigratorError>;
    async fn release_lock(&self, owner: Uuid) -> Result<(), MigratorError>;
}

/// History kept in CQL tables inside the migrated keyspace
pub struct CqlHistoryStore {
    connection: Arc<dyn CqlConnection>,
    keyspace: String,
    table: String,
    lock_table: String,
    lock_ttl: Duration,
}

impl CqlHistoryStore {
    pub fn new(connection: Arc<dyn CqlConnection>, keyspace: impl Into<String>) -> Self {
        Self {
            connection,
            keyspace: keyspace.into(),
            table: HISTORY_TABLE.to_string(),
            lock_table: LOCK_TABLE.to_string(),
            lock_ttl: DEFAULT_LOCK_TTL,
        }
    }

    pub fn with_tables(mut self, table: impl Into<String>, lock_table: impl Into<String>) -> Self {
        self.table = table.into();
        self.lock_table = lock_table.into();
        self
    }

    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    fn create_table_cmd(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (version bigint PRIMARY KEY, name text, applied_at timestamp)",
            self.table
        )
    }

    fn create_lock_table_cmd(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (lock_name text PRIMARY KEY, owner uuid, acquired_at timestamp)",
            self.lock_table
        )
    }

    fn table_exists_cmd(&self) -> String {
        format!(
            "SELECT table_name FROM system_schema.tables WHERE keyspace_name = {} AND table_name = {}",
            quote_literal(&self.keyspace.to_lowercase()),
            quote_literal(&self.table.to_lowercase())
        )
    }

    fn select_cmd(&self) -> String {
        format!("SELECT version, name, applied_at FROM {}", self.table)
    }

    fn insert_cmd(&self, entry: &AppliedMigration) -> String {
        format!(
            "INSERT INTO {} (version, name, applied_at) VALUES ({}, {}, {}) IF NOT EXISTS",
            self.table,
            entry.id,
            quote_literal(&entry.name),
            entry.applied_at.timestamp_millis()
        )
    }

    fn delete_cmd(&self, id: MigrationId) -> String {
        format!("DELETE FROM {} WHERE version = {} IF EXISTS", self.table, id)
    }

    fn lock_cmd(&self, owner: Uuid, now: DateTime<Utc>) -> String {
        format!(
            "INSERT INTO {} (lock_name, owner, acquired_at) VALUES ({}, {}, {}) IF NOT EXISTS USING TTL {}",
            self.lock_table,
            quote_literal(LOCK_NAME),
            owner,
            now.timestamp_millis(),
            self.lock_ttl.as_secs().max(1)
        )
    }

    fn unlock_cmd(&self, owner: Uuid) -> String {
        format!(
            "DELETE FROM {} WHERE lock_name = {} IF owner = {}",
            self.lock_table,
            quote_literal(LOCK_NAME),
            owner
        )
    }

    fn parse_row(row: &crate::types::RowData) -> Result<AppliedMigration, MigratorError> {
        let id = row.column(0).as_bigint().ok_or_else(|| {
            MigratorError::QueryError(format!("unexpected row in {}: {:?}", HISTORY_TABLE, row))
        })?;

        Ok(AppliedMigration {
            id: MigrationId::new(id),
            name: row.column(1).as_text().unwrap_or_default().to_string(),
            applied_at: row.column(2).as_timestamp().unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        })
    }
}

/// `[applied]` column of a lightweight transaction result.
/// A server that returns no LWT row applied the statement unconditionally.
fn lwt_applied(outcome: &QueryOutcome) -> bool {
    outcome
        .first_row()
        .and_then(|row| row.column(0).as_bool())
        .unwrap_or(true)
}

#[async_trait]
impl HistoryStore for CqlHistoryStore {
    async fn ensure_schema(&self) -> Result<(), MigratorError> {
        self.connection.execute(&self.create_table_cmd()).await?;
        self.connection.execute(&self.create_lock_table_cmd()).await?;
        Ok(())
    }

    async fn schema_exists(&self) -> Result<bool, MigratorError> {
        let outcome = self.connection.execute(&self.table_exists_cmd()).await?;
        Ok(outcome.first_row().is_some())
    }

    async fn applied(&self) -> Result<Vec<AppliedMigration>, MigratorError> {
        let outcome = self.connection.execute(&self.select_cmd()).await?;
        let applied = outcome
            .rows
            .iter()
            .map(Self::parse_row)
            .collect::<Result<Vec<_>, _>>()?;

        debug!("{} migration(s) recorded in {}", applied.len(), self.table);
        Ok(applied)
    }

    async fn record(&self, entry: &AppliedMigration) -> Result<(), MigratorError> {
        let outcome = self.connection.execute(&self.insert_cmd(entry)).await?;
        if !lwt_applied(&outcome) {
            return Err(MigratorError::HistoryConflict(format!(
                "migration {} is already recorded in {}",
                entry.id, self.table
            )));
        }
        Ok(())
    }

    async fn remove(&self, id: MigrationId) -> Result<(), MigratorError> {
        let outcome = self.connection.execute(&self.delete_cmd(id)).await?;
        if !lwt_applied(&outcome) {
            return Err(MigratorError::HistoryConflict(format!(
                "migration {} is no longer recorded in {}",
                id, self.table
            )));
        }
        Ok(())
    }

    async fn acquire_lock(&self, owner: Uuid) -> Result<bool, MigratorError> {
        let outcome = self.connection.execute(&self.lock_cmd(owner, Utc::now())).await?;
        let acquired = lwt_applied(&outcome);
        if acquired {
            info!("Acquired migration lock {} (ttl {:?})", owner, self.lock_ttl);
        }
        Ok(acquired)
    }

    async fn release_lock(&self, owner: Uuid) -> Result<(), MigratorError> {
        let outcome = self.connection.execute(&self.unlock_cmd(owner)).await?;
        if lwt_applied(&outcome) {
            info!("Released migration lock {}", owner);
        } else {
            warn!("Migration lock {} was no longer ours to release (expired?)", owner);
        }
        Ok(())
    }
}
