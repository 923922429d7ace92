// svckit/src/testing.rs
//
// In-memory stand-ins for the database used by unit tests: a connection
// that records every statement, a connector handing it out, and a
// history store backed by a map.
//

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::database::{ConnectionParams, Connector, CqlConnection, QueryOutcome};
use crate::errors::MigratorError;
use crate::migration::history::{AppliedMigration, HistoryStore};
use crate::types::MigrationId;

#[derive(Debug, Clone, Copy)]
pub enum FailureKind {
    Query,
    Connection,
}

/// Connection that records statements and answers from canned responses
#[derive(Default)]
pub struct RecordingConnection {
    commands: Mutex<Vec<String>>,
    failures: Mutex<Vec<(String, FailureKind)>>,
    responses: Mutex<Vec<(String, QueryOutcome)>>,
}

impl RecordingConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail every statement containing `needle`
    pub fn fail_on(&self, needle: &str, kind: FailureKind) {
        self.failures.lock().push((needle.to_string(), kind));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// Answer statements starting with `prefix` with `outcome`
    pub fn respond_to(&self, prefix: &str, outcome: QueryOutcome) {
        self.responses.lock().push((prefix.to_string(), outcome));
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl CqlConnection for RecordingConnection {
    async fn execute(&self, cql: &str) -> Result<QueryOutcome, MigratorError> {
        self.commands.lock().push(cql.to_string());

        let failure = self
            .failures
            .lock()
            .iter()
            .find(|(needle, _)| cql.contains(needle.as_str()))
            .map(|(_, kind)| *kind);
        match failure {
            Some(FailureKind::Query) => {
                return Err(MigratorError::QueryError(format!("rejected: {}", cql)))
            }
            Some(FailureKind::Connection) => {
                return Err(MigratorError::ConnectionError("operation timed out".to_string()))
            }
            None => {}
        }

        let outcome = self
            .responses
            .lock()
            .iter()
            .find(|(prefix, _)| cql.starts_with(prefix.as_str()))
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or_default();
        Ok(outcome)
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }
}

/// Connector that always hands out the same recording connection
pub struct RecordingConnector {
    connection: Arc<RecordingConnection>,
    params: Mutex<Vec<ConnectionParams>>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::with_connection(RecordingConnection::new())
    }

    pub fn with_connection(connection: Arc<RecordingConnection>) -> Self {
        Self {
            connection,
            params: Mutex::new(Vec::new()),
        }
    }

    pub fn params(&self) -> Vec<ConnectionParams> {
        self.params.lock().clone()
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn CqlConnection>, MigratorError> {
        self.params.lock().push(params.clone());
        Ok(self.connection.clone())
    }
}

/// History kept in a map, with a single-owner lock
#[derive(Default)]
pub struct MemoryHistory {
    entries: Mutex<BTreeMap<MigrationId, AppliedMigration>>,
    lock_owner: Mutex<Option<Uuid>>,
    lock_attempts: AtomicUsize,
    schema: AtomicBool,
    release_fails: AtomicBool,
}

impl MemoryHistory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, entry: AppliedMigration) {
        self.schema.store(true, Ordering::SeqCst);
        self.entries.lock().insert(entry.id, entry);
    }

    pub fn has_schema(&self) -> bool {
        self.schema.load(Ordering::SeqCst)
    }

    /// Make every lock release fail as if the cluster dropped the request
    pub fn fail_release(&self) {
        self.release_fails.store(true, Ordering::SeqCst);
    }

    pub fn applied_ids(&self) -> Vec<MigrationId> {
        self.entries.lock().keys().copied().collect()
    }

    /// Pretend another run holds the lock
    pub fn hold_lock(&self, owner: Uuid) {
        *self.lock_owner.lock() = Some(owner);
    }

    pub fn is_locked(&self) -> bool {
        self.lock_owner.lock().is_some()
    }

    pub fn lock_attempts(&self) -> usize {
        self.lock_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn ensure_schema(&self) -> Result<(), MigratorError> {
        self.schema.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn schema_exists(&self) -> Result<bool, MigratorError> {
        Ok(self.has_schema())
    }

    async fn applied(&self) -> Result<Vec<AppliedMigration>, MigratorError> {
        Ok(self.entries.lock().values().cloned().collect())
    }

    async fn record(&self, entry: &AppliedMigration) -> Result<(), MigratorError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&entry.id) {
            return Err(MigratorError::HistoryConflict(format!("{} already recorded", entry.id)));
        }
        entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn remove(&self, id: MigrationId) -> Result<(), MigratorError> {
        match self.entries.lock().remove(&id) {
            Some(_) => Ok(()),
            None => Err(MigratorError::HistoryConflict(format!("{} is not recorded", id))),
        }
    }

    async fn acquire_lock(&self, owner: Uuid) -> Result<bool, MigratorError> {
        self.lock_attempts.fetch_add(1, Ordering::SeqCst);
        let mut lock = self.lock_owner.lock();
        if lock.is_some() {
            return Ok(false);
        }
        *lock = Some(owner);
        Ok(true)
    }

    async fn release_lock(&self, owner: Uuid) -> Result<(), MigratorError> {
        if self.release_fails.load(Ordering::SeqCst) {
            return Err(MigratorError::ConnectionError("lock release timed out".to_string()));
        }
        let mut lock = self.lock_owner.lock();
        if *lock == Some(owner) {
            *lock = None;
        }
        Ok(())
    }
}
