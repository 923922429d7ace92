// svckit/src/migration/runner.rs
//
// MigrationRunner - diffs the known migrations against the recorded history,
// then applies the pending ones in ascending order or reverses applied ones
// in reverse order of application. Every completed step is recorded before
// the next begins, so a failed run can simply be rerun.
//

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::context::MigrationContext;
use super::history::{AppliedMigration, CqlHistoryStore, HistoryStore};
use super::unit::{Migration, MigrationSet};
use crate::config::EnvironmentConfig;
use crate::database::Connector;
use crate::errors::MigratorError;
use crate::types::{Direction, MigrationId, MigrationStatus};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Discovering,
    Diffing,
    Applying,
    Recording,
    /// The last run stopped at a failing step
    Halted,
}

/// How far a rollback goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTarget {
    /// The N most recently applied migrations
    Steps(usize),
    /// Everything applied with an identifier above this one
    To(MigrationId),
}

/// Known migrations split by the recorded history
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationPlan {
    /// Not yet applied, ascending
    pub pending: Vec<MigrationId>,
    /// Applied, most recently applied first
    pub applied: Vec<AppliedMigration>,
    /// Recorded but unknown to this migration set
    pub orphaned: Vec<AppliedMigration>,
}

impl MigrationPlan {
    pub fn compute(migrations: &MigrationSet, history: Vec<AppliedMigration>) -> Self {
        let (mut applied, mut orphaned): (Vec<_>, Vec<_>) = history
            .into_iter()
            .partition(|entry| migrations.contains(entry.id));

        applied.sort_by(|a, b| {
            b.applied_at
                .cmp(&a.applied_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        orphaned.sort_by_key(|entry| entry.id);

        let pending = migrations
            .ids()
            .into_iter()
            .filter(|id| !applied.iter().any(|entry| entry.id == *id))
            .collect();

        Self {
            pending,
            applied,
            orphaned,
        }
    }

    /// Pending migrations up to and including `target`
    pub fn pending_until(&self, target: Option<MigrationId>) -> Vec<MigrationId> {
        self.pending
            .iter()
            .copied()
            .filter(|id| target.map_or(true, |t| *id <= t))
            .collect()
    }

    /// Applied migrations to reverse, in the order they must be reversed
    pub fn rollback_targets(&self, target: RollbackTarget) -> Vec<AppliedMigration> {
        match target {
            RollbackTarget::Steps(steps) => self.applied.iter().take(steps).cloned().collect(),
            RollbackTarget::To(id) => self
                .applied
                .iter()
                .filter(|entry| entry.id > id)
                .cloned()
                .collect(),
        }
    }

    /// Highest applied identifier
    pub fn current_version(&self) -> Option<MigrationId> {
        self.applied.iter().map(|entry| entry.id).max()
    }
}

/// Migrations completed by one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub direction: Direction,
    pub migrations: Vec<MigrationId>,
}

impl RunReport {
    fn new(direction: Direction) -> Self {
        Self {
            direction,
            migrations: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.migrations.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    /// Every known migration, ascending
    pub migrations: Vec<MigrationStatus>,
    pub orphaned: Vec<AppliedMigration>,
}

pub struct MigrationRunner {
    context: MigrationContext,
    history: Arc<dyn HistoryStore>,
    migrations: MigrationSet,
    owner: Uuid,
    phase: RunPhase,
    schema_ready: bool,
}

impl MigrationRunner {
    pub fn new(context: MigrationContext, history: Arc<dyn HistoryStore>, migrations: MigrationSet) -> Self {
        Self {
            context,
            history,
            migrations,
            owner: Uuid::new_v4(),
            phase: RunPhase::Idle,
            schema_ready: false,
        }
    }

    /// Connect to the environment's keyspace and keep history in CQL tables there
    pub async fn connect(
        env: &EnvironmentConfig,
        connector: &dyn Connector,
        migrations: MigrationSet,
    ) -> Result<Self, MigratorError> {
        let context = MigrationContext::connect(env, connector).await?;
        let history = Arc::new(CqlHistoryStore::new(context.connection(), context.keyspace()));
        Ok(Self::new(context, history, migrations))
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn migrations(&self) -> &MigrationSet {
        &self.migrations
    }

    /// Read the history and split the known migrations into pending and applied
    pub async fn plan(&mut self) -> Result<MigrationPlan, MigratorError> {
        let result = self.diff().await;
        self.finish(&result);
        result
    }

    /// Apply every pending migration
    pub async fn migrate(&mut self) -> Result<RunReport, MigratorError> {
        let result = self.migrate_until(None).await;
        self.finish(&result);
        result
    }

    /// Apply pending migrations with identifiers up to and including `target`
    pub async fn migrate_to(&mut self, target: MigrationId) -> Result<RunReport, MigratorError> {
        let result = self.migrate_until(Some(target)).await;
        self.finish(&result);
        result
    }

    /// Reverse the `steps` most recently applied migrations
    pub async fn rollback(&mut self, steps: usize) -> Result<RunReport, MigratorError> {
        let result = self.rollback_until(RollbackTarget::Steps(steps)).await;
        self.finish(&result);
        result
    }

    /// Reverse every applied migration above `target`, most recently applied first
    pub async fn rollback_to(&mut self, target: MigrationId) -> Result<RunReport, MigratorError> {
        let result = self.rollback_until(RollbackTarget::To(target)).await;
        self.finish(&result);
        result
    }

    pub async fn status(&mut self) -> Result<StatusReport, MigratorError> {
        let plan = self.plan().await?;
        let applied_at: HashMap<MigrationId, _> = plan
            .applied
            .iter()
            .map(|entry| (entry.id, entry.applied_at))
            .collect();

        let migrations = self
            .migrations
            .iter()
            .map(|m| MigrationStatus {
                id: m.id(),
                name: m.name().to_string(),
                applied_at: applied_at.get(&m.id()).copied(),
            })
            .collect();

        Ok(StatusReport {
            migrations,
            orphaned: plan.orphaned,
        })
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!("Runner phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    fn finish<T>(&mut self, result: &Result<T, MigratorError>) {
        match result {
            Ok(_) => self.enter(RunPhase::Idle),
            Err(_) => self.enter(RunPhase::Halted),
        }
    }

    async fn diff(&mut self) -> Result<MigrationPlan, MigratorError> {
        self.enter(RunPhase::Discovering);
        debug!("{} migration(s) known", self.migrations.len());

        self.enter(RunPhase::Diffing);
        let history = self.read_history().await?;
        let plan = MigrationPlan::compute(&self.migrations, history);

        if !plan.orphaned.is_empty() {
            let ids: Vec<String> = plan.orphaned.iter().map(|e| e.id.to_string()).collect();
            warn!(
                "History lists {} migration(s) unknown to this run: {}",
                ids.len(),
                ids.join(", ")
            );
        }
        debug!(
            "{} pending, {} applied in keyspace {}",
            plan.pending.len(),
            plan.applied.len(),
            self.context.keyspace()
        );
        Ok(plan)
    }

    /// A keyspace that was never migrated has no history table; read it as empty
    async fn read_history(&mut self) -> Result<Vec<AppliedMigration>, MigratorError> {
        if !self.schema_ready {
            if !self.history.schema_exists().await? {
                debug!("No migration history in keyspace {}", self.context.keyspace());
                return Ok(Vec::new());
            }
            self.schema_ready = true;
        }
        self.history.applied().await
    }

    async fn prepare(&mut self) -> Result<(), MigratorError> {
        self.history.ensure_schema().await?;
        self.schema_ready = true;
        Ok(())
    }

    async fn migrate_until(&mut self, target: Option<MigrationId>) -> Result<RunReport, MigratorError> {
        let plan = self.diff().await?;
        if plan.pending_until(target).is_empty() {
            info!("Keyspace {} is up to date", self.context.keyspace());
            return Ok(RunReport::new(Direction::Up));
        }

        self.prepare().await?;
        self.lock().await?;
        let result = self.apply_locked(target).await;
        let released = self.unlock().await;
        result.and_then(|report| released.map(|_| report))
    }

    async fn apply_locked(&mut self, target: Option<MigrationId>) -> Result<RunReport, MigratorError> {
        // Re-read under the lock; another run may have finished meanwhile
        let plan = self.diff().await?;
        let pending: Vec<Arc<dyn Migration>> = plan
            .pending_until(target)
            .into_iter()
            .filter_map(|id| self.migrations.get(id))
            .collect();

        info!("{} migration(s) to apply", pending.len());
        let mut report = RunReport::new(Direction::Up);

        for migration in pending {
            let (id, name) = (migration.id(), migration.name().to_string());
            let started = Instant::now();

            self.enter(RunPhase::Applying);
            info!("Migrating {} {}", id, name);
            if let Err(e) = migration.up(&self.context).await {
                error!("Migration {} {} failed: {}", id, name, e);
                return Err(failed(id, name, Direction::Up, e));
            }

            self.enter(RunPhase::Recording);
            let entry = AppliedMigration::new(id, name.clone(), Utc::now());
            if let Err(e) = self.history.record(&entry).await {
                error!("Migration {} {} ran but could not be recorded: {}", id, name, e);
                return Err(failed(id, name, Direction::Up, e));
            }

            info!("Migrated {} {} in {:?}", id, name, started.elapsed());
            report.migrations.push(id);
        }

        Ok(report)
    }

    async fn rollback_until(&mut self, target: RollbackTarget) -> Result<RunReport, MigratorError> {
        if target == RollbackTarget::Steps(0) {
            return Ok(RunReport::new(Direction::Down));
        }

        let plan = self.diff().await?;
        if plan.rollback_targets(target).is_empty() {
            info!("Nothing to roll back in keyspace {}", self.context.keyspace());
            return Ok(RunReport::new(Direction::Down));
        }

        self.prepare().await?;
        self.lock().await?;
        let result = self.revert_locked(target).await;
        let released = self.unlock().await;
        result.and_then(|report| released.map(|_| report))
    }

    async fn revert_locked(&mut self, target: RollbackTarget) -> Result<RunReport, MigratorError> {
        let plan = self.diff().await?;
        let entries = plan.rollback_targets(target);

        info!("{} migration(s) to roll back", entries.len());
        let mut report = RunReport::new(Direction::Down);

        for entry in entries {
            let Some(migration) = self.migrations.get(entry.id) else {
                continue;
            };
            let (id, name) = (migration.id(), migration.name().to_string());
            let started = Instant::now();

            self.enter(RunPhase::Applying);
            info!("Rolling back {} {}", id, name);
            match migration.down(&self.context).await {
                Ok(()) => {}
                Err(e @ MigratorError::NotReversible { .. }) => {
                    warn!("Rollback stopped: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    error!("Rollback of {} {} failed: {}", id, name, e);
                    return Err(failed(id, name, Direction::Down, e));
                }
            }

            self.enter(RunPhase::Recording);
            if let Err(e) = self.history.remove(id).await {
                error!("Migration {} {} was reversed but is still recorded: {}", id, name, e);
                return Err(failed(id, name, Direction::Down, e));
            }

            info!("Rolled back {} {} in {:?}", id, name, started.elapsed());
            report.migrations.push(id);
        }

        Ok(report)
    }

    async fn lock(&self) -> Result<(), MigratorError> {
        if self.history.acquire_lock(self.owner).await? {
            Ok(())
        } else {
            Err(MigratorError::LockHeld(format!(
                "keyspace {} is being migrated by another process",
                self.context.keyspace()
            )))
        }
    }

    /// The TTL frees a lock we fail to release; the failure is still reported
    async fn unlock(&self) -> Result<(), MigratorError> {
        self.history.release_lock(self.owner).await.map_err(|e| {
            warn!("Failed to release migration lock {}: {}", self.owner, e);
            e
        })
    }
}

fn failed(id: MigrationId, name: String, direction: Direction, source: MigratorError) -> MigratorError {
    MigratorError::MigrationFailed {
        id,
        name,
        direction,
        source: Box::new(source),
    }
}
