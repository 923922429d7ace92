// svckit/src/migration/unit.rs
//
// Migration - one versioned schema change with an `up` and, where possible,
// a `down`. Migrations are registered into a MigrationSet, which keeps them
// ordered by identifier for the runner.
//

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use super::context::MigrationContext;
use crate::errors::MigratorError;
use crate::types::MigrationId;

/// A schema change. The default `down` refuses to run so that
/// rollback stops at migrations that cannot be undone.
#[async_trait]
pub trait Migration: Send + Sync {
    fn id(&self) -> MigrationId;
    fn name(&self) -> &str;

    async fn up(&self, ctx: &MigrationContext) -> Result<(), MigratorError>;

    async fn down(&self, _ctx: &MigrationContext) -> Result<(), MigratorError> {
        Err(MigratorError::NotReversible {
            id: self.id(),
            name: self.name().to_string(),
        })
    }
}

/// Migration made of plain CQL statements
#[derive(Debug, Clone, PartialEq)]
pub struct CqlMigration {
    id: MigrationId,
    name: String,
    up: Vec<String>,
    down: Option<Vec<String>>,
}

impl CqlMigration {
    pub fn new<S: Into<String>>(id: MigrationId, name: impl Into<String>, up: Vec<S>) -> Self {
        Self {
            id,
            name: name.into(),
            up: up.into_iter().map(Into::into).collect(),
            down: None,
        }
    }

    pub fn with_down<S: Into<String>>(mut self, down: Vec<S>) -> Self {
        self.down = Some(down.into_iter().map(Into::into).collect());
        self
    }

    /// Build from script text. A down script without statements leaves
    /// the migration irreversible.
    pub fn from_scripts(id: MigrationId, name: impl Into<String>, up: &str, down: Option<&str>) -> Self {
        let down = down.map(split_statements).filter(|s| !s.is_empty());
        Self {
            id,
            name: name.into(),
            up: split_statements(up),
            down,
        }
    }

    pub fn up_statements(&self) -> &[String] {
        &self.up
    }

    pub fn is_reversible(&self) -> bool {
        self.down.is_some()
    }

    async fn run(&self, ctx: &MigrationContext, statements: &[String]) -> Result<(), MigratorError> {
        for (i, statement) in statements.iter().enumerate() {
            debug!(
                "Migration {} statement {}/{}: {}",
                self.id,
                i + 1,
                statements.len(),
                statement
            );
            ctx.execute(statement).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Migration for CqlMigration {
    fn id(&self) -> MigrationId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn up(&self, ctx: &MigrationContext) -> Result<(), MigratorError> {
        self.run(ctx, &self.up).await
    }

    async fn down(&self, ctx: &MigrationContext) -> Result<(), MigratorError> {
        match self.down {
            Some(ref statements) => self.run(ctx, statements).await,
            None => Err(MigratorError::NotReversible {
                id: self.id,
                name: self.name.clone(),
            }),
        }
    }
}

/// Split a script on `;`, dropping `--` comment lines and blank statements
pub fn split_statements(script: &str) -> Vec<String> {
    let without_comments: String = script
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// All migrations known to a run, ordered by identifier
#[derive(Clone, Default)]
pub struct MigrationSet {
    migrations: BTreeMap<MigrationId, Arc<dyn Migration>>,
}

impl MigrationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M: Migration + 'static>(&mut self, migration: M) -> Result<(), MigratorError> {
        self.register_shared(Arc::new(migration))
    }

    pub fn register_shared(&mut self, migration: Arc<dyn Migration>) -> Result<(), MigratorError> {
        let id = migration.id();
        if self.migrations.contains_key(&id) {
            return Err(MigratorError::DuplicateMigration(id));
        }
        self.migrations.insert(id, migration);
        Ok(())
    }

    pub fn get(&self, id: MigrationId) -> Option<Arc<dyn Migration>> {
        self.migrations.get(&id).cloned()
    }

    pub fn contains(&self, id: MigrationId) -> bool {
        self.migrations.contains_key(&id)
    }

    /// Ascending by identifier
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Migration>> {
        self.migrations.values()
    }

    pub fn ids(&self) -> Vec<MigrationId> {
        self.migrations.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingConnection;

    struct SeedCountries;

    #[async_trait]
    impl Migration for SeedCountries {
        fn id(&self) -> MigrationId {
            MigrationId::new(5)
        }

        fn name(&self) -> &str {
            "seed_countries"
        }

        async fn up(&self, ctx: &MigrationContext) -> Result<(), MigratorError> {
            for code in ["NZ", "PT"] {
                ctx.execute(&format!("INSERT INTO countries (code) VALUES ('{}')", code))
                    .await?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_split_statements() {
        let script = "-- create the users table\nCREATE TABLE users (id uuid PRIMARY KEY);\n\n  CREATE INDEX ON users (email) ;\n;";
        assert_eq!(
            split_statements(script),
            vec![
                "CREATE TABLE users (id uuid PRIMARY KEY)".to_string(),
                "CREATE INDEX ON users (email)".to_string(),
            ]
        );
        assert!(split_statements("-- nothing here\n").is_empty());
    }

    #[test]
    fn test_from_scripts_empty_down_is_irreversible() {
        let migration = CqlMigration::from_scripts(
            MigrationId::new(1),
            "create_users",
            "CREATE TABLE users (id uuid PRIMARY KEY);",
            Some("-- fill me in\n"),
        );
        assert!(!migration.is_reversible());
        assert_eq!(migration.up_statements().len(), 1);
    }

    #[tokio::test]
    async fn test_cql_migration_runs_statements_in_order() {
        let connection = RecordingConnection::new();
        let ctx = MigrationContext::new(connection.clone(), "ks");
        let migration = CqlMigration::new(
            MigrationId::new(1),
            "create_users",
            vec!["CREATE TABLE users (id uuid PRIMARY KEY)", "CREATE INDEX ON users (email)"],
        )
        .with_down(vec!["DROP TABLE users"]);

        migration.up(&ctx).await.unwrap();
        migration.down(&ctx).await.unwrap();
        assert_eq!(
            connection.commands(),
            vec![
                "CREATE TABLE users (id uuid PRIMARY KEY)".to_string(),
                "CREATE INDEX ON users (email)".to_string(),
                "DROP TABLE users".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_down_is_not_reversible() {
        let connection = RecordingConnection::new();
        let ctx = MigrationContext::new(connection.clone(), "ks");
        let migration = CqlMigration::new(MigrationId::new(3), "add_email", vec!["ALTER TABLE users ADD email text"]);

        let err = migration.down(&ctx).await.unwrap_err();
        assert!(matches!(err, MigratorError::NotReversible { id, .. } if id == MigrationId::new(3)));
        assert!(connection.commands().is_empty());
    }

    #[tokio::test]
    async fn test_custom_migration_defaults_to_not_reversible() {
        let connection = RecordingConnection::new();
        let ctx = MigrationContext::new(connection.clone(), "ks");

        SeedCountries.up(&ctx).await.unwrap();
        assert_eq!(connection.commands().len(), 2);
        assert!(matches!(
            SeedCountries.down(&ctx).await,
            Err(MigratorError::NotReversible { .. })
        ));
    }

    #[test]
    fn test_migration_set_orders_and_rejects_duplicates() {
        let mut set = MigrationSet::new();
        for id in [3, 1, 2] {
            set.register(CqlMigration::new(MigrationId::new(id), format!("m{}", id), vec!["SELECT 1"]))
                .unwrap();
        }

        assert_eq!(set.ids(), vec![MigrationId::new(1), MigrationId::new(2), MigrationId::new(3)]);
        assert_eq!(set.iter().next().unwrap().name(), "m1");

        let err = set
            .register(CqlMigration::new(MigrationId::new(2), "again", vec!["SELECT 1"]))
            .unwrap_err();
        assert!(matches!(err, MigratorError::DuplicateMigration(id) if id == MigrationId::new(2)));
        assert_eq!(set.len(), 3);
    }
}
