use thiserror::Error;

use crate::types::{Direction, MigrationId};

#[derive(Error, Debug)]
pub enum MigratorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Migration {id} ({name}) is not reversible")]
    NotReversible { id: MigrationId, name: String },

    #[error("Migration {id} ({name}) failed during {direction}: {source}")]
    MigrationFailed {
        id: MigrationId,
        name: String,
        direction: Direction,
        #[source]
        source: Box<MigratorError>,
    },

    #[error("Duplicate migration identifier: {0}")]
    DuplicateMigration(MigrationId),

    #[error("Migration history conflict: {0}")]
    HistoryConflict(String),

    #[error("Migration lock is held by another run: {0}")]
    LockHeld(String),
}

impl MigratorError {
    /// Identifier of the migration that was in progress, if any
    pub fn migration_id(&self) -> Option<MigrationId> {
        match self {
            MigratorError::NotReversible { id, .. } => Some(*id),
            MigratorError::MigrationFailed { id, .. } => Some(*id),
            MigratorError::DuplicateMigration(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<scylla::transport::errors::QueryError> for MigratorError {
    fn from(err: scylla::transport::errors::QueryError) -> Self {
        use scylla::transport::errors::QueryError;

        match err {
            QueryError::DbError(..) | QueryError::BadQuery(..) => {
                MigratorError::QueryError(err.to_string())
            }
            other => MigratorError::ConnectionError(other.to_string()),
        }
    }
}

impl From<scylla::transport::errors::NewSessionError> for MigratorError {
    fn from(err: scylla::transport::errors::NewSessionError) -> Self {
        MigratorError::ConnectionError(err.to_string())
    }
}

impl From<serde_yaml::Error> for MigratorError {
    fn from(err: serde_yaml::Error) -> Self {
        MigratorError::ConfigError(err.to_string())
    }
}

impl From<config::ConfigError> for MigratorError {
    fn from(err: config::ConfigError) -> Self {
        MigratorError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_failed_names_the_step() {
        let err = MigratorError::MigrationFailed {
            id: MigrationId::new(2),
            name: "add_users".to_string(),
            direction: Direction::Up,
            source: Box::new(MigratorError::QueryError("line 1: no viable alternative".to_string())),
        };

        let message = err.to_string();
        assert!(message.contains("Migration 2 (add_users) failed during up"));
        assert!(message.contains("no viable alternative"));
        assert_eq!(err.migration_id(), Some(MigrationId::new(2)));
    }

    #[test]
    fn test_config_error_has_no_migration() {
        let err = MigratorError::ConfigError("host is missing".to_string());
        assert_eq!(err.migration_id(), None);
    }

    #[test]
    fn test_driver_errors_map_by_cause() {
        use scylla::transport::errors::{BadQuery, DbError, QueryError};

        let err: MigratorError = QueryError::BadQuery(BadQuery::Other("no keyspace".to_string())).into();
        assert!(matches!(err, MigratorError::QueryError(_)));

        let err: MigratorError =
            QueryError::DbError(DbError::Invalid, "unconfigured table users".to_string()).into();
        assert!(matches!(err, MigratorError::QueryError(ref msg) if msg.contains("unconfigured table users")));

        let err: MigratorError = QueryError::TimeoutError.into();
        assert!(matches!(err, MigratorError::ConnectionError(_)));
    }

    #[test]
    fn test_yaml_error_is_config_error() {
        let err: MigratorError = serde_yaml::from_str::<serde_yaml::Value>("a: [1").unwrap_err().into();
        assert!(matches!(err, MigratorError::ConfigError(_)));
    }
}
