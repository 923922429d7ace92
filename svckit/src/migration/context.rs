use std::sync::Arc;

use crate::config::EnvironmentConfig;
use crate::database::{ConnectionParams, Connector, CqlConnection, QueryOutcome};
use crate::errors::MigratorError;

/// Keyspace-bound connection handed to every migration.
/// `execute` is a straight pass-through: no retry, no error translation.
#[derive(Clone)]
pub struct MigrationContext {
    connection: Arc<dyn CqlConnection>,
    keyspace: String,
}

impl MigrationContext {
    /// Connect with the environment's keyspace selected and its client options applied
    pub async fn connect(env: &EnvironmentConfig, connector: &dyn Connector) -> Result<Self, MigratorError> {
        let params = ConnectionParams::with_keyspace(env)?;
        let keyspace = env.keyspace()?.to_string();
        let connection = connector.connect(&params).await?;
        Ok(Self::new(connection, keyspace))
    }

    pub fn new(connection: Arc<dyn CqlConnection>, keyspace: impl Into<String>) -> Self {
        Self {
            connection,
            keyspace: keyspace.into(),
        }
    }

    pub async fn execute(&self, cql: &str) -> Result<QueryOutcome, MigratorError> {
        self.connection.execute(cql).await
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn connection(&self) -> Arc<dyn CqlConnection> {
        self.connection.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScalarValue;
    use crate::testing::{FailureKind, RecordingConnection, RecordingConnector};
    use std::collections::BTreeMap;
    use std::time::Duration;

    #[tokio::test]
    async fn test_connect_selects_keyspace() {
        let connector = RecordingConnector::new();
        let env = EnvironmentConfig {
            host: Some("somehost".to_string()),
            keyspace: Some("somekeyspace".to_string()),
            ..Default::default()
        };

        let ctx = MigrationContext::connect(&env, &connector).await.unwrap();
        assert_eq!(ctx.keyspace(), "somekeyspace");

        let params = connector.params();
        assert_eq!(params[0].host, "somehost");
        assert_eq!(params[0].keyspace.as_deref(), Some("somekeyspace"));
        assert!(params[0].client_options.is_empty());
    }

    #[tokio::test]
    async fn test_connect_applies_client_options() {
        let connector = RecordingConnector::new();
        let mut options = BTreeMap::new();
        options.insert("connect_timeout".to_string(), ScalarValue::Int(5));
        options.insert("timeout".to_string(), ScalarValue::Int(10));
        let env = EnvironmentConfig {
            host: Some("somehost".to_string()),
            keyspace: Some("somekeyspace".to_string()),
            client_options: Some(options),
            ..Default::default()
        };

        MigrationContext::connect(&env, &connector).await.unwrap();

        let params = connector.params();
        assert_eq!(params[0].client_options.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(params[0].client_options.request_timeout, Some(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_connect_without_keyspace_fails() {
        let connector = RecordingConnector::new();
        let env = EnvironmentConfig {
            host: Some("somehost".to_string()),
            ..Default::default()
        };

        let result = MigrationContext::connect(&env, &connector).await;
        assert!(matches!(result, Err(MigratorError::ConfigError(_))));
        assert!(connector.params().is_empty());
    }

    #[tokio::test]
    async fn test_execute_delegates() {
        let connection = RecordingConnection::new();
        let ctx = MigrationContext::new(connection.clone(), "test keyspace");

        ctx.execute("some cql string").await.unwrap();
        assert_eq!(connection.commands(), vec!["some cql string".to_string()]);
    }

    #[tokio::test]
    async fn test_execute_surfaces_errors_untranslated() {
        let connection = RecordingConnection::new();
        connection.fail_on("ALTER", FailureKind::Connection);
        let ctx = MigrationContext::new(connection.clone(), "ks");

        let result = ctx.execute("ALTER TABLE users ADD email text").await;
        assert!(matches!(result, Err(MigratorError::ConnectionError(_))));
    }
}
