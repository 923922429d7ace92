// svckit/src/database/keyspace.rs
//
// KeyspaceManager - create, select and drop the environment's keyspace.
// Runs over a connection opened without a keyspace so that it works
// before the keyspace exists.
//

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::connection::{ConnectionParams, CqlConnection};
use super::factory::Connector;
use super::query_builder::QueryBuilder;
use crate::config::{EnvironmentConfig, ScalarValue};
use crate::errors::MigratorError;

/// Keyspace name plus replication settings, only used to build DDL
#[derive(Debug, Clone, PartialEq)]
pub struct KeyspaceSpec {
    pub name: String,
    pub strategy_class: String,
    pub strategy_options: Option<BTreeMap<String, ScalarValue>>,
}

impl KeyspaceSpec {
    pub fn from_env(env: &EnvironmentConfig) -> Result<Self, MigratorError> {
        Ok(Self {
            name: env.keyspace()?.to_string(),
            strategy_class: env.strategy_class()?.to_string(),
            strategy_options: env.strategy_options.clone(),
        })
    }

    pub fn create_cmd(&self) -> String {
        QueryBuilder::build_create_keyspace_cmd(
            &self.name,
            &self.strategy_class,
            self.strategy_options.as_ref(),
        )
    }
}

pub struct KeyspaceManager {
    connection: Arc<dyn CqlConnection>,
    env: EnvironmentConfig,
}

impl KeyspaceManager {
    /// Connect to the environment's host without selecting a keyspace
    pub async fn connect(env: &EnvironmentConfig, connector: &dyn Connector) -> Result<Self, MigratorError> {
        let params = ConnectionParams::without_keyspace(env)?;
        let connection = connector.connect(&params).await?;
        Ok(Self::new(connection, env.clone()))
    }

    pub fn new(connection: Arc<dyn CqlConnection>, env: EnvironmentConfig) -> Self {
        Self { connection, env }
    }

    pub async fn create_keyspace(&self) -> Result<(), MigratorError> {
        let spec = KeyspaceSpec::from_env(&self.env)?;
        info!("Creating keyspace {} ({})", spec.name, spec.strategy_class);
        self.connection.execute(&spec.create_cmd()).await?;
        info!("Keyspace {} created", spec.name);
        Ok(())
    }

    pub async fn use_keyspace(&self) -> Result<(), MigratorError> {
        let keyspace = self.env.keyspace()?;
        self.connection
            .execute(&QueryBuilder::build_use_keyspace_cmd(keyspace))
            .await?;
        Ok(())
    }

    pub async fn drop_keyspace(&self) -> Result<(), MigratorError> {
        let keyspace = self.env.keyspace()?;
        info!("Dropping keyspace {}", keyspace);
        self.connection
            .execute(&QueryBuilder::build_drop_keyspace_cmd(keyspace))
            .await?;
        info!("Keyspace {} dropped", keyspace);
        Ok(())
    }
}
