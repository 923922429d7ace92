// svckit/src/database/factory.rs
//
// Connector - opens connections from resolved connection parameters.
// Everything above the wire talks to `dyn CqlConnection`, so the keyspace
// manager and the migration runner never name the driver directly.
//

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::connection::{ConnectionParams, CqlConnection};
use super::scylla::ScyllaConnection;
use crate::errors::MigratorError;

/// Opens a new connection for each caller
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn CqlConnection>, MigratorError>;
}

/// Connector backed by the scylla driver (CQL-compatible with Cassandra 4.x)
#[derive(Debug, Clone, Copy, Default)]
pub struct ScyllaConnector;

#[async_trait]
impl Connector for ScyllaConnector {
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn CqlConnection>, MigratorError> {
        let connection = ScyllaConnection::new(params).await?;
        info!("Opened connection: {}", connection.describe());
        Ok(Arc::new(connection))
    }
}
