use async_trait::async_trait;

use crate::config::{ClientOptions, EnvironmentConfig};
use crate::errors::MigratorError;
use crate::types::RowData;

/// Rows returned by a statement; empty for DDL
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    pub rows: Vec<RowData>,
}

impl QueryOutcome {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<RowData>) -> Self {
        Self { rows }
    }

    pub fn first_row(&self) -> Option<&RowData> {
        self.rows.first()
    }
}

/// A live connection able to run one CQL statement at a time.
/// Fails with `ConnectionError` for transport problems and `QueryError`
/// when the server rejects the statement.
#[async_trait]
pub trait CqlConnection: Send + Sync {
    async fn execute(&self, cql: &str) -> Result<QueryOutcome, MigratorError>;
    fn describe(&self) -> String;
}

/// Everything needed to open a connection
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    pub host: String,
    pub keyspace: Option<String>,
    pub client_options: ClientOptions,
}

impl ConnectionParams {
    /// Keyspace-agnostic connection, used for keyspace DDL
    pub fn without_keyspace(env: &EnvironmentConfig) -> Result<Self, MigratorError> {
        Ok(Self {
            host: env.host()?.to_string(),
            keyspace: None,
            client_options: ClientOptions::from_options(env.client_options())?,
        })
    }

    /// Connection with the environment's keyspace pre-selected
    pub fn with_keyspace(env: &EnvironmentConfig) -> Result<Self, MigratorError> {
        let mut params = Self::without_keyspace(env)?;
        params.keyspace = Some(env.keyspace()?.to_string());
        Ok(params)
    }
}
