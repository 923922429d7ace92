use async_trait::async_trait;
use scylla::frame::response::result::CqlValue;
use scylla::transport::execution_profile::ExecutionProfile;
use scylla::{Session, SessionBuilder};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::connection::{ConnectionParams, CqlConnection, QueryOutcome};
use crate::errors::MigratorError;
use crate::types::{ColumnValue, RowData};

/// ScyllaDB/Cassandra connection wrapper with session management
#[derive(Clone)]
pub struct ScyllaConnection {
    session: Arc<Session>,
    params: ConnectionParams,
}

impl ScyllaConnection {
    /// Open a session against `params.host`, selecting the keyspace if one is given
    pub async fn new(params: &ConnectionParams) -> Result<Self, MigratorError> {
        info!(
            "Connecting to {} (keyspace: {})",
            params.host,
            params.keyspace.as_deref().unwrap_or("<none>")
        );

        let mut session_builder = SessionBuilder::new().known_node(&params.host);

        if let Some(timeout) = params.client_options.connect_timeout {
            session_builder = session_builder.connection_timeout(timeout);
        }

        if let Some(timeout) = params.client_options.request_timeout {
            let profile = ExecutionProfile::builder()
                .request_timeout(Some(timeout))
                .build();
            session_builder = session_builder.default_execution_profile_handle(profile.into_handle());
        }

        if let Some(ref keyspace) = params.keyspace {
            session_builder = session_builder.use_keyspace(keyspace, false);
        }

        let session = session_builder.build().await.map_err(|e| {
            error!("Failed to connect to {}: {}", params.host, e);
            MigratorError::from(e)
        })?;

        info!("Connected to {}", params.host);

        Ok(Self {
            session: Arc::new(session),
            params: params.clone(),
        })
    }

    /// Get the underlying session
    pub fn get_session(&self) -> &Session {
        &self.session
    }

    /// Execute a statement without bound values
    pub async fn execute_simple(&self, cql: &str) -> Result<QueryOutcome, MigratorError> {
        debug!("Executing CQL: {}", cql);

        let result = self.session.query_unpaged(cql, ()).await?;

        let rows = result
            .rows
            .unwrap_or_default()
            .into_iter()
            .map(|row| RowData::new(row.columns.into_iter().map(column_value).collect()))
            .collect();

        Ok(QueryOutcome::with_rows(rows))
    }
}

#[async_trait]
impl CqlConnection for ScyllaConnection {
    async fn execute(&self, cql: &str) -> Result<QueryOutcome, MigratorError> {
        self.execute_simple(cql).await
    }

    fn describe(&self) -> String {
        match self.params.keyspace {
            Some(ref keyspace) => format!("{}/{}", self.params.host, keyspace),
            None => self.params.host.clone(),
        }
    }
}

/// Convert a driver value into a `ColumnValue`
fn column_value(value: Option<CqlValue>) -> ColumnValue {
    match value {
        None | Some(CqlValue::Empty) => ColumnValue::Null,
        Some(CqlValue::Text(s)) | Some(CqlValue::Ascii(s)) => ColumnValue::Text(s),
        Some(CqlValue::Int(v)) => ColumnValue::Int(v),
        Some(CqlValue::BigInt(v)) => ColumnValue::BigInt(v),
        Some(CqlValue::Double(v)) => ColumnValue::Double(v),
        Some(CqlValue::Boolean(v)) => ColumnValue::Boolean(v),
        Some(CqlValue::Uuid(v)) => ColumnValue::Uuid(v),
        Some(CqlValue::Timestamp(ts)) => ColumnValue::Timestamp(ts.0),
        Some(other) => ColumnValue::Text(format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scylla::frame::value::CqlTimestamp;

    #[test]
    fn test_column_value_conversion() {
        assert_eq!(column_value(None), ColumnValue::Null);
        assert_eq!(column_value(Some(CqlValue::BigInt(42))), ColumnValue::BigInt(42));
        assert_eq!(
            column_value(Some(CqlValue::Text("create_users".to_string()))),
            ColumnValue::Text("create_users".to_string())
        );
        assert_eq!(column_value(Some(CqlValue::Boolean(true))), ColumnValue::Boolean(true));
        assert_eq!(
            column_value(Some(CqlValue::Timestamp(CqlTimestamp(1_700_000_000_000)))),
            ColumnValue::Timestamp(1_700_000_000_000)
        );
    }
}
