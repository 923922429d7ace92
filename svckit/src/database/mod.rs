pub mod connection;
pub mod factory;
pub mod keyspace;
pub mod query_builder;
pub mod scylla;

pub use self::connection::{ConnectionParams, CqlConnection, QueryOutcome};
pub use self::factory::{Connector, ScyllaConnector};
pub use self::keyspace::{KeyspaceManager, KeyspaceSpec};
pub use self::query_builder::QueryBuilder;
pub use self::scylla::ScyllaConnection;
