//! Keyspace lifecycle and schema migrations for ScyllaDB/Cassandra.
//!
//! `config` resolves per-environment connection settings, `database` opens
//! connections and manages the keyspace itself, and `migration` applies and
//! reverses versioned schema changes while tracking them in the keyspace.

pub mod config;
pub mod database;
pub mod errors;
pub mod migration;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
