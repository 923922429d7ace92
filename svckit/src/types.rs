use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Ordering key of a migration, typically a `YYYYMMDDHHMMSS` timestamp.
/// Stored as a CQL `bigint`, so it never goes negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MigrationId(i64);

impl MigrationId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MigrationId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|e| format!("invalid migration identifier '{}': {}", s, e))?;
        if value < 0 {
            return Err(format!("migration identifier must not be negative: {}", value));
        }
        Ok(Self(value))
    }
}

/// Which half of a migration is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// A single cell returned by the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValue {
    Text(String),
    Int(i32),
    BigInt(i64),
    Double(f64),
    Boolean(bool),
    Uuid(Uuid),
    /// Milliseconds since the Unix epoch
    Timestamp(i64),
    Null,
}

impl ColumnValue {
    pub fn as_bigint(&self) -> Option<i64> {
        match self {
            ColumnValue::BigInt(v) => Some(*v),
            ColumnValue::Int(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ColumnValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            ColumnValue::Timestamp(ms) => DateTime::<Utc>::from_timestamp_millis(*ms),
            _ => None,
        }
    }
}

/// Positional row, columns in SELECT order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowData {
    pub columns: Vec<ColumnValue>,
}

impl RowData {
    pub fn new(columns: Vec<ColumnValue>) -> Self {
        Self { columns }
    }

    pub fn column(&self, index: usize) -> &ColumnValue {
        self.columns.get(index).unwrap_or(&ColumnValue::Null)
    }
}

/// Per-migration line of `status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub id: MigrationId,
    pub name: String,
    pub applied_at: Option<DateTime<Utc>>,
}

impl MigrationStatus {
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_id_parse() {
        assert_eq!("20240117120000".parse::<MigrationId>().unwrap(), MigrationId::new(20240117120000));
        assert_eq!(" 7 ".parse::<MigrationId>().unwrap(), MigrationId::new(7));
        assert!("-3".parse::<MigrationId>().is_err());
        assert!("create_users".parse::<MigrationId>().is_err());
    }

    #[test]
    fn test_migration_id_ordering() {
        let mut ids = vec![MigrationId::new(3), MigrationId::new(1), MigrationId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![MigrationId::new(1), MigrationId::new(2), MigrationId::new(3)]);
    }

    #[test]
    fn test_row_missing_column_is_null() {
        let row = RowData::new(vec![ColumnValue::BigInt(5)]);
        assert_eq!(row.column(0).as_bigint(), Some(5));
        assert_eq!(row.column(3), &ColumnValue::Null);
    }

    #[test]
    fn test_timestamp_column() {
        let value = ColumnValue::Timestamp(1_700_000_000_000);
        let ts = value.as_timestamp().unwrap();
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(ColumnValue::Null.as_timestamp(), None);
    }
}
