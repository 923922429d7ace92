use std::collections::BTreeMap;

use crate::config::ScalarValue;

pub struct QueryBuilder;

/// Decide whether a strategy options clause is emitted at all.
/// Absent and empty mappings are treated the same: no clause.
pub fn normalize_strategy_options(
    options: Option<&BTreeMap<String, ScalarValue>>,
) -> Option<&BTreeMap<String, ScalarValue>> {
    options.filter(|o| !o.is_empty())
}

impl QueryBuilder {
    /// Build the CREATE KEYSPACE statement, one `AND strategy_options:<key> = <value>`
    /// clause per option
    pub fn build_create_keyspace_cmd(
        name: &str,
        strategy_class: &str,
        strategy_options: Option<&BTreeMap<String, ScalarValue>>,
    ) -> String {
        let mut cmd = format!(
            "CREATE KEYSPACE {} WITH strategy_class = '{}'",
            name, strategy_class
        );

        if let Some(options) = normalize_strategy_options(strategy_options) {
            for (key, value) in options {
                cmd.push_str(&format!(" AND strategy_options:{} = {}", key, value));
            }
        }

        cmd
    }

    pub fn build_use_keyspace_cmd(name: &str) -> String {
        format!("USE {}", name)
    }

    pub fn build_drop_keyspace_cmd(name: &str) -> String {
        format!("DROP KEYSPACE {}", name)
    }
}

/// Quote a string literal for inline CQL
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
