//! Static table-load configuration.

use serde::{Deserialize, Serialize};

/// How a table load treats rows already present in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
    /// Insert the source rows without deleting anything first.
    ///
    /// Re-running is only idempotent when the source query is itself
    /// deduplicating (e.g. `SELECT DISTINCT`); that is the caller's contract.
    Append,
    /// Delete every existing row, then insert the source rows.
    TruncateInsert,
}

impl LoadPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::TruncateInsert => "truncate_insert",
        }
    }
}

impl std::fmt::Display for LoadPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of a dimension or fact table load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Target table, optionally schema-qualified.
    pub table: String,
    /// Explicit target column list; empty means positional insert.
    #[serde(default)]
    pub columns: Vec<String>,
    /// `SELECT` over staging that produces the rows to load.
    #[serde(rename = "sql")]
    pub select_sql: String,
    pub policy: LoadPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_deserializes_with_sql_alias() {
        let descriptor: TableDescriptor = serde_json::from_value(serde_json::json!({
            "table": "users",
            "columns": ["user_id", "first_name"],
            "sql": "SELECT DISTINCT userId, firstName FROM staging_events",
            "policy": "truncate_insert",
        }))
        .unwrap();
        assert_eq!(descriptor.policy, LoadPolicy::TruncateInsert);
        assert_eq!(descriptor.columns, vec!["user_id", "first_name"]);
        assert_eq!(
            descriptor.select_sql,
            "SELECT DISTINCT userId, firstName FROM staging_events"
        );
    }

    #[test]
    fn columns_default_to_empty() {
        let descriptor: TableDescriptor = serde_json::from_value(serde_json::json!({
            "table": "songplays",
            "sql": "SELECT 1",
            "policy": "append",
        }))
        .unwrap();
        assert!(descriptor.columns.is_empty());
        assert_eq!(descriptor.policy.to_string(), "append");
    }
}
