use rusqlite::Connection;

use super::error::{AdapterError, Result};

pub const SCHEMA_VERSION: u32 = 1;

/// Table used when the configuration doesn't name one
pub const DEFAULT_TABLE: &str = "casbin_rule";

/// Reject table names that would need quoting
///
/// The name is interpolated into SQL text, so only plain identifiers are
/// accepted.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid && !name.to_ascii_lowercase().starts_with("sqlite_") {
        Ok(())
    } else {
        Err(AdapterError::InvalidTableName(name.to_string()))
    }
}

/// Create the rule table and its bookkeeping (idempotent)
pub fn create_tables(conn: &Connection, table: &str) -> Result<()> {
    validate_table_name(table)?;

    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS rule_adapter_schema (
            table_name TEXT PRIMARY KEY,
            version INTEGER NOT NULL,
            applied_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ptype TEXT NOT NULL,
            v0 TEXT,
            v1 TEXT,
            v2 TEXT,
            v3 TEXT,
            v4 TEXT,
            v5 TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_{table}_ptype ON {table}(ptype);
        "#
    ))?;

    Ok(())
}

/// Record the schema version for a rule table
pub fn init_schema_version(conn: &Connection, table: &str) -> Result<()> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO rule_adapter_schema (table_name, version, applied_at)
         VALUES (?1, ?2, datetime('now'))",
        (table, SCHEMA_VERSION),
    )?;
    if inserted > 0 {
        tracing::info!("Created rule table '{}' (schema v{})", table, SCHEMA_VERSION);
    }
    Ok(())
}
