use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::config::{AdapterConfig, Config};
use crate::policy::{
    error::{AdapterError, Result},
    filter::{compile_exact, compile_filter, compile_partial, WhereClause},
    model::{load_policy_line, Model},
    schema,
    types::*,
};

/// Persistence interface the policy engine drives
///
/// Every call is its own transaction. Batch calls (`add_policies`,
/// `remove_policies`) are NOT atomic unless the adapter was configured with
/// [`BatchMode::Atomic`]: a failure on one rule leaves the rules before it
/// committed and skips the rest.
pub trait Adapter {
    /// Load every stored rule into the model
    fn load_policy(&self, model: &mut dyn Model) -> Result<()>;

    /// Load only the rules matching `filter`; marks the adapter as filtered
    fn load_filtered_policy(&self, model: &mut dyn Model, filter: &Filter) -> Result<()>;

    /// Replace the stored rule set with the model's `p` and `g` sections
    fn save_policy(&self, model: &dyn Model) -> Result<()>;

    /// Delete every stored rule
    fn clear_policy(&self) -> Result<()>;

    fn add_policy(&self, sec: &str, ptype: &str, rule: &[String]) -> Result<()>;

    fn add_policies(&self, sec: &str, ptype: &str, rules: &[Rule]) -> Result<()>;

    /// Remove rows equal to `rule`, trailing fields compared against `""`
    fn remove_policy(&self, sec: &str, ptype: &str, rule: &[String]) -> Result<bool>;

    fn remove_policies(&self, sec: &str, ptype: &str, rules: &[Rule]) -> Result<bool>;

    /// Remove rows whose fields from `field_index` on match `field_values`
    ///
    /// Returns `Ok(false)` without touching storage when no values are given
    /// or the index span falls outside the row.
    fn remove_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<bool>;

    /// Whether the last load was a filtered one
    fn is_filtered(&self) -> bool;
}

/// Rule store adapter backed by a single SQLite table
pub struct SqliteAdapter {
    conn: Mutex<Connection>,
    table: String,
    batch_mode: BatchMode,
    filtered: AtomicBool,
}

impl SqliteAdapter {
    /// Wrap a caller-supplied connection, creating the rule table if needed
    pub fn new(conn: Connection, options: &AdapterConfig) -> Result<Self> {
        schema::create_tables(&conn, &options.table)?;
        schema::init_schema_version(&conn, &options.table)?;

        Ok(Self {
            conn: Mutex::new(conn),
            table: options.table.clone(),
            batch_mode: options.batch_mode,
            filtered: AtomicBool::new(false),
        })
    }

    /// Open the database described by the configuration
    pub fn open(config: &Config) -> Result<Self> {
        let db = &config.database;
        let conn = if db.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            Self::open_file(&db.path)?
        };

        if !db.is_in_memory() {
            conn.pragma_update(None, "journal_mode", db.journal_mode.as_str())?;
        }
        conn.busy_timeout(Duration::from_millis(db.busy_timeout_ms))?;
        conn.pragma_update(None, "synchronous", db.synchronous.as_str())?;

        tracing::debug!(
            "Opened rule store {:?} (journal={}, synchronous={})",
            db.path,
            db.journal_mode,
            db.synchronous
        );
        Self::new(conn, &config.adapter)
    }

    /// In-memory store with default options
    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?, &AdapterConfig::default())
    }

    fn open_file(path: &Path) -> Result<Connection> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(Connection::open(path)?)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn batch_mode(&self) -> BatchMode {
        self.batch_mode
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| AdapterError::LockPoisoned)
    }

    /// Stored rows matching `filter`, in insertion order
    pub fn rows(&self, filter: &Filter) -> Result<Vec<StoredRow>> {
        let conn = self.lock()?;
        select_rows(&conn, &self.table, &compile_filter(filter))
    }

    /// Validate and insert one rule in its own transaction
    pub(crate) fn insert_rule<S: AsRef<str>>(&self, ptype: &str, rule: &[S]) -> Result<StoredRow> {
        validate_ptype(ptype)?;
        let fields = padded_fields(rule)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let id = insert_row(&tx, &self.table, ptype, &fields)?;
        tx.commit()?;

        Ok(StoredRow {
            id,
            ptype: ptype.to_string(),
            fields,
        })
    }

    fn delete_matching(&self, clause: &WhereClause) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = delete_rows(&tx, &self.table, clause)?;
        tx.commit()?;
        Ok(removed)
    }

    fn load_matching(&self, model: &mut dyn Model, filter: &Filter) -> Result<usize> {
        // Release the connection before handing lines to the model
        let rows = self.rows(filter)?;
        for row in &rows {
            load_policy_line(&row.to_string(), model);
        }
        Ok(rows.len())
    }
}

impl Adapter for SqliteAdapter {
    fn load_policy(&self, model: &mut dyn Model) -> Result<()> {
        let count = self.load_matching(model, &Filter::default())?;
        self.filtered.store(false, Ordering::SeqCst);
        tracing::debug!("Loaded {} rules from '{}'", count, self.table);
        Ok(())
    }

    fn load_filtered_policy(&self, model: &mut dyn Model, filter: &Filter) -> Result<()> {
        let count = self.load_matching(model, filter)?;
        self.filtered.store(true, Ordering::SeqCst);
        tracing::debug!("Loaded {} filtered rules from '{}'", count, self.table);
        Ok(())
    }

    fn save_policy(&self, model: &dyn Model) -> Result<()> {
        if self.is_filtered() {
            tracing::warn!(
                "Saving policy to '{}' after a filtered load; rules outside the filter will be lost",
                self.table
            );
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(&format!("DELETE FROM {}", self.table), [])?;

        let mut saved = 0;
        for sec in POLICY_SECTIONS {
            if !model.has_section(sec) {
                continue;
            }
            for ptype in model.ptypes(sec) {
                validate_ptype(&ptype)?;
                for rule in model.policy(sec, &ptype) {
                    let fields = padded_fields(&rule)?;
                    insert_row(&tx, &self.table, &ptype, &fields)?;
                    saved += 1;
                }
            }
        }

        tx.commit()?;
        tracing::info!("Saved {} rules to '{}'", saved, self.table);
        Ok(())
    }

    fn clear_policy(&self) -> Result<()> {
        let removed = self.delete_matching(&WhereClause::default())?;
        tracing::debug!("Cleared {} rules from '{}'", removed, self.table);
        Ok(())
    }

    fn add_policy(&self, _sec: &str, ptype: &str, rule: &[String]) -> Result<()> {
        let row = self.insert_rule(ptype, rule)?;
        tracing::debug!("Added {}", row.repr());
        Ok(())
    }

    fn add_policies(&self, sec: &str, ptype: &str, rules: &[Rule]) -> Result<()> {
        match self.batch_mode {
            BatchMode::PerRule => {
                for rule in rules {
                    self.add_policy(sec, ptype, rule)?;
                }
            }
            BatchMode::Atomic => {
                validate_ptype(ptype)?;
                let mut conn = self.lock()?;
                let tx = conn.transaction()?;
                for rule in rules {
                    let fields = padded_fields(rule)?;
                    insert_row(&tx, &self.table, ptype, &fields)?;
                }
                tx.commit()?;
                tracing::debug!("Added {} '{}' rules in one transaction", rules.len(), ptype);
            }
        }
        Ok(())
    }

    fn remove_policy(&self, _sec: &str, ptype: &str, rule: &[String]) -> Result<bool> {
        // A rule wider than the row can't have been stored
        if rule.len() > FIELD_COUNT {
            return Ok(false);
        }
        let mut fields: [String; FIELD_COUNT] = Default::default();
        for (slot, value) in fields.iter_mut().zip(rule) {
            slot.clone_from(value);
        }

        let removed = self.delete_matching(&compile_exact(ptype, &fields))?;
        tracing::debug!("Removed {} rows for '{}' rule {:?}", removed, ptype, rule);
        Ok(removed > 0)
    }

    fn remove_policies(&self, sec: &str, ptype: &str, rules: &[Rule]) -> Result<bool> {
        match self.batch_mode {
            BatchMode::PerRule => {
                let mut any = false;
                for rule in rules {
                    any |= self.remove_policy(sec, ptype, rule)?;
                }
                Ok(any)
            }
            BatchMode::Atomic => {
                let mut conn = self.lock()?;
                let tx = conn.transaction()?;
                let mut removed = 0;
                for rule in rules.iter().filter(|r| r.len() <= FIELD_COUNT) {
                    let mut fields: [String; FIELD_COUNT] = Default::default();
                    for (slot, value) in fields.iter_mut().zip(rule) {
                        slot.clone_from(value);
                    }
                    removed += delete_rows(&tx, &self.table, &compile_exact(ptype, &fields))?;
                }
                tx.commit()?;
                tracing::debug!("Removed {} '{}' rows in one transaction", removed, ptype);
                Ok(removed > 0)
            }
        }
    }

    fn remove_filtered_policy(
        &self,
        _sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<bool> {
        let in_row = field_index < FIELD_COUNT
            && !field_values.is_empty()
            && field_values.len() <= FIELD_COUNT - field_index;
        if !in_row {
            tracing::debug!(
                "Ignoring filtered removal with field index {} and {} values",
                field_index,
                field_values.len()
            );
            return Ok(false);
        }

        let removed = self.delete_matching(&compile_partial(ptype, field_index, field_values))?;
        tracing::debug!(
            "Removed {} '{}' rows matching {:?} from v{}",
            removed,
            ptype,
            field_values,
            field_index
        );
        Ok(removed > 0)
    }

    fn is_filtered(&self) -> bool {
        self.filtered.load(Ordering::SeqCst)
    }
}

/// Seed a row directly, bypassing the policy engine
pub fn create_rule<S: AsRef<str>>(
    adapter: &SqliteAdapter,
    ptype: &str,
    fields: &[S],
) -> Result<StoredRow> {
    adapter.insert_rule(ptype, fields)
}

fn insert_row(
    conn: &Connection,
    table: &str,
    ptype: &str,
    fields: &[String; FIELD_COUNT],
) -> Result<i64> {
    conn.execute(
        &format!(
            "INSERT INTO {} (ptype, v0, v1, v2, v3, v4, v5) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            table
        ),
        params![
            ptype, &fields[0], &fields[1], &fields[2], &fields[3], &fields[4], &fields[5]
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn delete_rows(conn: &Connection, table: &str, clause: &WhereClause) -> Result<usize> {
    let sql = format!("DELETE FROM {}{}", table, clause.to_sql_suffix());
    Ok(conn.execute(&sql, params_from_iter(clause.params.iter()))?)
}

fn select_rows(conn: &Connection, table: &str, clause: &WhereClause) -> Result<Vec<StoredRow>> {
    let sql = format!(
        "SELECT id, ptype, v0, v1, v2, v3, v4, v5 FROM {}{} ORDER BY id",
        table,
        clause.to_sql_suffix()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(clause.params.iter()), |row| {
        let mut fields: [String; FIELD_COUNT] = Default::default();
        for (i, field) in fields.iter_mut().enumerate() {
            *field = row.get::<_, Option<String>>(i + 2)?.unwrap_or_default();
        }
        Ok(StoredRow {
            id: row.get(0)?,
            ptype: row.get(1)?,
            fields,
        })
    })?;

    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}
