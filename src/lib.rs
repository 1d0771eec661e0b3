//! rule-adapter: SQLite persistence for access-control policy rules
//!
//! This library provides:
//! - A rule store adapter that loads policy rules into an engine's model and
//!   persists additions, removals and full overwrites
//! - Filtered loading by per-field value sets
//! - Policy file import/export
//! - The `ruleadm` command line tool for inspecting rule databases

pub mod config;
pub mod policy;
pub mod transport;

pub use config::Config;
pub use policy::{
    create_rule, Adapter, AdapterError, FieldFilter, Filter, MemoryModel, Model, SqliteAdapter,
    StoredRow,
};
