pub mod adapter;
pub mod error;
pub mod file;
pub mod filter;
pub mod model;
pub mod schema;
pub mod types;

pub use adapter::{create_rule, Adapter, SqliteAdapter};
pub use error::{AdapterError, Result};
pub use file::{load_policy_file, render_policy, write_policy_file};
pub use model::{load_policy_line, policy_line, MemoryModel, Model};
pub use types::{
    BatchMode, FieldFilter, Filter, Rule, StoredRow, FIELD_COUNT, MAX_FIELD_LEN, POLICY_SECTIONS,
};
