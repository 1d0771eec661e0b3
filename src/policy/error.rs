//! Adapter error types
//!
//! Validation failures are raised before anything is written, so a rejected
//! rule never leaves a partial row behind.

use thiserror::Error;

use super::types::{FIELD_COUNT, MAX_FIELD_LEN};

/// Errors raised by the rule store adapter
#[derive(Debug, Error)]
pub enum AdapterError {
    /// A rule field exceeds the bounded column width
    #[error("field v{index} is {len} characters long, maximum is {max}")]
    FieldTooLong { index: usize, len: usize, max: usize },

    /// The policy type tag exceeds the bounded column width
    #[error("ptype is {len} characters long, maximum is {max}")]
    PtypeTooLong { len: usize, max: usize },

    /// The policy type tag is required
    #[error("ptype must not be empty")]
    EmptyPtype,

    /// Rules wider than the fixed row are not representable
    #[error("rule has {0} fields, at most {} are supported", FIELD_COUNT)]
    TooManyFields(usize),

    /// Configured table name is not a plain SQL identifier
    #[error("invalid table name: {0:?}")]
    InvalidTableName(String),

    /// Connection mutex was poisoned by a panicking holder
    #[error("rule store lock poisoned")]
    LockPoisoned,

    /// Storage layer failure
    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Policy file I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdapterError {
    pub(crate) fn field_too_long(index: usize, len: usize) -> Self {
        AdapterError::FieldTooLong {
            index,
            len,
            max: MAX_FIELD_LEN,
        }
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;
