use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::error::{AdapterError, Result};

/// Number of positional fields in a stored row (`v0`..`v5`)
pub const FIELD_COUNT: usize = 6;

/// Column width for the type tag and every field
pub const MAX_FIELD_LEN: usize = 255;

/// Sections of the model that hold rule data, in save order
pub const POLICY_SECTIONS: [&str; 2] = ["p", "g"];

/// Logical rule: the field values of a policy line, without its type tag
pub type Rule = Vec<String>;

/// Persisted rule row
///
/// Rows are fixed-width while rules are not. A rule of fewer than
/// [`FIELD_COUNT`] values is padded with empty strings, and a row renders
/// back to a rule by taking fields up to the first empty one. Fields after
/// the first empty field are never rendered, so `["a", "", "c"]` reads back
/// as `["a"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRow {
    pub id: i64,
    pub ptype: String,
    pub fields: [String; FIELD_COUNT],
}

impl StoredRow {
    /// Leading non-empty fields, i.e. the rule this row reconstructs to
    pub fn rule(&self) -> Rule {
        self.fields
            .iter()
            .take_while(|v| !v.is_empty())
            .cloned()
            .collect()
    }

    /// Diagnostic form: `<CasbinRule 7: "p, alice, data1, read">`
    pub fn repr(&self) -> String {
        format!("<CasbinRule {}: \"{}\">", self.id, self)
    }
}

impl fmt::Display for StoredRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ptype)?;
        for v in self.fields.iter().take_while(|v| !v.is_empty()) {
            write!(f, ", {}", v)?;
        }
        Ok(())
    }
}

/// Validate a type tag against the column constraints
pub(crate) fn validate_ptype(ptype: &str) -> Result<()> {
    if ptype.is_empty() {
        return Err(AdapterError::EmptyPtype);
    }
    let len = ptype.chars().count();
    if len > MAX_FIELD_LEN {
        return Err(AdapterError::PtypeTooLong {
            len,
            max: MAX_FIELD_LEN,
        });
    }
    Ok(())
}

/// Pad a rule to the fixed row width, rejecting values the column can't hold
pub(crate) fn padded_fields<S: AsRef<str>>(rule: &[S]) -> Result<[String; FIELD_COUNT]> {
    if rule.len() > FIELD_COUNT {
        return Err(AdapterError::TooManyFields(rule.len()));
    }

    let mut fields: [String; FIELD_COUNT] = Default::default();
    for (index, value) in rule.iter().enumerate() {
        let value = value.as_ref();
        let len = value.chars().count();
        if len > MAX_FIELD_LEN {
            return Err(AdapterError::field_too_long(index, len));
        }
        fields[index] = value.to_string();
    }
    Ok(fields)
}

/// Constraint on a single row dimension
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldFilter {
    /// Any value matches, including the empty string
    #[default]
    Unconstrained,
    /// The value must be one of the set; an empty set matches nothing
    OneOf(BTreeSet<String>),
}

impl FieldFilter {
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldFilter::OneOf(values.into_iter().map(Into::into).collect())
    }

    /// Build from a plain list where an empty list means no constraint
    pub fn from_list<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if set.is_empty() {
            FieldFilter::Unconstrained
        } else {
            FieldFilter::OneOf(set)
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        matches!(self, FieldFilter::Unconstrained)
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            FieldFilter::Unconstrained => true,
            FieldFilter::OneOf(set) => set.contains(value),
        }
    }
}

/// Row selection for filtered loads
///
/// Each of the seven dimensions (type tag plus `v0`..`v5`) is constrained
/// independently, and a row must satisfy all of them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Filter {
    pub ptype: FieldFilter,
    pub fields: [FieldFilter; FIELD_COUNT],
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Legacy list form: every empty list leaves its dimension unconstrained
    pub fn from_lists(ptype: Vec<String>, fields: [Vec<String>; FIELD_COUNT]) -> Self {
        Self {
            ptype: FieldFilter::from_list(ptype),
            fields: fields.map(FieldFilter::from_list),
        }
    }

    pub fn with_ptype<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ptype = FieldFilter::one_of(values);
        self
    }

    /// Constrain field `v{index}`; an index past the row width is ignored
    pub fn with_field<I, S>(mut self, index: usize, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self.fields.get_mut(index) {
            Some(slot) => *slot = FieldFilter::one_of(values),
            None => tracing::warn!("Ignoring filter on nonexistent field v{}", index),
        }
        self
    }

    pub fn is_unconstrained(&self) -> bool {
        self.ptype.is_unconstrained() && self.fields.iter().all(FieldFilter::is_unconstrained)
    }

    /// Evaluate the filter against a row already in memory
    pub fn matches(&self, row: &StoredRow) -> bool {
        self.ptype.matches(&row.ptype)
            && self
                .fields
                .iter()
                .zip(row.fields.iter())
                .all(|(filter, value)| filter.matches(value))
    }
}

/// How multi-rule mutations are committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// One transaction per rule; a failure leaves earlier rules committed
    #[default]
    PerRule,
    /// All rules of a batch commit or roll back together
    Atomic,
}

impl BatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchMode::PerRule => "per_rule",
            BatchMode::Atomic => "atomic",
        }
    }
}

impl FromStr for BatchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "per_rule" => Ok(BatchMode::PerRule),
            "atomic" => Ok(BatchMode::Atomic),
            _ => Err(format!("Invalid batch mode: {}", s)),
        }
    }
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
