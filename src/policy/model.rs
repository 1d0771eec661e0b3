//! Policy model interface
//!
//! The adapter never evaluates rules. It only needs a place to put loaded
//! rules and a way to read them back when saving, which is what [`Model`]
//! describes. [`MemoryModel`] is a plain rule container implementing it.

use std::collections::BTreeMap;

use super::types::Rule;

/// In-memory policy model as seen by the adapter
pub trait Model {
    /// Whether the model defines the section (`p`, `g`, ...)
    fn has_section(&self, sec: &str) -> bool;

    /// Policy types held in a section, in iteration order
    fn ptypes(&self, sec: &str) -> Vec<String>;

    /// Rules stored under a policy type
    fn policy(&self, sec: &str, ptype: &str) -> Vec<Rule>;

    /// Add a rule; returns false if it was already present
    fn add_policy(&mut self, sec: &str, ptype: &str, rule: Rule) -> bool;

    /// Drop every rule, keeping the section layout
    fn clear_policy(&mut self);
}

/// Parse one policy line (`p, alice, data1, read`) into the model
///
/// Blank lines and `#` comments are skipped. The section is the first
/// character of the type tag.
pub fn load_policy_line(line: &str, model: &mut dyn Model) {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return;
    }

    let mut tokens = line.split(',').map(|t| t.trim().to_string());
    let Some(ptype) = tokens.next() else {
        return;
    };
    let Some(first) = ptype.chars().next() else {
        return;
    };
    let sec = first.to_string();
    let rule: Rule = tokens.collect();

    if !model.add_policy(&sec, &ptype, rule) {
        tracing::trace!("Skipped duplicate policy line: {}", line);
    }
}

/// Render a rule back into a policy line
pub fn policy_line(ptype: &str, rule: &[String]) -> String {
    let mut line = ptype.to_string();
    for v in rule {
        line.push_str(", ");
        line.push_str(v);
    }
    line
}

/// Rule container keyed by section, then policy type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryModel {
    sections: BTreeMap<String, BTreeMap<String, Vec<Rule>>>,
}

impl MemoryModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a section up front so it exists even while empty
    pub fn with_section(mut self, sec: &str) -> Self {
        self.sections.entry(sec.to_string()).or_default();
        self
    }

    /// Whether the exact rule is present
    pub fn has_policy(&self, sec: &str, ptype: &str, rule: &[&str]) -> bool {
        self.sections
            .get(sec)
            .and_then(|ptypes| ptypes.get(ptype))
            .map(|rules| {
                rules
                    .iter()
                    .any(|r| r.len() == rule.len() && r.iter().zip(rule).all(|(a, b)| a == b))
            })
            .unwrap_or(false)
    }

    /// Total number of rules across all sections
    pub fn len(&self) -> usize {
        self.sections
            .values()
            .flat_map(|ptypes| ptypes.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Model for MemoryModel {
    fn has_section(&self, sec: &str) -> bool {
        self.sections.contains_key(sec)
    }

    fn ptypes(&self, sec: &str) -> Vec<String> {
        self.sections
            .get(sec)
            .map(|ptypes| ptypes.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn policy(&self, sec: &str, ptype: &str) -> Vec<Rule> {
        self.sections
            .get(sec)
            .and_then(|ptypes| ptypes.get(ptype))
            .cloned()
            .unwrap_or_default()
    }

    fn add_policy(&mut self, sec: &str, ptype: &str, rule: Rule) -> bool {
        let rules = self
            .sections
            .entry(sec.to_string())
            .or_default()
            .entry(ptype.to_string())
            .or_default();
        if rules.contains(&rule) {
            return false;
        }
        rules.push(rule);
        true
    }

    fn clear_policy(&mut self) {
        for ptypes in self.sections.values_mut() {
            for rules in ptypes.values_mut() {
                rules.clear();
            }
        }
    }
}
