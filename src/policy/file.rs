//! Plain-text policy files
//!
//! One rule per line, `ptype, v0, v1, ...`, with `#` comments allowed.

use std::path::Path;

use super::error::Result;
use super::model::{load_policy_line, policy_line, Model};
use super::types::POLICY_SECTIONS;

/// Read a policy file into the model; returns the number of lines processed
pub fn load_policy_file(path: &Path, model: &mut dyn Model) -> Result<usize> {
    let content = std::fs::read_to_string(path)?;
    let mut lines = 0;
    for line in content.lines() {
        load_policy_line(line, model);
        lines += 1;
    }
    tracing::debug!("Read {} lines from {:?}", lines, path);
    Ok(lines)
}

/// Render the model's `p` and `g` sections as policy file text
pub fn render_policy(model: &dyn Model) -> String {
    let mut out = String::new();
    for sec in POLICY_SECTIONS {
        for ptype in model.ptypes(sec) {
            for rule in model.policy(sec, &ptype) {
                out.push_str(&policy_line(&ptype, &rule));
                out.push('\n');
            }
        }
    }
    out
}

pub fn write_policy_file(path: &Path, model: &dyn Model) -> Result<()> {
    std::fs::write(path, render_policy(model))?;
    Ok(())
}
