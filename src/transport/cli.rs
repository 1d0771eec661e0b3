//! CLI command handlers for `ruleadm`

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

use crate::policy::{
    load_policy_file, render_policy, write_policy_file, Adapter, Filter, MemoryModel, Model,
    SqliteAdapter, POLICY_SECTIONS,
};

/// Section a policy type belongs to (`p2` lives in `p`)
fn section_of(ptype: &str) -> &str {
    ptype
        .chars()
        .next()
        .map_or(ptype, |first| &ptype[..first.len_utf8()])
}

/// List stored rows matching a filter
pub fn run_list(adapter: &SqliteAdapter, filter: &Filter, format: &str) -> Result<()> {
    let rows = adapter.rows(filter)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => {
            if rows.is_empty() {
                println!("No rules found in '{}'.", adapter.table());
                return Ok(());
            }

            #[derive(Tabled)]
            struct RuleRow {
                #[tabled(rename = "ID")]
                id: i64,
                #[tabled(rename = "Type")]
                ptype: String,
                #[tabled(rename = "Rule")]
                rule: String,
            }

            let data: Vec<RuleRow> = rows
                .iter()
                .map(|r| RuleRow {
                    id: r.id,
                    ptype: r.ptype.clone(),
                    rule: r.rule().join(", "),
                })
                .collect();

            let mut table = Table::new(data);
            table.with(Style::rounded());
            println!("{}", table);
            println!("{} rule(s)", rows.len());
        }
    }

    Ok(())
}

pub fn run_add(adapter: &SqliteAdapter, ptype: &str, fields: &[String]) -> Result<()> {
    adapter
        .add_policy(section_of(ptype), ptype, fields)
        .with_context(|| format!("Failed to add '{}' rule", ptype))?;
    println!("{} {}, {}", "added".green(), ptype, fields.join(", "));
    Ok(())
}

pub fn run_remove(adapter: &SqliteAdapter, ptype: &str, fields: &[String]) -> Result<()> {
    if adapter.remove_policy(section_of(ptype), ptype, fields)? {
        println!("{} {}, {}", "removed".green(), ptype, fields.join(", "));
    } else {
        println!("{} no matching rule", "unchanged".yellow());
    }
    Ok(())
}

pub fn run_remove_filtered(
    adapter: &SqliteAdapter,
    ptype: &str,
    field_index: usize,
    values: &[String],
) -> Result<()> {
    if adapter.remove_filtered_policy(section_of(ptype), ptype, field_index, values)? {
        println!(
            "{} '{}' rules matching [{}] from v{}",
            "removed".green(),
            ptype,
            values.join(", "),
            field_index
        );
    } else {
        println!("{} no matching rule", "unchanged".yellow());
    }
    Ok(())
}

/// Load a policy file into the store, replacing or appending
pub fn run_import(adapter: &SqliteAdapter, path: &Path, append: bool) -> Result<()> {
    let mut model = MemoryModel::new();
    load_policy_file(path, &mut model)
        .with_context(|| format!("Failed to read policy file: {}", path.display()))?;

    if append {
        for sec in POLICY_SECTIONS {
            for ptype in model.ptypes(sec) {
                adapter.add_policies(sec, &ptype, &model.policy(sec, &ptype))?;
            }
        }
    } else {
        adapter.save_policy(&model)?;
    }

    let verb = if append { "appended" } else { "imported" };
    println!(
        "{} {} rule(s) from {}",
        verb.green(),
        model.len(),
        path.display()
    );
    Ok(())
}

/// Write the full stored policy to a file, or stdout
pub fn run_export(adapter: &SqliteAdapter, path: Option<&Path>) -> Result<()> {
    let mut model = MemoryModel::new();
    adapter.load_policy(&mut model)?;

    match path {
        Some(path) => {
            write_policy_file(path, &model)
                .with_context(|| format!("Failed to write policy file: {}", path.display()))?;
            tracing::info!("Exported {} rules to {:?}", model.len(), path);
        }
        None => print!("{}", render_policy(&model)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::create_rule;
    use tempfile::TempDir;

    #[test]
    fn test_section_of() {
        assert_eq!(section_of("p"), "p");
        assert_eq!(section_of("g2"), "g");
        assert_eq!(section_of(""), "");
        assert_eq!(section_of("élan"), "é");
    }

    #[test]
    fn test_import_replaces_and_appends() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("policy.csv");
        std::fs::write(&path, "p, alice, data1, read\ng, alice, admin\n").unwrap();

        let adapter = SqliteAdapter::open_in_memory().unwrap();
        create_rule(&adapter, "p", &["stale", "data", "read"]).unwrap();

        run_import(&adapter, &path, false).unwrap();
        let rendered: Vec<String> = adapter
            .rows(&Filter::new())
            .unwrap()
            .iter()
            .map(|r| r.to_string())
            .collect();
        assert_eq!(rendered, vec!["p, alice, data1, read", "g, alice, admin"]);

        run_import(&adapter, &path, true).unwrap();
        assert_eq!(adapter.rows(&Filter::new()).unwrap().len(), 4);
    }

    #[test]
    fn test_export_to_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("export.csv");

        let adapter = SqliteAdapter::open_in_memory().unwrap();
        create_rule(&adapter, "g", &["alice", "admin"]).unwrap();
        create_rule(&adapter, "p", &["admin", "data", "write"]).unwrap();

        run_export(&adapter, Some(&path)).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "p, admin, data, write\ng, alice, admin\n");
    }
}
