//! Integration tests for the SQLite rule store adapter
//!
//! Drives the adapter the way a policy engine does: load into a model,
//! mutate through the adapter, and reload to observe what was persisted.

use anyhow::Result;
use tempfile::TempDir;

use rule_adapter::config::Config;
use rule_adapter::policy::{
    create_rule, load_policy_line, Adapter, Filter, MemoryModel, Model, Rule, SqliteAdapter,
};

/// Test helper to create an adapter over a temporary database file
fn setup_adapter() -> Result<(TempDir, SqliteAdapter)> {
    let temp_dir = TempDir::new()?;
    let mut config = Config::default();
    config.database.path = temp_dir.path().join("rules.db");

    let adapter = SqliteAdapter::open(&config)?;
    Ok((temp_dir, adapter))
}

fn seed(adapter: &SqliteAdapter) -> Result<()> {
    create_rule(adapter, "p", &["alice", "data1", "read"])?;
    create_rule(adapter, "p", &["bob", "data2", "write"])?;
    create_rule(adapter, "p", &["data2_admin", "data2", "read"])?;
    create_rule(adapter, "p", &["data2_admin", "data2", "write"])?;
    create_rule(adapter, "g", &["alice", "data2_admin"])?;
    Ok(())
}

fn rule(values: &[&str]) -> Rule {
    values.iter().map(|v| v.to_string()).collect()
}

/// Permission rules held by the model, as comparable tuples
fn p_rules(model: &MemoryModel) -> Vec<Rule> {
    let mut rules = model.policy("p", "p");
    rules.sort();
    rules
}

fn load_filtered(adapter: &SqliteAdapter, filter: &Filter) -> Result<MemoryModel> {
    let mut model = MemoryModel::new();
    adapter.load_filtered_policy(&mut model, filter)?;
    Ok(model)
}

fn load_all(adapter: &SqliteAdapter) -> Result<MemoryModel> {
    let mut model = MemoryModel::new();
    adapter.load_policy(&mut model)?;
    Ok(model)
}

#[test]
fn test_load_seeded_policy() -> Result<()> {
    let (_temp, adapter) = setup_adapter()?;
    seed(&adapter)?;

    let model = load_all(&adapter)?;
    assert_eq!(model.len(), 5);
    assert!(model.has_policy("p", "p", &["alice", "data1", "read"]));
    assert!(model.has_policy("g", "g", &["alice", "data2_admin"]));
    assert!(!adapter.is_filtered());
    Ok(())
}

#[test]
fn test_rules_persist_across_reopen() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut config = Config::default();
    config.database.path = temp_dir.path().join("nested").join("rules.db");

    {
        let adapter = SqliteAdapter::open(&config)?;
        adapter.add_policy("p", "p", &rule(&["eve", "data3", "read"]))?;
    }

    let adapter = SqliteAdapter::open(&config)?;
    let model = load_all(&adapter)?;
    assert!(model.has_policy("p", "p", &["eve", "data3", "read"]));
    Ok(())
}

#[test]
fn test_add_policy_round_trips() -> Result<()> {
    let (_temp, adapter) = setup_adapter()?;

    let rules = vec![
        rule(&["a"]),
        rule(&["a", "b"]),
        rule(&["a", "b", "c"]),
        rule(&["a", "b", "c", "d", "e", "f"]),
    ];
    for r in &rules {
        adapter.add_policy("p", "p", r)?;
    }

    let model = load_all(&adapter)?;
    assert_eq!(model.policy("p", "p"), rules);
    Ok(())
}

#[test]
fn test_add_policies() -> Result<()> {
    let (_temp, adapter) = setup_adapter()?;
    adapter.add_policies(
        "p",
        "p",
        &[rule(&["eve", "data3", "read"]), rule(&["eve", "data4", "read"])],
    )?;

    let model = load_all(&adapter)?;
    assert!(model.has_policy("p", "p", &["eve", "data3", "read"]));
    assert!(model.has_policy("p", "p", &["eve", "data4", "read"]));
    Ok(())
}

#[test]
fn test_remove_policy() -> Result<()> {
    let (_temp, adapter) = setup_adapter()?;
    let r = rule(&["alice", "data5", "read"]);

    adapter.add_policy("p", "p", &r)?;
    assert!(load_all(&adapter)?.has_policy("p", "p", &["alice", "data5", "read"]));

    assert!(adapter.remove_policy("p", "p", &r)?);
    assert!(load_all(&adapter)?.is_empty());
    assert!(!adapter.remove_policy("p", "p", &r)?);
    Ok(())
}

#[test]
fn test_remove_policies() -> Result<()> {
    let (_temp, adapter) = setup_adapter()?;
    let rules = vec![rule(&["alice", "data5", "read"]), rule(&["alice", "data6", "read"])];

    adapter.add_policies("p", "p", &rules)?;
    assert_eq!(load_all(&adapter)?.len(), 2);

    assert!(adapter.remove_policies("p", "p", &rules)?);
    assert!(load_all(&adapter)?.is_empty());
    Ok(())
}

#[test]
fn test_remove_filtered_policy_sequence() -> Result<()> {
    let (_temp, adapter) = setup_adapter()?;
    seed(&adapter)?;

    assert!(adapter.remove_filtered_policy("p", "p", 1, &rule(&["data1"]))?);
    let model = load_all(&adapter)?;
    assert!(!model.has_policy("p", "p", &["alice", "data1", "read"]));
    assert_eq!(model.len(), 4);

    assert!(adapter.remove_filtered_policy("p", "p", 1, &rule(&["data2", "read"]))?);
    assert_eq!(
        p_rules(&load_all(&adapter)?),
        vec![rule(&["bob", "data2", "write"]), rule(&["data2_admin", "data2", "write"])]
    );

    assert!(adapter.remove_filtered_policy("p", "p", 2, &rule(&["write"]))?);
    let model = load_all(&adapter)?;
    assert!(p_rules(&model).is_empty());
    // Grouping rules are a different type and survive
    assert!(model.has_policy("g", "g", &["alice", "data2_admin"]));
    Ok(())
}

#[test]
fn test_remove_filtered_then_by_action_leaves_admin_read() -> Result<()> {
    let (_temp, adapter) = setup_adapter()?;
    seed(&adapter)?;

    adapter.remove_filtered_policy("p", "p", 1, &rule(&["data1"]))?;
    adapter.remove_filtered_policy("p", "p", 2, &rule(&["write"]))?;

    assert_eq!(
        p_rules(&load_all(&adapter)?),
        vec![rule(&["data2_admin", "data2", "read"])]
    );
    Ok(())
}

#[test]
fn test_remove_filtered_leaves_empty_field_rows() -> Result<()> {
    let (_temp, adapter) = setup_adapter()?;
    seed(&adapter)?;
    create_rule(&adapter, "p", &["carol", "data3"])?;

    adapter.remove_filtered_policy("p", "p", 2, &rule(&["write"]))?;
    let model = load_all(&adapter)?;
    assert!(model.has_policy("p", "p", &["carol", "data3"]));
    assert!(model.has_policy("p", "p", &["alice", "data1", "read"]));
    assert!(model.has_policy("p", "p", &["data2_admin", "data2", "read"]));
    assert_eq!(p_rules(&model).len(), 3);
    Ok(())
}

#[test]
fn test_filter_by_field_one() -> Result<()> {
    let (_temp, adapter) = setup_adapter()?;
    seed(&adapter)?;

    let model = load_filtered(&adapter, &Filter::new().with_field(1, ["data2"]))?;
    assert!(adapter.is_filtered());
    assert_eq!(
        p_rules(&model),
        vec![
            rule(&["bob", "data2", "write"]),
            rule(&["data2_admin", "data2", "read"]),
            rule(&["data2_admin", "data2", "write"]),
        ]
    );
    // The grouping row's v1 is "data2_admin", not "data2"
    assert!(model.policy("g", "g").is_empty());
    Ok(())
}

#[test]
fn test_filter_table() -> Result<()> {
    let (_temp, adapter) = setup_adapter()?;
    seed(&adapter)?;

    let alice_read = rule(&["alice", "data1", "read"]);
    let bob_write = rule(&["bob", "data2", "write"]);
    let admin_read = rule(&["data2_admin", "data2", "read"]);
    let admin_write = rule(&["data2_admin", "data2", "write"]);

    let cases: Vec<(Filter, Vec<Rule>, usize)> = vec![
        (
            Filter::new().with_ptype(["p"]),
            vec![
                alice_read.clone(),
                bob_write.clone(),
                admin_read.clone(),
                admin_write.clone(),
            ],
            0,
        ),
        (Filter::new().with_field(0, ["alice"]), vec![alice_read.clone()], 1),
        (Filter::new().with_field(0, ["bob"]), vec![bob_write.clone()], 0),
        (
            Filter::new().with_field(0, ["data2_admin"]),
            vec![admin_read.clone(), admin_write.clone()],
            0,
        ),
        (
            Filter::new().with_field(0, ["alice", "bob"]),
            vec![alice_read.clone(), bob_write.clone()],
            1,
        ),
        (
            Filter::new()
                .with_field(0, ["alice", "bob"])
                .with_field(1, ["data1"]),
            vec![alice_read.clone()],
            0,
        ),
        (Filter::new().with_field(1, ["data1"]), vec![alice_read.clone()], 0),
        (
            Filter::new().with_field(1, ["data2"]),
            vec![bob_write.clone(), admin_read.clone(), admin_write.clone()],
            0,
        ),
        (
            Filter::new().with_field(2, ["read"]),
            vec![alice_read.clone(), admin_read.clone()],
            0,
        ),
        (
            Filter::new().with_field(2, ["write"]),
            vec![bob_write.clone(), admin_write.clone()],
            0,
        ),
    ];

    for (filter, expected_p, expected_g) in cases {
        let model = load_filtered(&adapter, &filter)?;
        assert_eq!(p_rules(&model), expected_p, "filter {:?}", filter);
        assert_eq!(
            model.policy("g", "g").len(),
            expected_g,
            "filter {:?}",
            filter
        );
    }
    Ok(())
}

#[test]
fn test_unconstrained_filter_equals_full_load() -> Result<()> {
    let (_temp, adapter) = setup_adapter()?;
    seed(&adapter)?;

    let full = load_all(&adapter)?;
    let filtered = load_filtered(&adapter, &Filter::default())?;
    assert_eq!(filtered, full);

    let from_lists = load_filtered(
        &adapter,
        &Filter::from_lists(vec![], Default::default()),
    )?;
    assert_eq!(from_lists, full);
    Ok(())
}

#[test]
fn test_save_policy_overwrites_and_is_idempotent() -> Result<()> {
    let (_temp, adapter) = setup_adapter()?;
    create_rule(&adapter, "p", &["stale", "data9", "read"])?;

    let mut model = MemoryModel::new();
    for line in [
        "p, alice, data1, read",
        "p, bob, data2, write",
        "p, data2_admin, data2, read",
        "p, data2_admin, data2, write",
        "g, alice, data2_admin",
    ] {
        load_policy_line(line, &mut model);
    }

    adapter.save_policy(&model)?;
    let once: Vec<String> = adapter
        .rows(&Filter::default())?
        .iter()
        .map(|r| r.to_string())
        .collect();

    adapter.save_policy(&model)?;
    let twice: Vec<String> = adapter
        .rows(&Filter::default())?
        .iter()
        .map(|r| r.to_string())
        .collect();

    assert_eq!(once, twice);
    assert_eq!(once.len(), 5);
    assert!(!once.contains(&"p, stale, data9, read".to_string()));
    assert_eq!(load_all(&adapter)?, model);
    Ok(())
}

#[test]
fn test_save_policy_skips_model_without_sections() -> Result<()> {
    let (_temp, adapter) = setup_adapter()?;
    seed(&adapter)?;

    adapter.save_policy(&MemoryModel::new())?;
    assert!(load_all(&adapter)?.is_empty());
    Ok(())
}

#[test]
fn test_gap_in_fields_truncates_on_load() -> Result<()> {
    let (_temp, adapter) = setup_adapter()?;
    adapter.add_policy("p", "p", &rule(&["alice", "", "read"]))?;

    let row = &adapter.rows(&Filter::default())?[0];
    assert_eq!(row.fields[2], "read");

    let model = load_all(&adapter)?;
    assert_eq!(model.policy("p", "p"), vec![rule(&["alice"])]);
    Ok(())
}
