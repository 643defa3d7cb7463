// tests/rule_store.rs

mod common;
use crate::common::builders::RuleBuilder;

use std::path::Path;

use vgrid_events::rules::RuleStore;

fn store_with_neighbours() -> RuleStore {
    let store = RuleStore::new("/data");
    store.reload(
        "Project",
        vec![
            RuleBuilder::new("p-csv", "*.csv", "submit").template("j").build("Project"),
            RuleBuilder::new("p-all", "*", "submit").template("j").build("Project"),
        ],
    );
    store.reload(
        "Project-Management",
        vec![RuleBuilder::new("pm-csv", "*.csv", "submit").template("j").build("Project-Management")],
    );
    store.reload(
        "Project/Sub",
        vec![RuleBuilder::new("sub-csv", "*.csv", "submit").template("j").build("Project/Sub")],
    );
    store
}

#[test]
fn reload_replaces_only_the_named_workspace() {
    let store = store_with_neighbours();
    assert_eq!(store.rule_count(), 4);

    let kept = store.reload(
        "Project",
        vec![RuleBuilder::new("p-txt", "*.txt", "submit").template("j").build("Project")],
    );
    assert_eq!(kept, 1);
    assert_eq!(store.rule_count(), 3);
    assert_eq!(
        store.workspaces(),
        vec!["Project", "Project-Management", "Project/Sub"]
    );
}

#[test]
fn clear_leaves_prefix_sharing_workspaces_alone() {
    let store = store_with_neighbours();
    store.clear("Project");

    assert!(store.workspace_rules("Project").is_none());
    assert!(store.workspace_rules("Project-Management").is_some());
    assert!(store.workspace_rules("Project/Sub").is_some());
}

#[test]
fn active_targets_use_separator_terminated_prefix() {
    let store = store_with_neighbours();
    assert_eq!(
        store.active_targets(Path::new("/data/Project")),
        vec![
            "/data/Project/*".to_string(),
            "/data/Project/*.csv".to_string(),
            "/data/Project/Sub/*.csv".to_string(),
        ]
    );
    assert_eq!(
        store.active_targets(Path::new("/data/Project-Management")),
        vec!["/data/Project-Management/*.csv".to_string()]
    );
}

#[test]
fn rules_for_path_reports_hit_kind() {
    let store = store_with_neighbours();

    let mut direct: Vec<String> = store
        .rules_for_path(Path::new("/data/Project/a.csv"))
        .into_iter()
        .filter(|c| c.hit.direct)
        .map(|c| c.rule.rule_id.clone())
        .collect();
    direct.sort();
    assert_eq!(direct, vec!["p-all", "p-csv"]);

    let nested = store.rules_for_path(Path::new("/data/Project/Sub/a.csv"));
    let sub = nested
        .iter()
        .find(|c| c.rule.rule_id == "sub-csv")
        .expect("sub workspace rule matches");
    assert!(sub.hit.direct);
    let parent = nested
        .iter()
        .find(|c| c.rule.rule_id == "p-csv")
        .expect("parent rule matches recursively");
    assert!(!parent.hit.direct && parent.hit.recursive);
}

#[test]
fn reload_with_no_rules_removes_the_workspace() {
    let store = store_with_neighbours();
    assert_eq!(store.reload("Project", vec![]), 0);
    assert!(store.workspace_rules("Project").is_none());
    assert!(store.active_targets(Path::new("/data/Project")).iter().all(|t| t.contains("/Sub/")));
}
