//! Dependency resolution through the manager

mod common;

use common::TestEnv;
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn test_any_constraint_is_met_exactly_when_enabled() {
    let env = TestEnv::new();
    env.create_module(json!({"name": "Users", "version": "1.0.0"}));
    env.create_module(json!({"name": "Blog", "dependencies": {"Users": "*"}}));
    let manager = env.manager();

    assert_eq!(manager.check_dependencies("Blog"), vec!["Users".to_string()]);
    manager.enable("Users").unwrap();
    assert!(manager.check_dependencies("Blog").is_empty());
    manager.disable("Users").unwrap();
    assert_eq!(manager.check_dependencies("Blog"), vec!["Users".to_string()]);
}

#[test]
fn test_caret_constraint_against_installed_version() {
    let env = TestEnv::new();
    env.create_module(json!({"name": "Users", "version": "1.5.0"}));
    env.create_module(json!({"name": "Blog", "dependencies": {"Users": "^1.0"}}));
    let manager = env.manager();
    manager.enable("Users").unwrap();
    assert!(manager.check_dependencies("Blog").is_empty());

    // Upgrading the dependency past the major version breaks the constraint
    env.create_module(json!({"name": "Users", "version": "2.0.0"}));
    let manager = env.manager();
    assert_eq!(
        manager.check_dependencies("Blog"),
        vec!["Users (^1.0)".to_string()]
    );
}

#[test]
fn test_enabling_ignores_unmet_dependencies() {
    let env = TestEnv::new();
    env.create_module(json!({"name": "Blog", "dependencies": ["Users"]}));
    let manager = env.manager();

    assert!(manager.enable("Blog").unwrap());
    assert_eq!(manager.check_dependencies("Blog"), vec!["Users".to_string()]);
}

#[test]
fn test_mutual_dependency_is_reported_as_cycle() {
    let env = TestEnv::new();
    env.create_module(json!({"name": "A", "dependencies": ["B"]}));
    env.create_module(json!({"name": "B", "dependencies": ["A"]}));
    env.create_module(json!({"name": "Leaf"}));
    let manager = env.manager();

    let cycle = manager.detect_circular_dependencies("A").unwrap();
    assert!(cycle.contains(&"A".to_string()));
    assert!(cycle.contains(&"B".to_string()));
    assert_eq!(cycle.first(), cycle.last());

    assert_eq!(manager.detect_circular_dependencies("Leaf"), None);

    // Cycles are data: both modules can still be enabled
    assert!(manager.enable("A").unwrap());
    assert!(manager.enable("B").unwrap());
    assert_eq!(manager.boot_order().cyclic, vec!["A".to_string(), "B".to_string()]);
}

#[test]
fn test_dependents_only_count_enabled_modules() {
    let env = TestEnv::new();
    env.create_module(json!({"name": "A", "version": "1.0.0"}));
    env.create_module(json!({"name": "B", "dependencies": {"A": "^1.0"}}));
    env.create_module(json!({"name": "C", "dependencies": ["A"]}));
    let manager = env.manager();
    manager.enable("A").unwrap();
    manager.enable("B").unwrap();

    let dependents = manager.dependent_modules("A");
    assert_eq!(dependents, vec!["B".to_string()]);
    assert!(!dependents.contains(&"C".to_string()));
}

#[test]
fn test_boot_order_follows_dependencies() {
    let env = TestEnv::new();
    env.create_module(json!({"name": "Shop", "dependencies": ["Catalog"], "providers": ["ShopServiceProvider"]}));
    env.create_module(json!({"name": "Catalog", "providers": ["CatalogServiceProvider"]}));
    let manager = env.manager();
    manager.enable("Shop").unwrap();
    manager.enable("Catalog").unwrap();

    let plan = manager.boot_order();
    assert_eq!(plan.names(), vec!["Catalog", "Shop"]);
    assert_eq!(plan.order[0].providers, vec!["CatalogServiceProvider".to_string()]);
}
