//! Subcommand implementations
//!
//! Every command builds an [`OperationResult`]. With `--json` the result is
//! printed as is; otherwise the message goes to stdout and the data is shown
//! as a table. A failed result makes the process exit non-zero.

use anyhow::{bail, Result};
use serde::Serialize;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use modkeeper_core::{ModuleError, ModuleManager, OperationResult, UnmetDependency, UnmetReason};

use crate::Command;

pub fn execute(command: Command, manager: &ModuleManager, json: bool) -> Result<()> {
    match command {
        Command::List => execute_list(manager, json),
        Command::Enable { name, strict } => execute_enable(manager, &name, strict, json),
        Command::Disable { name, force } => execute_disable(manager, &name, force, json),
        Command::Check { name } => execute_check(manager, &name, json),
        Command::Cycles { name } => execute_cycles(manager, &name, json),
        Command::Dependents { name } => execute_dependents(manager, &name, json),
        Command::Install { archive, name } => {
            let result = manager.install_report(&archive, name.as_deref());
            emit(&result, json, |manifest| {
                println!("\nRun 'modkeeper enable {}' to enable it.", manifest.name);
            })
        }
        Command::Uninstall { name } => emit(&manager.uninstall_report(&name), json, |_| {}),
        Command::Export { name } => emit(&manager.export_report(&name), json, |exported| {
            println!("Size:    {} bytes", exported.size);
            println!("Digest:  {}", exported.digest);
        }),
        Command::BootOrder => execute_boot_order(manager, json),
    }
}

/// Print `result` and turn a failure into an error
fn emit<T: Serialize>(
    result: &OperationResult<T>,
    json: bool,
    render: impl FnOnce(&T),
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else if result.success {
        println!("{}", result.message);
        if let Some(data) = &result.data {
            render(data);
        }
    }

    if !result.success {
        bail!("{}", result.message);
    }
    Ok(())
}

/// A refusal decided by the CLI rather than the core
fn refused<T>(message: String, data: T) -> OperationResult<T> {
    OperationResult {
        success: false,
        message,
        kind: None,
        data: Some(data),
    }
}

fn not_found<T>(name: &str) -> OperationResult<T> {
    OperationResult::failed(&ModuleError::NotFound(name.to_string()))
}

fn render_table<R: Tabled>(rows: &[R]) {
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();
    println!("{table}");
}

#[derive(Tabled)]
struct ModuleRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Dependencies")]
    dependencies: String,
    #[tabled(rename = "Description")]
    description: String,
}

fn execute_list(manager: &ModuleManager, json: bool) -> Result<()> {
    let modules = manager.list_all();
    let result = OperationResult::ok(format!("{} module(s) installed", modules.len()), modules);

    emit(&result, json, |modules| {
        if modules.is_empty() {
            return;
        }
        let rows: Vec<ModuleRow> = modules
            .values()
            .map(|entry| ModuleRow {
                name: entry.manifest.name.clone(),
                version: entry.manifest.version.clone().unwrap_or_else(|| "-".into()),
                status: if entry.enabled { "enabled" } else { "disabled" }.to_string(),
                dependencies: entry
                    .manifest
                    .dependencies
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
                description: entry.manifest.description.clone().unwrap_or_default(),
            })
            .collect();
        println!();
        render_table(&rows);
    })
}

fn execute_enable(manager: &ModuleManager, name: &str, strict: bool, json: bool) -> Result<()> {
    if !manager.exists(name) {
        return emit(&not_found::<Vec<UnmetDependency>>(name), json, |_| {});
    }

    let unmet = manager.unmet_dependencies(name);
    if strict && !unmet.is_empty() {
        let names: Vec<String> = unmet.iter().map(ToString::to_string).collect();
        let result = refused(
            format!(
                "Module '{name}' has unmet dependencies: {}",
                names.join(", ")
            ),
            unmet,
        );
        return emit(&result, json, |_| {});
    }

    let report = manager.enable_report(name);
    let result = OperationResult {
        data: report.success.then_some(unmet),
        success: report.success,
        message: report.message,
        kind: report.kind,
    };
    emit(&result, json, |unmet| {
        if !unmet.is_empty() {
            println!("\nWarning: unmet dependencies:");
            render_unmet(unmet);
        }
    })
}

fn execute_disable(manager: &ModuleManager, name: &str, force: bool, json: bool) -> Result<()> {
    if !manager.exists(name) {
        return emit(&not_found::<Vec<String>>(name), json, |_| {});
    }

    let dependents = manager.dependent_modules(name);
    if !force && !dependents.is_empty() && manager.is_enabled(name) {
        let result = refused(
            format!(
                "Module '{name}' is required by enabled modules: {} (use --force to disable anyway)",
                dependents.join(", ")
            ),
            dependents,
        );
        return emit(&result, json, |_| {});
    }

    let report = manager.disable_report(name);
    let result = OperationResult {
        data: report.success.then_some(dependents),
        success: report.success,
        message: report.message,
        kind: report.kind,
    };
    emit(&result, json, |dependents| {
        if !dependents.is_empty() {
            println!("Warning: still enabled and depending on it: {}", dependents.join(", "));
        }
    })
}

#[derive(Tabled)]
struct UnmetRow {
    #[tabled(rename = "Dependency")]
    name: String,
    #[tabled(rename = "Constraint")]
    constraint: String,
    #[tabled(rename = "Problem")]
    problem: String,
}

fn render_unmet(unmet: &[UnmetDependency]) {
    let rows: Vec<UnmetRow> = unmet
        .iter()
        .map(|dep| UnmetRow {
            name: dep.name.clone(),
            constraint: dep.constraint.clone(),
            problem: match &dep.reason {
                UnmetReason::NotEnabled => "not enabled".to_string(),
                UnmetReason::VersionMismatch {
                    installed: Some(version),
                } => format!("installed version {version}"),
                UnmetReason::VersionMismatch { installed: None } => {
                    "installed without a version".to_string()
                }
            },
        })
        .collect();
    render_table(&rows);
}

fn execute_check(manager: &ModuleManager, name: &str, json: bool) -> Result<()> {
    if !manager.exists(name) {
        return emit(&not_found::<Vec<UnmetDependency>>(name), json, |_| {});
    }

    let unmet = manager.unmet_dependencies(name);
    let message = if unmet.is_empty() {
        format!("All dependencies of '{name}' are satisfied")
    } else {
        format!("Module '{name}' has {} unmet dependencies", unmet.len())
    };

    emit(&OperationResult::ok(message, unmet), json, |unmet| {
        if !unmet.is_empty() {
            println!();
            render_unmet(unmet);
        }
    })
}

fn execute_cycles(manager: &ModuleManager, name: &str, json: bool) -> Result<()> {
    if !manager.exists(name) {
        return emit(&not_found::<Option<Vec<String>>>(name), json, |_| {});
    }

    let cycle = manager.detect_circular_dependencies(name);
    let message = match &cycle {
        Some(path) => format!("Circular dependency: {}", path.join(" -> ")),
        None => format!("No circular dependencies reachable from '{name}'"),
    };
    emit(&OperationResult::ok(message, cycle), json, |_| {})
}

fn execute_dependents(manager: &ModuleManager, name: &str, json: bool) -> Result<()> {
    let dependents = manager.dependent_modules(name);
    let message = if dependents.is_empty() {
        format!("No enabled module depends on '{name}'")
    } else {
        format!("Enabled modules depending on '{name}':")
    };

    emit(&OperationResult::ok(message, dependents), json, |dependents| {
        for dependent in dependents {
            println!("  {dependent}");
        }
    })
}

#[derive(Tabled)]
struct BootRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Module")]
    name: String,
    #[tabled(rename = "Providers")]
    providers: String,
}

fn execute_boot_order(manager: &ModuleManager, json: bool) -> Result<()> {
    let plan = manager.boot_order();
    let message = format!("{} enabled module(s)", plan.order.len());

    emit(&OperationResult::ok(message, plan), json, |plan| {
        if plan.order.is_empty() {
            return;
        }
        let rows: Vec<BootRow> = plan
            .order
            .iter()
            .enumerate()
            .map(|(i, entry)| BootRow {
                position: i + 1,
                name: entry.name.clone(),
                providers: entry.providers.join(", "),
            })
            .collect();
        println!();
        render_table(&rows);

        if !plan.cyclic.is_empty() {
            println!(
                "\nWarning: dependency cycle among {}; booted in enable order",
                plan.cyclic.join(", ")
            );
        }
    })
}
