//! Dependency resolution over manifests and the enabled-set
//!
//! The resolver is read-only: it never touches the registry file or a module
//! directory. Dependency edges are recomputed from the current manifests on
//! every call. Unmet dependencies and cycles are reported as data; deciding
//! whether to refuse an operation because of them is up to the caller.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::manifest::Dependency;
use crate::registry::EnabledRegistry;
use crate::store::ManifestStore;
use crate::version::VersionConstraint;

/// Why a dependency is not satisfied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnmetReason {
    NotEnabled,
    VersionMismatch { installed: Option<String> },
}

/// A declared dependency that the current enabled-set does not satisfy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmetDependency {
    pub name: String,
    pub constraint: String,
    #[serde(flatten)]
    pub reason: UnmetReason,
}

impl std::fmt::Display for UnmetDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Dependency::new(self.name.as_str(), self.constraint.as_str()))
    }
}

/// One step of a boot plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootEntry {
    pub name: String,
    pub providers: Vec<String>,
}

/// Enabled modules in dependency order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootPlan {
    /// Dependencies come before their dependents. Modules in `cyclic` are
    /// appended at the end in enabled-set order.
    pub order: Vec<BootEntry>,
    /// Enabled modules that could not be ordered because of a cycle
    pub cyclic: Vec<String>,
}

impl BootPlan {
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|e| e.name.as_str()).collect()
    }
}

/// Read-only view answering dependency questions
pub struct DependencyResolver<'a> {
    store: &'a ManifestStore,
    registry: &'a EnabledRegistry,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(store: &'a ManifestStore, registry: &'a EnabledRegistry) -> Self {
        Self { store, registry }
    }

    /// Unmet dependencies of `name`, in declaration order
    ///
    /// A module without a manifest has no dependencies.
    pub fn unmet_dependencies(&self, name: &str) -> Vec<UnmetDependency> {
        let Some(manifest) = self.store.get(name) else {
            return Vec::new();
        };

        let mut unmet = Vec::new();
        for dependency in &manifest.dependencies {
            let reason = if !self.registry.is_enabled(&dependency.name) {
                UnmetReason::NotEnabled
            } else if dependency.is_any_version() {
                continue;
            } else {
                let installed = self
                    .store
                    .get(&dependency.name)
                    .and_then(|m| m.version.clone());
                let constraint = VersionConstraint::parse(&dependency.constraint);
                if constraint.satisfied_by(installed.as_deref()) {
                    continue;
                }
                UnmetReason::VersionMismatch { installed }
            };

            unmet.push(UnmetDependency {
                name: dependency.name.clone(),
                constraint: dependency.constraint.clone(),
                reason,
            });
        }

        unmet
    }

    /// Unmet dependencies of `name` as display strings: `"<dep>"` for `*`,
    /// `"<dep> (<constraint>)"` otherwise
    pub fn check_dependencies(&self, name: &str) -> Vec<String> {
        self.unmet_dependencies(name)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// First dependency cycle reachable from `name`
    ///
    /// Traversal is depth-first in declaration order. The returned path starts
    /// at `name` and ends with the node that closed the cycle, so the cycle is
    /// the suffix starting at that node's first occurrence.
    pub fn detect_circular_dependencies(&self, name: &str) -> Option<Vec<String>> {
        let mut path = Vec::new();
        let mut acyclic = HashSet::new();
        let cycle = self.find_cycle(name, &mut path, &mut acyclic);
        if let Some(cycle) = &cycle {
            debug!("Circular dependency from '{}': {}", name, cycle.join(" -> "));
        }
        cycle
    }

    fn find_cycle(
        &self,
        name: &str,
        path: &mut Vec<String>,
        acyclic: &mut HashSet<String>,
    ) -> Option<Vec<String>> {
        if path.iter().any(|n| n == name) {
            let mut cycle = path.clone();
            cycle.push(name.to_string());
            return Some(cycle);
        }
        // Everything reachable from here was already explored without a cycle
        if acyclic.contains(name) {
            return None;
        }

        let manifest = self.store.get(name);
        path.push(name.to_string());
        if let Some(manifest) = manifest {
            for dependency in &manifest.dependencies {
                if let Some(cycle) = self.find_cycle(&dependency.name, path, acyclic) {
                    return Some(cycle);
                }
            }
        }
        path.pop();

        acyclic.insert(name.to_string());
        None
    }

    /// Enabled modules, other than `name`, that declare a dependency on it
    pub fn dependent_modules(&self, name: &str) -> Vec<String> {
        self.registry
            .enabled()
            .into_iter()
            .filter(|enabled| enabled != name)
            .filter(|enabled| {
                self.store
                    .get(enabled)
                    .map(|m| m.depends_on(name))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Order the enabled modules so every module boots after its enabled
    /// dependencies
    pub fn boot_order(&self) -> BootPlan {
        let enabled = self.registry.enabled();
        let index: HashMap<&str, usize> = enabled
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let manifests: Vec<_> = enabled.iter().map(|name| self.store.get(name)).collect();

        // Edges point from a dependency to the modules waiting on it
        let mut in_degree = vec![0usize; enabled.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); enabled.len()];
        for (i, manifest) in manifests.iter().enumerate() {
            let Some(manifest) = manifest else { continue };
            let deps: BTreeSet<usize> = manifest
                .dependencies
                .iter()
                .filter_map(|d| index.get(d.name.as_str()).copied())
                .collect();
            for dep in deps {
                dependents[dep].push(i);
                in_degree[i] += 1;
            }
        }

        // Kahn's algorithm; the ready set yields the earliest-enabled module first
        let mut ready: BTreeSet<usize> = (0..enabled.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut placed = vec![false; enabled.len()];
        let mut order = Vec::with_capacity(enabled.len());

        while let Some(i) = ready.pop_first() {
            placed[i] = true;
            order.push(i);
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        let cyclic: Vec<usize> = (0..enabled.len()).filter(|&i| !placed[i]).collect();
        if !cyclic.is_empty() {
            debug!("{} enabled modules are part of a dependency cycle", cyclic.len());
        }

        let entry = |i: usize| BootEntry {
            name: enabled[i].clone(),
            providers: manifests[i]
                .as_ref()
                .map(|m| m.providers.clone())
                .unwrap_or_default(),
        };

        BootPlan {
            order: order.iter().chain(cyclic.iter()).map(|&i| entry(i)).collect(),
            cyclic: cyclic.iter().map(|&i| enabled[i].clone()).collect(),
        }
    }
}
