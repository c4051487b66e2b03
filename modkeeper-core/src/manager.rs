//! Module manager facade
//!
//! [`ModuleManager`] is constructed once per process from a
//! [`ModularConfig`] and owns the manifest store, the enabled-set registry,
//! the installer and the listeners. It is `Send + Sync`; share it behind an
//! `Arc` instead of reaching for a global.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::archive::ExportedArchive;
use crate::config::ModularConfig;
use crate::error::{ModuleError, OperationResult};
use crate::events::{EventBus, ModuleEvent, ModuleEventKind, ModuleListener};
use crate::features::FeatureRegistry;
use crate::installer::{InstallOutcome, Installer};
use crate::manifest::ModuleManifest;
use crate::registry::{EnabledRegistry, RegistryCache, Transition};
use crate::resolver::{BootPlan, DependencyResolver, UnmetDependency};
use crate::store::ManifestStore;

/// A discovered module with its live state
#[derive(Debug, Clone, Serialize)]
pub struct ModuleEntry {
    #[serde(flatten)]
    pub manifest: Arc<ModuleManifest>,
    pub enabled: bool,
    /// Absolute path of the module directory
    pub path: PathBuf,
}

/// Entry point for every module operation
pub struct ModuleManager {
    config: ModularConfig,
    store: Arc<ManifestStore>,
    registry: Arc<EnabledRegistry>,
    installer: Installer,
    events: EventBus,
    features: FeatureRegistry,
}

impl ModuleManager {
    /// Build a manager, using an in-process cache when `cache_enabled` is set
    pub fn new(config: ModularConfig) -> Result<Self, ModuleError> {
        let store = Arc::new(ManifestStore::from_config(&config));
        let registry = Arc::new(EnabledRegistry::from_config(&config, Arc::clone(&store))?);
        Ok(Self::assemble(config, store, registry))
    }

    /// Build a manager whose enabled-set reads go through a host-supplied cache
    pub fn with_cache(config: ModularConfig, cache: RegistryCache) -> Result<Self, ModuleError> {
        let store = Arc::new(ManifestStore::from_config(&config));
        let registry = Arc::new(EnabledRegistry::open(
            config.enabled_modules_path(),
            Arc::clone(&store),
            Some(cache),
        )?);
        Ok(Self::assemble(config, store, registry))
    }

    fn assemble(
        config: ModularConfig,
        store: Arc<ManifestStore>,
        registry: Arc<EnabledRegistry>,
    ) -> Self {
        let installer = Installer::from_config(&config, Arc::clone(&store), Arc::clone(&registry));
        Self {
            config,
            store,
            registry,
            installer,
            events: EventBus::new(),
            features: FeatureRegistry::new(),
        }
    }

    pub fn config(&self) -> &ModularConfig {
        &self.config
    }

    /// Register a listener for lifecycle events
    pub fn add_listener(&self, listener: Arc<dyn ModuleListener>) {
        self.events.subscribe(listener);
    }

    /// Feature flags registered by modules
    pub fn features(&self) -> &FeatureRegistry {
        &self.features
    }

    /// Whether feature `key` is on and, when a module owns it, that module
    /// is enabled
    pub fn is_feature_enabled(&self, key: &str) -> bool {
        let Some(feature) = self.features.get(key) else {
            return false;
        };
        let module_enabled = feature
            .module
            .as_deref()
            .map_or(true, |module| self.registry.is_enabled(module));
        module_enabled && self.features.is_enabled(key)
    }

    pub fn resolver(&self) -> DependencyResolver<'_> {
        DependencyResolver::new(&self.store, &self.registry)
    }

    /// Every module with a usable manifest, keyed by name
    pub fn list_all(&self) -> BTreeMap<String, ModuleEntry> {
        self.store
            .discover()
            .into_iter()
            .map(|module| {
                let entry = ModuleEntry {
                    enabled: self.registry.is_enabled(&module.name),
                    manifest: module.manifest,
                    path: module.path,
                };
                (module.name, entry)
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModuleManifest>> {
        self.store.get(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.store.exists(name)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.registry.is_enabled(name)
    }

    /// Enabled module names in enable order
    pub fn enabled(&self) -> Vec<String> {
        self.registry.enabled()
    }

    /// Enable `name`; `Ok(false)` when it does not exist
    ///
    /// Unmet dependencies do not prevent enabling; check them first when that
    /// matters.
    pub fn enable(&self, name: &str) -> Result<bool, ModuleError> {
        Ok(self.enable_transition(name)? != Transition::NotInstalled)
    }

    /// Disable `name`; disabling a module that is not enabled succeeds
    pub fn disable(&self, name: &str) -> Result<bool, ModuleError> {
        self.disable_transition(name)?;
        Ok(true)
    }

    // The enabled-set file decides whether anything changes, not this
    // process's copy of it: another manager may have written it since.
    fn enable_transition(&self, name: &str) -> Result<Transition, ModuleError> {
        if !self.store.exists(name) {
            return Ok(Transition::NotInstalled);
        }
        if self.registry.check_persisted(name)? {
            return Ok(Transition::Unchanged);
        }

        self.publish(name, ModuleEventKind::Enabling);
        let transition = self.registry.enable(name)?;
        if transition != Transition::NotInstalled {
            self.publish(name, ModuleEventKind::Enabled);
        }
        Ok(transition)
    }

    fn disable_transition(&self, name: &str) -> Result<Transition, ModuleError> {
        if !self.registry.check_persisted(name)? {
            return Ok(Transition::Unchanged);
        }

        self.publish(name, ModuleEventKind::Disabling);
        let transition = self.registry.disable(name)?;
        self.publish(name, ModuleEventKind::Disabled);
        Ok(transition)
    }

    pub fn check_dependencies(&self, name: &str) -> Vec<String> {
        self.resolver().check_dependencies(name)
    }

    pub fn unmet_dependencies(&self, name: &str) -> Vec<UnmetDependency> {
        self.resolver().unmet_dependencies(name)
    }

    pub fn detect_circular_dependencies(&self, name: &str) -> Option<Vec<String>> {
        self.resolver().detect_circular_dependencies(name)
    }

    pub fn dependent_modules(&self, name: &str) -> Vec<String> {
        self.resolver().dependent_modules(name)
    }

    pub fn boot_order(&self) -> BootPlan {
        self.resolver().boot_order()
    }

    /// Install a package. The installed module is left disabled.
    pub fn install(
        &self,
        archive: &Path,
        name: Option<&str>,
    ) -> Result<InstallOutcome, ModuleError> {
        let prepared = self.installer.prepare(archive, name)?;

        self.events.publish(ModuleEvent::new(
            prepared.name(),
            ModuleEventKind::Installing {
                archive: archive.to_path_buf(),
            },
            Some(Arc::new(prepared.manifest().clone())),
        ));

        let outcome = self.installer.commit(prepared)?;
        self.events.publish(ModuleEvent::new(
            outcome.name.as_str(),
            ModuleEventKind::Installed,
            Some(Arc::clone(&outcome.manifest)),
        ));
        Ok(outcome)
    }

    /// Disable and delete `name`
    pub fn uninstall(&self, name: &str) -> Result<(), ModuleError> {
        if !self.store.exists(name) {
            return Err(ModuleError::NotFound(name.to_string()));
        }

        let manifest = self.store.get(name);
        self.publish(name, ModuleEventKind::Uninstalling);
        self.disable(name)?;
        self.installer.uninstall(name)?;
        let dropped = self.features.unregister_module(name);
        if dropped > 0 {
            debug!("Dropped {} feature(s) of '{}'", dropped, name);
        }
        self.events.publish(ModuleEvent::new(
            name,
            ModuleEventKind::Uninstalled,
            manifest,
        ));
        Ok(())
    }

    /// Package `name` into `<exports_path>/<name>.tar.gz`
    pub fn export(&self, name: &str) -> Result<ExportedArchive, ModuleError> {
        self.installer.export(name)
    }

    /// Re-read the enabled-set from disk (through the cache, if any)
    pub fn reload(&self) -> Result<(), ModuleError> {
        self.registry.reload()
    }

    fn publish(&self, name: &str, kind: ModuleEventKind) {
        self.events
            .publish(ModuleEvent::new(name, kind, self.store.get(name)));
    }

    pub fn enable_report(&self, name: &str) -> OperationResult<()> {
        match self.enable_transition(name) {
            Ok(Transition::Changed) => {
                OperationResult::ok(format!("Module '{name}' has been enabled"), ())
            }
            Ok(Transition::Unchanged) => {
                OperationResult::ok(format!("Module '{name}' is already enabled"), ())
            }
            Ok(Transition::NotInstalled) => {
                OperationResult::failed(&ModuleError::NotFound(name.to_string()))
            }
            Err(e) => OperationResult::failed(&e),
        }
    }

    pub fn disable_report(&self, name: &str) -> OperationResult<()> {
        match self.disable_transition(name) {
            Ok(Transition::Changed) => {
                OperationResult::ok(format!("Module '{name}' has been disabled"), ())
            }
            Ok(_) => OperationResult::ok(format!("Module '{name}' is already disabled"), ()),
            Err(e) => OperationResult::failed(&e),
        }
    }

    pub fn install_report(
        &self,
        archive: &Path,
        name: Option<&str>,
    ) -> OperationResult<Arc<ModuleManifest>> {
        let result = self.install(archive, name).map(|outcome| outcome.manifest);
        OperationResult::from_result(result, |manifest| {
            format!("Module '{}' installed successfully", manifest.name)
        })
    }

    pub fn uninstall_report(&self, name: &str) -> OperationResult<()> {
        OperationResult::from_result(self.uninstall(name), |_| {
            format!("Module '{name}' has been uninstalled")
        })
    }

    pub fn export_report(&self, name: &str) -> OperationResult<ExportedArchive> {
        OperationResult::from_result(self.export(name), |exported| {
            debug!("Export digest for '{}': {}", name, exported.digest);
            format!("Module '{name}' exported to {}", exported.path.display())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(root: &Path) -> ModuleManager {
        let config = ModularConfig {
            exports_path: root.join("exports"),
            ..ModularConfig::with_modules_path(root.join("modules"))
        };
        ModuleManager::new(config).unwrap()
    }

    fn create_module(root: &Path, name: &str) {
        let dir = root.join("modules").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("module.json"),
            format!(r#"{{"name": "{name}", "version": "1.0.0"}}"#),
        )
        .unwrap();
    }

    #[test]
    fn test_manager_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ModuleManager>();
    }

    #[test]
    fn test_list_all_merges_enabled_flag() {
        let temp_dir = TempDir::new().unwrap();
        create_module(temp_dir.path(), "Blog");
        create_module(temp_dir.path(), "Shop");
        let manager = manager(temp_dir.path());
        manager.enable("Shop").unwrap();

        let modules = manager.list_all();
        assert_eq!(modules.keys().collect::<Vec<_>>(), vec!["Blog", "Shop"]);
        assert!(!modules["Blog"].enabled);
        assert!(modules["Shop"].enabled);
        assert!(modules["Shop"].path.is_absolute());

        let json = serde_json::to_value(&modules["Shop"]).unwrap();
        assert_eq!(json["name"], "Shop");
        assert_eq!(json["enabled"], true);
    }

    #[test]
    fn test_reports() {
        let temp_dir = TempDir::new().unwrap();
        create_module(temp_dir.path(), "Blog");
        let manager = manager(temp_dir.path());

        let report = manager.enable_report("Blog");
        assert!(report.success);
        assert_eq!(report.message, "Module 'Blog' has been enabled");

        let report = manager.enable_report("Blog");
        assert!(report.success);
        assert_eq!(report.message, "Module 'Blog' is already enabled");

        let report = manager.enable_report("Ghost");
        assert!(!report.success);
        assert_eq!(report.message, "Module 'Ghost' does not exist");

        let report = manager.export_report("Blog");
        assert!(report.success);
        assert!(report.data.unwrap().path.ends_with("Blog.tar.gz"));

        let report = manager.uninstall_report("Blog");
        assert!(report.success);
        assert!(!manager.is_enabled("Blog"));
    }

    #[test]
    fn test_module_features_follow_the_module() {
        let temp_dir = TempDir::new().unwrap();
        create_module(temp_dir.path(), "Blog");
        let manager = manager(temp_dir.path());
        manager
            .features()
            .register("blog.comments", crate::Feature::for_module("Blog"));
        manager
            .features()
            .register("site.search", crate::Feature::default());

        assert!(!manager.is_feature_enabled("blog.comments"));
        assert!(manager.is_feature_enabled("site.search"));
        assert!(!manager.is_feature_enabled("missing"));

        manager.enable("Blog").unwrap();
        assert!(manager.is_feature_enabled("blog.comments"));

        manager.uninstall("Blog").unwrap();
        assert!(manager.features().get("blog.comments").is_none());
        assert!(manager.features().get("site.search").is_some());
    }
}
