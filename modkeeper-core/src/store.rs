//! Manifest store
//!
//! Reads per-module manifests from `<modules_path>/<name>/<module_config_file>`
//! and memoizes parsed manifests for the lifetime of the store. A module whose
//! manifest is missing, unreadable or malformed does not exist as far as the
//! rest of the system is concerned.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use tracing::{debug, warn};

use crate::config::ModularConfig;
use crate::error::ModuleError;
use crate::manifest::ModuleManifest;

/// A module found while scanning the modules root
#[derive(Debug, Clone)]
pub struct DiscoveredModule {
    /// Directory name, which is the module's identity
    pub name: String,
    /// Absolute path of the module directory
    pub path: PathBuf,
    pub manifest: Arc<ModuleManifest>,
}

/// Read-through store of module manifests
pub struct ManifestStore {
    modules_path: PathBuf,
    manifest_file: String,
    loaded: RwLock<HashMap<String, Arc<ModuleManifest>>>,
}

/// Whether `name` can be used as a single directory component
pub fn is_valid_module_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && name.trim() == name
}

impl ManifestStore {
    pub fn new(modules_path: impl Into<PathBuf>, manifest_file: impl Into<String>) -> Self {
        Self {
            modules_path: modules_path.into(),
            manifest_file: manifest_file.into(),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ModularConfig) -> Self {
        Self::new(&config.modules_path, &config.module_config_file)
    }

    pub fn modules_path(&self) -> &Path {
        &self.modules_path
    }

    /// Manifest file name inside each module directory
    pub fn manifest_file(&self) -> &str {
        &self.manifest_file
    }

    /// Directory a module with this name lives in (whether or not it exists)
    pub fn module_dir(&self, name: &str) -> Result<PathBuf, ModuleError> {
        if !is_valid_module_name(name) {
            return Err(ModuleError::InvalidName(name.to_string()));
        }
        Ok(self.modules_path.join(name))
    }

    fn manifest_path(&self, name: &str) -> Option<PathBuf> {
        self.module_dir(name)
            .ok()
            .map(|dir| dir.join(&self.manifest_file))
    }

    /// True when the module's manifest file is present. The manifest is not parsed.
    pub fn exists(&self, name: &str) -> bool {
        self.manifest_path(name)
            .map(|path| path.is_file())
            .unwrap_or(false)
    }

    /// Parsed manifest for `name`, or `None` if it is missing or malformed
    pub fn get(&self, name: &str) -> Option<Arc<ModuleManifest>> {
        if let Some(manifest) = self.read_loaded().get(name) {
            return Some(Arc::clone(manifest));
        }

        let path = self.manifest_path(name)?;
        if !path.is_file() {
            return None;
        }

        match ModuleManifest::from_file(&path) {
            Ok(manifest) => {
                let manifest = Arc::new(manifest);
                self.loaded
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(name.to_string(), Arc::clone(&manifest));
                Some(manifest)
            }
            Err(e) => {
                warn!("Ignoring module '{}': {:#}", name, e);
                None
            }
        }
    }

    /// Drop the memoized manifest for `name`
    ///
    /// Only the installer calls this, when it creates or removes the module's
    /// directory.
    pub(crate) fn forget(&self, name: &str) {
        self.loaded
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
    }

    fn read_loaded(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<ModuleManifest>>> {
        self.loaded.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Scan the modules root for module directories with a usable manifest
    ///
    /// Modules come back sorted by name. A missing root yields no modules.
    pub fn discover(&self) -> Vec<DiscoveredModule> {
        let entries = match std::fs::read_dir(&self.modules_path) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(
                    "Modules directory {} not readable: {}",
                    self.modules_path.display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut modules = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };

            if let Some(manifest) = self.get(&name) {
                let path = std::path::absolute(&path).unwrap_or(path);
                modules.push(DiscoveredModule {
                    name,
                    path,
                    manifest,
                });
            } else {
                debug!("No usable manifest in {}, skipping", path.display());
            }
        }

        modules.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("Discovered {} modules", modules.len());
        modules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_manifest(root: &Path, dir: &str, content: &str) {
        let module_dir = root.join(dir);
        std::fs::create_dir_all(&module_dir).unwrap();
        std::fs::write(module_dir.join("module.json"), content).unwrap();
    }

    #[test]
    fn test_exists_only_needs_the_file() {
        let temp_dir = TempDir::new().unwrap();
        write_manifest(temp_dir.path(), "Broken", "{not json");
        let store = ManifestStore::new(temp_dir.path(), "module.json");

        assert!(store.exists("Broken"));
        assert!(store.get("Broken").is_none());
        assert!(!store.exists("Missing"));
    }

    #[test]
    fn test_get_memoizes_manifest() {
        let temp_dir = TempDir::new().unwrap();
        write_manifest(temp_dir.path(), "Blog", r#"{"name": "Blog", "version": "1.0.0"}"#);
        let store = ManifestStore::new(temp_dir.path(), "module.json");

        let first = store.get("Blog").unwrap();
        write_manifest(temp_dir.path(), "Blog", r#"{"name": "Blog", "version": "2.0.0"}"#);
        let second = store.get("Blog").unwrap();
        assert_eq!(second.version.as_deref(), Some("1.0.0"));
        assert!(Arc::ptr_eq(&first, &second));

        store.forget("Blog");
        assert_eq!(store.get("Blog").unwrap().version.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn test_discover_skips_non_modules() {
        let temp_dir = TempDir::new().unwrap();
        write_manifest(temp_dir.path(), "Shop", r#"{"name": "Shop"}"#);
        write_manifest(temp_dir.path(), "Blog", r#"{"name": "Blog"}"#);
        write_manifest(temp_dir.path(), "Corrupt", "[1, 2");
        std::fs::create_dir_all(temp_dir.path().join("assets")).unwrap();
        std::fs::write(temp_dir.path().join("enabled.json"), "[]").unwrap();

        let store = ManifestStore::new(temp_dir.path(), "module.json");
        let names: Vec<String> = store.discover().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["Blog".to_string(), "Shop".to_string()]);
    }

    #[test]
    fn test_discover_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let store = ManifestStore::new(temp_dir.path().join("nope"), "module.json");
        assert!(store.discover().is_empty());
    }

    #[test]
    fn test_path_like_names_never_exist() {
        let temp_dir = TempDir::new().unwrap();
        write_manifest(temp_dir.path(), "Blog", r#"{"name": "Blog"}"#);
        let store = ManifestStore::new(temp_dir.path().join("modules"), "module.json");

        assert!(!store.exists(".."));
        assert!(!store.exists("../Blog"));
        assert!(store.get("../Blog").is_none());
        assert!(matches!(store.module_dir("a/b"), Err(ModuleError::InvalidName(_))));
        assert!(is_valid_module_name("Blog"));
        assert!(!is_valid_module_name(" Blog"));
    }
}
