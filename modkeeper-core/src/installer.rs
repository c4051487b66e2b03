//! Archive installer
//!
//! Installs module packages into the modules directory, tears installed
//! modules down and exports them back into packages. The installer is the
//! only component that creates or deletes module directories.
//!
//! Installing runs in two phases. [`Installer::prepare`] opens and extracts
//! the archive, validates the manifest, resolves the final name and checks
//! for collisions without touching the modules directory.
//! [`Installer::commit`] copies the module into place. The extraction
//! directory lives inside [`PreparedInstall`] and is removed when it drops,
//! whichever phase fails.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::archive::{self, ExportedArchive, ARCHIVE_EXTENSION};
use crate::config::ModularConfig;
use crate::error::{Collision, ModuleError};
use crate::manifest::{rewrite_manifest_name, ModuleManifest};
use crate::registry::EnabledRegistry;
use crate::store::{is_valid_module_name, ManifestStore};

/// A validated package waiting to be copied into place
#[derive(Debug)]
pub struct PreparedInstall {
    name: String,
    manifest: ModuleManifest,
    source_dir: PathBuf,
    _extracted: TempDir,
}

impl PreparedInstall {
    /// Name the module will be installed under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Manifest as found in the archive
    pub fn manifest(&self) -> &ModuleManifest {
        &self.manifest
    }

    /// Whether the module is installed under a name other than its own
    pub fn is_renamed(&self) -> bool {
        self.name != self.manifest.name
    }
}

/// A freshly installed module
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub name: String,
    pub path: PathBuf,
    pub manifest: Arc<ModuleManifest>,
}

/// Creates, removes and packages module directories
pub struct Installer {
    store: Arc<ManifestStore>,
    registry: Arc<EnabledRegistry>,
    exports_path: PathBuf,
    upload_max_size: u64,
}

impl Installer {
    pub fn new(
        store: Arc<ManifestStore>,
        registry: Arc<EnabledRegistry>,
        exports_path: impl Into<PathBuf>,
        upload_max_size: u64,
    ) -> Self {
        Self {
            store,
            registry,
            exports_path: exports_path.into(),
            upload_max_size,
        }
    }

    pub fn from_config(
        config: &ModularConfig,
        store: Arc<ManifestStore>,
        registry: Arc<EnabledRegistry>,
    ) -> Self {
        Self::new(store, registry, &config.exports_path, config.upload_max_size)
    }

    /// Install `archive` under its manifest name, or under `name` if given
    ///
    /// The module is not enabled.
    pub fn install(
        &self,
        archive: &Path,
        name: Option<&str>,
    ) -> Result<InstallOutcome, ModuleError> {
        let prepared = self.prepare(archive, name)?;
        self.commit(prepared)
    }

    /// Extract and validate `archive` and make sure its target is free
    pub fn prepare(
        &self,
        archive: &Path,
        name: Option<&str>,
    ) -> Result<PreparedInstall, ModuleError> {
        self.check_size(archive)?;

        let extracted = archive::extract(archive)?;
        let manifest_path = archive::locate_manifest(extracted.path(), self.store.manifest_file())
            .ok_or_else(|| ModuleError::invalid_package("no manifest found in archive"))?;

        let manifest = ModuleManifest::from_file(&manifest_path).map_err(|e| {
            debug!("Rejecting manifest {}: {:#}", manifest_path.display(), e);
            ModuleError::invalid_package("invalid manifest format")
        })?;

        let final_name = name.unwrap_or(manifest.name.as_str()).to_string();
        if !is_valid_module_name(&final_name) {
            return Err(ModuleError::InvalidName(final_name));
        }

        if self.store.exists(&final_name) {
            return Err(ModuleError::Collision(Collision::ModuleExists(final_name)));
        }
        let target = self.store.module_dir(&final_name)?;
        if target.symlink_metadata().is_ok() {
            return Err(ModuleError::Collision(Collision::DirectoryExists(target)));
        }

        let source_dir = match manifest_path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => extracted.path().to_path_buf(),
        };

        Ok(PreparedInstall {
            name: final_name,
            manifest,
            source_dir,
            _extracted: extracted,
        })
    }

    /// Copy a prepared package into the modules directory
    pub fn commit(&self, prepared: PreparedInstall) -> Result<InstallOutcome, ModuleError> {
        let target = self.store.module_dir(&prepared.name)?;
        // The target may have appeared since prepare()
        if target.symlink_metadata().is_ok() {
            return Err(ModuleError::Collision(Collision::DirectoryExists(target)));
        }

        if let Err(e) = self.materialize(&prepared, &target) {
            if let Err(cleanup) = std::fs::remove_dir_all(&target) {
                warn!(
                    "Could not remove partial install {}: {}",
                    target.display(),
                    cleanup
                );
            }
            self.store.forget(&prepared.name);
            return Err(e);
        }

        self.store.forget(&prepared.name);
        let manifest = self
            .store
            .get(&prepared.name)
            .ok_or_else(|| ModuleError::invalid_package("invalid manifest format"))?;

        info!(
            "Installed module '{}' into {}",
            prepared.name,
            target.display()
        );

        Ok(InstallOutcome {
            name: prepared.name,
            path: std::path::absolute(&target).unwrap_or(target),
            manifest,
        })
    }

    fn materialize(&self, prepared: &PreparedInstall, target: &Path) -> Result<(), ModuleError> {
        copy_tree(&prepared.source_dir, target)?;

        if prepared.is_renamed() {
            let manifest_path = target.join(self.store.manifest_file());
            rewrite_manifest_name(&manifest_path, &prepared.name).map_err(|e| {
                ModuleError::io(
                    "Failed to rewrite manifest",
                    &manifest_path,
                    std::io::Error::other(format!("{e:#}")),
                )
            })?;
        }
        Ok(())
    }

    fn check_size(&self, archive: &Path) -> Result<(), ModuleError> {
        let metadata = std::fs::metadata(archive).map_err(|source| ModuleError::InvalidPackage {
            reason: "could not open archive".to_string(),
            source: Some(source),
        })?;

        if self.upload_max_size > 0 && metadata.len() > self.upload_max_size {
            return Err(ModuleError::invalid_package(format!(
                "archive is {} bytes, the limit is {} bytes",
                metadata.len(),
                self.upload_max_size
            )));
        }
        Ok(())
    }

    /// Disable `name` and delete its directory
    ///
    /// The module is disabled before anything is deleted. If deletion fails
    /// the module stays disabled and calling this again is safe.
    pub fn uninstall(&self, name: &str) -> Result<(), ModuleError> {
        if !self.store.exists(name) {
            return Err(ModuleError::NotFound(name.to_string()));
        }
        let dir = self.store.module_dir(name)?;

        self.registry.disable(name)?;

        let removed = std::fs::remove_dir_all(&dir);
        self.store.forget(name);
        removed.map_err(|e| ModuleError::io("Failed to remove module directory", &dir, e))?;

        info!("Uninstalled module '{}'", name);
        Ok(())
    }

    /// Where [`Installer::export`] writes the package for `name`
    pub fn export_path(&self, name: &str) -> PathBuf {
        self.exports_path.join(format!("{name}.{ARCHIVE_EXTENSION}"))
    }

    /// Package an installed module, replacing any earlier export
    pub fn export(&self, name: &str) -> Result<ExportedArchive, ModuleError> {
        if !self.store.exists(name) {
            return Err(ModuleError::NotFound(name.to_string()));
        }
        let dir = self.store.module_dir(name)?;

        let exported = archive::pack_directory(&dir, &self.export_path(name))?;
        info!(
            "Exported module '{}' to {} ({} bytes)",
            name,
            exported.path.display(),
            exported.size
        );
        Ok(exported)
    }
}

/// Recursively copy `source` to `target`, which must not exist yet
fn copy_tree(source: &Path, target: &Path) -> Result<(), ModuleError> {
    std::fs::create_dir_all(target)
        .map_err(|e| ModuleError::io("Failed to create module directory", target, e))?;

    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            ModuleError::io("Failed to read extracted package", path, e.into())
        })?;

        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let destination = target.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)
                .map_err(|e| ModuleError::io("Failed to create directory", &destination, e))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &destination)
                .map_err(|e| ModuleError::io("Failed to copy file", &destination, e))?;
        } else {
            debug!("Skipping non-regular file {}", entry.path().display());
        }
    }
    Ok(())
}
