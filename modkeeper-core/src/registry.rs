//! Enabled-set registry (`<modules_path>/enabled.json`)
//!
//! The registry is the durable record of which modules are active and the
//! only writer of the enabled-set file. All mutations of one registry are
//! serialized by an internal mutex: at most one writer at a time. Separate
//! processes writing the same file are not coordinated.
//!
//! Mutations start from the file on disk, never from the cache. Writes go to
//! a temporary file next to the target and are renamed into place, and the
//! in-memory set only changes after the write succeeded.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::{CacheProvider, MemoryCache, ENABLED_MODULES_KEY};
use crate::config::ModularConfig;
use crate::error::ModuleError;
use crate::store::ManifestStore;

/// Optional read-through cache in front of the enabled-set file
#[derive(Clone)]
pub struct RegistryCache {
    pub provider: Arc<dyn CacheProvider>,
    pub ttl: Duration,
}

/// What an enable or disable did to the persisted set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The file was rewritten
    Changed,
    /// The file already had the requested state
    Unchanged,
    /// No such module, nothing was written
    NotInstalled,
}

/// Durable set of enabled module names
pub struct EnabledRegistry {
    path: PathBuf,
    store: Arc<ManifestStore>,
    cache: Option<RegistryCache>,
    enabled: Mutex<Vec<String>>,
}

impl EnabledRegistry {
    /// Open the registry described by `config`, using an in-process cache when
    /// caching is enabled
    pub fn from_config(
        config: &ModularConfig,
        store: Arc<ManifestStore>,
    ) -> Result<Self, ModuleError> {
        let cache = config.cache_enabled.then(|| RegistryCache {
            provider: Arc::new(MemoryCache::new()) as Arc<dyn CacheProvider>,
            ttl: config.cache_ttl(),
        });
        Self::open(config.enabled_modules_path(), store, cache)
    }

    /// Load the enabled-set from `path` and drop entries whose module is gone
    ///
    /// Pruned entries are persisted (and the cache evicted) before this returns.
    pub fn open(
        path: impl Into<PathBuf>,
        store: Arc<ManifestStore>,
        cache: Option<RegistryCache>,
    ) -> Result<Self, ModuleError> {
        let registry = Self {
            path: path.into(),
            store,
            cache,
            enabled: Mutex::new(Vec::new()),
        };

        registry.reload()?;
        Ok(registry)
    }

    /// Path of the enabled-set file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read persisted state (through the cache when one is configured)
    pub fn reload(&self) -> Result<(), ModuleError> {
        let mut enabled = self.lock();
        let loaded = self.load()?;
        *enabled = self.prune(loaded)?;
        Ok(())
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.lock().iter().any(|n| n == name)
    }

    /// Enabled module names in the order they were enabled
    pub fn enabled(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Re-read the file and report whether `name` is enabled on disk
    ///
    /// The in-memory set is replaced by the file's content.
    pub fn check_persisted(&self, name: &str) -> Result<bool, ModuleError> {
        let mut enabled = self.lock();
        let current = self.read_file()?;
        let present = current.iter().any(|n| n == name);
        *enabled = current;
        Ok(present)
    }

    /// Mark `name` as enabled
    ///
    /// Enabling an enabled module succeeds without touching the file.
    pub fn enable(&self, name: &str) -> Result<Transition, ModuleError> {
        if !self.store.exists(name) {
            debug!("Refusing to enable unknown module '{}'", name);
            return Ok(Transition::NotInstalled);
        }

        let mut enabled = self.lock();
        let mut next = self.read_file()?;
        if next.iter().any(|n| n == name) {
            *enabled = next;
            return Ok(Transition::Unchanged);
        }

        next.push(name.to_string());
        self.persist(&next)?;
        *enabled = next;
        self.evict();

        info!("Enabled module '{}'", name);
        Ok(Transition::Changed)
    }

    /// Mark `name` as disabled
    ///
    /// A module that was never enabled is already in the desired state, so
    /// this fails only when the file cannot be written.
    pub fn disable(&self, name: &str) -> Result<Transition, ModuleError> {
        let mut enabled = self.lock();
        let current = self.read_file()?;
        if !current.iter().any(|n| n == name) {
            *enabled = current;
            return Ok(Transition::Unchanged);
        }

        let next: Vec<String> = current.into_iter().filter(|n| n != name).collect();
        self.persist(&next)?;
        *enabled = next;
        self.evict();

        info!("Disabled module '{}'", name);
        Ok(Transition::Changed)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.enabled.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn load(&self) -> Result<Vec<String>, ModuleError> {
        match &self.cache {
            Some(cache) => cache.provider.get_or_compute(
                ENABLED_MODULES_KEY,
                cache.ttl,
                &mut || self.read_file(),
            ),
            None => self.read_file(),
        }
    }

    fn read_file(&self) -> Result<Vec<String>, ModuleError> {
        if !self.path.exists() {
            debug!("Creating empty enabled-set file {}", self.path.display());
            self.persist(&[])?;
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|source| {
            ModuleError::Persistence {
                path: self.path.clone(),
                source,
            }
        })?;

        match serde_json::from_str::<Vec<String>>(&content) {
            Ok(names) => Ok(names),
            Err(e) => {
                warn!(
                    "Enabled-set file {} is not a JSON array of names, treating as empty: {}",
                    self.path.display(),
                    e
                );
                Ok(Vec::new())
            }
        }
    }

    /// Drop entries for modules that no longer exist, and duplicates
    fn prune(&self, loaded: Vec<String>) -> Result<Vec<String>, ModuleError> {
        let mut seen = HashSet::new();
        let kept: Vec<String> = loaded
            .iter()
            .filter(|name| self.store.exists(name) && seen.insert(name.as_str()))
            .cloned()
            .collect();

        if kept.len() != loaded.len() {
            let dropped: Vec<&String> = loaded.iter().filter(|n| !kept.contains(n)).collect();
            warn!("Removing stale enabled-set entries: {:?}", dropped);
            self.persist(&kept)?;
            self.evict();
        }

        Ok(kept)
    }

    fn persist(&self, names: &[String]) -> Result<(), ModuleError> {
        let to_error = |source: std::io::Error| ModuleError::Persistence {
            path: self.path.clone(),
            source,
        };

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(to_error)?;

        let content = serde_json::to_string_pretty(names)
            .map_err(|e| to_error(std::io::Error::other(e)))?;

        let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(to_error)?;
        temp.write_all(content.as_bytes()).map_err(to_error)?;
        temp.persist(&self.path).map_err(|e| to_error(e.error))?;

        Ok(())
    }

    fn evict(&self) {
        if let Some(cache) = &self.cache {
            cache.provider.forget(ENABLED_MODULES_KEY);
        }
    }
}
