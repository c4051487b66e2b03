//! Per-module feature flags
//!
//! Modules register named features at boot. A feature is on when its own
//! flag is set and every feature it depends on is on. Features live in
//! memory only; the host registers them again on every start.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// A registered feature flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Module that registered the feature, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    /// Opaque permission identifiers, for the host
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Keys of features that must be on for this one to be on
    #[serde(default)]
    pub dependencies: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for Feature {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            module: None,
            permissions: Vec::new(),
            dependencies: Vec::new(),
        }
    }
}

impl Feature {
    /// An enabled feature owned by `module`
    pub fn for_module(module: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            ..Default::default()
        }
    }

    pub fn depends_on(mut self, key: impl Into<String>) -> Self {
        self.dependencies.push(key.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// In-memory table of feature flags keyed by feature key
#[derive(Default)]
pub struct FeatureRegistry {
    features: RwLock<BTreeMap<String, Feature>>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `feature` under `key`, replacing any earlier registration
    pub fn register(&self, key: impl Into<String>, feature: Feature) {
        let key = key.into();
        debug!("Registered feature '{}' (enabled: {})", key, feature.enabled);
        self.write().insert(key, feature);
    }

    /// Remove `key`, returning its registration
    pub fn unregister(&self, key: &str) -> Option<Feature> {
        self.write().remove(key)
    }

    /// Remove every feature owned by `module`
    pub fn unregister_module(&self, module: &str) -> usize {
        let mut features = self.write();
        let before = features.len();
        features.retain(|_, feature| feature.module.as_deref() != Some(module));
        before - features.len()
    }

    /// Set the flag of `key`; `false` when it is not registered
    pub fn enable(&self, key: &str) -> bool {
        self.set_enabled(key, true)
    }

    /// Clear the flag of `key`; `false` when it is not registered
    pub fn disable(&self, key: &str) -> bool {
        self.set_enabled(key, false)
    }

    fn set_enabled(&self, key: &str, enabled: bool) -> bool {
        match self.write().get_mut(key) {
            Some(feature) => {
                feature.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Whether `key` is registered, flagged on and all its dependencies are on
    ///
    /// Features on a dependency cycle are off.
    pub fn is_enabled(&self, key: &str) -> bool {
        let features = self.read();
        let mut path = HashSet::new();
        Self::resolve(&features, key, &mut path)
    }

    fn resolve<'a>(
        features: &'a BTreeMap<String, Feature>,
        key: &'a str,
        path: &mut HashSet<&'a str>,
    ) -> bool {
        let Some(feature) = features.get(key) else {
            return false;
        };
        if !feature.enabled {
            return false;
        }
        if !path.insert(key) {
            warn!("Feature '{}' is part of a dependency cycle", key);
            return false;
        }

        let on = feature
            .dependencies
            .iter()
            .all(|dep| Self::resolve(features, dep, path));
        path.remove(key);
        on
    }

    pub fn get(&self, key: &str) -> Option<Feature> {
        self.read().get(key).cloned()
    }

    /// Every registered feature, sorted by key
    pub fn all(&self) -> BTreeMap<String, Feature> {
        self.read().clone()
    }

    /// Features registered by `module`
    pub fn by_module(&self, module: &str) -> BTreeMap<String, Feature> {
        self.read()
            .iter()
            .filter(|(_, feature)| feature.module.as_deref() == Some(module))
            .map(|(key, feature)| (key.clone(), feature.clone()))
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Feature>> {
        self.features.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Feature>> {
        self.features.write().unwrap_or_else(|e| e.into_inner())
    }
}
