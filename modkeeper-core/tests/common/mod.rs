//! Test helpers shared by the integration tests

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use modkeeper_core::{ModularConfig, ModuleManager};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tar::Builder;
use tempfile::TempDir;
use walkdir::WalkDir;

static INIT: Once = Once::new();

/// Initialize logging for tests (only once per test run)
pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// An isolated modules root with its own manager
pub struct TestEnv {
    pub temp_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        init_test_logging();
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("modules")).unwrap();
        Self { temp_dir }
    }

    pub fn config(&self) -> ModularConfig {
        ModularConfig {
            exports_path: self.temp_dir.path().join("exports"),
            ..ModularConfig::with_modules_path(self.modules_path())
        }
    }

    /// A fresh manager, as a new process would construct it
    pub fn manager(&self) -> ModuleManager {
        ModuleManager::new(self.config()).unwrap()
    }

    pub fn modules_path(&self) -> PathBuf {
        self.temp_dir.path().join("modules")
    }

    pub fn enabled_file(&self) -> Vec<String> {
        let content = std::fs::read_to_string(self.modules_path().join("enabled.json")).unwrap();
        serde_json::from_str(&content).unwrap()
    }

    /// Write `<modules>/<name>/module.json` from a JSON manifest
    pub fn create_module(&self, manifest: serde_json::Value) {
        let name = manifest["name"].as_str().unwrap();
        let dir = self.modules_path().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("module.json"),
            serde_json::to_string_pretty(&manifest).unwrap(),
        )
        .unwrap();
    }

    /// Write a `.tar.gz` next to the modules root from (path, content) pairs
    pub fn archive(&self, file_name: &str, entries: &[(&str, &str)]) -> PathBuf {
        let mut bytes = Vec::new();
        {
            let encoder = GzEncoder::new(&mut bytes, Compression::default());
            let mut builder = Builder::new(encoder);
            for (path, content) in entries {
                let mut header = tar::Header::new_gnu();
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder
                    .append_data(&mut header, path, content.as_bytes())
                    .unwrap();
            }
            builder.into_inner().unwrap().finish().unwrap();
        }

        let path = self.temp_dir.path().join(file_name);
        std::fs::write(&path, bytes).unwrap();
        path
    }
}

/// Every regular file under `root`, keyed by relative path
pub fn read_tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap().to_path_buf();
            (relative, std::fs::read(e.path()).unwrap())
        })
        .collect()
}
