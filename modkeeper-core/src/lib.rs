//! modkeeper - module lifecycle management for host applications
//!
//! Tracks which optional modules exist on disk and which are enabled,
//! resolves dependencies between them and installs, uninstalls and exports
//! module packages.
//!
//! # Layout on disk
//!
//! ```text
//! <modules_path>/
//!     enabled.json          ← JSON array of enabled module names
//!     Blog/
//!         module.json       ← manifest: name, version, dependencies, providers
//!         ...
//!     Shop/
//!         module.json
//! <exports_path>/
//!     Blog.tar.gz           ← written by export
//! ```
//!
//! Everything goes through [`ModuleManager`], built once from a
//! [`ModularConfig`].

pub mod archive;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod features;
pub mod installer;
pub mod manager;
pub mod manifest;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod version;

pub use archive::ExportedArchive;
pub use cache::{CacheProvider, MemoryCache};
pub use config::ModularConfig;
pub use error::{Collision, ErrorKind, ModuleError, OperationResult};
pub use events::{ModuleEvent, ModuleEventKind, ModuleListener};
pub use features::{Feature, FeatureRegistry};
pub use installer::InstallOutcome;
pub use manager::{ModuleEntry, ModuleManager};
pub use manifest::{Dependency, ModuleManifest};
pub use registry::{RegistryCache, Transition};
pub use resolver::{BootEntry, BootPlan, UnmetDependency, UnmetReason};
pub use version::VersionConstraint;
