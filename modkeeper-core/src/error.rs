//! Module system error types
//!
//! Dependency problems and dependency cycles are not errors: the resolver
//! reports them as data and the caller decides what to do with them.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Why an install target is already taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collision {
    /// A module with a readable manifest already uses the name
    ModuleExists(String),
    /// The target directory is on disk even though no module lives there
    DirectoryExists(PathBuf),
}

impl std::fmt::Display for Collision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Collision::ModuleExists(name) => write!(f, "Module '{name}' already exists"),
            Collision::DirectoryExists(path) => {
                write!(f, "Target directory already exists: {}", path.display())
            }
        }
    }
}

/// Errors surfaced by module operations
#[derive(Error, Debug)]
pub enum ModuleError {
    /// The referenced module has no manifest
    #[error("Module '{0}' does not exist")]
    NotFound(String),

    /// The install target name or directory is in use
    #[error("{0}")]
    Collision(Collision),

    /// The archive could not be read or does not contain a usable manifest
    #[error("Invalid module package: {reason}")]
    InvalidPackage {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A module name cannot be used as a directory name
    #[error("Invalid module name '{0}'")]
    InvalidName(String),

    /// The enabled-set file could not be read or written
    #[error("Failed to persist enabled modules to {path}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A filesystem operation on a module directory failed
    #[error("{context}: {path}")]
    Io {
        context: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ModuleError {
    pub(crate) fn invalid_package(reason: impl Into<String>) -> Self {
        ModuleError::InvalidPackage {
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn io(
        context: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        ModuleError::Io {
            context: context.into(),
            path: path.into(),
            source,
        }
    }

    /// Coarse error kind, stable across message wording changes
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModuleError::NotFound(_) => ErrorKind::NotFound,
            ModuleError::Collision(_) => ErrorKind::Collision,
            ModuleError::InvalidPackage { .. } | ModuleError::InvalidName(_) => {
                ErrorKind::InvalidPackage
            }
            ModuleError::Persistence { .. } | ModuleError::Io { .. } => ErrorKind::Persistence,
        }
    }
}

/// Error kinds reported across the host boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Collision,
    InvalidPackage,
    Persistence,
}

/// Result of a public operation in the shape a host boundary (admin UI, CLI)
/// consumes: a flag, a human-readable message and optional data.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> OperationResult<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            kind: None,
            data: Some(data),
        }
    }

    pub fn failed(error: &ModuleError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            kind: Some(error.kind()),
            data: None,
        }
    }

    /// Convert an operation result, building the success message from the data
    pub fn from_result(
        result: Result<T, ModuleError>,
        message: impl FnOnce(&T) -> String,
    ) -> Self {
        match result {
            Ok(data) => {
                let message = message(&data);
                Self::ok(message, data)
            }
            Err(e) => Self::failed(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_messages() {
        let err = ModuleError::Collision(Collision::ModuleExists("Blog".to_string()));
        assert_eq!(err.to_string(), "Module 'Blog' already exists");
        assert_eq!(err.kind(), ErrorKind::Collision);

        let err = ModuleError::Collision(Collision::DirectoryExists(PathBuf::from("/m/Blog")));
        assert!(err.to_string().contains("/m/Blog"));
    }

    #[test]
    fn test_operation_result_from_error() {
        let result: OperationResult<()> =
            OperationResult::from_result(Err(ModuleError::NotFound("Shop".into())), |_| {
                unreachable!()
            });

        assert!(!result.success);
        assert_eq!(result.kind, Some(ErrorKind::NotFound));
        assert_eq!(result.message, "Module 'Shop' does not exist");

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["kind"], "not_found");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_operation_result_from_success() {
        let result = OperationResult::from_result(Ok(vec!["A".to_string()]), |names| {
            format!("{} module(s)", names.len())
        });

        assert!(result.success);
        assert_eq!(result.message, "1 module(s)");
        assert_eq!(result.data.unwrap(), vec!["A".to_string()]);
    }
}
