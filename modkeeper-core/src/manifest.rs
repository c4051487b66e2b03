//! Module manifest parsing (module.json)
//!
//! The manifest names the module and declares its version, dependencies and
//! bootstrap providers. Dependencies are accepted in two shapes and
//! normalized into one ordered list at parse time:
//!
//! ```json
//! { "name": "Shop", "dependencies": { "Catalog": "^1.2", "Users": "*" } }
//! { "name": "Shop", "dependencies": ["Catalog", "Users"] }
//! ```

use anyhow::{Context, Result};
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Constraint that accepts any enabled version
pub const ANY_VERSION: &str = "*";

/// A module manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Unique module name, matches the module's directory name
    pub name: String,

    /// Loose version string (not validated)
    #[serde(
        default,
        deserialize_with = "deserialize_loose_version",
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Dependencies in declaration order
    #[serde(
        default,
        deserialize_with = "deserialize_dependencies",
        serialize_with = "serialize_dependencies",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub dependencies: Vec<Dependency>,

    /// Opaque bootstrap hook identifiers
    #[serde(default)]
    pub providers: Vec<String>,

    /// Fields the module system does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One dependency edge: the named module at a version constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub constraint: String,
}

impl Dependency {
    pub fn new(name: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraint: constraint.into(),
        }
    }

    /// Dependency on any version of `name`
    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, ANY_VERSION)
    }

    pub fn is_any_version(&self) -> bool {
        self.constraint == ANY_VERSION
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_any_version() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.constraint)
        }
    }
}

impl ModuleManifest {
    /// Load manifest from a file path
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;

        Self::from_json(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))
    }

    /// Parse and validate a manifest from JSON text
    pub fn from_json(content: &str) -> Result<Self> {
        let manifest: Self = serde_json::from_str(content).context("Invalid manifest JSON")?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// A manifest is usable only with a non-empty name
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Module name is required");
        }
        Ok(())
    }

    /// Whether this module declares a dependency on `name`
    pub fn depends_on(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d.name == name)
    }
}

/// Rewrite the `name` field of a manifest file in place, keeping every other
/// field and its position.
pub fn rewrite_manifest_name(path: &Path, name: &str) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;

    let mut value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;

    let object = value
        .as_object_mut()
        .context("Manifest is not a JSON object")?;
    object.insert("name".to_string(), Value::String(name.to_string()));

    let rendered = serde_json::to_string_pretty(&value)?;
    std::fs::write(path, rendered)
        .with_context(|| format!("Failed to write manifest: {}", path.display()))?;

    Ok(())
}

fn deserialize_loose_version<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    // Accepts "1.2.0", 2, 1.5 and null
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::invalid_type(
            de::Unexpected::Other(&other.to_string()),
            &"a version string",
        )),
    }
}

fn deserialize_dependencies<'de, D>(deserializer: D) -> Result<Vec<Dependency>, D::Error>
where
    D: Deserializer<'de>,
{
    struct DependenciesVisitor;

    impl<'de> Visitor<'de> for DependenciesVisitor {
        type Value = Vec<Dependency>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a map of module names to constraints or a list of module names")
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Vec::new())
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Vec::new())
        }

        fn visit_seq<S>(self, mut seq: S) -> Result<Self::Value, S::Error>
        where
            S: SeqAccess<'de>,
        {
            let mut dependencies = Vec::new();
            while let Some(name) = seq.next_element::<String>()? {
                dependencies.push(Dependency::any(name));
            }
            Ok(dependencies)
        }

        fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
        where
            M: MapAccess<'de>,
        {
            let mut dependencies = Vec::new();
            while let Some((name, constraint)) = map.next_entry::<String, Option<String>>()? {
                let constraint = constraint
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| ANY_VERSION.to_string());
                dependencies.push(Dependency::new(name, constraint.trim()));
            }
            Ok(dependencies)
        }
    }

    deserializer.deserialize_any(DependenciesVisitor)
}

fn serialize_dependencies<S>(dependencies: &[Dependency], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(dependencies.len()))?;
    for dependency in dependencies {
        map.serialize_entry(&dependency.name, &dependency.constraint)?;
    }
    map.end()
}
