// src/component/definition.rs

//! Component definitions and schema validation
//!
//! A component's on-disk package directory contains its immutable definition
//! (`modkit.json`), optional hook scripts under `hooks/`, optional template
//! resources under `templates/`, and an optional `files/` payload tree.
//!
//! Validation reports field-specific messages so a malformed definition
//! points straight at the offending key. `soft` validation downgrades
//! violations to best-effort loading for tooling that must inspect broken
//! packages.

use crate::error::{Error, Result};
use crate::properties::PropertySpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use strum_macros::{Display, EnumString};

/// File name of the definition document inside a package directory
pub const DEFINITION_FILE: &str = "modkit.json";

/// Directory of hook scripts inside a package directory
pub const HOOKS_DIR: &str = "hooks";

/// Directory of template resources inside a package directory
pub const TEMPLATES_DIR: &str = "templates";

/// Directory of payload files inside a package directory
pub const FILES_DIR: &str = "files";

/// Whether a component is a plain library or a supervised service
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ComponentKind {
    #[default]
    Component,
    Service,
}

/// A declared export: a named entry point with argument names and defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ExportSpec {
    pub arguments: Vec<String>,
    pub options: BTreeMap<String, Value>,
}

/// Service process configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceSpec {
    pub pid_file: String,
    pub log_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conf_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<StartSpec>,
}

/// Declared start command for a service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StartSpec {
    pub command: String,
    /// Seconds the start command may run before it is killed
    pub timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Default for StartSpec {
    fn default() -> Self {
        Self {
            command: String::new(),
            timeout: 60,
            username: None,
        }
    }
}

/// One file selection inside a packaging folder
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FileSelection {
    pub origin: Vec<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub allow_empty_list: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
}

/// A named folder of file selections
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PackFolder {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub files: Vec<FileSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
}

fn default_selected() -> bool {
    true
}

/// A selectable packaging component
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PackComponent {
    pub name: String,
    pub selected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    pub folders: Vec<PackFolder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
}

impl Default for PackComponent {
    fn default() -> Self {
        Self {
            name: String::new(),
            selected: default_selected(),
            destination: None,
            folders: Vec::new(),
            permissions: None,
        }
    }
}

/// Explicit packaging layout
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct PackagingSpec {
    pub components: Vec<PackComponent>,
}

/// Installation section of a definition
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct InstallationSpec {
    /// Destination prefix under the installation root, overriding the
    /// component name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packaging: Option<PackagingSpec>,
}

/// The immutable identity and declarations of a component
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ComponentDefinition {
    pub id: String,
    pub name: String,
    pub version: String,
    pub revision: i64,
    pub kind: ComponentKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertySpec>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub exports: BTreeMap<String, ExportSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub expects: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installation: Option<InstallationSpec>,
}

impl ComponentDefinition {
    /// Parse and validate a raw JSON definition
    ///
    /// With `soft` set, schema violations fall back to best-effort defaults
    /// instead of failing.
    pub fn from_json(raw: &Value, soft: bool) -> Result<Self> {
        let mut raw = normalize(raw.clone());
        if let Err(e) = validate_schema(&raw) {
            if soft {
                tracing::warn!("schema violation tolerated (soft validation): {}", e);
                raw = sanitize(raw);
            } else {
                return Err(e);
            }
        }
        let mut definition: ComponentDefinition = serde_json::from_value(raw)?;
        if definition.name.is_empty() {
            definition.name = definition.id.clone();
        }
        Ok(definition)
    }

    /// Read and validate `modkit.json` from a package directory
    pub fn load(dir: &Path, soft: bool) -> Result<Self> {
        let file = dir.join(DEFINITION_FILE);
        let text = fs::read_to_string(&file).map_err(|e| {
            Error::Validation(format!("cannot read '{}': {}", file.display(), e))
        })?;
        let raw: Value = serde_json::from_str(&text).map_err(|e| {
            Error::Validation(format!("cannot parse '{}': {}", file.display(), e))
        })?;
        Self::from_json(&raw, soft)
    }

    pub fn is_service(&self) -> bool {
        self.kind == ComponentKind::Service
    }

    /// Export names in declaration order
    pub fn export_names(&self) -> Vec<String> {
        self.exports.keys().cloned().collect()
    }
}

/// Coerce tolerated variants before typed deserialization: revisions written
/// as numeric strings become integers
fn normalize(mut raw: Value) -> Value {
    if let Some(obj) = raw.as_object_mut() {
        let coerced = obj
            .get("revision")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<i64>().ok());
        if let Some(n) = coerced {
            obj.insert("revision".to_string(), Value::from(n));
        }
    }
    raw
}

/// Best-effort repair of a schema-violating definition for soft loading:
/// scalar identity fields coerce to strings, structurally wrong fields drop
fn sanitize(mut raw: Value) -> Value {
    let Some(obj) = raw.as_object_mut() else {
        return Value::Object(serde_json::Map::new());
    };
    for field in ["id", "name", "version"] {
        let repair = match obj.get(field) {
            Some(Value::Number(n)) => Some(Some(n.to_string())),
            Some(v) if !v.is_string() && !v.is_null() => Some(None),
            _ => None,
        };
        match repair {
            Some(Some(s)) => {
                obj.insert(field.to_string(), Value::String(s));
            }
            Some(None) => {
                obj.remove(field);
            }
            None => {}
        }
    }
    if obj.get("revision").map(|v| !v.is_i64() && !v.is_u64()).unwrap_or(false) {
        obj.remove("revision");
    }
    if obj.get("expects").map(|v| !v.is_array()).unwrap_or(false) {
        obj.remove("expects");
    }
    if obj.get("kind").map(|v| !v.is_string()).unwrap_or(false) {
        obj.remove("kind");
    }
    raw
}

fn require_string(raw: &Value, field: &str) -> Result<()> {
    match raw.get(field) {
        None | Some(Value::Null) => Err(Error::Validation(format!("\"{}\" is required", field))),
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err(Error::Validation(format!("\"{}\" must be a string", field))),
    }
}

fn validate_schema(raw: &Value) -> Result<()> {
    if !raw.is_object() {
        return Err(Error::Validation(
            "component definition must be an object".to_string(),
        ));
    }

    require_string(raw, "id")?;
    require_string(raw, "version")?;

    if let Some(name) = raw.get("name")
        && !name.is_null()
        && !name.is_string()
    {
        return Err(Error::Validation("\"name\" must be a string".to_string()));
    }
    if let Some(revision) = raw.get("revision")
        && !revision.is_null()
        && !revision.is_i64()
        && !revision.is_u64()
        && revision.as_str().map(|s| s.parse::<i64>().is_err()).unwrap_or(true)
    {
        return Err(Error::Validation(
            "\"revision\" must be an integer".to_string(),
        ));
    }
    if let Some(expects) = raw.get("expects")
        && !expects.is_null()
        && !expects.is_array()
    {
        return Err(Error::Validation(
            "\"expects\" must be an array of component ids".to_string(),
        ));
    }

    let kind = raw.get("kind").and_then(Value::as_str).unwrap_or("component");
    match kind {
        "component" => {}
        "service" => {
            if raw.get("service").map(Value::is_null).unwrap_or(true) {
                return Err(Error::Validation(
                    "service components must declare a \"service\" section".to_string(),
                ));
            }
        }
        other => {
            return Err(Error::Validation(format!(
                "\"kind\" must be \"component\" or \"service\", not \"{}\"",
                other
            )));
        }
    }

    Ok(())
}
