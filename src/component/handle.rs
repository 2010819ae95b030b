// src/component/handle.rs

//! Read-only component projections
//!
//! A [`Handle`] is the only view one component's hook code ever gets of
//! another component. It is built from a fixed allow-list of identity and
//! path attributes plus the declared non-password properties, snapshotted at
//! construction time. Writes always fail; internal bookkeeping (raw specs,
//! metadata directories, file manifests) is never exposed.

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Built-in attributes every handle exposes
pub const HANDLE_BUILTIN_KEYS: &[&str] = &[
    "exports",
    "name",
    "id",
    "version",
    "revision",
    "licenses",
    "installdir",
    "dataDir",
    "logsDir",
    "tmpDir",
    "confDir",
    "libDir",
    "binDir",
];

/// Immutable capability view of a component
#[derive(Debug, Clone)]
pub struct Handle {
    id: String,
    fields: BTreeMap<String, Value>,
}

impl Handle {
    pub(crate) fn new(id: String, fields: BTreeMap<String, Value>) -> Self {
        Self { id, fields }
    }

    /// Id of the component this handle projects
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Read an exposed field; absent keys return None
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Every write through a handle is rejected
    pub fn set(&self, key: &str, _value: Value) -> Result<()> {
        Err(Error::Property(format!("'{}' is read-only", key)))
    }

    /// The exposed field names, sorted
    pub fn keys(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    /// Iterate over exposed fields
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Declared export names, if any
    pub fn exports(&self) -> Vec<String> {
        match self.fields.get("exports") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_handle() -> Handle {
        let mut fields = BTreeMap::new();
        fields.insert("id".to_string(), json!("com.example.dep"));
        fields.insert("name".to_string(), json!("dep"));
        fields.insert("exports".to_string(), json!(["check", "render"]));
        Handle::new("com.example.dep".to_string(), fields)
    }

    #[test]
    fn test_get_exposed_field() {
        let handle = sample_handle();
        assert_eq!(handle.get("name"), Some(&json!("dep")));
        assert_eq!(handle.get("metadataDir"), None);
    }

    #[test]
    fn test_every_write_is_rejected() {
        let handle = sample_handle();
        for key in ["id", "name", "exports", "anything"] {
            let err = handle.set(key, json!("dummy")).unwrap_err();
            assert!(err.to_string().contains(&format!("'{}' is read-only", key)));
        }
        // The underlying fields are unchanged
        assert_eq!(handle.get("name"), Some(&json!("dep")));
    }

    #[test]
    fn test_exports_listing() {
        assert_eq!(sample_handle().exports(), vec!["check", "render"]);
    }
}
