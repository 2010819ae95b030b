// src/properties/mod.rs

//! Declared component properties
//!
//! A component definition declares typed properties with defaults and
//! persistence flags. [`PropertySet`] owns the declared specs and implements
//! the serialization policy: password values never reach the plaintext
//! registry, `encrypt` values are persisted only as sealed envelopes, and
//! `serializable: false` values are dropped so a reload yields the declared
//! default.

use crate::crypto;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

fn default_true() -> bool {
    true
}

/// A single declared property
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PropertySpec {
    /// Shorthand type tag; `"password"` implies the password flag
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub required: bool,
    pub password: bool,
    pub encrypt: bool,
    #[serde(default = "default_true")]
    pub serializable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for PropertySpec {
    fn default() -> Self {
        Self {
            kind: None,
            value: None,
            default: None,
            required: false,
            password: false,
            encrypt: false,
            serializable: true,
            description: None,
        }
    }
}

impl PropertySpec {
    /// Effective password flag, honoring the `type: password` shorthand
    pub fn is_password(&self) -> bool {
        self.password || self.kind.as_deref() == Some("password")
    }

    /// The value a freshly constructed component starts with
    pub fn initial_value(&self) -> Value {
        self.value
            .clone()
            .or_else(|| self.default.clone())
            .unwrap_or_else(|| Value::String(String::new()))
    }

}

/// The declared property specs of one component
#[derive(Debug, Clone, Default)]
pub struct PropertySet {
    specs: BTreeMap<String, PropertySpec>,
}

impl PropertySet {
    pub fn new(specs: BTreeMap<String, PropertySpec>) -> Self {
        Self { specs }
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&PropertySpec> {
        self.specs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.specs.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertySpec)> {
        self.specs.iter()
    }

    /// Values a freshly constructed component starts with
    pub fn initial_values(&self) -> BTreeMap<String, Value> {
        self.specs
            .iter()
            .map(|(name, spec)| (name.clone(), spec.initial_value()))
            .collect()
    }

    /// Names of required properties whose current value is still unset
    pub fn missing_required(&self, current: &BTreeMap<String, Value>) -> Vec<String> {
        self.specs
            .iter()
            .filter(|(_, spec)| spec.required)
            .filter(|(name, _)| match current.get(name.as_str()) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The subset of `current` that may be written to the registry
    ///
    /// Password values are excluded from plaintext persistence regardless of
    /// the serializable flag, as are `encrypt` values when no encryption key
    /// is configured.
    pub fn serializable_values(
        &self,
        current: &BTreeMap<String, Value>,
        encryption_key: Option<&str>,
    ) -> Result<BTreeMap<String, Value>> {
        let mut out = BTreeMap::new();
        for (name, value) in current {
            let Some(spec) = self.specs.get(name) else {
                continue;
            };
            if spec.is_password() {
                continue;
            }
            if spec.encrypt {
                match encryption_key {
                    Some(key) => {
                        out.insert(name.clone(), Value::String(crypto::encrypt_value(value, key)?));
                    }
                    None => {
                        warn!("property '{}' is marked encrypt but no encryption key is configured; not persisting", name);
                    }
                }
                continue;
            }
            if !spec.serializable {
                continue;
            }
            out.insert(name.clone(), value.clone());
        }
        Ok(out)
    }

    /// Rebuild runtime values from persisted ones
    ///
    /// Excluded properties come back as their declared initial values. Encrypted
    /// properties decrypt when the key is present and surface as null when it
    /// is absent or wrong.
    pub fn rehydrate(
        &self,
        stored: &BTreeMap<String, Value>,
        encryption_key: Option<&str>,
    ) -> BTreeMap<String, Value> {
        let mut out: BTreeMap<String, Value> = self
            .specs
            .iter()
            .map(|(name, spec)| (name.clone(), spec.initial_value()))
            .collect();

        for (name, value) in stored {
            let Some(spec) = self.specs.get(name) else {
                // Stored value without a declared spec: keep it as-is so
                // soft-loaded definitions round-trip.
                out.insert(name.clone(), value.clone());
                continue;
            };
            if spec.encrypt {
                let decrypted = match (encryption_key, value.as_str()) {
                    (Some(key), Some(envelope)) => match crypto::decrypt_value(envelope, key) {
                        Ok(v) => v,
                        Err(e) => {
                            debug!("could not decrypt property '{}': {}", name, e);
                            Value::Null
                        }
                    },
                    _ => Value::Null,
                };
                out.insert(name.clone(), decrypted);
            } else {
                out.insert(name.clone(), value.clone());
            }
        }
        out
    }
}

/// Coerce a raw `--key=value` argument string into a typed value
fn coerce(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
    }
}

/// Parse raw `--key=value` arguments into a value map
///
/// A bare `--flag` sets the property to true.
pub fn parse_raw_args(args: &[String]) -> Result<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    for arg in args {
        let body = arg.strip_prefix("--").ok_or_else(|| {
            Error::Property(format!("invalid argument '{}': expected --key=value", arg))
        })?;
        match body.split_once('=') {
            Some((key, value)) => out.insert(key.to_string(), coerce(value)),
            None => out.insert(body.to_string(), Value::Bool(true)),
        };
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_specs() -> PropertySet {
        let raw = json!({
            "password": {"type": "password", "required": true},
            "plain_attr": {"value": "sample_text"},
            "non_serialized": {"value": "keep_local", "serializable": false},
            "secret": {"encrypt": true},
        });
        let specs: BTreeMap<String, PropertySpec> = serde_json::from_value(raw).unwrap();
        PropertySet::new(specs)
    }

    #[test]
    fn test_password_shorthand() {
        let set = sample_specs();
        assert!(set.get("password").unwrap().is_password());
        assert!(!set.get("plain_attr").unwrap().is_password());
    }

    #[test]
    fn test_initial_values_prefer_value_over_default() {
        let set = sample_specs();
        let values = set.initial_values();
        assert_eq!(values["plain_attr"], json!("sample_text"));
        assert_eq!(values["password"], json!(""));
    }

    #[test]
    fn test_missing_required() {
        let set = sample_specs();
        let mut current = set.initial_values();
        assert_eq!(set.missing_required(&current), vec!["password".to_string()]);

        current.insert("password".to_string(), json!("s3cret"));
        assert!(set.missing_required(&current).is_empty());
    }

    #[test]
    fn test_serializable_values_apply_exclusions() {
        let set = sample_specs();
        let mut current = set.initial_values();
        current.insert("password".to_string(), json!("s3cret"));
        current.insert("secret".to_string(), json!("classified"));

        let out = set.serializable_values(&current, None).unwrap();
        assert_eq!(out.get("plain_attr"), Some(&json!("sample_text")));
        assert!(!out.contains_key("password"));
        assert!(!out.contains_key("non_serialized"));
        // No key configured: encrypted property is not persisted at all
        assert!(!out.contains_key("secret"));
    }

    #[test]
    fn test_encrypted_round_trip_through_rehydrate() {
        let set = sample_specs();
        let mut current = set.initial_values();
        current.insert("secret".to_string(), json!("classified"));

        let stored = set.serializable_values(&current, Some("k3y")).unwrap();
        assert!(stored["secret"].is_string());
        assert_ne!(stored["secret"], json!("classified"));

        let with_key = set.rehydrate(&stored, Some("k3y"));
        assert_eq!(with_key["secret"], json!("classified"));

        let without_key = set.rehydrate(&stored, None);
        assert_eq!(without_key["secret"], Value::Null);
    }

    #[test]
    fn test_rehydrate_restores_declared_values_for_excluded() {
        let set = sample_specs();
        let stored = BTreeMap::new();
        let values = set.rehydrate(&stored, None);
        assert_eq!(values["non_serialized"], json!("keep_local"));
        assert_eq!(values["password"], json!(""));
    }

    #[test]
    fn test_parse_raw_args() {
        let args = vec![
            "--password=asdfasdf".to_string(),
            "--force=true".to_string(),
            "--start_services=false".to_string(),
            "--workers=4".to_string(),
            "--verbose".to_string(),
        ];
        let map = parse_raw_args(&args).unwrap();
        assert_eq!(map["password"], json!("asdfasdf"));
        assert_eq!(map["force"], json!(true));
        assert_eq!(map["start_services"], json!(false));
        assert_eq!(map["workers"], json!(4));
        assert_eq!(map["verbose"], json!(true));
    }

    #[test]
    fn test_parse_raw_args_rejects_malformed() {
        assert!(parse_raw_args(&["password=x".to_string()]).is_err());
    }
}
