// src/component/attributes.rs

//! Dynamic attribute registry
//!
//! Components expose their state through an explicit accessor table: each
//! attribute carries a stored value plus writability, enumerability, and
//! optional get/set transforms. Every read and write dispatches through
//! [`AttributeSet::get`] / [`AttributeSet::set`] rather than native field
//! access, which is what lets handles, templates, and the registry all share
//! one view of a component.
//!
//! Path-flavored attributes resolve relative stored values against the
//! component's installdir at read time; absolute values pass through
//! unchanged. The normalization happens on every access, so reassigning a
//! relative value after an absolute one behaves predictably.

use crate::error::{Error, Result};
use crate::template;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Custom read transform: receives the attribute set and the (expanded,
/// path-resolved) value
pub type Getter = Box<dyn Fn(&AttributeSet, &Value) -> Value + Send + Sync>;

/// Custom write transform: receives the attribute set, the incoming value,
/// and the currently stored value; returns what to store
pub type Setter = Box<dyn Fn(&AttributeSet, Value, &Value) -> Value + Send + Sync>;

/// Options for defining one attribute
pub struct AttributeOptions {
    pub initial: Value,
    pub writable: bool,
    /// None: enumerable unless the name starts with '_'
    pub enumerable: Option<bool>,
    pub getter: Option<Getter>,
    pub setter: Option<Setter>,
    /// Resolve relative values against installdir at read time
    pub path: bool,
}

impl Default for AttributeOptions {
    fn default() -> Self {
        Self {
            initial: Value::Null,
            writable: true,
            enumerable: None,
            getter: None,
            setter: None,
            path: false,
        }
    }
}

impl AttributeOptions {
    pub fn value(initial: impl Into<Value>) -> Self {
        Self {
            initial: initial.into(),
            ..Default::default()
        }
    }

    pub fn read_only(initial: impl Into<Value>) -> Self {
        Self {
            initial: initial.into(),
            writable: false,
            ..Default::default()
        }
    }

    pub fn path(initial: impl Into<Value>) -> Self {
        Self {
            initial: initial.into(),
            path: true,
            ..Default::default()
        }
    }
}

struct AttributeDef {
    value: Value,
    writable: bool,
    enumerable: bool,
    getter: Option<Getter>,
    setter: Option<Setter>,
    path: bool,
}

/// Accessor table for one component instance
#[derive(Default)]
pub struct AttributeSet {
    defs: BTreeMap<String, AttributeDef>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) an attribute definition
    pub fn define(&mut self, name: &str, options: AttributeOptions) {
        let enumerable = options.enumerable.unwrap_or(!name.starts_with('_'));
        self.defs.insert(
            name.to_string(),
            AttributeDef {
                value: options.initial,
                writable: options.writable,
                enumerable,
                getter: options.getter,
                setter: options.setter,
                path: options.path,
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    pub fn is_enumerable(&self, name: &str) -> bool {
        self.defs.get(name).map(|d| d.enumerable).unwrap_or(false)
    }

    /// Read an attribute through its transforms
    pub fn get(&self, name: &str) -> Option<Value> {
        if name == "installdir" {
            return Some(Value::String(path_to_string(&self.installdir())));
        }
        let def = self.defs.get(name)?;
        let mut value = def.value.clone();
        // Placeholders expand before path resolution so templated paths
        // resolve against their final text
        if let Value::String(s) = &value
            && template::has_placeholders(s)
        {
            value = Value::String(template::expand(s, &self.expansion_map()));
        }
        if def.path {
            value = self.resolve_path_value(&value);
        }
        if let Some(getter) = &def.getter {
            value = getter(self, &value);
        }
        Some(value)
    }

    /// Write an attribute through its transforms
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let def = self
            .defs
            .get(name)
            .ok_or_else(|| Error::Property(format!("unknown attribute '{}'", name)))?;
        if !def.writable {
            return Err(Error::Property(format!("'{}' is read-only", name)));
        }
        let new_value = match &def.setter {
            Some(setter) => setter(self, value, &def.value),
            None => value,
        };
        if let Some(def) = self.defs.get_mut(name) {
            def.value = new_value;
        }
        Ok(())
    }

    /// The effective installation directory
    ///
    /// An explicitly stored installdir wins; otherwise it derives from
    /// installPrefix joined with the component name, so reassigning the
    /// prefix moves the derived installdir with it.
    pub fn installdir(&self) -> PathBuf {
        if let Some(def) = self.defs.get("installdir")
            && let Value::String(s) = &def.value
            && !s.is_empty()
        {
            return PathBuf::from(s);
        }
        let prefix = self
            .defs
            .get("installPrefix")
            .and_then(|d| d.value.as_str())
            .unwrap_or("");
        let name = self
            .defs
            .get("name")
            .and_then(|d| d.value.as_str())
            .unwrap_or("");
        Path::new(prefix).join(name)
    }

    fn resolve_path_str(&self, s: &str) -> Value {
        if s.is_empty() || Path::new(s).is_absolute() {
            Value::String(s.to_string())
        } else {
            Value::String(path_to_string(&self.installdir().join(s)))
        }
    }

    /// Resolve a path-flavored value: relative joins installdir, absolute
    /// passes through
    pub fn resolve_path_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => self.resolve_path_str(s),
            other => other.clone(),
        }
    }

    /// Enumerable attributes with installdir derived, placeholders expanded,
    /// and path values resolved; the map used for template substitution
    pub fn expansion_map(&self) -> BTreeMap<String, Value> {
        let mut map = BTreeMap::new();
        for (name, def) in &self.defs {
            if !def.enumerable {
                continue;
            }
            let value = if name == "installdir" {
                Value::String(path_to_string(&self.installdir()))
            } else if def.path && !value_has_placeholders(&def.value) {
                self.resolve_path_value(&def.value)
            } else {
                def.value.clone()
            };
            map.insert(name.clone(), value);
        }
        let snapshot = map.clone();
        for (name, value) in map.iter_mut() {
            if let Value::String(s) = value
                && template::has_placeholders(s)
            {
                let expanded = template::expand(s, &snapshot);
                let is_path = self.defs.get(name.as_str()).map(|d| d.path).unwrap_or(false);
                *value = if is_path {
                    self.resolve_path_str(&expanded)
                } else {
                    Value::String(expanded)
                };
            }
        }
        map.insert(
            "installdir".to_string(),
            Value::String(path_to_string(&self.installdir())),
        );
        map
    }

    /// Fully resolved view of all enumerable attributes (transforms applied)
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.defs
            .iter()
            .filter(|(_, def)| def.enumerable)
            .filter_map(|(name, _)| self.get(name).map(|v| (name.clone(), v)))
            .collect()
    }

}

fn value_has_placeholders(value: &Value) -> bool {
    matches!(value, Value::String(s) if template::has_placeholders(s))
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
