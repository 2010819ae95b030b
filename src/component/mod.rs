// src/component/mod.rs

//! Component aggregate
//!
//! A [`Component`] wraps an immutable [`ComponentDefinition`] with its
//! runtime state: the dynamic attribute table, current property values,
//! lifecycle position, and the hook sources it shipped with. Instances are
//! shared as `Arc<Component>` out of the registry cache; mutable state sits
//! behind an interior lock so the single-writer discipline of the manager
//! holds without threading `&mut` through every caller.

pub mod attributes;
pub mod definition;
pub mod handle;

use crate::error::{Error, Result};
use crate::hooks::{Hook, HookBindings, HookHost, HookOutcome};
use crate::properties::{self, PropertySet};
use crate::template;
use attributes::{AttributeOptions, AttributeSet};
use definition::{ComponentDefinition, ComponentKind, DEFINITION_FILE, HOOKS_DIR, TEMPLATES_DIR};
use handle::{Handle, HANDLE_BUILTIN_KEYS};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use strum_macros::{Display, EnumString};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Default root under which components install
pub const DEFAULT_INSTALL_PREFIX: &str = "/opt/modkit";

/// Manifest file name inside a component's metadata directory
pub const INSTALLED_FILES_MANIFEST: &str = "installed-files.txt";

/// Built-in directory attributes, each relative to installdir unless
/// overridden
const BUILTIN_DIRS: &[(&str, &str)] = &[
    ("logsDir", "logs"),
    ("confDir", "conf"),
    ("dataDir", "data"),
    ("tmpDir", "tmp"),
    ("libDir", "lib"),
    ("binDir", "bin"),
];

/// Lifecycle position of a component
///
/// A freshly constructed component has no lifecycle value yet; uninstall is
/// removal from the registry, not a state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Lifecycle {
    Unpacked,
    Installed,
}

/// Construction options for a component
#[derive(Debug, Clone, Default)]
pub struct ComponentOptions {
    /// Explicit installation directory, overriding prefix/name derivation
    pub installdir: Option<PathBuf>,
    /// Installation root; installdir defaults to `<prefix>/<name>`
    pub install_prefix: Option<PathBuf>,
    /// Passphrase for encrypted properties
    pub encryption_key: Option<String>,
}

/// Durable snapshot of a component's state, embedded in registry entries and
/// written to the metadata directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecord {
    pub definition: ComponentDefinition,
    pub values: BTreeMap<String, Value>,
    pub lifecycle: Option<Lifecycle>,
    pub installdir: PathBuf,
    pub install_prefix: PathBuf,
    pub installed_as_root: bool,
}

/// What [`Component::serialize`] wrote, categorized
#[derive(Debug, Clone, Serialize)]
pub struct SerializedResources {
    pub hooks: Vec<String>,
    pub extra: Vec<String>,
    pub json: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_files: Option<String>,
}

struct Inner {
    attrs: AttributeSet,
    lifecycle: Option<Lifecycle>,
    installed_as_root: bool,
    installed_files: Vec<String>,
}

/// One loaded component instance
pub struct Component {
    definition: ComponentDefinition,
    properties: PropertySet,
    hooks: BTreeMap<Hook, String>,
    package_dir: Option<PathBuf>,
    host: Arc<dyn HookHost>,
    encryption_key: Option<String>,
    inner: Mutex<Inner>,
}

impl Component {
    /// Build a component from its definition; performs no I/O
    pub fn new(
        definition: ComponentDefinition,
        hooks: BTreeMap<Hook, String>,
        package_dir: Option<PathBuf>,
        host: Arc<dyn HookHost>,
        options: &ComponentOptions,
    ) -> Self {
        let mut attrs = AttributeSet::new();

        attrs.define("id", AttributeOptions::read_only(definition.id.clone()));
        attrs.define("name", AttributeOptions::read_only(definition.name.clone()));
        attrs.define(
            "version",
            AttributeOptions::read_only(definition.version.clone()),
        );
        attrs.define(
            "revision",
            AttributeOptions::read_only(definition.revision),
        );
        attrs.define(
            "licenses",
            AttributeOptions::read_only(Value::from(definition.licenses.clone())),
        );

        let prefix = options
            .install_prefix
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INSTALL_PREFIX));
        attrs.define(
            "installPrefix",
            AttributeOptions::value(prefix.to_string_lossy().into_owned()),
        );
        let installdir_initial = options
            .installdir
            .as_ref()
            .map(|p| Value::String(p.to_string_lossy().into_owned()))
            .unwrap_or(Value::Null);
        attrs.define("installdir", AttributeOptions::value(installdir_initial));

        for (attr, dir) in BUILTIN_DIRS {
            attrs.define(attr, AttributeOptions::path(*dir));
        }

        if let Some(service) = &definition.service {
            attrs.define("pidFile", AttributeOptions::path(service.pid_file.clone()));
            attrs.define("logFile", AttributeOptions::path(service.log_file.clone()));
            if let Some(socket_file) = &service.socket_file {
                attrs.define("socketFile", AttributeOptions::path(socket_file.clone()));
            }
            if let Some(conf_file) = &service.conf_file {
                attrs.define("confFile", AttributeOptions::path(conf_file.clone()));
            }
        }

        let properties = PropertySet::new(definition.properties.clone());
        for (name, value) in properties.initial_values() {
            attrs.define(&name, AttributeOptions::value(value));
        }

        Self {
            definition,
            properties,
            hooks,
            package_dir,
            host,
            encryption_key: options.encryption_key.clone(),
            inner: Mutex::new(Inner {
                attrs,
                lifecycle: None,
                installed_as_root: nix::unistd::geteuid().is_root(),
                installed_files: Vec::new(),
            }),
        }
    }

    /// Load an unregistered component from a package directory
    pub fn from_package_dir(
        dir: &Path,
        host: Arc<dyn HookHost>,
        options: &ComponentOptions,
        soft_schema_validation: bool,
    ) -> Result<Self> {
        let definition = ComponentDefinition::load(dir, soft_schema_validation)?;
        let hooks = load_hooks(&dir.join(HOOKS_DIR))?;
        Ok(Self::new(
            definition,
            hooks,
            Some(dir.to_path_buf()),
            host,
            options,
        ))
    }

    /// Rebuild a component from its durable record and metadata directory
    pub fn from_record(
        record: ComponentRecord,
        metadata_dir: &Path,
        host: Arc<dyn HookHost>,
        encryption_key: Option<&str>,
    ) -> Result<Self> {
        let options = ComponentOptions {
            installdir: Some(record.installdir.clone()),
            install_prefix: Some(record.install_prefix.clone()),
            encryption_key: encryption_key.map(String::from),
        };
        let hooks = load_hooks(&metadata_dir.join(HOOKS_DIR))?;
        let component = Self::new(
            record.definition,
            hooks,
            Some(metadata_dir.to_path_buf()),
            host,
            &options,
        );

        let values = component
            .properties
            .rehydrate(&record.values, encryption_key);
        {
            let mut inner = component.inner.lock();
            for (name, value) in values {
                if inner.attrs.contains(&name) {
                    inner.attrs.set(&name, value)?;
                } else {
                    inner.attrs.define(&name, AttributeOptions::value(value));
                }
            }
            inner.lifecycle = record.lifecycle;
            inner.installed_as_root = record.installed_as_root;
            inner.installed_files = read_manifest(metadata_dir)?;
        }
        Ok(component)
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn version(&self) -> &str {
        &self.definition.version
    }

    pub fn revision(&self) -> i64 {
        self.definition.revision
    }

    pub fn kind(&self) -> ComponentKind {
        self.definition.kind
    }

    pub fn is_service(&self) -> bool {
        self.definition.is_service()
    }

    pub fn definition(&self) -> &ComponentDefinition {
        &self.definition
    }

    pub fn expects(&self) -> &[String] {
        &self.definition.expects
    }

    pub fn lifecycle(&self) -> Option<Lifecycle> {
        self.inner.lock().lifecycle
    }

    pub(crate) fn set_lifecycle(&self, lifecycle: Option<Lifecycle>) {
        self.inner.lock().lifecycle = lifecycle;
    }

    pub fn installed_as_root(&self) -> bool {
        self.inner.lock().installed_as_root
    }

    pub fn installdir(&self) -> PathBuf {
        self.inner.lock().attrs.installdir()
    }

    pub fn install_prefix(&self) -> PathBuf {
        self.get("installPrefix")
            .and_then(|v| v.as_str().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INSTALL_PREFIX))
    }

    pub fn installed_files(&self) -> Vec<String> {
        self.inner.lock().installed_files.clone()
    }

    pub(crate) fn set_installed_files(&self, files: Vec<String>) {
        self.inner.lock().installed_files = files;
    }

    /// Read an attribute through the accessor table
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.lock().attrs.get(name)
    }

    /// Write an attribute through the accessor table
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.inner.lock().attrs.set(name, value.into())
    }

    /// Define a dynamic attribute
    pub fn define_attribute(&self, name: &str, options: AttributeOptions) {
        self.inner.lock().attrs.define(name, options);
    }

    /// Define a dynamic path attribute (relative values resolve against
    /// installdir at read time)
    pub fn define_path_attribute(&self, name: &str, options: AttributeOptions) {
        self.inner.lock().attrs.define(
            name,
            AttributeOptions {
                path: true,
                ..options
            },
        );
    }

    /// Expand `{{$app.<attr>}}` / `{{<key>}}` placeholders against this
    /// component's attributes merged with `extra`
    pub fn subst(&self, text: &str, extra: Option<&BTreeMap<String, Value>>) -> String {
        let mut map = self.inner.lock().attrs.expansion_map();
        if let Some(extra) = extra {
            for (key, value) in extra {
                map.insert(key.clone(), value.clone());
            }
        }
        template::expand(text, &map)
    }

    /// Like [`Component::subst`], but non-string values pass through
    /// unchanged
    pub fn subst_value(&self, value: &Value, extra: Option<&BTreeMap<String, Value>>) -> Value {
        match value {
            Value::String(s) => Value::String(self.subst(s, extra)),
            other => other.clone(),
        }
    }

    /// The template-expansion view of this component's attributes
    pub fn expansion_map(&self) -> BTreeMap<String, Value> {
        self.inner.lock().attrs.expansion_map()
    }

    /// Current values of the declared properties
    pub fn property_values(&self) -> BTreeMap<String, Value> {
        let inner = self.inner.lock();
        self.properties
            .names()
            .filter_map(|name| inner.attrs.get(name).map(|v| (name.clone(), v)))
            .collect()
    }

    /// Names of required properties still unset
    pub fn missing_required_properties(&self) -> Vec<String> {
        self.properties.missing_required(&self.property_values())
    }

    /// Apply user-supplied property values
    pub fn apply_values(&self, values: &BTreeMap<String, Value>) -> Result<()> {
        for (name, value) in values {
            if !self.properties.contains(name) {
                return Err(Error::Property(format!(
                    "unknown property '{}' for component {}",
                    name,
                    self.id()
                )));
            }
            self.set(name, value.clone())?;
        }
        Ok(())
    }

    /// Apply raw `--key=value` arguments
    pub fn apply_raw_args(&self, args: &[String]) -> Result<()> {
        self.apply_values(&properties::parse_raw_args(args)?)
    }

    /// The read-only projection other components see of this one
    pub fn handle(&self) -> Handle {
        let inner = self.inner.lock();
        let mut fields = BTreeMap::new();
        for key in HANDLE_BUILTIN_KEYS {
            let value = match *key {
                "exports" => Value::from(self.definition.export_names()),
                _ => inner.attrs.get(key).unwrap_or(Value::Null),
            };
            fields.insert((*key).to_string(), value);
        }
        for (name, spec) in self.properties.iter() {
            if spec.is_password() {
                continue;
            }
            if let Some(value) = inner.attrs.get(name) {
                fields.insert(name.clone(), value);
            }
        }
        Handle::new(self.definition.id.clone(), fields)
    }

    /// JSON summary for inspection tooling
    pub fn inspect(&self) -> Value {
        serde_json::json!({
            "id": self.id(),
            "name": self.name(),
            "version": self.version(),
            "revision": self.revision(),
            "kind": self.kind(),
            "lifecycle": self.lifecycle(),
            "installdir": self.installdir(),
            "installPrefix": self.install_prefix(),
            "installedAsRoot": self.installed_as_root(),
            "environment": &self.definition.environment,
            "exports": self.definition.export_names(),
            "expects": &self.definition.expects,
            "properties": self.property_values(),
        })
    }

    fn bindings(&self, label: String, modules: &BTreeMap<String, Handle>) -> HookBindings {
        let inner = self.inner.lock();
        let installdir = inner.attrs.installdir();
        HookBindings {
            label,
            app: inner.attrs.snapshot(),
            modules: modules.clone(),
            // A hook may legitimately run after its installdir is gone
            // (post-uninstallation); fall back to the process cwd then
            cwd: Some(installdir).filter(|dir| dir.is_dir()),
            timeout: None,
            username: None,
        }
    }

    /// Run one lifecycle hook; absence is a no-op
    ///
    /// A failing hook surfaces as a lifecycle error wrapping the hook name
    /// and the original failure text; the caller must not advance the
    /// lifecycle past the last completed step.
    pub fn run_hook(&self, hook: Hook, modules: &BTreeMap<String, Handle>) -> Result<()> {
        let Some(source) = self.hooks.get(&hook) else {
            debug!("{}: no '{}' hook, skipping", self.id(), hook);
            return Ok(());
        };
        info!("{}: running '{}' hook", self.id(), hook);
        let bindings = self.bindings(hook.to_string(), modules);
        let outcome = self.host.run(source, &bindings).map_err(|e| Error::Lifecycle {
            hook: hook.to_string(),
            message: e.to_string(),
        })?;
        if !outcome.success() {
            return Err(Error::Lifecycle {
                hook: hook.to_string(),
                message: outcome.failure_message(),
            });
        }
        Ok(())
    }

    /// Execute arbitrary source under this component's bindings, returning
    /// the outcome value (its last non-empty stdout line)
    pub fn eval_code(&self, code: &str) -> Result<String> {
        self.eval_code_with_modules(code, &BTreeMap::new())
    }

    pub fn eval_code_with_modules(
        &self,
        code: &str,
        modules: &BTreeMap<String, Handle>,
    ) -> Result<String> {
        let bindings = self.bindings("eval".to_string(), modules);
        let outcome = self.host.run(code, &bindings)?;
        outcome_value(outcome)
    }

    /// Execute a script file under this component's bindings
    pub fn eval_file(&self, path: &Path) -> Result<String> {
        let code = fs::read_to_string(path)?;
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "eval".to_string());
        let bindings = self.bindings(label, &BTreeMap::new());
        let outcome = self.host.run(&code, &bindings)?;
        outcome_value(outcome)
    }

    /// Current durable snapshot (property exclusions applied)
    pub fn record(&self) -> Result<ComponentRecord> {
        let values = self
            .properties
            .serializable_values(&self.property_values(), self.encryption_key.as_deref())?;
        let inner = self.inner.lock();
        let install_prefix = inner
            .attrs
            .get("installPrefix")
            .and_then(|v| v.as_str().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INSTALL_PREFIX));
        Ok(ComponentRecord {
            definition: self.definition.clone(),
            values,
            lifecycle: inner.lifecycle,
            installdir: inner.attrs.installdir(),
            install_prefix,
            installed_as_root: inner.installed_as_root,
        })
    }

    /// Write this component's metadata directory: the JSON snapshot, the
    /// hook sources it actually defines, extra resource directories, and the
    /// installed-files manifest
    pub fn serialize(&self, dir: &Path) -> Result<SerializedResources> {
        fs::create_dir_all(dir)?;

        let record = self.record()?;
        fs::write(
            dir.join(DEFINITION_FILE),
            serde_json::to_string_pretty(&record)?,
        )?;

        let mut hook_files = Vec::new();
        if !self.hooks.is_empty() {
            let hooks_dir = dir.join(HOOKS_DIR);
            fs::create_dir_all(&hooks_dir)?;
            for (hook, source) in &self.hooks {
                let file_name = hook.file_name();
                fs::write(hooks_dir.join(&file_name), source)?;
                hook_files.push(file_name);
            }
        }

        let mut extra = Vec::new();
        if let Some(package_dir) = &self.package_dir {
            let templates = package_dir.join(TEMPLATES_DIR);
            let target = dir.join(TEMPLATES_DIR);
            if templates.is_dir() && templates != target {
                copy_dir(&templates, &target)?;
                extra.push(TEMPLATES_DIR.to_string());
            }
        }

        let installed_files = {
            let inner = self.inner.lock();
            if inner.installed_files.is_empty() {
                None
            } else {
                fs::write(
                    dir.join(INSTALLED_FILES_MANIFEST),
                    inner.installed_files.join("\n") + "\n",
                )?;
                Some(INSTALLED_FILES_MANIFEST.to_string())
            }
        };

        Ok(SerializedResources {
            hooks: hook_files,
            extra,
            json: DEFINITION_FILE.to_string(),
            installed_files,
        })
    }

    /// Remove every path recorded in the installed-files manifest, pruning
    /// directories that end up empty
    pub fn remove_installed_files(&self) -> Result<()> {
        let installdir = self.installdir();
        let manifest = self.installed_files();

        let mut directories = Vec::new();
        for line in &manifest {
            let path = if Path::new(line).is_absolute() {
                PathBuf::from(line)
            } else {
                installdir.join(line)
            };
            if path.is_dir() {
                directories.push(path);
            } else {
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        // Deepest directories first so empty parents can go too
        directories.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
        for dir in directories {
            let _ = fs::remove_dir(dir);
        }
        if installdir.is_dir() {
            let _ = fs::remove_dir(&installdir);
        }
        Ok(())
    }

}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.definition.id)
            .field("version", &self.definition.version)
            .field("lifecycle", &self.lifecycle())
            .finish()
    }
}

fn outcome_value(outcome: HookOutcome) -> Result<String> {
    if !outcome.success() {
        return Err(Error::Execution(outcome.failure_message()));
    }
    Ok(outcome.value().unwrap_or_default())
}

/// Read the hook scripts present in a `hooks/` directory
fn load_hooks(dir: &Path) -> Result<BTreeMap<Hook, String>> {
    let mut hooks = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(hooks);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(stem) = name.strip_suffix(".sh") else {
            continue;
        };
        if let Ok(hook) = Hook::from_str(stem) {
            hooks.insert(hook, fs::read_to_string(entry.path())?);
        } else {
            debug!("ignoring unknown hook script '{}'", name);
        }
    }
    Ok(hooks)
}

/// Read a metadata directory's installed-files manifest
pub(crate) fn read_manifest(metadata_dir: &Path) -> Result<Vec<String>> {
    let path = metadata_dir.join(INSTALLED_FILES_MANIFEST);
    if !path.is_file() {
        return Ok(Vec::new());
    }
    Ok(fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

fn copy_dir(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry =
            entry.map_err(|e| Error::Execution(format!("cannot walk '{}': {}", src.display(), e)))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Execution(format!("path outside tree: {}", e)))?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent()
                && !parent.exists()
            {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::ShellHost;
    use serde_json::json;

    fn sample_definition() -> ComponentDefinition {
        ComponentDefinition::from_json(
            &json!({
                "id": "com.example.sample",
                "name": "sample",
                "version": "1.2.3",
                "revision": 0
            }),
            false,
        )
        .unwrap()
    }

    fn sample_component() -> Component {
        Component::new(
            sample_definition(),
            BTreeMap::new(),
            None,
            Arc::new(ShellHost::new()),
            &ComponentOptions::default(),
        )
    }

    #[test]
    fn test_lifecycle_defaults_to_none() {
        assert_eq!(sample_component().lifecycle(), None);
    }

    #[test]
    fn test_installdir_defaults_to_prefix_and_name() {
        let component = sample_component();
        assert_eq!(
            component.installdir(),
            PathBuf::from("/opt/modkit/sample")
        );
    }

    #[test]
    fn test_installdir_follows_options() {
        let component = Component::new(
            sample_definition(),
            BTreeMap::new(),
            None,
            Arc::new(ShellHost::new()),
            &ComponentOptions {
                install_prefix: Some(PathBuf::from("/tmp/new_root")),
                ..Default::default()
            },
        );
        assert_eq!(component.installdir(), PathBuf::from("/tmp/new_root/sample"));

        let component = Component::new(
            sample_definition(),
            BTreeMap::new(),
            None,
            Arc::new(ShellHost::new()),
            &ComponentOptions {
                installdir: Some(PathBuf::from("/tmp/exact")),
                ..Default::default()
            },
        );
        assert_eq!(component.installdir(), PathBuf::from("/tmp/exact"));
    }

    #[test]
    fn test_builtin_path_attributes() {
        let component = sample_component();
        for (attr, dir) in [("logsDir", "logs"), ("confDir", "conf"), ("dataDir", "data"), ("tmpDir", "tmp")] {
            assert_eq!(
                component.get(attr),
                Some(json!(format!("/opt/modkit/sample/{}", dir)))
            );
        }
    }

    #[test]
    fn test_subst_with_extras() {
        let component = sample_component();
        assert_eq!(
            component.subst("{{$app.name}} has version {{$app.version}}-{{$app.id}}", None),
            "sample has version 1.2.3-com.example.sample"
        );
        assert_eq!(component.subst("{{$app.name}} - {{foo}}", None), "sample - ");
        let mut extra = BTreeMap::new();
        extra.insert("foo".to_string(), json!("bar"));
        assert_eq!(
            component.subst("{{$app.name}} - {{foo}}", Some(&extra)),
            "sample - bar"
        );
    }

    #[test]
    fn test_subst_value_passes_non_strings_through() {
        let component = sample_component();
        for value in [json!(24), json!(["a", "b"]), json!({"foo": "bar"}), Value::Null] {
            assert_eq!(component.subst_value(&value, None), value);
        }
    }

    #[test]
    fn test_identity_attributes_are_read_only() {
        let component = sample_component();
        for attr in ["id", "name", "version", "revision"] {
            let err = component.set(attr, json!("other")).unwrap_err();
            assert!(err.to_string().contains("is read-only"));
        }
    }

    #[test]
    fn test_eval_code_runs_with_app_bindings() {
        let component = sample_component();
        assert_eq!(component.eval_code("echo \"$APP_NAME\"").unwrap(), "sample");
    }

    #[test]
    fn test_run_hook_absent_is_noop() {
        let component = sample_component();
        component
            .run_hook(Hook::PostInstallation, &BTreeMap::new())
            .unwrap();
    }

    #[test]
    fn test_run_hook_failure_wraps_hook_name() {
        let mut hooks = BTreeMap::new();
        hooks.insert(
            Hook::PostInstallation,
            "echo something went wrong >&2\nexit 1".to_string(),
        );
        let component = Component::new(
            sample_definition(),
            hooks,
            None,
            Arc::new(ShellHost::new()),
            &ComponentOptions {
                installdir: Some(std::env::temp_dir()),
                ..Default::default()
            },
        );
        let err = component
            .run_hook(Hook::PostInstallation, &BTreeMap::new())
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("error executing 'post-installation'"));
        assert!(text.contains("something went wrong"));
    }

    #[test]
    fn test_handle_contract() {
        let definition = ComponentDefinition::from_json(
            &json!({
                "id": "com.example.sample",
                "name": "sample",
                "version": "1.2.3",
                "exports": {"test": {}},
                "properties": {
                    "foo": {"value": "bar"},
                    "demo": {"value": true},
                    "secret": {"type": "password"}
                }
            }),
            false,
        )
        .unwrap();
        let component = Component::new(
            definition,
            BTreeMap::new(),
            None,
            Arc::new(ShellHost::new()),
            &ComponentOptions::default(),
        );
        let handle = component.handle();

        for key in HANDLE_BUILTIN_KEYS {
            assert!(handle.get(key).is_some(), "missing builtin key {}", key);
            assert!(handle
                .set(key, json!("dummy"))
                .unwrap_err()
                .to_string()
                .contains("is read-only"));
        }
        assert_eq!(handle.get("foo"), Some(&json!("bar")));
        assert_eq!(handle.get("demo"), Some(&json!(true)));
        // Passwords and internals are not exposed
        assert_eq!(handle.get("secret"), None);
        assert_eq!(handle.get("metadataDir"), None);
        assert_eq!(handle.exports(), vec!["test"]);
    }

    #[test]
    fn test_serialize_writes_metadata(){
        let dir = tempfile::tempdir().unwrap();
        let mut hooks = BTreeMap::new();
        hooks.insert(Hook::PostInstallation, "echo done".to_string());
        let component = Component::new(
            sample_definition(),
            hooks,
            None,
            Arc::new(ShellHost::new()),
            &ComponentOptions::default(),
        );
        component.set_installed_files(vec!["bin/tool".to_string(), "bin".to_string()]);

        let target = dir.path().join("metadata");
        let res = component.serialize(&target).unwrap();
        assert_eq!(res.json, "modkit.json");
        assert_eq!(res.hooks, vec!["post-installation.sh"]);
        assert_eq!(res.installed_files.as_deref(), Some("installed-files.txt"));
        assert!(target.join("modkit.json").is_file());
        assert!(target.join("hooks/post-installation.sh").is_file());
        assert!(target.join("installed-files.txt").is_file());

        let record: ComponentRecord =
            serde_json::from_str(&fs::read_to_string(target.join("modkit.json")).unwrap()).unwrap();
        assert_eq!(record.definition.id, "com.example.sample");
        assert_eq!(record.lifecycle, None);
    }

    #[test]
    fn test_record_round_trip_through_from_record() {
        let dir = tempfile::tempdir().unwrap();
        let definition = ComponentDefinition::from_json(
            &json!({
                "id": "com.example.sample",
                "name": "sample",
                "version": "1.2.3",
                "properties": {"data-dir": {"default": "data"}}
            }),
            false,
        )
        .unwrap();
        let component = Component::new(
            definition,
            BTreeMap::new(),
            None,
            Arc::new(ShellHost::new()),
            &ComponentOptions {
                install_prefix: Some(dir.path().to_path_buf()),
                ..Default::default()
            },
        );
        component.set("data-dir", json!("persistent-dir")).unwrap();
        component.set_lifecycle(Some(Lifecycle::Installed));

        let metadata = dir.path().join("metadata");
        component.serialize(&metadata).unwrap();
        let record = component.record().unwrap();

        let reloaded =
            Component::from_record(record, &metadata, Arc::new(ShellHost::new()), None).unwrap();
        assert_eq!(reloaded.get("data-dir"), Some(json!("persistent-dir")));
        assert_eq!(reloaded.lifecycle(), Some(Lifecycle::Installed));
        assert_eq!(reloaded.installdir(), component.installdir());
    }
}
