// src/registry/mod.rs

//! Durable component registry
//!
//! The registry tracks every installed component in a single JSON document
//! (`registry.json`) plus one metadata directory per component under
//! `components/`, holding that component's hook sources, extra resources,
//! and installed-files manifest.
//!
//! Loaded components are cached by id: repeated `load_package` calls return
//! the identical shared instance until a caller asks for `reload`, which
//! re-reads the entry from disk and swaps a fresh, distinct instance into
//! the cache slot. Persistence assumes the manager's single-writer
//! discipline; there is no cross-process locking.

use crate::component::{Component, ComponentOptions, ComponentRecord};
use crate::error::{Error, Result};
use crate::hooks::{HookHost, ShellHost};
use crate::version::{self, VersionConstraint};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strum_macros::{Display, EnumString};
use tracing::{debug, info};

/// File name of the registry document under the registry prefix
pub const DATABASE_FILE: &str = "registry.json";

/// Directory of per-component metadata under the registry prefix
pub const COMPONENTS_DIR: &str = "components";

/// One persisted registry entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    #[serde(flatten)]
    pub record: ComponentRecord,
    /// Metadata directory name under `components/`
    pub root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    components: BTreeMap<String, RegistryEntry>,
}

/// Fields a search term is matched against, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SearchField {
    Id,
    Name,
}

/// Options for [`Registry::search`]
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Fields tried in order; the first field with a surviving match wins
    pub search_by: Vec<SearchField>,
    /// Require exactly one match
    pub request_single_result: bool,
    /// Bypass the component cache and re-read matches from disk
    pub reload: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            search_by: vec![SearchField::Id, SearchField::Name],
            request_single_result: false,
            reload: false,
        }
    }
}

/// Construction options for a registry
#[derive(Clone, Default)]
pub struct RegistryOptions {
    /// Registry root directory; defaults to `~/.modkit`
    pub prefix: Option<PathBuf>,
    /// Passphrase for encrypted properties
    pub encryption_key: Option<String>,
    /// Execution host handed to loaded components
    pub host: Option<Arc<dyn HookHost>>,
}

/// The durable store of installed components
pub struct Registry {
    prefix: PathBuf,
    database_file: PathBuf,
    components_dir: PathBuf,
    entries: BTreeMap<String, RegistryEntry>,
    cache: HashMap<String, Arc<Component>>,
    encryption_key: Option<String>,
    host: Arc<dyn HookHost>,
}

impl Registry {
    pub fn new(options: RegistryOptions) -> Self {
        let prefix = options.prefix.unwrap_or_else(default_prefix);
        Self {
            database_file: prefix.join(DATABASE_FILE),
            components_dir: prefix.join(COMPONENTS_DIR),
            prefix,
            entries: BTreeMap::new(),
            cache: HashMap::new(),
            encryption_key: options.encryption_key,
            host: options
                .host
                .unwrap_or_else(|| Arc::new(ShellHost::new())),
        }
    }

    /// Construct and immediately load
    pub fn open(options: RegistryOptions) -> Result<Self> {
        let mut registry = Self::new(options);
        registry.load()?;
        Ok(registry)
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn database_file(&self) -> &Path {
        &self.database_file
    }

    pub fn components_dir(&self) -> &Path {
        &self.components_dir
    }

    /// Read the registry document into memory; idempotent, lazy about
    /// component construction
    pub fn load(&mut self) -> Result<()> {
        if !self.database_file.is_file() {
            debug!(
                "no registry document at {}; starting empty",
                self.database_file.display()
            );
            self.entries = BTreeMap::new();
            return Ok(());
        }
        let text = fs::read_to_string(&self.database_file)?;
        let document: RegistryDocument = serde_json::from_str(&text)
            .map_err(|e| Error::Validation(format!("corrupt registry document: {}", e)))?;
        self.entries = document.components;
        debug!("loaded {} registry entries", self.entries.len());
        Ok(())
    }

    /// Re-read the document and drop every cached component instance
    pub fn reload(&mut self) -> Result<()> {
        self.cache.clear();
        self.load()
    }

    /// Flush the in-memory state to disk, recreating the document if it was
    /// externally deleted; safe to call repeatedly
    pub fn save(&self, file: Option<&Path>) -> Result<PathBuf> {
        let target = file.unwrap_or(&self.database_file);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let document = RegistryDocument {
            components: self.entries.clone(),
        };
        fs::write(target, serde_json::to_string_pretty(&document)?)?;
        Ok(target.to_path_buf())
    }

    /// Raw entry data for one id
    pub fn get_package_data(&self, id: &str) -> Option<&RegistryEntry> {
        self.entries.get(id)
    }

    /// All registered ids
    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Persist a component as a new (or replaced) registry entry
    ///
    /// Serializes the component into a fresh metadata directory, then
    /// rewrites the document.
    pub fn register(&mut self, component: &Arc<Component>) -> Result<()> {
        let id = component.id().to_string();
        let metadata_dir = self.components_dir.join(&id);
        if metadata_dir.exists() {
            fs::remove_dir_all(&metadata_dir)?;
        }
        component.serialize(&metadata_dir)?;

        let installed_at = self
            .entries
            .get(&id)
            .and_then(|entry| entry.installed_at.clone())
            .unwrap_or_else(|| Utc::now().to_rfc3339());
        let entry = RegistryEntry {
            record: component.record()?,
            root: id.clone(),
            installed_at: Some(installed_at),
        };
        self.entries.insert(id.clone(), entry);
        self.save(None)?;
        self.cache.insert(id.clone(), Arc::clone(component));
        info!("registered component '{}'", id);
        Ok(())
    }

    /// Refresh the persisted state of an already-registered component
    pub fn update(&mut self, component: &Arc<Component>) -> Result<()> {
        if !self.is_registered(component.id()) {
            return Err(Error::NotFound(format!(
                "package '{}' is not registered",
                component.id()
            )));
        }
        self.register(component)
    }

    /// Drop a component from the registry
    ///
    /// With `delete` (the default behavior for uninstalls), the metadata
    /// directory is removed too; otherwise it is preserved on disk while the
    /// registry forgets about it.
    pub fn unregister(&mut self, id: &str, delete: bool) -> Result<()> {
        let entry = self
            .entries
            .remove(id)
            .ok_or_else(|| Error::NotFound(format!("package '{}' is not registered", id)))?;
        if delete {
            let metadata_dir = self.components_dir.join(&entry.root);
            if metadata_dir.exists() {
                fs::remove_dir_all(&metadata_dir)?;
            }
        }
        self.cache.remove(id);
        self.save(None)?;
        info!("unregistered component '{}'", id);
        Ok(())
    }

    /// Return the component for `id`, cached unless `reload` is set
    ///
    /// With `reload`, the entry is re-read from disk and a fresh, distinct
    /// instance replaces the cache slot.
    pub fn load_package(&mut self, id: &str, reload: bool) -> Result<Arc<Component>> {
        if !reload
            && let Some(component) = self.cache.get(id)
        {
            return Ok(Arc::clone(component));
        }
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("package '{}' is not registered", id)))?
            .clone();
        let metadata_dir = self.components_dir.join(&entry.root);
        let component = Arc::new(Component::from_record(
            entry.record,
            &metadata_dir,
            Arc::clone(&self.host),
            self.encryption_key.as_deref(),
        )?);
        self.cache.insert(id.to_string(), Arc::clone(&component));
        Ok(component)
    }

    /// Validate and construct an unregistered component from a package
    /// directory
    pub fn load_package_from_dir(
        &self,
        dir: &Path,
        overrides: &ComponentOptions,
        soft_schema_validation: bool,
    ) -> Result<Component> {
        let mut options = overrides.clone();
        if options.encryption_key.is_none() {
            options.encryption_key = self.encryption_key.clone();
        }
        Component::from_package_dir(dir, Arc::clone(&self.host), &options, soft_schema_validation)
    }

    /// Search registered components by `<identifier>[@<version-range>]`
    ///
    /// Fields in `search_by` are tried in order. For the first field with
    /// any identifier match, the version range (if given) filters the
    /// candidates; when nothing survives the filter, the next field is tried
    /// before giving up. The id-branch falling through to name on a version
    /// miss is load-bearing for dependents and deliberately not symmetric.
    pub fn search(&mut self, term: &str, options: &SearchOptions) -> Result<Vec<Arc<Component>>> {
        let (ident, range) = version::parse_search_term(term)?;

        for field in &options.search_by {
            let candidates: Vec<(String, String)> = self
                .entries
                .values()
                .filter(|entry| match field {
                    SearchField::Id => entry.record.definition.id == ident,
                    SearchField::Name => entry.record.definition.name == ident,
                })
                .map(|entry| {
                    (
                        entry.record.definition.id.clone(),
                        entry.record.definition.version.clone(),
                    )
                })
                .collect();
            if candidates.is_empty() {
                continue;
            }

            let survivors: Vec<String> = candidates
                .into_iter()
                .filter(|(_, v)| range_matches(range.as_ref(), v))
                .map(|(id, _)| id)
                .collect();
            if survivors.is_empty() {
                debug!(
                    "'{}' matched by {} but no candidate satisfied the version range",
                    ident, field
                );
                continue;
            }

            if options.request_single_result && survivors.len() > 1 {
                return Err(Error::AmbiguousMatch(term.to_string()));
            }
            return survivors
                .iter()
                .map(|id| self.load_package(id, options.reload))
                .collect();
        }

        Err(Error::NotFound(
            "cannot find any module matching the provided specification".to_string(),
        ))
    }

    /// Like [`Registry::search`] with `request_single_result`, returning the
    /// single component directly
    pub fn search_one(&mut self, term: &str, options: &SearchOptions) -> Result<Arc<Component>> {
        let mut options = options.clone();
        options.request_single_result = true;
        let mut result = self.search(term, &options)?;
        result.pop().ok_or_else(|| {
            Error::NotFound("cannot find any module matching the provided specification".to_string())
        })
    }
}

fn range_matches(range: Option<&VersionConstraint>, version: &str) -> bool {
    match range {
        None => true,
        Some(constraint) => match version::parse_lenient(version) {
            Ok(v) => constraint.satisfies(&v),
            Err(_) => false,
        },
    }
}

fn default_prefix() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".modkit"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/modkit"))
}
