// src/manager.rs

//! Top-level orchestration of component lifecycles
//!
//! The manager sequences one component operation at a time: unpack (hooks +
//! file layout + registration), initialize (dependency resolution + the
//! post-installation hook), install (both), and uninstall (uninstall hooks +
//! manifest-driven file removal + unregistration). Failures freeze the
//! component at its last completed lifecycle step; a failed uninstall leaves
//! the component registered so the operation can be retried.

use crate::component::{
    Component, ComponentOptions, Lifecycle, DEFAULT_INSTALL_PREFIX,
};
use crate::error::{Error, Result};
use crate::hooks::{Hook, HookBindings, HookHost, ShellHost};
use crate::registry::{Registry, RegistryOptions, SearchOptions};
use crate::packaging;
use crate::resolver;
use crate::service::ServiceSupervisor;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Construction options for a [`Manager`]
#[derive(Clone, Default)]
pub struct ManagerOptions {
    /// Registry root directory; defaults to `~/.modkit`
    pub registry_prefix: Option<PathBuf>,
    /// Root under which components install; defaults to `/opt/modkit`
    pub installation_prefix: Option<PathBuf>,
    /// Passphrase for encrypted properties
    pub encryption_key: Option<String>,
    /// Execution host for hook code
    pub host: Option<Arc<dyn HookHost>>,
}

/// Options for install/unpack/initialize operations
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Re-run against an already-installed component
    pub force: bool,
    /// Override the installation root for this component
    pub install_prefix: Option<PathBuf>,
    /// Override the installation directory outright
    pub installdir: Option<PathBuf>,
    /// Property values in typed form
    pub values: BTreeMap<String, Value>,
    /// Property values in raw `--key=value` form
    pub args: Vec<String>,
}

impl DeployOptions {
    pub fn with_value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }
}

/// Top-level component lifecycle orchestrator
pub struct Manager {
    registry: Registry,
    installation_prefix: PathBuf,
    host: Arc<dyn HookHost>,
}

impl Manager {
    pub fn new(options: ManagerOptions) -> Result<Self> {
        let host: Arc<dyn HookHost> = options
            .host
            .unwrap_or_else(|| Arc::new(ShellHost::new()));
        let registry = Registry::open(RegistryOptions {
            prefix: options.registry_prefix,
            encryption_key: options.encryption_key,
            host: Some(Arc::clone(&host)),
        })?;
        Ok(Self {
            registry,
            installation_prefix: options
                .installation_prefix
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INSTALL_PREFIX)),
            host,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn installation_prefix(&self) -> &Path {
        &self.installation_prefix
    }

    /// Unpack a package directory: run the pre-unpack hooks, lay files down,
    /// run the post-unpack hook, and register the component at `unpacked`
    ///
    /// The component registers before its hooks run so a mid-unpack failure
    /// never leaves laid-down state the registry does not know about.
    pub fn unpack(&mut self, pkg_dir: &Path, options: &DeployOptions) -> Result<Arc<Component>> {
        let overrides = ComponentOptions {
            installdir: options.installdir.clone(),
            install_prefix: Some(
                options
                    .install_prefix
                    .clone()
                    .unwrap_or_else(|| self.installation_prefix.clone()),
            ),
            encryption_key: None,
        };
        let component = Arc::new(self.registry.load_package_from_dir(
            pkg_dir,
            &overrides,
            false,
        )?);

        if self.registry.is_registered(component.id()) && !options.force {
            return Err(Error::AlreadyInstalled(format!(
                "package {} seems to be already installed (use force to override)",
                component.id()
            )));
        }

        apply_arguments(&component, options)?;
        self.registry.register(&component)?;

        info!("unpacking {} into {}", component.id(), component.installdir().display());
        fs::create_dir_all(component.installdir())?;
        let no_modules = BTreeMap::new();
        for hook in Hook::PRE_UNPACK_SEQUENCE {
            component.run_hook(*hook, &no_modules)?;
        }

        let laid = packaging::install_files(
            pkg_dir,
            component.definition().installation.as_ref(),
            &component.install_prefix(),
            &component.installdir(),
            &component.expansion_map(),
        )?;
        component.set_installed_files(manifest_paths(&laid, &component.installdir()));

        component.run_hook(Hook::PostUnpackFiles, &no_modules)?;
        component.set_lifecycle(Some(Lifecycle::Unpacked));
        self.registry.update(&component)?;
        Ok(component)
    }

    /// Run the post-installation step of an unpacked component
    pub fn initialize_package(
        &mut self,
        id: &str,
        options: &DeployOptions,
    ) -> Result<Arc<Component>> {
        let component = self.registry.load_package(id, false)?;
        if component.lifecycle() == Some(Lifecycle::Installed) && !options.force {
            return Err(Error::AlreadyInstalled(format!(
                "package {} seems to be already fully installed (use force to override)",
                id
            )));
        }

        apply_arguments(&component, options)?;
        let missing = component.missing_required_properties();
        if !missing.is_empty() {
            return Err(Error::Property(format!(
                "the following options are required: {}",
                missing.join(", ")
            )));
        }

        let modules = resolver::resolve(&mut self.registry, component.expects())?;
        component.run_hook(Hook::PostInstallation, &modules)?;
        component.set_lifecycle(Some(Lifecycle::Installed));
        self.registry.update(&component)?;
        info!("{} installed", id);
        Ok(component)
    }

    /// Unpack and initialize in one step
    ///
    /// Service components are left stopped; starting is a separate,
    /// explicit operation.
    pub fn install(&mut self, pkg_dir: &Path, options: &DeployOptions) -> Result<Arc<Component>> {
        let component = self.unpack(pkg_dir, options)?;
        self.initialize_package(component.id(), options)
    }

    /// Remove an installed component: uninstall hooks, manifest-driven file
    /// removal, then unregistration
    ///
    /// Any hook failure propagates and leaves the component registered so
    /// the uninstall can be retried.
    pub fn uninstall(&mut self, id: &str) -> Result<()> {
        let component = self.registry.load_package(id, false)?;
        if component.installed_as_root() && !nix::unistd::geteuid().is_root() {
            return Err(Error::Permission(
                "this package was installed as root; refusing to uninstall without admin privileges"
                    .to_string(),
            ));
        }

        let no_modules = BTreeMap::new();
        component.run_hook(Hook::PreUninstallation, &no_modules)?;
        component.remove_installed_files()?;
        component.run_hook(Hook::PostUninstallation, &no_modules)?;
        self.registry.unregister(id, true)?;
        info!("{} uninstalled", id);
        Ok(())
    }

    /// All registered components
    pub fn list_packages(&mut self) -> Result<Vec<Arc<Component>>> {
        self.registry
            .ids()
            .iter()
            .map(|id| self.registry.load_package(id, false))
            .collect()
    }

    /// JSON summary of one installed component
    pub fn inspect_package(&mut self, id: &str) -> Result<Value> {
        Ok(self.find_by_id(id)?.inspect())
    }

    /// The cached component for an exact id
    pub fn find_by_id(&mut self, id: &str) -> Result<Arc<Component>> {
        self.registry.load_package(id, false)
    }

    /// Search registered components by `<identifier>[@<version-range>]`
    pub fn search(&mut self, term: &str, options: &SearchOptions) -> Result<Vec<Arc<Component>>> {
        self.registry.search(term, options)
    }

    /// Search requiring exactly one match
    pub fn search_one(&mut self, term: &str, options: &SearchOptions) -> Result<Arc<Component>> {
        self.registry.search_one(term, options)
    }

    /// Re-read the registry document and drop cached component instances
    pub fn reload(&mut self) -> Result<()> {
        self.registry.reload()
    }

    /// Process supervisor for an installed service component
    pub fn supervisor(&mut self, id: &str) -> Result<ServiceSupervisor> {
        let component = self.registry.load_package(id, false)?;
        ServiceSupervisor::for_component(&component)
    }

    /// Execute source text, optionally in an installed package's context
    pub fn eval_code(&mut self, code: &str, package: Option<&str>) -> Result<String> {
        match package {
            Some(id) => self.registry.load_package(id, false)?.eval_code(code),
            None => {
                let bindings = HookBindings {
                    label: "eval".to_string(),
                    ..Default::default()
                };
                let outcome = self.host.run(code, &bindings)?;
                if !outcome.success() {
                    return Err(Error::Execution(outcome.failure_message()));
                }
                Ok(outcome.value().unwrap_or_default())
            }
        }
    }

    /// Execute a script file, optionally in an installed package's context
    pub fn eval_file(&mut self, path: &Path, package: Option<&str>) -> Result<String> {
        match package {
            Some(id) => self.registry.load_package(id, false)?.eval_file(path),
            None => {
                let code = fs::read_to_string(path)?;
                self.eval_code(&code, None)
            }
        }
    }

}

/// Apply both argument forms to a component
fn apply_arguments(component: &Arc<Component>, options: &DeployOptions) -> Result<()> {
    if !options.values.is_empty() {
        component.apply_values(&options.values)?;
    }
    if !options.args.is_empty() {
        component.apply_raw_args(&options.args)?;
    }
    Ok(())
}

/// Convert laid-down paths to manifest lines: relative to installdir when
/// under it, absolute otherwise
fn manifest_paths(laid: &[PathBuf], installdir: &Path) -> Vec<String> {
    laid.iter()
        .map(|path| match path.strip_prefix(installdir) {
            Ok(rel) => rel.to_string_lossy().into_owned(),
            Err(_) => {
                debug!("recording out-of-tree path {}", path.display());
                path.to_string_lossy().into_owned()
            }
        })
        .filter(|line| !line.is_empty())
        .collect()
}
