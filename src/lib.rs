// src/lib.rs

//! modkit: component installer and lifecycle manager
//!
//! Installs, tracks, reconfigures, supervises, and uninstalls self-contained
//! software components (plain libraries or long-running services) under a
//! managed filesystem root.
//!
//! # Architecture
//!
//! - Registry-first: a single JSON document plus one metadata directory per
//!   component tracks every installed unit and survives process restarts
//! - Lifecycle state machine: unpacked → installed, monotonic; a failing
//!   hook freezes the component at its last completed step
//! - Capability boundary: dependency components are only ever visible as
//!   read-only handles built from a fixed allow-list
//! - Pluggable execution host: hook scripts run behind the [`hooks::HookHost`]
//!   trait; the default host stages them as shell scripts with env-injected
//!   bindings under a hard timeout
//! - Service supervision: PID-file based start/stop/restart/status with
//!   distinct, user-visible start-failure kinds

pub mod component;
pub mod crypto;
mod error;
pub mod hooks;
pub mod manager;
pub mod packaging;
pub mod properties;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod template;
pub mod version;

pub use component::attributes::{AttributeOptions, AttributeSet};
pub use component::definition::{
    ComponentDefinition, ComponentKind, ExportSpec, InstallationSpec, ServiceSpec, StartSpec,
};
pub use component::handle::Handle;
pub use component::{
    Component, ComponentOptions, ComponentRecord, Lifecycle, SerializedResources,
    DEFAULT_INSTALL_PREFIX,
};
pub use error::{Error, Result, ServiceError};
pub use hooks::{Hook, HookBindings, HookHost, HookOutcome, ShellHost};
pub use manager::{DeployOptions, Manager, ManagerOptions};
pub use properties::{PropertySet, PropertySpec};
pub use registry::{Registry, RegistryEntry, RegistryOptions, SearchField, SearchOptions};
pub use service::{ServiceState, ServiceStatus, ServiceSupervisor};
pub use version::VersionConstraint;
