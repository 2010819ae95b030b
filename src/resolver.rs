// src/resolver.rs

//! Dependency resolution for component installation
//!
//! A component's `expects` list names hard dependencies by id. Each one must
//! already be registered **and installed** when the dependent's own lifecycle
//! runs; there is no lazy or circular resolution. The resolved handles are
//! injected as the `$modules` mapping for the dependent's hook code only.
//! A dependency that never reached the installed state is indistinguishable
//! from a missing one.

use crate::component::handle::Handle;
use crate::component::Lifecycle;
use crate::error::{Error, Result};
use crate::registry::Registry;
use std::collections::BTreeMap;
use tracing::debug;

/// Resolve a component's declared dependencies into read-only handles
pub fn resolve(registry: &mut Registry, expects: &[String]) -> Result<BTreeMap<String, Handle>> {
    let mut modules = BTreeMap::new();
    for id in expects {
        let installed = registry
            .get_package_data(id)
            .map(|entry| entry.record.lifecycle == Some(Lifecycle::Installed))
            .unwrap_or(false);
        if !installed {
            return Err(Error::NotFound(format!(
                "cannot find expected dependency '{}' in installed state",
                id
            )));
        }
        let component = registry.load_package(id, false)?;
        debug!("resolved dependency '{}'", id);
        modules.insert(id.clone(), component.handle());
    }
    Ok(modules)
}
