// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

use modkit::{Manager, ManagerOptions};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::TempDir;

static TRACING: Once = Once::new();

/// Honor RUST_LOG when debugging tests; safe to call repeatedly.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Temp directories backing one manager; keep alive to prevent cleanup.
pub struct TestEnv {
    pub registry_dir: TempDir,
    pub install_root: TempDir,
}

impl TestEnv {
    pub fn registry_prefix(&self) -> PathBuf {
        self.registry_dir.path().join(".modkit")
    }

    pub fn install_prefix(&self) -> PathBuf {
        self.install_root.path().to_path_buf()
    }
}

/// Fresh manager on fresh temp directories.
pub fn new_manager() -> (TestEnv, Manager) {
    new_manager_with_key(None)
}

pub fn new_manager_with_key(encryption_key: Option<&str>) -> (TestEnv, Manager) {
    init_tracing();
    let env = TestEnv {
        registry_dir: tempfile::tempdir().unwrap(),
        install_root: tempfile::tempdir().unwrap(),
    };
    let manager = manager_for(&env, encryption_key);
    (env, manager)
}

/// Second manager over the same registry/install roots (simulates a process
/// restart).
pub fn manager_for(env: &TestEnv, encryption_key: Option<&str>) -> Manager {
    Manager::new(ManagerOptions {
        registry_prefix: Some(env.registry_prefix()),
        installation_prefix: Some(env.install_prefix()),
        encryption_key: encryption_key.map(String::from),
        host: None,
    })
    .unwrap()
}

/// Builder for sample package directories.
pub struct PackageBuilder {
    dir: TempDir,
    definition: Value,
    hooks: Vec<(&'static str, String)>,
    files: Vec<(String, String)>,
    templates: Vec<(String, String)>,
}

impl PackageBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            definition: json!({
                "id": id,
                "name": id,
                "version": "1.0.0",
                "revision": 0,
            }),
            hooks: Vec::new(),
            files: Vec::new(),
            templates: Vec::new(),
        }
    }

    pub fn set(mut self, key: &str, value: Value) -> Self {
        self.definition
            .as_object_mut()
            .unwrap()
            .insert(key.to_string(), value);
        self
    }

    pub fn name(self, name: &str) -> Self {
        self.set("name", json!(name))
    }

    pub fn version(self, version: &str) -> Self {
        self.set("version", json!(version))
    }

    pub fn properties(self, properties: Value) -> Self {
        self.set("properties", properties)
    }

    pub fn expects(self, ids: &[&str]) -> Self {
        self.set("expects", json!(ids))
    }

    pub fn service(self, service: Value) -> Self {
        let with_kind = self.set("kind", json!("service"));
        with_kind.set("service", service)
    }

    /// Add a hook script by its file stem ("post-installation", ...).
    pub fn hook(mut self, name: &'static str, source: &str) -> Self {
        self.hooks.push((name, source.to_string()));
        self
    }

    /// Add a payload file under files/.
    pub fn file(mut self, rel: &str, content: &str) -> Self {
        self.files.push((rel.to_string(), content.to_string()));
        self
    }

    pub fn template(mut self, name: &str, content: &str) -> Self {
        self.templates.push((name.to_string(), content.to_string()));
        self
    }

    /// Write the package directory and return its path; the TempDir guard
    /// must stay alive for the duration of the test.
    pub fn build(self) -> (TempDir, PathBuf) {
        let root = self.dir.path().to_path_buf();
        fs::write(
            root.join("modkit.json"),
            serde_json::to_string_pretty(&self.definition).unwrap(),
        )
        .unwrap();

        if !self.hooks.is_empty() {
            let hooks_dir = root.join("hooks");
            fs::create_dir_all(&hooks_dir).unwrap();
            for (name, source) in &self.hooks {
                fs::write(hooks_dir.join(format!("{}.sh", name)), source).unwrap();
            }
        }
        for (rel, content) in &self.files {
            let path = root.join("files").join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        if !self.templates.is_empty() {
            let templates_dir = root.join("templates");
            fs::create_dir_all(&templates_dir).unwrap();
            for (name, content) in &self.templates {
                fs::write(templates_dir.join(name), content).unwrap();
            }
        }
        (self.dir, root)
    }
}

/// A hook body that appends its own name to steps.txt in the installdir.
pub fn step_recorder(step: &str) -> String {
    format!("echo {} >> steps.txt\n", step)
}

/// The demo package: every hook records itself, and a small files/ tree is
/// packed.
pub fn demo_package(id: &str) -> (TempDir, PathBuf) {
    let mut builder = PackageBuilder::new(id)
        .file("bin/hp-build", "#!/bin/sh\n")
        .file("bin/hp-compress", "#!/bin/sh\n")
        .file("docs/index.txt", "index\n")
        .file("docs/chapters/1.txt", "one\n")
        .file("docs/chapters/2.txt", "two\n")
        .file("docs/chapters/3.txt", "three\n");
    for step in [
        "pre-install-checks",
        "pre-installation",
        "pre-unpack-files",
        "post-unpack-files",
        "post-installation",
        "pre-uninstallation",
        "post-uninstallation",
    ] {
        builder = builder.hook(step, &step_recorder(step));
    }
    builder.build()
}

/// Read steps.txt from an installdir.
pub fn read_steps(installdir: &Path) -> Vec<String> {
    match fs::read_to_string(installdir.join("steps.txt")) {
        Ok(text) => text.lines().map(String::from).collect(),
        Err(_) => Vec::new(),
    }
}

/// Recursively list a directory's relative paths, sorted.
pub fn list_dir(root: &Path) -> Vec<String> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<String>) {
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                out.push(
                    path.strip_prefix(root)
                        .unwrap()
                        .to_string_lossy()
                        .into_owned(),
                );
                if path.is_dir() {
                    walk(root, &path, out);
                }
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}
