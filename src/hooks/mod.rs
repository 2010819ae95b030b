// src/hooks/mod.rs

//! Lifecycle hook execution
//!
//! Components may ship a script per lifecycle hook (`hooks/<hook>.sh` in the
//! package directory). Hooks run through a pluggable [`HookHost`]; the core
//! never depends on how isolation is achieved, only on the binding contract:
//! the component's own attribute view (`$app`), the resolved dependency
//! handles (`$modules`), a working directory, a timeout, and an optional
//! run-as user.
//!
//! The default [`ShellHost`] stages the source as an executable temp script,
//! injects the bindings as `APP_*` / `MODULE_<ID>_*` environment variables,
//! nullifies stdin to prevent hangs, captures stdout/stderr, and enforces the
//! timeout with a hard kill.

use crate::component::handle::Handle;
use crate::error::{Error, Result};
use crate::template;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use strum_macros::{Display, EnumString};
use tempfile::TempDir;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Default ceiling for hook execution (60 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// The lifecycle hooks a component may define
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Hook {
    PreInstallChecks,
    PreInstallation,
    PreUnpackFiles,
    PostUnpackFiles,
    PostInstallation,
    PreUninstallation,
    PostUninstallation,
}

impl Hook {
    /// Hooks run during the unpack step, before files are laid down
    pub const PRE_UNPACK_SEQUENCE: &'static [Hook] = &[
        Hook::PreInstallChecks,
        Hook::PreInstallation,
        Hook::PreUnpackFiles,
    ];

    /// Script file name inside a package's `hooks/` directory
    pub fn file_name(&self) -> String {
        format!("{}.sh", self)
    }
}

/// The object graph injected into one hook invocation
#[derive(Debug, Clone, Default)]
pub struct HookBindings {
    /// Label for error messages and logging (hook file name or "eval")
    pub label: String,
    /// The component's own attribute view (`$app`)
    pub app: BTreeMap<String, Value>,
    /// Resolved dependency handles (`$modules`)
    pub modules: BTreeMap<String, Handle>,
    /// Working directory for the hook (normally the installdir)
    pub cwd: Option<PathBuf>,
    /// Hard execution ceiling; None falls back to the host default
    pub timeout: Option<Duration>,
    /// Run the hook as this user (requires root)
    pub username: Option<String>,
}

/// Captured result of one hook invocation
#[derive(Debug, Clone)]
pub struct HookOutcome {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl HookOutcome {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// The hook's "return value": its last non-empty stdout line
    pub fn value(&self) -> Option<String> {
        self.stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(String::from)
    }

    /// The most useful failure text: stderr if present, else the exit code
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exited with code {}", self.code)
        } else {
            stderr.to_string()
        }
    }
}

/// Pluggable execution host for hook code
pub trait HookHost: Send + Sync {
    /// Run `source` with the given bindings
    ///
    /// Returns Ok for any completed execution (the outcome carries the exit
    /// code); Err only for host-level failures: spawn errors and timeouts.
    fn run(&self, source: &str, bindings: &HookBindings) -> Result<HookOutcome>;
}

/// Default host: runs hook sources as shell scripts
pub struct ShellHost {
    shell: PathBuf,
    default_timeout: Duration,
}

impl Default for ShellHost {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ShellHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shell<P: Into<PathBuf>>(mut self, shell: P) -> Self {
        self.shell = shell.into();
        self
    }

    /// Stage the hook source as an executable script (0700)
    fn prepare_script(&self, dir: &TempDir, source: &str) -> Result<PathBuf> {
        let script_path = dir.path().join("hook.sh");
        let mut file = File::create(&script_path)?;
        file.write_all(source.as_bytes())?;

        let mut perms = fs::metadata(&script_path)?.permissions();
        perms.set_mode(0o700);
        fs::set_permissions(&script_path, perms)?;
        Ok(script_path)
    }

}

/// Drop privileges to `username` for a spawned command
///
/// Requires root; as an unprivileged user the request is ignored so local
/// development installs still work.
pub(crate) fn apply_run_as(cmd: &mut Command, username: &str) -> Result<()> {
    let current = nix::unistd::geteuid();
    let user = nix::unistd::User::from_name(username)
        .map_err(|e| Error::Execution(format!("cannot look up user '{}': {}", username, e)))?
        .ok_or_else(|| Error::Execution(format!("unknown user '{}'", username)))?;

    if user.uid == current {
        return Ok(());
    }
    if !current.is_root() {
        debug!(
            "not running as root; ignoring run-as user '{}' request",
            username
        );
        return Ok(());
    }

    let uid = user.uid;
    let gid = user.gid;
    use std::os::unix::process::CommandExt;
    unsafe {
        cmd.pre_exec(move || {
            nix::unistd::setgid(gid).map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
            nix::unistd::setuid(uid).map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
            Ok(())
        });
    }
    Ok(())
}

impl HookHost for ShellHost {
    fn run(&self, source: &str, bindings: &HookBindings) -> Result<HookOutcome> {
        let temp_dir = TempDir::new()?;
        let script_path = self.prepare_script(&temp_dir, source)?;
        let timeout = bindings.timeout.unwrap_or(self.default_timeout);

        let mut cmd = Command::new(&self.shell);
        cmd.arg(&script_path)
            .env("MODKIT_HOOK", &bindings.label)
            .stdin(Stdio::null()) // prevent hangs on interactive reads
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for (name, value) in &bindings.app {
            cmd.env(
                format!("APP_{}", env_var_name(name)),
                template::render_value(value),
            );
        }
        for (id, handle) in &bindings.modules {
            let prefix = format!("MODULE_{}", env_var_name(id));
            for (key, value) in handle.iter() {
                cmd.env(
                    format!("{}_{}", prefix, env_var_name(key)),
                    template::render_value(value),
                );
            }
        }
        if !bindings.modules.is_empty() {
            let ids: Vec<&str> = bindings.modules.keys().map(String::as_str).collect();
            cmd.env("MODKIT_MODULES", ids.join(" "));
        }

        if let Some(cwd) = &bindings.cwd {
            cmd.current_dir(cwd);
        }
        if let Some(username) = &bindings.username {
            apply_run_as(&mut cmd, username)?;
        }

        debug!(
            "running '{}' via {} (timeout {:?})",
            bindings.label,
            self.shell.display(),
            timeout
        );

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Execution(format!("failed to spawn '{}': {}", bindings.label, e)))?;

        match child.wait_timeout(timeout)? {
            Some(status) => {
                let output = child.wait_with_output()?;
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                for line in stderr.lines() {
                    warn!("[{}] {}", bindings.label, line);
                }
                Ok(HookOutcome {
                    code: status.code().unwrap_or(-1),
                    stdout,
                    stderr,
                })
            }
            None => {
                let _ = child.kill();
                Err(Error::Execution(format!(
                    "'{}' timed out after {} seconds",
                    bindings.label,
                    timeout.as_secs()
                )))
            }
        }
    }
}

/// Environment variable name for an attribute: camelCase and punctuation
/// collapse to SCREAMING_SNAKE_CASE ("logsDir" → "LOGS_DIR",
/// "com.example.dep" → "COM_EXAMPLE_DEP")
fn env_var_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if ch.is_ascii_uppercase() && prev_lower {
                out.push('_');
            }
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
            out.push(ch.to_ascii_uppercase());
        } else {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out.trim_matches('_').to_string()
}
