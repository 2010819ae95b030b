// src/service/mod.rs

//! Service process supervision
//!
//! Service-type components declare a PID file, a log file, and a start
//! command. Supervision state is never stored: `running`/`stopped` is
//! computed on demand from the PID file and a liveness probe
//! (`kill(pid, 0)`). Start failures split into three user-visible kinds:
//! missing PID file, stale PID file, and a failing start command whose
//! captured stderr is surfaced.

use crate::component::Component;
use crate::error::{Error, Result, ServiceError};
use crate::hooks;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use strum_macros::{Display, EnumString};
use tracing::{debug, info, warn};
use wait_timeout::ChildExt;

/// How long `stop` waits for the process to exit before escalating from
/// SIGTERM to SIGKILL
const STOP_GRACE: Duration = Duration::from_secs(10);

/// Lines returned by [`ServiceSupervisor::log`]
const LOG_TAIL_LINES: usize = 40;

/// Derived service state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ServiceState {
    Running,
    Stopped,
}

/// Structured result of [`ServiceSupervisor::status`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub is_running: bool,
    pub status_name: ServiceState,
    pub status_output: String,
    pub code: i32,
}

/// Resolved start command
#[derive(Debug, Clone)]
struct ResolvedStart {
    command: String,
    timeout: Duration,
    username: Option<String>,
}

/// Process lifecycle control for one service component
pub struct ServiceSupervisor {
    id: String,
    pid_file: PathBuf,
    log_file: PathBuf,
    installdir: PathBuf,
    start: Option<ResolvedStart>,
}

impl ServiceSupervisor {
    /// Build a supervisor from a service component's expanded attributes
    pub fn for_component(component: &Component) -> Result<Self> {
        let service = component.definition().service.clone().ok_or_else(|| {
            Error::Validation(format!(
                "component {} does not declare a service section",
                component.id()
            ))
        })?;

        let attr_path = |name: &str| -> PathBuf {
            component
                .get(name)
                .and_then(|v| match v {
                    Value::String(s) if !s.is_empty() => Some(PathBuf::from(s)),
                    _ => None,
                })
                .unwrap_or_default()
        };

        let start = service.start.as_ref().map(|spec| ResolvedStart {
            command: component.subst(&spec.command, None),
            timeout: Duration::from_secs(spec.timeout),
            username: spec.username.clone(),
        });

        Ok(Self {
            id: component.id().to_string(),
            pid_file: attr_path("pidFile"),
            log_file: attr_path("logFile"),
            installdir: component.installdir(),
            start,
        })
    }

    pub fn pid_file(&self) -> &PathBuf {
        &self.pid_file
    }

    pub fn log_file(&self) -> &PathBuf {
        &self.log_file
    }

    /// Parse the PID file without probing liveness
    fn read_pid(&self) -> Option<u32> {
        fs::read_to_string(&self.pid_file)
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    /// The PID of the live supervised process, if any; never errors for the
    /// stopped case
    pub fn get_pid(&self) -> Option<u32> {
        self.read_pid().filter(|pid| pid_alive(*pid))
    }

    pub fn is_running(&self) -> bool {
        self.get_pid().is_some()
    }

    /// Derived status: running/stopped, a human line, and a shell-style code
    pub fn status(&self) -> ServiceStatus {
        match self.is_running() {
            true => ServiceStatus {
                is_running: true,
                status_name: ServiceState::Running,
                status_output: format!("{} is running", self.id),
                code: 0,
            },
            false => ServiceStatus {
                is_running: false,
                status_name: ServiceState::Stopped,
                status_output: format!("{} not running", self.id),
                code: 1,
            },
        }
    }

    /// Run the declared start command and verify the resulting PID
    ///
    /// Returns the live PID on success. The three failure kinds are
    /// distinct: the command itself failing (stderr surfaced), the PID file
    /// never appearing, and the PID file referencing no live process.
    pub fn start(&self) -> Result<u32> {
        let spec = self.start.as_ref().ok_or_else(|| ServiceError::NoStartCommand {
            service: self.id.clone(),
        })?;

        for file in [&self.pid_file, &self.log_file] {
            if let Some(parent) = file.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
        }

        info!("starting {} (timeout {:?})", self.id, spec.timeout);
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(&spec.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if self.installdir.is_dir() {
            cmd.current_dir(&self.installdir);
        }
        if let Some(username) = &spec.username {
            hooks::apply_run_as(&mut cmd, username)?;
        }

        let mut child = cmd.spawn().map_err(|e| ServiceError::StartFailed {
            service: self.id.clone(),
            message: format!("failed to spawn start command: {}", e),
        })?;

        match child.wait_timeout(spec.timeout)? {
            Some(status) => {
                let output = child.wait_with_output()?;
                if !status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let stderr = stderr.trim();
                    let message = if stderr.is_empty() {
                        format!(
                            "start command exited with code {}",
                            status.code().unwrap_or(-1)
                        )
                    } else {
                        stderr.to_string()
                    };
                    return Err(ServiceError::StartFailed {
                        service: self.id.clone(),
                        message,
                    }
                    .into());
                }
            }
            None => {
                let _ = child.kill();
                return Err(ServiceError::StartFailed {
                    service: self.id.clone(),
                    message: format!(
                        "start command timed out after {} seconds",
                        spec.timeout.as_secs()
                    ),
                }
                .into());
            }
        }

        if !self.pid_file.exists() {
            return Err(ServiceError::MissingPidFile {
                service: self.id.clone(),
                pid_file: self.pid_file.clone(),
            }
            .into());
        }
        match self.get_pid() {
            Some(pid) => {
                info!("{} started with pid {}", self.id, pid);
                Ok(pid)
            }
            None => Err(ServiceError::StalePidFile {
                service: self.id.clone(),
                pid_file: self.pid_file.clone(),
            }
            .into()),
        }
    }

    /// Signal the supervised process to terminate
    ///
    /// Does not require the PID file to disappear afterward. SIGTERM first;
    /// a process that outlives the grace period gets SIGKILL.
    pub fn stop(&self) -> Result<()> {
        let Some(pid) = self.get_pid() else {
            debug!("{} is not running; nothing to stop", self.id);
            return Ok(());
        };
        info!("stopping {} (pid {})", self.id, pid);
        signal(pid, Signal::SIGTERM)?;

        let deadline = Instant::now() + STOP_GRACE;
        while pid_alive(pid) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }
        if pid_alive(pid) {
            warn!("{} ignored SIGTERM; escalating to SIGKILL", self.id);
            signal(pid, Signal::SIGKILL)?;
            let deadline = Instant::now() + STOP_GRACE;
            while pid_alive(pid) && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(50));
            }
        }
        Ok(())
    }

    /// Stop followed by start; fails if the same PID survived, since that
    /// means the process never actually stopped
    pub fn restart(&self) -> Result<u32> {
        let previous = self.get_pid();
        self.stop()?;
        let pid = self.start()?;
        if previous == Some(pid) {
            return Err(ServiceError::PidUnchanged {
                service: self.id.clone(),
                pid,
            }
            .into());
        }
        Ok(pid)
    }

    /// Tail of the declared log file, both returned and echoed to stdout
    pub fn log(&self) -> Result<String> {
        if !self.log_file.is_file() {
            return Ok(String::new());
        }
        let text = fs::read_to_string(&self.log_file)?;
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(LOG_TAIL_LINES);
        let mut tail = lines[start..].join("\n");
        if !tail.is_empty() {
            tail.push('\n');
        }

        let mut stdout = std::io::stdout();
        stdout.write_all(tail.as_bytes())?;
        stdout.flush()?;
        Ok(tail)
    }
}

fn pid_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

fn signal(pid: u32, sig: Signal) -> Result<()> {
    kill(Pid::from_raw(pid as i32), sig)
        .map_err(|e| Error::Execution(format!("cannot signal pid {}: {}", pid, e)))
}
