// src/error.rs

//! Central error type for modkit operations
//!
//! Every fallible operation in the crate returns [`Result`]. Variants map to
//! the user-visible failure classes: definition validation, registry lookup,
//! lifecycle hook execution, privilege checks, service control, and property
//! handling.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by manager, registry, component, and service operations
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or schema-violating component definition
    #[error("{0}")]
    Validation(String),

    /// A search or dependency lookup yielded zero matches
    #[error("{0}")]
    NotFound(String),

    /// A search yielded multiple matches when a single result was required
    #[error("found multiple occurrences for the specified term '{0}'")]
    AmbiguousMatch(String),

    /// A lifecycle hook failed; the component stays at its last good state
    #[error("error executing '{hook}': {message}")]
    Lifecycle { hook: String, message: String },

    /// Install or initialize attempted on an already-installed component
    #[error("{0}")]
    AlreadyInstalled(String),

    /// Privilege check failed (e.g. uninstalling a root-installed component)
    #[error("{0}")]
    Permission(String),

    /// Service supervision failure
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Missing required property, unknown property, or read-only write
    #[error("{0}")]
    Property(String),

    /// Hook host failure outside the component's own hook code
    /// (spawn failure, timeout, eval errors)
    #[error("{0}")]
    Execution(String),

    /// Encrypted property envelope could not be produced or opened
    #[error("{0}")]
    Crypto(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Service start/stop/restart failures
///
/// The start-failure kinds are distinct so callers can tell apart a start
/// command that never wrote its PID file, a PID file pointing at a dead
/// process, and a start command that itself failed.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unable to start {service}: cannot find pid file '{}'", pid_file.display())]
    MissingPidFile { service: String, pid_file: PathBuf },

    #[error(
        "unable to start {service}: pid file '{}' was found but either no proper PID was found \
         or no process is running there",
        pid_file.display()
    )]
    StalePidFile { service: String, pid_file: PathBuf },

    #[error("unable to start {service}: {message}")]
    StartFailed { service: String, message: String },

    #[error("unable to restart {service}: process kept pid {pid} across restart")]
    PidUnchanged { service: String, pid: u32 },

    #[error("{service} does not declare a start command")]
    NoStartCommand { service: String },
}

/// Result type for modkit operations
pub type Result<T> = std::result::Result<T, Error>;
