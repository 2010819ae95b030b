// tests/service.rs

//! Service supervision tests: start/stop/restart/status, PID handling, and
//! the distinct start-failure kinds.

mod common;

use common::{new_manager, PackageBuilder};
use modkit::{DeployOptions, ServiceState};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn service_definition(command: &str, timeout: u64) -> serde_json::Value {
    json!({
        "pidFile": "{{$app.tmpDir}}/service.pid",
        "logFile": "{{$app.logsDir}}/service.log",
        "socketFile": "{{$app.tmpDir}}/service.sock",
        "confFile": "{{$app.confDir}}/service.conf",
        "start": {
            "timeout": timeout,
            "command": command
        }
    })
}

const START_COMMAND: &str = "echo '[START] STARTING SERVICE' >> \"{{$app.logFile}}\"; \
                             nohup sleep 300 >/dev/null 2>&1 & echo $! > \"{{$app.pidFile}}\"";

fn install_service(id: &str, command: &str, timeout: u64) -> (common::TestEnv, TempDir, modkit::ServiceSupervisor) {
    let (env, mut manager) = new_manager();
    let (guard, pkg_dir) = PackageBuilder::new(id)
        .service(service_definition(command, timeout))
        .build();
    manager.install(&pkg_dir, &DeployOptions::default()).unwrap();
    let supervisor = manager.supervisor(id).unwrap();
    (env, guard, supervisor)
}

fn read_pid(pid_file: &PathBuf) -> u32 {
    fs::read_to_string(pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap()
}

#[test]
fn test_services_are_left_stopped_after_install() {
    let (_env, _guard, supervisor) = install_service("sample-service", START_COMMAND, 10);
    assert!(!supervisor.is_running());
    assert_eq!(supervisor.get_pid(), None);
}

#[test]
fn test_start_stop_status_cycle() {
    let (_env, _guard, supervisor) = install_service("sample-service", START_COMMAND, 10);

    let pid = supervisor.start().unwrap();
    assert!(supervisor.pid_file().is_file());
    assert_eq!(read_pid(supervisor.pid_file()), pid);
    assert_eq!(supervisor.get_pid(), Some(pid));

    let status = supervisor.status();
    assert!(status.is_running);
    assert_eq!(status.status_name, ServiceState::Running);
    assert_eq!(status.status_output, "sample-service is running");
    assert_eq!(status.code, 0);

    supervisor.stop().unwrap();
    let status = supervisor.status();
    assert!(!status.is_running);
    assert_eq!(status.status_name, ServiceState::Stopped);
    assert_eq!(status.status_output, "sample-service not running");
    assert_eq!(status.code, 1);
    assert_eq!(supervisor.get_pid(), None);

    // Stopping an already-stopped service is a no-op
    supervisor.stop().unwrap();
}

#[test]
fn test_restart_replaces_the_pid() {
    let (_env, _guard, supervisor) = install_service("sample-service", START_COMMAND, 10);

    let first = supervisor.start().unwrap();
    let second = supervisor.restart().unwrap();
    assert_ne!(first, second);
    assert_eq!(supervisor.get_pid(), Some(second));

    supervisor.stop().unwrap();
}

#[test]
fn test_log_returns_and_echoes_the_tail() {
    let (_env, _guard, supervisor) = install_service("sample-service", START_COMMAND, 10);
    supervisor.start().unwrap();

    let text = supervisor.log().unwrap();
    assert!(text.contains("[START] STARTING SERVICE"));

    supervisor.stop().unwrap();
}

#[test]
fn test_start_reports_missing_pid_file() {
    let (_env, _guard, supervisor) = install_service("failing-service", "echo It works", 1);

    let err = supervisor.start().unwrap_err();
    let text = err.to_string();
    assert!(text.contains("unable to start failing-service"));
    assert!(text.contains(&format!(
        "cannot find pid file '{}'",
        supervisor.pid_file().display()
    )));
}

#[test]
fn test_start_reports_stale_pid_file() {
    let (_env, _guard, supervisor) = install_service("failing-service", "echo It works", 1);

    fs::create_dir_all(supervisor.pid_file().parent().unwrap()).unwrap();
    fs::write(supervisor.pid_file(), "999999999").unwrap();

    let err = supervisor.start().unwrap_err();
    let text = err.to_string();
    assert!(text.contains("unable to start failing-service"));
    assert!(text.contains("was found but either no proper PID was found or no process is running there"));
}

#[test]
fn test_start_surfaces_command_stderr() {
    let (_env, _guard, supervisor) = install_service(
        "failing-service",
        "sleep 1 && echo Internal server error >&2 && exit 1",
        3,
    );

    let err = supervisor.start().unwrap_err();
    let text = err.to_string();
    assert!(text.contains("unable to start failing-service"));
    assert!(text.contains("Internal server error"));
}

#[test]
fn test_start_times_out() {
    let (_env, _guard, supervisor) = install_service("slow-service", "sleep 30", 1);

    let err = supervisor.start().unwrap_err();
    assert!(err.to_string().contains("timed out"));
}

#[test]
fn test_get_pid_never_errors_when_stopped() {
    let (_env, _guard, supervisor) = install_service("sample-service", START_COMMAND, 10);

    // No pid file at all
    assert_eq!(supervisor.get_pid(), None);

    // Garbage pid file
    fs::create_dir_all(supervisor.pid_file().parent().unwrap()).unwrap();
    fs::write(supervisor.pid_file(), "not a pid").unwrap();
    assert_eq!(supervisor.get_pid(), None);
    assert_eq!(supervisor.status().code, 1);
}
