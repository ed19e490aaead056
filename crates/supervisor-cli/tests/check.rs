//! Running the `supervise` binary

use std::process::Command;

fn supervise() -> Command {
    Command::new(env!("CARGO_BIN_EXE_supervise"))
}

#[test]
fn test_check_prints_resolved_command() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("supervise.yaml");
    std::fs::write(
        &config,
        "execute: \"{dir}/bin/server\"\nargs: [\"--port\", \"8080\"]\ndir: /srv/app\n",
    )
    .unwrap();

    let output = supervise().arg("--config").arg(&config).arg("--check").output().unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "/srv/app/bin/server --port 8080"
    );
}

#[test]
fn test_missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = supervise()
        .arg("--config")
        .arg(dir.path().join("absent.yaml"))
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to load"));
}

#[cfg(unix)]
#[test]
fn test_runs_process_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("supervise.yaml");
    let log = dir.path().join("out.log");
    std::fs::write(
        &config,
        format!(
            "execute: sh\nargs: [\"-c\", \"echo supervised; exit 4\"]\nlogger:\n  path: {}\n",
            log.display()
        ),
    )
    .unwrap();

    let status = supervise().arg("--config").arg(&config).status().unwrap();
    assert_eq!(status.code(), Some(4));
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "supervised\n");
}
