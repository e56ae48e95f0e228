//! Tests that run the `globwatch` binary

use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;
use tempfile::TempDir;

fn globwatch() -> Command {
    Command::new(env!("CARGO_BIN_EXE_globwatch"))
}

#[test]
fn test_help_lists_options() {
    let output = globwatch().arg("--help").output().unwrap();
    assert!(output.status.success());

    let help = String::from_utf8_lossy(&output.stdout);
    for flag in ["--cwd", "--debounce-ms", "--ignore", "--rescan-ms", "--json"] {
        assert!(help.contains(flag), "missing {flag}");
    }
}

#[test]
fn test_invalid_pattern_fails_fast() {
    let temp_dir = TempDir::new().unwrap();
    let output = globwatch()
        .args(["src/[", "--cwd"])
        .arg(temp_dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid glob pattern"));
}

#[test]
fn test_missing_cwd_fails_fast() {
    let temp_dir = TempDir::new().unwrap();
    let output = globwatch()
        .arg("**/*")
        .arg("--cwd")
        .arg(temp_dir.path().join("missing"))
        .output()
        .unwrap();

    assert!(!output.status.success());
}

#[test]
fn test_json_stream_starts_with_scan() {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("one.txt"), "1").unwrap();

    let mut child = globwatch()
        .args(["**/*", "--json", "--cwd"])
        .arg(temp_dir.path())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let stdout = child.stdout.take().unwrap();
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut names = Vec::new();
    while let Ok(line) = rx.recv_timeout(Duration::from_secs(10)) {
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        let name = value["event"].as_str().unwrap().to_string();
        let done = name == "ready";
        names.push(name);
        if done {
            break;
        }
    }
    child.kill().unwrap();
    child.wait().unwrap();

    assert_eq!(names, vec!["addDir", "add", "ready"]);
}

#[test]
fn test_verbose_logs_start_on_stderr() {
    let temp_dir = TempDir::new().unwrap();

    let mut child = globwatch()
        .args(["**/*", "--verbose", "--cwd"])
        .arg(temp_dir.path())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    let stderr = child.stderr.take().unwrap();
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut started = false;
    while let Ok(line) = rx.recv_timeout(Duration::from_secs(10)) {
        if line.contains("watcher started") {
            started = true;
            break;
        }
    }
    child.kill().unwrap();
    child.wait().unwrap();

    assert!(started, "no start log on stderr");
}
