#![cfg(unix)]

use std::time::{Duration, Instant};

use lintel_runner::{RunError, RunnerSettings, Shell};

fn settings() -> RunnerSettings {
    RunnerSettings::new(Shell::new("/bin/sh", vec!["-c".to_string()]))
}

#[tokio::test]
async fn captures_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let out = settings()
        .runner()
        .execute(dir.path(), "echo hello")
        .await
        .unwrap();
    assert!(out.success());
    assert_eq!(out.stdout, "hello\n");
    assert!(out.stderr.is_empty());
}

#[tokio::test]
async fn captures_stderr_separately() {
    let dir = tempfile::tempdir().unwrap();
    let out = settings()
        .runner()
        .execute(dir.path(), "echo out; echo err 1>&2")
        .await
        .unwrap();
    assert_eq!(out.stdout, "out\n");
    assert_eq!(out.stderr, "err\n");
}

#[tokio::test]
async fn non_zero_exit_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let out = settings()
        .runner()
        .execute(dir.path(), "echo '[]'; exit 2")
        .await
        .unwrap();
    assert_eq!(out.exit_code, Some(2));
    assert!(!out.success());
    assert_eq!(out.stdout.trim(), "[]");
}

#[tokio::test]
async fn runs_in_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
    let out = settings()
        .runner()
        .execute(dir.path(), "ls")
        .await
        .unwrap();
    assert!(out.stdout.lines().any(|l| l == "marker.txt"));
}

#[tokio::test]
async fn large_output_does_not_block() {
    let dir = tempfile::tempdir().unwrap();
    let out = settings()
        .runner()
        .execute(dir.path(), "i=0; while [ $i -lt 20000 ]; do echo line$i; i=$((i+1)); done")
        .await
        .unwrap();
    assert!(out.success());
    assert_eq!(out.stdout.lines().count(), 20000);
    assert_eq!(out.stdout.lines().last(), Some("line19999"));
}

#[tokio::test]
async fn timeout_kills_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let err = settings()
        .with_timeout(Some(Duration::from_millis(200)))
        .runner()
        .execute(dir.path(), "sleep 5")
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::TimedOut { .. }), "{err}");
}

#[tokio::test]
async fn background_child_cannot_hold_the_run_open() {
    let dir = tempfile::tempdir().unwrap();
    let started = Instant::now();
    let out = settings()
        .with_timeout(Some(Duration::from_millis(300)))
        .runner()
        .execute(dir.path(), "sleep 4 & echo '[]'")
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    assert_eq!(out.stdout.trim(), "[]");
    assert!(out.success());
}

#[tokio::test]
async fn background_child_is_killed_without_a_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let started = Instant::now();
    let out = settings()
        .runner()
        .execute(dir.path(), "sleep 30 & echo done")
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(10), "{:?}", started.elapsed());
    assert_eq!(out.stdout, "done\n");
}

#[tokio::test]
async fn timeout_bounds_output_still_streaming() {
    let dir = tempfile::tempdir().unwrap();
    let started = Instant::now();
    let err = settings()
        .with_timeout(Some(Duration::from_millis(300)))
        .runner()
        .execute(dir.path(), "while true; do echo tick; sleep 0.05; done")
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::TimedOut { .. }), "{err}");
    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
}

#[tokio::test]
async fn missing_working_directory_fails_to_launch() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");
    let err = settings()
        .runner()
        .execute(&missing, "echo hi")
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::Launch { .. }), "{err}");
}

#[tokio::test]
async fn denied_variables_are_not_inherited() {
    let dir = tempfile::tempdir().unwrap();
    if std::env::var_os("CARGO_MANIFEST_DIR").is_none() {
        return;
    }
    let mut settings = settings();
    settings.env_denylist = vec!["CARGO_MANIFEST_*".to_string()];
    let out = settings
        .runner()
        .execute(dir.path(), "echo \"dir=${CARGO_MANIFEST_DIR:-unset}\"")
        .await
        .unwrap();
    assert_eq!(out.stdout.trim(), "dir=unset");
}
