//! CLI smoke tests against the compiled binary, isolated with `USDE_HOME`.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

fn run_usde(home: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_usde"))
        .env("USDE_HOME", home)
        .env("NO_COLOR", "1")
        .args(args)
        .output()
        .expect("failed to run usde binary");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn init_creates_database_and_registry() {
    let tmp = TempDir::new().unwrap();

    let (stdout, stderr, ok) = run_usde(tmp.path(), &["init"]);
    assert!(ok, "init failed: stdout={stdout}, stderr={stderr}");
    assert!(stdout.contains("Initialized"));

    let db = tmp.path().join("data/default.usde");
    assert!(db.is_file(), "missing {db:?}");
    assert!(tmp.path().join("data/databases.json").is_file());
}

#[test]
fn init_refuses_existing_database() {
    let tmp = TempDir::new().unwrap();

    let (_, _, ok) = run_usde(tmp.path(), &["init"]);
    assert!(ok);

    let (_, stderr, ok) = run_usde(tmp.path(), &["init"]);
    assert!(!ok, "second init should fail");
    assert!(stderr.contains("already exists"));
}

#[test]
fn named_init_lands_in_data_dir() {
    let tmp = TempDir::new().unwrap();

    let (_, _, ok) = run_usde(tmp.path(), &["init", "workdocs"]);
    assert!(ok);
    assert!(tmp.path().join("data/workdocs.usde").is_file());
}

#[test]
fn list_on_empty_database_prints_nothing() {
    let tmp = TempDir::new().unwrap();
    run_usde(tmp.path(), &["init"]);

    let (stdout, _, ok) = run_usde(tmp.path(), &["list"]);
    assert!(ok);
    assert_eq!(stdout.trim(), "");

    let (stdout, _, ok) = run_usde(tmp.path(), &["list", "--count"]);
    assert!(ok);
    assert_eq!(stdout.trim(), "0");
}

#[test]
fn unknown_source_type_is_an_error() {
    let tmp = TempDir::new().unwrap();
    run_usde(tmp.path(), &["init"]);

    let (_, stderr, ok) = run_usde(tmp.path(), &["add", "cobol", "legacy"]);
    assert!(!ok);
    assert!(stderr.contains("unknown source type"));
}

#[test]
fn config_path_and_round_trip() {
    let tmp = TempDir::new().unwrap();

    let (stdout, _, ok) = run_usde(tmp.path(), &["config", "path"]);
    assert!(ok);
    assert!(stdout.trim().ends_with("config.toml"));

    let (_, _, ok) = run_usde(tmp.path(), &["config", "set", "search.default_limit", "42"]);
    assert!(ok);

    let (stdout, _, ok) = run_usde(tmp.path(), &["config", "get", "search.default_limit"]);
    assert!(ok);
    assert_eq!(stdout.trim(), "42");

    let (stdout, _, ok) = run_usde(tmp.path(), &["config", "show"]);
    assert!(ok);
    assert!(stdout.contains("default_limit = 42"));

    let (_, _, ok) = run_usde(tmp.path(), &["config", "get", "bogus.key"]);
    assert!(!ok);
}

#[test]
fn cache_status_and_clear_on_fresh_home() {
    let tmp = TempDir::new().unwrap();

    let (stdout, _, ok) = run_usde(tmp.path(), &["cache", "status"]);
    assert!(ok);
    assert!(stdout.contains("Cache Directory:"));

    let (stdout, _, ok) = run_usde(tmp.path(), &["cache", "prune"]);
    assert!(ok);
    assert!(stdout.contains("Pruned 0 cache entries"));

    let (stdout, _, ok) = run_usde(tmp.path(), &["cache", "clear"]);
    assert!(ok);
    assert!(stdout.contains("Cache cleared"));
}

#[test]
fn read_missing_document_fails_with_not_found() {
    let tmp = TempDir::new().unwrap();
    run_usde(tmp.path(), &["init"]);

    let (_, stderr, ok) = run_usde(tmp.path(), &["read", "go/nope"]);
    assert!(!ok);
    assert!(stderr.contains("not found"), "stderr: {stderr}");
}

#[test]
fn quiet_suppresses_success_output() {
    let tmp = TempDir::new().unwrap();

    let (stdout, _, ok) = run_usde(tmp.path(), &["-q", "init"]);
    assert!(ok);
    assert_eq!(stdout.trim(), "");
}
