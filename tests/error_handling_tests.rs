use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;
mod test_env;
use test_env::{loongshot, setup_test_env};

/// HOME with an rc file holding exactly `rc`
fn setup_with_rc(rc: &str) -> (TempDir, std::sync::MutexGuard<'static, ()>) {
    let guard = test_env::lock_test_env();
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join(".loongshot");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("rc"), rc).unwrap();
    std::env::set_var("HOME", temp_dir.path().to_str().unwrap());
    (temp_dir, guard)
}

fn get_cmd() -> Command {
    loongshot()
}

#[test]
fn test_user_error_format() {
    let (_temp_dir, _guard) = setup_test_env("");

    // User errors have an "Error: " prefix and exit code 1
    get_cmd()
        .args(["bit", "get", "zlib"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::starts_with("Error:"));
}

#[test]
fn test_storage_failure_is_internal_error() {
    let temp_dir = TempDir::new().unwrap();
    // The database's parent directory is a regular file
    let blocker = temp_dir.path().join("blocker");
    fs::write(&blocker, "").unwrap();
    let (_home, _guard) = setup_with_rc(&format!(
        "data.location={}\n",
        blocker.join("ledger.db").display()
    ));

    get_cmd()
        .args(["task", "show"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::starts_with("Internal error:"))
        .stderr(predicate::str::contains("Caused by:"));
}

#[test]
fn test_invalid_rc_value_is_user_error() {
    let (_temp_dir, _guard) = setup_with_rc("build.max_retries=many\n");

    get_cmd()
        .args(["task", "show"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("build.max_retries"));
}

#[test]
fn test_worker_requires_builder_and_script() {
    let (_temp_dir, _guard) = setup_test_env("");

    get_cmd()
        .args(["worker"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No builder name"));

    get_cmd()
        .args(["worker", "--builder", "loong-01"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("No build script"));
}

#[test]
fn test_worker_rejects_non_positive_list() {
    let (_temp_dir, _guard) = setup_test_env("");

    get_cmd()
        .args(["worker", "-l", "0", "--builder", "b", "--script", "/bin/true"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Tasklist must be positive"));
}

#[test]
fn test_default_database_location() {
    let (temp_dir, _guard) = setup_with_rc("");

    get_cmd().args(["task", "add", "zlib"]).assert().success();
    assert!(temp_dir.path().join(".loongshot").join("ledger.db").exists());
}
