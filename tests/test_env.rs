use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock};
use assert_cmd::Command;
use tempfile::TempDir;

pub fn lock_test_env() -> MutexGuard<'static, ()> {
    static TEST_ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    TEST_ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|err| err.into_inner())
}

/// Temporary HOME with an rc file pointing at a fresh database
///
/// `extra_rc` lines are appended to the rc file.
#[allow(dead_code)]
pub fn setup_test_env(extra_rc: &str) -> (TempDir, MutexGuard<'static, ()>) {
    let guard = lock_test_env();
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("ledger.db");

    let config_dir = temp_dir.path().join(".loongshot");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("rc"),
        format!("data.location={}\n{}", db_path.display(), extra_rc),
    )
    .unwrap();

    // Set HOME to temp_dir so the config file is found
    std::env::set_var("HOME", temp_dir.path().to_str().unwrap());
    (temp_dir, guard)
}

#[allow(dead_code)]
pub fn db_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("ledger.db")
}

#[allow(dead_code)]
pub fn loongshot() -> Command {
    Command::cargo_bin("loongshot").unwrap()
}

/// Write a sync snapshot and load it into the ledger
#[allow(dead_code)]
pub fn sync_packages(temp_dir: &TempDir, json: &str) {
    let path = temp_dir.path().join("sync.json");
    fs::write(&path, json).unwrap();
    loongshot()
        .args(["pkg", "sync", path.to_str().unwrap()])
        .assert()
        .success();
}
