use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::{Duration, Instant};
use crate::build::classify::{self, LogReport};
use crate::build::control::OperatorAction;
use crate::build::runner::{BuildRunner, Invocation, RunOutcome};
use crate::build::version::target_version;
use crate::db::immediate;
use crate::error::BuildError;
use crate::models::flags::{self, FlagDelta};
use crate::models::{FailureCategory, Task};
use crate::repo::{AttemptRepo, BuilderRepo, Finalize, PackageRepo, TaskRepo};

/// Repository used when the ledger does not know a package's repository
pub const DEFAULT_REPO: &str = "extra";

/// How often and how patiently transient failures are retried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total runs allowed for a task failing with retryable errors
    pub max_retries: u32,
    /// The n-th retry waits `n * backoff_unit`
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_unit: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt
    }
}

/// Settings shared by every task a worker builds
#[derive(Debug, Clone)]
pub struct BuildSettings {
    /// Identity passed to the build tool and recorded in attempt logs
    pub builder: String,
    /// Where the build tool writes `<pkgname>-<version>.log`
    pub log_dir: PathBuf,
    pub policy: RetryPolicy,
}

/// How a task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded { version: String },
    Failed(FailureCategory),
    NoLog,
    Skipped,
    /// Skipped on the operator's request to stop the worker
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryDecision {
    Retry(Duration),
    GiveUp,
}

/// Retry bookkeeping for one task
#[derive(Debug, Default)]
struct RetryState {
    attempts: u32,
    skip_pgp: bool,
}

impl RetryState {
    fn on_failure(&mut self, category: FailureCategory, policy: &RetryPolicy) -> RetryDecision {
        if !category.is_retryable() {
            return RetryDecision::GiveUp;
        }
        self.attempts += 1;
        if category == FailureCategory::Pgp {
            self.skip_pgp = true;
        }
        if self.attempts >= policy.max_retries {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(policy.delay(self.attempts))
        }
    }
}

/// What to write to the ledger when a task is finalized
enum LedgerWrite {
    Nothing,
    /// Attempt log carrying the current flags
    AttemptOnly,
    Build {
        delta: FlagDelta,
        log_version: Option<String>,
        timecost: Option<f64>,
    },
}

/// Drives single tasks through the external build tool
///
/// No database lock is held while the tool runs or while waiting to retry.
/// The ledger update, attempt log and task finalization for an outcome are
/// written in one transaction.
pub struct BuildOrchestrator<'c, R: BuildRunner> {
    conn: &'c Connection,
    runner: R,
    settings: BuildSettings,
    control: Option<Receiver<OperatorAction>>,
}

impl<'c, R: BuildRunner> BuildOrchestrator<'c, R> {
    pub fn new(conn: &'c Connection, runner: R, settings: BuildSettings) -> Self {
        Self {
            conn,
            runner,
            settings,
            control: None,
        }
    }

    /// Accept operator actions while builds run
    pub fn with_control(mut self, control: Receiver<OperatorAction>) -> Self {
        self.control = Some(control);
        self
    }

    pub fn conn(&self) -> &'c Connection {
        self.conn
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// Build a claimed task and finalize it
    pub fn run_task(&mut self, task: &Task) -> Result<TaskOutcome, BuildError> {
        let base = task.pkgbase.as_str();
        let Some(record) = PackageRepo::get(self.conn, base)? else {
            log::warn!("{} is not in the package ledger", base);
            self.finish(task, LedgerWrite::Nothing, Finalize::Failed(FailureCategory::BeforeBuild.code()))?;
            return Ok(TaskOutcome::Failed(FailureCategory::BeforeBuild));
        };

        let version = match record.upstream_version(task.repo) {
            Some(upstream) => target_version(upstream, record.built_version(task.repo)),
            None => {
                log::warn!("{} has no upstream version", base);
                return self.fail_before_build(task);
            }
        };
        let version = match version {
            Ok(version) => version,
            Err(e) => {
                log::warn!("{}: {}", base, e);
                return self.fail_before_build(task);
            }
        };

        let repo = format!(
            "{}{}",
            record.repo.as_deref().unwrap_or(DEFAULT_REPO),
            task.repo.suffix()
        );
        let mut invocation = Invocation {
            pkgname: base.to_string(),
            version: version.clone(),
            repo,
            builder: self.settings.builder.clone(),
            skip_pgp: false,
        };
        let mut state = RetryState::default();

        loop {
            log::info!("building {} {} for {}", base, version, invocation.repo);
            let started = Instant::now();
            let outcome = self
                .runner
                .run(&invocation, self.control.as_ref())
                .map_err(|source| BuildError::Spawn {
                    pkgname: base.to_string(),
                    source,
                })?;
            let elapsed = started.elapsed();

            let exit = match outcome {
                RunOutcome::Interrupted(OperatorAction::Retry) => {
                    log::info!("{}: restarting on operator request", base);
                    continue;
                }
                RunOutcome::Interrupted(OperatorAction::Skip) => {
                    self.finish(task, LedgerWrite::AttemptOnly, Finalize::Skipped)?;
                    return Ok(TaskOutcome::Skipped);
                }
                RunOutcome::Interrupted(OperatorAction::Quit) => {
                    self.finish(task, LedgerWrite::AttemptOnly, Finalize::Skipped)?;
                    return Ok(TaskOutcome::Aborted);
                }
                RunOutcome::Exited(code) => code,
            };

            let log_path = self.log_path(base, &version);
            let report = read_log(&log_path).map(|text| classify::scan(&text));

            if exit == Some(0) {
                let delta = match &report {
                    Some(report) => report.ledger_delta(true),
                    None => FlagDelta::new().success(),
                };
                let timecost = self.timecost(report.as_ref(), elapsed)?;
                self.finish(
                    task,
                    LedgerWrite::Build {
                        delta,
                        log_version: Some(version.clone()),
                        timecost: Some(timecost),
                    },
                    Finalize::Done,
                )?;
                log::info!("{} {} built", base, version);
                return Ok(TaskOutcome::Succeeded { version });
            }

            let Some(report) = report else {
                log::warn!("{} failed without a log at {}", base, log_path.display());
                let delta = FlagDelta::new().with_failure(FailureCategory::BeforeBuild.code());
                self.finish(
                    task,
                    LedgerWrite::Build { delta, log_version: None, timecost: None },
                    Finalize::NoLog,
                )?;
                return Ok(TaskOutcome::NoLog);
            };

            let category = report.failure.unwrap_or(FailureCategory::BeforeBuild);
            match state.on_failure(category, &self.settings.policy) {
                RetryDecision::Retry(delay) => {
                    invocation.skip_pgp = state.skip_pgp;
                    log::warn!(
                        "{}: {} (exit {:?}), retry {} of {} in {:?}",
                        base,
                        category,
                        exit,
                        state.attempts,
                        self.settings.policy.max_retries.saturating_sub(1),
                        delay
                    );
                    thread::sleep(delay);
                }
                RetryDecision::GiveUp => {
                    log::warn!("{}: {} (exit {:?}), giving up", base, category, exit);
                    let timecost = self.timecost(Some(&report), elapsed)?;
                    self.finish(
                        task,
                        LedgerWrite::Build {
                            delta: report.ledger_delta(false),
                            log_version: None,
                            timecost: Some(timecost),
                        },
                        Finalize::Failed(category.code()),
                    )?;
                    return Ok(TaskOutcome::Failed(category));
                }
            }
        }
    }

    pub fn log_path(&self, pkgname: &str, version: &str) -> PathBuf {
        self.settings.log_dir.join(format!("{}-{}.log", pkgname, version))
    }

    fn fail_before_build(&self, task: &Task) -> Result<TaskOutcome, BuildError> {
        let category = FailureCategory::BeforeBuild;
        let delta = FlagDelta::new().with_failure(category.code());
        self.finish(
            task,
            LedgerWrite::Build { delta, log_version: None, timecost: None },
            Finalize::Failed(category.code()),
        )?;
        Ok(TaskOutcome::Failed(category))
    }

    /// Build duration in normalized seconds
    fn timecost(&self, report: Option<&LogReport>, elapsed: Duration) -> Result<f64, BuildError> {
        let raw = report
            .and_then(|r| r.time_cost)
            .unwrap_or_else(|| elapsed.as_secs_f64());
        let scale = BuilderRepo::scale(self.conn, &self.settings.builder)?;
        Ok(raw * scale)
    }

    fn finish(&self, task: &Task, write: LedgerWrite, finalize: Finalize) -> Result<(), BuildError> {
        let base = task.pkgbase.as_str();
        let builder = self.settings.builder.as_str();
        let tx = immediate(self.conn)?;

        match write {
            LedgerWrite::Nothing => {}
            LedgerWrite::AttemptOnly => {
                if let Some(current) = PackageRepo::read(&tx, base)? {
                    AttemptRepo::record_attempt(&tx, base, builder, current)?;
                }
            }
            LedgerWrite::Build { delta, log_version, timecost } => {
                let delta = delta
                    .clear(flags::TESTING | flags::STAGING)
                    .set(task.repo.flag());
                let result = PackageRepo::report_build_in(&tx, base, delta, log_version.as_deref(), timecost)?;
                // Only successful builds carry a version
                if let Some(version) = log_version.as_deref() {
                    PackageRepo::record_built_version(&tx, base, task.repo, version)?;
                }
                AttemptRepo::record_attempt(&tx, base, builder, result)?;
            }
        }

        TaskRepo::finalize_in(&tx, base, task.tasklist, finalize)?;
        tx.commit()?;
        Ok(())
    }
}

fn read_log(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        // Build logs carry terminal escapes and sometimes invalid UTF-8
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConnection;
    use crate::models::{Channel, InsertMode, TaskInfo};
    use crate::repo::Dequeued;
    use std::collections::VecDeque;
    use std::fs;
    use std::io;
    use tempfile::TempDir;

    /// Scripted runner: each run pops an outcome and optionally writes a log
    struct FakeRunner {
        log_dir: PathBuf,
        script: VecDeque<(RunOutcome, Option<&'static str>)>,
        seen: Vec<Invocation>,
    }

    impl FakeRunner {
        fn new(log_dir: &Path, script: Vec<(RunOutcome, Option<&'static str>)>) -> Self {
            Self {
                log_dir: log_dir.to_path_buf(),
                script: script.into(),
                seen: Vec::new(),
            }
        }
    }

    impl BuildRunner for FakeRunner {
        fn run(
            &mut self,
            invocation: &Invocation,
            _control: Option<&Receiver<OperatorAction>>,
        ) -> io::Result<RunOutcome> {
            self.seen.push(invocation.clone());
            let (outcome, log) = self
                .script
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no more scripted runs"))?;
            let path = self
                .log_dir
                .join(format!("{}-{}.log", invocation.pkgname, invocation.version));
            match log {
                Some(text) => fs::write(path, text)?,
                None => {
                    let _ = fs::remove_file(path);
                }
            }
            Ok(outcome)
        }
    }

    struct Fixture {
        _dir: TempDir,
        log_dir: PathBuf,
        conn: Connection,
    }

    fn fixture(packages: &[(&str, &str, Option<&str>)]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().to_path_buf();
        let conn = DbConnection::connect_in_memory().unwrap();
        for (base, upstream, built) in packages {
            conn.execute(
                "INSERT INTO packages (base, repo, flags, x86_version, loong_version) VALUES (?1, 'core', 0, ?2, ?3)",
                rusqlite::params![base, upstream, built],
            ).unwrap();
        }
        Fixture { _dir: dir, log_dir, conn }
    }

    fn settings(log_dir: &Path) -> BuildSettings {
        BuildSettings {
            builder: "loong-01".to_string(),
            log_dir: log_dir.to_path_buf(),
            policy: RetryPolicy {
                max_retries: 3,
                backoff_unit: Duration::ZERO,
            },
        }
    }

    fn claim(conn: &Connection, pkgbase: &str, channel: Channel) -> Task {
        TaskRepo::enqueue(conn, &[pkgbase.to_string()], 1, channel, InsertMode::Append).unwrap();
        match TaskRepo::dequeue(conn, 1, true).unwrap() {
            Dequeued::Package(task) => task,
            other => panic!("unexpected {:?}", other),
        }
    }

    fn info_of(conn: &Connection, pkgbase: &str) -> TaskInfo {
        TaskRepo::find_live(conn, pkgbase).unwrap().unwrap().info
    }

    const DOWNLOAD_FAILURE: &str = "==> ERROR: Failure while downloading src.tar.gz\n";
    const PGP_FAILURE: &str = "==> ERROR: One or more PGP signatures could not be verified!\n";
    const BUILD_FAILURE: &str = "==> ERROR: A failure occurred in build().\n";
    const SUCCESS: &str = "==> Loong's patch applied.\n==> Finished making: zlib\nbuilt on loong-01, time cost: 60\n";

    #[test]
    fn test_retry_state_bound() {
        let policy = RetryPolicy { max_retries: 3, backoff_unit: Duration::from_secs(5) };
        let mut state = RetryState::default();
        assert_eq!(state.on_failure(FailureCategory::Download, &policy), RetryDecision::Retry(Duration::from_secs(5)));
        assert_eq!(state.on_failure(FailureCategory::Download, &policy), RetryDecision::Retry(Duration::from_secs(10)));
        assert_eq!(state.on_failure(FailureCategory::Download, &policy), RetryDecision::GiveUp);

        let mut state = RetryState::default();
        assert_eq!(state.on_failure(FailureCategory::Build, &policy), RetryDecision::GiveUp);
        assert_eq!(state.attempts, 0);
    }

    #[test]
    fn test_success_updates_ledger_and_task() {
        let fx = fixture(&[("zlib", "1.3-2", Some("1.3-1"))]);
        let task = claim(&fx.conn, "zlib", Channel::Stable);
        let runner = FakeRunner::new(&fx.log_dir, vec![(RunOutcome::Exited(Some(0)), Some(SUCCESS))]);

        let mut orch = BuildOrchestrator::new(&fx.conn, runner, settings(&fx.log_dir));
        let outcome = orch.run_task(&task).unwrap();

        assert_eq!(outcome, TaskOutcome::Succeeded { version: "1.3-2".to_string() });
        assert_eq!(orch.runner.seen[0].repo, "core");
        assert_eq!(info_of(&fx.conn, "zlib"), TaskInfo::Done);

        let record = PackageRepo::get(&fx.conn, "zlib").unwrap().unwrap();
        assert_eq!(record.flags, flags::PATCH | flags::HASLOG);
        assert_eq!(record.log_version.as_deref(), Some("1.3-2"));
        assert_eq!(record.timecost, Some(60.0));

        let attempts = AttemptRepo::recent(&fx.conn, "zlib", 5).unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(TaskRepo::find_live(&fx.conn, "zlib").unwrap().unwrap().logid, Some(attempts[0].id));
    }

    #[test]
    fn test_rebuild_of_same_version_bumps_release() {
        let fx = fixture(&[("zlib", "1.3-2", Some("1.3-2"))]);
        let task = claim(&fx.conn, "zlib", Channel::Testing);
        let runner = FakeRunner::new(&fx.log_dir, vec![(RunOutcome::Exited(Some(0)), Some(SUCCESS))]);

        let mut orch = BuildOrchestrator::new(&fx.conn, runner, settings(&fx.log_dir));
        orch.run_task(&task).unwrap();

        let seen = &orch.runner.seen[0];
        assert_eq!(seen.version, "1.3-2.1");
        assert_eq!(seen.repo, "core-testing");
        let current = PackageRepo::read(&fx.conn, "zlib").unwrap().unwrap();
        assert_ne!(current & flags::TESTING, 0);
    }

    #[test]
    fn test_repeated_rebuilds_never_reuse_a_version() {
        let fx = fixture(&[("zlib", "1.3-2", Some("1.3-2"))]);
        let success = (RunOutcome::Exited(Some(0)), Some(SUCCESS));
        let runner = FakeRunner::new(&fx.log_dir, vec![success, success]);
        let mut orch = BuildOrchestrator::new(&fx.conn, runner, settings(&fx.log_dir));

        for _ in 0..2 {
            let task = claim(&fx.conn, "zlib", Channel::Stable);
            orch.run_task(&task).unwrap();
            // Retire the finished row so the package can be queued again
            assert!(matches!(TaskRepo::dequeue(&fx.conn, 1, true).unwrap(), Dequeued::Drained));
        }

        let versions: Vec<&str> = orch.runner.seen.iter().map(|i| i.version.as_str()).collect();
        assert_eq!(versions, vec!["1.3-2.1", "1.3-2.2"]);
        let record = PackageRepo::get(&fx.conn, "zlib").unwrap().unwrap();
        assert_eq!(record.loong_version.as_deref(), Some("1.3-2.2"));
    }

    #[test]
    fn test_failed_build_keeps_built_version() {
        let fx = fixture(&[("zlib", "1.3-2", Some("1.3-1"))]);
        let task = claim(&fx.conn, "zlib", Channel::Stable);
        let runner = FakeRunner::new(&fx.log_dir, vec![(RunOutcome::Exited(Some(2)), Some(BUILD_FAILURE))]);

        let mut orch = BuildOrchestrator::new(&fx.conn, runner, settings(&fx.log_dir));
        orch.run_task(&task).unwrap();

        let record = PackageRepo::get(&fx.conn, "zlib").unwrap().unwrap();
        assert_eq!(record.loong_version.as_deref(), Some("1.3-1"));
    }

    #[test]
    fn test_download_failures_retry_until_bound() {
        let fx = fixture(&[("zlib", "1.3-2", None)]);
        let task = claim(&fx.conn, "zlib", Channel::Stable);
        let fail = (RunOutcome::Exited(Some(1)), Some(DOWNLOAD_FAILURE));
        let runner = FakeRunner::new(&fx.log_dir, vec![fail, fail, fail, fail]);

        let mut orch = BuildOrchestrator::new(&fx.conn, runner, settings(&fx.log_dir));
        let outcome = orch.run_task(&task).unwrap();

        assert_eq!(outcome, TaskOutcome::Failed(FailureCategory::Download));
        assert_eq!(orch.runner.seen.len(), 3);
        assert_eq!(info_of(&fx.conn, "zlib"), TaskInfo::Failed(3));
        let current = PackageRepo::read(&fx.conn, "zlib").unwrap().unwrap();
        assert_eq!(flags::error_code(current), 3);
    }

    #[test]
    fn test_pgp_failure_adds_skip_flag() {
        let fx = fixture(&[("zlib", "1.3-2", None)]);
        let task = claim(&fx.conn, "zlib", Channel::Stable);
        let runner = FakeRunner::new(
            &fx.log_dir,
            vec![
                (RunOutcome::Exited(Some(1)), Some(PGP_FAILURE)),
                (RunOutcome::Exited(Some(0)), Some(SUCCESS)),
            ],
        );

        let mut orch = BuildOrchestrator::new(&fx.conn, runner, settings(&fx.log_dir));
        let outcome = orch.run_task(&task).unwrap();

        assert!(matches!(outcome, TaskOutcome::Succeeded { .. }));
        assert!(!orch.runner.seen[0].skip_pgp);
        assert!(orch.runner.seen[1].skip_pgp);
    }

    #[test]
    fn test_terminal_failure_is_not_retried() {
        let fx = fixture(&[("zlib", "1.3-2", None)]);
        let task = claim(&fx.conn, "zlib", Channel::Stable);
        let runner = FakeRunner::new(&fx.log_dir, vec![(RunOutcome::Exited(Some(2)), Some(BUILD_FAILURE))]);

        let mut orch = BuildOrchestrator::new(&fx.conn, runner, settings(&fx.log_dir));
        let outcome = orch.run_task(&task).unwrap();

        assert_eq!(outcome, TaskOutcome::Failed(FailureCategory::Build));
        assert_eq!(orch.runner.seen.len(), 1);
        assert_eq!(info_of(&fx.conn, "zlib"), TaskInfo::Failed(8));
    }

    #[test]
    fn test_missing_log_finalizes_nolog() {
        let fx = fixture(&[("zlib", "1.3-2", None)]);
        let task = claim(&fx.conn, "zlib", Channel::Stable);
        let runner = FakeRunner::new(&fx.log_dir, vec![(RunOutcome::Exited(Some(1)), None)]);

        let mut orch = BuildOrchestrator::new(&fx.conn, runner, settings(&fx.log_dir));
        assert_eq!(orch.run_task(&task).unwrap(), TaskOutcome::NoLog);

        assert_eq!(info_of(&fx.conn, "zlib"), TaskInfo::NoLog);
        let current = PackageRepo::read(&fx.conn, "zlib").unwrap().unwrap();
        assert!(flags::is_failed(current));
        assert_eq!(flags::error_code(current), 2);
    }

    #[test]
    fn test_operator_retry_does_not_use_budget() {
        let fx = fixture(&[("zlib", "1.3-2", None)]);
        let task = claim(&fx.conn, "zlib", Channel::Stable);
        let fail = (RunOutcome::Exited(Some(1)), Some(DOWNLOAD_FAILURE));
        let retry = (RunOutcome::Interrupted(OperatorAction::Retry), None);
        let runner = FakeRunner::new(&fx.log_dir, vec![retry, fail, retry, fail, fail]);

        let mut orch = BuildOrchestrator::new(&fx.conn, runner, settings(&fx.log_dir));
        orch.run_task(&task).unwrap();
        assert_eq!(orch.runner.seen.len(), 5);
    }

    #[test]
    fn test_operator_skip_and_quit() {
        let fx = fixture(&[("zlib", "1.3-2", None), ("xz", "5.6-1", None)]);
        let task = claim(&fx.conn, "zlib", Channel::Stable);
        let runner = FakeRunner::new(
            &fx.log_dir,
            vec![
                (RunOutcome::Interrupted(OperatorAction::Skip), None),
                (RunOutcome::Interrupted(OperatorAction::Quit), None),
            ],
        );

        let mut orch = BuildOrchestrator::new(&fx.conn, runner, settings(&fx.log_dir));
        assert_eq!(orch.run_task(&task).unwrap(), TaskOutcome::Skipped);
        assert_eq!(info_of(&fx.conn, "zlib"), TaskInfo::Skipped);
        assert_eq!(AttemptRepo::recent(&fx.conn, "zlib", 5).unwrap().len(), 1);

        TaskRepo::enqueue(&fx.conn, &["xz".to_string()], 1, Channel::Stable, InsertMode::Append).unwrap();
        let task = match TaskRepo::dequeue(&fx.conn, 1, true).unwrap() {
            Dequeued::Package(task) => task,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(orch.run_task(&task).unwrap(), TaskOutcome::Aborted);
        assert_eq!(info_of(&fx.conn, "xz"), TaskInfo::Skipped);
    }

    #[test]
    fn test_unknown_package_fails_before_build() {
        let fx = fixture(&[]);
        let task = claim(&fx.conn, "ghost", Channel::Stable);
        let runner = FakeRunner::new(&fx.log_dir, vec![]);

        let mut orch = BuildOrchestrator::new(&fx.conn, runner, settings(&fx.log_dir));
        assert_eq!(orch.run_task(&task).unwrap(), TaskOutcome::Failed(FailureCategory::BeforeBuild));
        assert!(orch.runner.seen.is_empty());
        assert_eq!(info_of(&fx.conn, "ghost"), TaskInfo::Failed(2));
        assert_eq!(PackageRepo::read(&fx.conn, "ghost").unwrap(), None);
    }

    #[test]
    fn test_bad_release_fails_before_build() {
        let fx = fixture(&[("zlib", "1.3-rc", Some("1.3-1"))]);
        let task = claim(&fx.conn, "zlib", Channel::Stable);
        let runner = FakeRunner::new(&fx.log_dir, vec![]);

        let mut orch = BuildOrchestrator::new(&fx.conn, runner, settings(&fx.log_dir));
        assert_eq!(orch.run_task(&task).unwrap(), TaskOutcome::Failed(FailureCategory::BeforeBuild));
        assert_eq!(info_of(&fx.conn, "zlib"), TaskInfo::Failed(2));
    }

    #[test]
    fn test_spawn_error_surfaces() {
        let fx = fixture(&[("zlib", "1.3-2", None)]);
        let task = claim(&fx.conn, "zlib", Channel::Stable);
        let runner = FakeRunner::new(&fx.log_dir, vec![]);

        let mut orch = BuildOrchestrator::new(&fx.conn, runner, settings(&fx.log_dir));
        let err = orch.run_task(&task).unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
        assert_eq!(info_of(&fx.conn, "zlib"), TaskInfo::Building);
    }
}
