use std::thread;
use std::time::Duration;
use serde::Serialize;
use crate::build::orchestrator::{BuildOrchestrator, TaskOutcome};
use crate::build::runner::BuildRunner;
use crate::error::BuildError;
use crate::models::Task;
use crate::repo::{BlacklistRepo, Dequeued, Finalize, TaskRepo};
use crate::utils::parse_duration;

/// Command rows a worker understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCommand {
    /// `%quit` or `%stop`: stop this worker
    Quit,
    /// `%pause:<duration>`: sleep before taking the next task
    Pause(Duration),
    Unknown(String),
}

impl WorkerCommand {
    pub fn parse(pkgbase: &str) -> Self {
        let body = pkgbase.trim_start_matches('%');
        if body == "quit" || body == "stop" {
            return WorkerCommand::Quit;
        }
        if let Some(arg) = body.strip_prefix("pause:") {
            if let Ok(duration) = parse_duration(arg) {
                return WorkerCommand::Pause(duration);
            }
        }
        WorkerCommand::Unknown(pkgbase.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub tasklist: i64,
    /// Keep polling while other workers still hold live tasks
    pub wait: bool,
    pub idle_interval: Duration,
    /// Delete retired rows once every tasklist has drained
    pub purge: bool,
}

impl WorkerOptions {
    pub fn new(tasklist: i64) -> Self {
        Self {
            tasklist,
            wait: false,
            idle_interval: Duration::from_secs(30),
            purge: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    /// No live tasks remain anywhere
    Drained,
    /// Nothing left on this tasklist, but other work is live
    Idle,
    /// Operator quit or a `%quit` command
    Quit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    pub built: usize,
    pub failed: usize,
    pub skipped: usize,
    pub commands: usize,
    /// Blacklisted rows removed from the queue at startup
    pub pruned: usize,
    pub purged: Option<usize>,
}

/// Take tasks from one tasklist until it runs dry or the worker is told to stop
pub fn run_worker<R: BuildRunner>(
    orchestrator: &mut BuildOrchestrator<'_, R>,
    options: &WorkerOptions,
) -> Result<(StopReason, WorkerSummary), BuildError> {
    let conn = orchestrator.conn();
    let mut summary = WorkerSummary::default();
    log::info!(
        "worker on list {} as {}",
        options.tasklist, orchestrator.settings().builder
    );
    summary.pruned = BlacklistRepo::prune_queue(conn)?.len();

    loop {
        match TaskRepo::dequeue(conn, options.tasklist, true)? {
            Dequeued::Package(task) => match orchestrator.run_task(&task)? {
                TaskOutcome::Succeeded { .. } => summary.built += 1,
                TaskOutcome::Failed(_) | TaskOutcome::NoLog => summary.failed += 1,
                TaskOutcome::Skipped => summary.skipped += 1,
                TaskOutcome::Aborted => {
                    summary.skipped += 1;
                    log::info!("worker on list {} quit by operator", options.tasklist);
                    return Ok((StopReason::Quit, summary));
                }
            },
            Dequeued::Command(task) => {
                summary.commands += 1;
                if run_command(conn, &task)? {
                    log::info!("worker on list {} stopped by {}", options.tasklist, task.pkgbase);
                    return Ok((StopReason::Quit, summary));
                }
            }
            Dequeued::Stop if options.wait => {
                log::debug!("list {} idle, waiting {:?}", options.tasklist, options.idle_interval);
                thread::sleep(options.idle_interval);
            }
            Dequeued::Stop => {
                log::info!("list {} has no waiting tasks", options.tasklist);
                return Ok((StopReason::Idle, summary));
            }
            Dequeued::Drained => {
                if options.purge {
                    summary.purged = TaskRepo::purge_retired(conn)?;
                }
                log::info!("all tasklists drained");
                return Ok((StopReason::Drained, summary));
            }
        }
    }
}

/// Execute a claimed command row; returns true when the worker should stop
fn run_command(conn: &rusqlite::Connection, task: &Task) -> Result<bool, BuildError> {
    let command = WorkerCommand::parse(&task.pkgbase);
    if let WorkerCommand::Pause(duration) = &command {
        log::info!("pausing for {:?}", duration);
        thread::sleep(*duration);
    }
    TaskRepo::finalize(conn, &task.pkgbase, task.tasklist, Finalize::Remove)?;

    match command {
        WorkerCommand::Quit => Ok(true),
        WorkerCommand::Pause(_) => Ok(false),
        WorkerCommand::Unknown(name) => {
            log::warn!("ignoring unknown command {}", name);
            Ok(false)
        }
    }
}
