use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use crate::build::control::spawn_stdin_reader;
use crate::build::{run_worker, BuildOrchestrator, BuildSettings, ProcessRunner, RetryPolicy, WorkerOptions};
use crate::cli::error::user_error;
use crate::cli::output::{
    format_blacklist, format_builders, format_failed, format_history, format_package, format_task_table, format_tasklists,
};
use crate::config::Config;
use crate::db::DbConnection;
use crate::error::{LedgerError, QueueError};
use crate::models::flags::{self, BIT_NAMES};
use crate::models::{Channel, InsertMode, SyncEntry};
use crate::repo::{AttemptRepo, BlacklistRepo, BuilderRepo, Dequeued, Finalize, PackageRepo, TaskRepo};
use anyhow::{Context, Result};

#[derive(Parser)]
#[command(name = "loongshot")]
#[command(about = "Rebuild queue, build driver and package ledger for the loong64 port")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Log more (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the rebuild task queue
    Task {
        #[command(subcommand)]
        subcommand: TaskCommands,
    },
    /// Read or change package ledger bits
    Bit {
        #[command(subcommand)]
        subcommand: BitCommands,
    },
    /// Inspect and maintain package ledger rows
    Pkg {
        #[command(subcommand)]
        subcommand: PkgCommands,
    },
    /// Manage build machines
    Builder {
        #[command(subcommand)]
        subcommand: BuilderCommands,
    },
    /// Build tasks from a tasklist until it runs dry
    Worker {
        #[command(flatten)]
        list: ListArg,
        /// Builder identity (defaults to builder.name from the rc file)
        #[arg(long)]
        builder: Option<String>,
        /// Build script (defaults to builder.script from the rc file)
        #[arg(long)]
        script: Option<PathBuf>,
        /// Directory the build script runs in and writes logs to
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// Read s(kip) / q(uit) / Enter (retry) from stdin during builds
        #[arg(long)]
        interactive: bool,
        /// Keep polling while other tasklists still have work
        #[arg(long)]
        wait: bool,
        /// Purge retired tasks once everything has drained
        #[arg(long)]
        purge: bool,
    },
}

#[derive(Args, Clone, Copy)]
pub struct ListArg {
    /// Tasklist to operate on
    #[arg(short = 'l', long = "list", default_value_t = 1)]
    pub list: i64,
}

#[derive(Args, Clone, Copy)]
pub struct ChannelArgs {
    /// Build for the testing channel
    #[arg(long, conflicts_with = "staging")]
    pub testing: bool,
    /// Build for the staging channel
    #[arg(long)]
    pub staging: bool,
}

impl ChannelArgs {
    fn channel(&self) -> Channel {
        if self.staging {
            Channel::Staging
        } else if self.testing {
            Channel::Testing
        } else {
            Channel::Stable
        }
    }
}

#[derive(Subcommand)]
pub enum TaskCommands {
    /// Append packages to a tasklist
    Add {
        #[command(flatten)]
        list: ListArg,
        #[command(flatten)]
        channel: ChannelArgs,
        #[arg(required = true)]
        pkgbases: Vec<String>,
    },
    /// Insert packages before the first waiting task, or at a position
    Insert {
        #[command(flatten)]
        list: ListArg,
        #[command(flatten)]
        channel: ChannelArgs,
        /// Task number to insert at
        #[arg(long)]
        at: Option<i64>,
        #[arg(required = true)]
        pkgbases: Vec<String>,
    },
    /// Remove packages from a tasklist
    Remove {
        #[command(flatten)]
        list: ListArg,
        #[arg(required = true)]
        pkgbases: Vec<String>,
    },
    /// Show the tasks of a tasklist
    Show {
        #[command(flatten)]
        list: ListArg,
        #[arg(long)]
        json: bool,
    },
    /// Print the next waiting task
    Get {
        #[command(flatten)]
        list: ListArg,
        /// Claim the task (mark it building)
        #[arg(long)]
        mark: bool,
    },
    /// Finalize a building task
    Finish {
        #[command(flatten)]
        list: ListArg,
        pkgbase: String,
        /// Failure code when the package has no ledger row
        #[arg(long)]
        fail: Option<u8>,
    },
    /// Put a stuck building task back to waiting
    Reset {
        #[command(flatten)]
        list: ListArg,
        pkgbase: String,
    },
    /// Show an earlier enqueue batch (0 = most recent)
    History {
        #[arg(default_value_t = 0)]
        offset: u32,
        #[arg(long)]
        json: bool,
    },
    /// Show tasklists that still hold tasks
    Lists {
        #[arg(long)]
        json: bool,
    },
    /// Delete retired tasks once nothing is live
    Cleanup,
}

#[derive(Subcommand)]
pub enum BitCommands {
    /// Print the flags of a package
    Get { pkgbase: String },
    /// Add or remove bits (comma-separated names)
    Set {
        pkgbase: String,
        #[arg(long)]
        add: Option<String>,
        #[arg(long)]
        remove: Option<String>,
    },
    /// List bit names
    List,
}

#[derive(Subcommand)]
pub enum PkgCommands {
    /// Show a package's ledger row and recent attempts
    Show {
        base: String,
        #[arg(long)]
        json: bool,
    },
    /// Replace the ledger's package set from a JSON snapshot
    Sync { file: PathBuf },
    /// List packages whose last build failed
    Failed {
        #[arg(long)]
        json: bool,
    },
    /// Apply a finished build log to the ledger
    Parselog {
        base: String,
        log: PathBuf,
        /// Builder that produced the log (defaults to the log trailer)
        #[arg(long)]
        builder: Option<String>,
    },
    /// Manage packages that must never be queued
    Blacklist {
        #[command(subcommand)]
        subcommand: BlacklistCommands,
    },
}

#[derive(Subcommand)]
pub enum BlacklistCommands {
    /// Ban packages and drop them from waiting tasklists at the next worker start
    Add {
        #[arg(required_unless_present = "file")]
        pkgbases: Vec<String>,
        #[arg(long)]
        reason: Option<String>,
        /// Read names from a file, one per line; `#` starts a comment
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Lift bans
    Remove {
        #[arg(required = true)]
        pkgbases: Vec<String>,
    },
    List {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum BuilderCommands {
    /// Register a builder or change its scale
    Add {
        name: String,
        /// Timecost multiplier for this machine
        #[arg(long, default_value_t = 1.0)]
        scale: f64,
    },
    /// List registered builders
    List,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);
    handle_command(cli)
}

fn init_logging(cli: &Cli) {
    let base = if matches!(cli.command, Commands::Worker { .. }) { 1 } else { 0 };
    let level = match base + cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    // Repeated init (tests calling run twice) is harmless
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .try_init();
}

fn handle_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Task { subcommand } => handle_task(subcommand),
        Commands::Bit { subcommand } => handle_bit(subcommand),
        Commands::Pkg { subcommand } => handle_pkg(subcommand),
        Commands::Builder { subcommand } => handle_builder(subcommand),
        Commands::Worker { list, builder, script, log_dir, interactive, wait, purge } => {
            handle_worker(list.list, builder, script, log_dir, interactive, wait, purge)
        }
    }
}

fn connect() -> Result<rusqlite::Connection> {
    DbConnection::connect().context("Failed to connect to database")
}

fn handle_task(cmd: TaskCommands) -> Result<()> {
    let conn = connect()?;
    match cmd {
        TaskCommands::Add { list, channel, pkgbases } => {
            let report = enqueue_or_exit(&conn, &pkgbases, list.list, channel.channel(), InsertMode::Append)?;
            println!(
                "Added {} task(s) to list {} starting at #{} (batch {}).",
                report.count, list.list, report.first_taskno, report.taskid
            );
        }
        TaskCommands::Insert { list, channel, at, pkgbases } => {
            let mode = match at {
                Some(position) => InsertMode::At(position),
                None => InsertMode::Top,
            };
            let report = enqueue_or_exit(&conn, &pkgbases, list.list, channel.channel(), mode)?;
            println!(
                "Inserted {} task(s) into list {} at #{} (batch {}).",
                report.count, list.list, report.first_taskno, report.taskid
            );
        }
        TaskCommands::Remove { list, pkgbases } => {
            let removed = TaskRepo::remove(&conn, &pkgbases, list.list)?;
            for pkgbase in pkgbases.iter().filter(|p| !removed.contains(p)) {
                eprintln!("Warning: {} is not on list {}", pkgbase, list.list);
            }
            println!("Removed {} task(s) from list {}.", removed.len(), list.list);
        }
        TaskCommands::Show { list, json } => {
            let tasks = TaskRepo::list(&conn, list.list)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else if tasks.is_empty() {
                println!("No tasks on list {}.", list.list);
            } else {
                print!("{}", format_task_table(&tasks, false));
            }
        }
        TaskCommands::Get { list, mark } => {
            match TaskRepo::dequeue(&conn, list.list, mark)? {
                Dequeued::Package(task) | Dequeued::Command(task) => println!("{}", task.pkgbase),
                Dequeued::Stop => println!("%stop"),
                Dequeued::Drained => println!("%drained"),
            }
        }
        TaskCommands::Finish { list, pkgbase, fail } => {
            let outcome = match fail {
                Some(code) => Finalize::Failed(code),
                None => Finalize::Done,
            };
            if !TaskRepo::finalize(&conn, &pkgbase, list.list, outcome)? {
                user_error(&format!("No building task '{}' on list {}", pkgbase, list.list));
            }
            println!("Finished {} on list {}.", pkgbase, list.list);
        }
        TaskCommands::Reset { list, pkgbase } => {
            if !TaskRepo::reset(&conn, &pkgbase, list.list)? {
                user_error(&format!("No building task '{}' on list {}", pkgbase, list.list));
            }
            println!("Reset {} on list {} to waiting.", pkgbase, list.list);
        }
        TaskCommands::History { offset, json } => match TaskRepo::history(&conn, offset)? {
            Some(batch) if json => println!("{}", serde_json::to_string_pretty(&batch)?),
            Some(batch) => print!("{}", format_history(&batch)),
            None => println!("No batch at offset {}.", offset),
        },
        TaskCommands::Lists { json } => {
            let lists = TaskRepo::live_tasklists(&conn)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&lists)?);
            } else if lists.is_empty() {
                println!("No live tasklists.");
            } else {
                print!("{}", format_tasklists(&lists));
            }
        }
        TaskCommands::Cleanup => match TaskRepo::purge_retired(&conn)? {
            Some(purged) => println!("Purged {} retired task(s).", purged),
            None => println!("Live tasks remain; nothing purged."),
        },
    }
    Ok(())
}

/// Enqueue, turning a rejected batch into a user error
fn enqueue_or_exit(
    conn: &rusqlite::Connection,
    pkgbases: &[String],
    tasklist: i64,
    channel: Channel,
    mode: InsertMode,
) -> Result<crate::repo::EnqueueReport> {
    match TaskRepo::enqueue(conn, pkgbases, tasklist, channel, mode) {
        Ok(report) => Ok(report),
        Err(QueueError::Conflict(names)) => {
            user_error(&format!("Already queued: {}", names.join(", ")));
        }
        Err(QueueError::Blacklisted(names)) => {
            user_error(&format!("Blacklisted: {}", names.join(", ")));
        }
        Err(e) => Err(e.into()),
    }
}

fn handle_bit(cmd: BitCommands) -> Result<()> {
    match cmd {
        BitCommands::List => {
            for (name, bit) in BIT_NAMES {
                println!("{:<10} {:#07x}", name, bit);
            }
        }
        BitCommands::Get { pkgbase } => {
            let conn = connect()?;
            match PackageRepo::read(&conn, &pkgbase)? {
                Some(mask) => println!("{}", mask),
                None => user_error(&format!("Package '{}' not found", pkgbase)),
            }
        }
        BitCommands::Set { pkgbase, add, remove } => {
            if add.is_none() && remove.is_none() {
                user_error("Nothing to change: pass --add and/or --remove");
            }
            let add = flags::parse_bits(add.as_deref().unwrap_or("")).unwrap_or_else(|e| user_error(&e));
            let remove = flags::parse_bits(remove.as_deref().unwrap_or("")).unwrap_or_else(|e| user_error(&e));

            let conn = connect()?;
            match PackageRepo::update_bits(&conn, &pkgbase, add, remove) {
                Ok(mask) => println!("Updated flags for '{}': {}", pkgbase, mask),
                Err(LedgerError::NotFound(base)) => user_error(&format!("Package '{}' not found", base)),
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}

fn handle_blacklist(conn: &rusqlite::Connection, cmd: BlacklistCommands) -> Result<()> {
    match cmd {
        BlacklistCommands::Add { mut pkgbases, reason, file } => {
            if let Some(file) = file {
                let content = std::fs::read_to_string(&file)
                    .unwrap_or_else(|e| user_error(&format!("Cannot read {}: {}", file.display(), e)));
                pkgbases.extend(blacklist_file_names(&content));
            }
            if pkgbases.is_empty() {
                user_error("No package names given");
            }
            match BlacklistRepo::add(conn, &pkgbases, reason.as_deref()) {
                Ok(added) => println!("Blacklisted {} new package(s).", added),
                Err(QueueError::InvalidPkgbase(name)) => {
                    user_error(&format!("Cannot blacklist '{}'", name));
                }
                Err(e) => return Err(e.into()),
            }
        }
        BlacklistCommands::Remove { pkgbases } => {
            let removed = BlacklistRepo::remove(conn, &pkgbases)?;
            for pkgbase in pkgbases.iter().filter(|p| !removed.contains(p)) {
                eprintln!("Warning: {} is not blacklisted", pkgbase);
            }
            println!("Removed {} package(s) from the blacklist.", removed.len());
        }
        BlacklistCommands::List { json } => {
            let entries = BlacklistRepo::list(conn)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("Blacklist is empty.");
            } else {
                print!("{}", format_blacklist(&entries));
            }
        }
    }
    Ok(())
}

/// Names from a blacklist file: one per line, blank lines and `#` comments skipped
fn blacklist_file_names(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn handle_pkg(cmd: PkgCommands) -> Result<()> {
    let conn = connect()?;
    match cmd {
        PkgCommands::Show { base, json } => {
            let Some(record) = PackageRepo::get(&conn, &base)? else {
                user_error(&format!("Package '{}' not found", base));
            };
            let attempts = AttemptRepo::recent(&conn, &base, 5)?;
            if json {
                let value = serde_json::json!({
                    "package": record,
                    "bits": flags::bit_names(record.flags),
                    "error_code": record.error_code(),
                    "attempts": attempts,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print!("{}", format_package(&record, &attempts));
            }
        }
        PkgCommands::Sync { file } => {
            let content = std::fs::read_to_string(&file)
                .unwrap_or_else(|e| user_error(&format!("Cannot read {}: {}", file.display(), e)));
            let entries: Vec<SyncEntry> = serde_json::from_str(&content)
                .unwrap_or_else(|e| user_error(&format!("Invalid sync file {}: {}", file.display(), e)));
            let report = PackageRepo::sync(&conn, &entries)?;
            println!("Synced {} package(s), removed {}.", report.upserted, report.removed);
        }
        PkgCommands::Failed { json } => {
            let records = PackageRepo::failed(&conn)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No failed packages.");
            } else {
                print!("{}", format_failed(&records));
            }
        }
        PkgCommands::Parselog { base, log, builder } => {
            let bytes = std::fs::read(&log)
                .unwrap_or_else(|e| user_error(&format!("Cannot read {}: {}", log.display(), e)));
            let text = String::from_utf8_lossy(&bytes);
            match PackageRepo::apply_log(&conn, &base, &text, builder.as_deref()) {
                Ok(applied) => println!(
                    "Updated flags for '{}': {} ({})",
                    base,
                    applied.flags,
                    flags::bit_names(applied.flags).join(", ")
                ),
                Err(LedgerError::NotFound(base)) => user_error(&format!("Package '{}' not found", base)),
                Err(e) => return Err(e.into()),
            }
        }
        PkgCommands::Blacklist { subcommand } => handle_blacklist(&conn, subcommand)?,
    }
    Ok(())
}

fn handle_builder(cmd: BuilderCommands) -> Result<()> {
    let conn = connect()?;
    match cmd {
        BuilderCommands::Add { name, scale } => {
            if !(scale > 0.0) {
                user_error("Scale must be a positive number");
            }
            let builder = BuilderRepo::add(&conn, &name, scale)?;
            println!("Builder '{}' (id {}) scale {}.", builder.name, builder.id, builder.scale);
        }
        BuilderCommands::List => {
            print!("{}", format_builders(&BuilderRepo::list(&conn)?));
        }
    }
    Ok(())
}

fn handle_worker(
    tasklist: i64,
    builder: Option<String>,
    script: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    interactive: bool,
    wait: bool,
    purge: bool,
) -> Result<()> {
    if tasklist <= 0 {
        user_error(&format!("Tasklist must be positive, got {}", tasklist));
    }
    let config = Config::load().context("Failed to load configuration")?;
    let builder = builder
        .or_else(|| config.builder_name.clone())
        .unwrap_or_else(|| user_error("No builder name: pass --builder or set builder.name in the rc file"));
    let script = script
        .or_else(|| config.builder_script.clone())
        .unwrap_or_else(|| user_error("No build script: pass --script or set builder.script in the rc file"));
    let log_dir = match log_dir.or_else(|| config.log_dir.clone()) {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };

    let conn = DbConnection::connect_with(&config).context("Failed to connect to database")?;

    let mut runner = ProcessRunner::new(script, log_dir.clone());
    runner.systemd_scope = config.systemd_scope;
    if let Some(grace) = config.stop_grace {
        runner.stop_grace = grace;
    }
    let settings = BuildSettings {
        builder,
        log_dir,
        policy: RetryPolicy {
            max_retries: config.max_retries.unwrap_or(3),
            backoff_unit: config.backoff.unwrap_or(Duration::from_secs(5)),
        },
    };

    let mut orchestrator = BuildOrchestrator::new(&conn, runner, settings);
    if interactive {
        let control = spawn_stdin_reader().context("Failed to start operator input")?;
        eprintln!("During a build: s = skip, q = quit, Enter = retry");
        orchestrator = orchestrator.with_control(control);
    }

    let mut options = WorkerOptions::new(tasklist);
    options.wait = wait;
    options.purge = purge;

    let (reason, summary) = run_worker(&mut orchestrator, &options)?;
    println!(
        "Worker stopped ({}): {} built, {} failed, {} skipped, {} command(s).",
        serde_json::to_value(reason)?.as_str().unwrap_or("stopped"),
        summary.built,
        summary.failed,
        summary.skipped,
        summary.commands
    );
    if summary.pruned > 0 {
        println!("Pruned {} blacklisted task(s) at startup.", summary.pruned);
    }
    if let Some(purged) = summary.purged {
        println!("Purged {} retired task(s).", purged);
    }
    Ok(())
}
