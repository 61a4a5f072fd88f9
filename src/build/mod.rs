//! Build driving: log classification, version targeting, the external build
//! tool, and the worker loop that ties them to the task queue.

pub mod classify;
pub mod version;
pub mod control;
pub mod runner;
pub mod orchestrator;
pub mod worker;

pub use control::OperatorAction;
pub use orchestrator::{BuildOrchestrator, BuildSettings, RetryPolicy, TaskOutcome};
pub use runner::{BuildRunner, Invocation, ProcessRunner, RunOutcome};
pub use worker::{run_worker, StopReason, WorkerOptions, WorkerSummary};
