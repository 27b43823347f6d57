//! Deadline-bounded execution of a single watch run.
//!
//! The watcher runs as one spawned task. The controller waits for it up to
//! a deadline, cancels it on timeout, and then always drains the task:
//! cancel and wait, abort and wait, and finally give up with a log line.

use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time;

use crate::cancel::CancelToken;
use crate::error::WatchError;
use crate::service::MailboxService;
use crate::watcher::{MailboxWatcher, WatchOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// How long the watch may run before it is cancelled
    pub deadline: Duration,
    /// Wait after each shutdown step
    pub shutdown_grace: Duration,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(WatchOutcome),
    TimedOut,
    /// The watcher returned an error or its task panicked
    Failed(String),
}

/// How the task was brought down after the wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownKind {
    AlreadyFinished,
    /// Stopped on its own after cancellation
    Graceful,
    /// Had to be aborted
    Forced,
    /// Still not terminated after the abort
    Stuck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub shutdown: ShutdownKind,
}

type WatchTask = JoinHandle<Result<WatchOutcome, WatchError>>;

/// Run `watcher` once, bounded by `limits.deadline`
pub async fn run<S>(watcher: MailboxWatcher<S>, limits: &RunLimits) -> RunReport
where
    S: MailboxService + 'static,
{
    let cancel = CancelToken::new();
    let task_cancel = cancel.clone();
    let mut task: WatchTask = tokio::spawn(async move { watcher.run(&task_cancel).await });
    tracing::info!("Watch task submitted (deadline {:?})", limits.deadline);

    let (outcome, finished) = match time::timeout(limits.deadline, &mut task).await {
        Ok(joined) => (outcome_of(joined), true),
        Err(_) => {
            tracing::info!("Watch timed out after {:?}, cancelling", limits.deadline);
            cancel.cancel();
            (RunOutcome::TimedOut, false)
        }
    };

    let shutdown = if finished {
        ShutdownKind::AlreadyFinished
    } else {
        shutdown(task, &cancel, limits.shutdown_grace).await
    };

    RunReport { outcome, shutdown }
}

fn outcome_of(joined: Result<Result<WatchOutcome, WatchError>, JoinError>) -> RunOutcome {
    match joined {
        Ok(Ok(outcome)) => RunOutcome::Completed(outcome),
        Ok(Err(e)) => {
            tracing::error!("Watch failed: {}", e);
            RunOutcome::Failed(e.to_string())
        }
        Err(e) => {
            tracing::error!("Watch task failed: {}", e);
            RunOutcome::Failed(e.to_string())
        }
    }
}

/// Bring down a task that did not finish in time.
///
/// Never panics; a task that survives the abort is logged and left behind.
async fn shutdown(mut task: WatchTask, cancel: &CancelToken, grace: Duration) -> ShutdownKind {
    cancel.cancel();
    if let Ok(joined) = time::timeout(grace, &mut task).await {
        log_late_result(joined);
        return ShutdownKind::Graceful;
    }

    tracing::warn!("Watch task ignored cancellation for {:?}, aborting", grace);
    task.abort();
    match time::timeout(grace, &mut task).await {
        Ok(joined) => {
            log_late_result(joined);
            ShutdownKind::Forced
        }
        Err(_) => {
            tracing::info!("shutdown: time out error");
            ShutdownKind::Stuck
        }
    }
}

fn log_late_result(joined: Result<Result<WatchOutcome, WatchError>, JoinError>) {
    match joined {
        Ok(Ok(outcome)) => tracing::debug!("Watch task ended after cancel: {:?}", outcome),
        Ok(Err(e)) => tracing::error!("Watch task ended with error: {}", e),
        Err(e) if e.is_cancelled() => tracing::debug!("Watch task aborted"),
        Err(e) => tracing::error!("Watch task failed during shutdown: {}", e),
    }
}
