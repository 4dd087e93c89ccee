/*!
 * Process Types
 * Worker lifecycle results and churn accounting
 */

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

/// Process operation result
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Process errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ProcessError {
    #[error("Spawn failed for '{path}': {reason}")]
    #[diagnostic(
        code(process::spawn_failed),
        help("Spawning under normal load should not fail. Check the process table and ulimits.")
    )]
    SpawnFailed { path: String, reason: String },

    #[error("Reap failed: {0}")]
    #[diagnostic(
        code(process::reap_failed),
        help("A blocking wait on outstanding workers should not fail.")
    )]
    ReapFailed(String),

    #[error("Reaped PID {0}, which is not an outstanding worker")]
    #[diagnostic(
        code(process::unknown_child),
        help("Something else in this process is spawning children.")
    )]
    UnknownChild(u32),
}

/// How a reaped worker ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildExit {
    Exited(i32),
    Signaled(i32),
}

impl ChildExit {
    pub fn is_success(&self) -> bool {
        matches!(self, ChildExit::Exited(0))
    }
}

/// A worker collected by a blocking wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReapedChild {
    pub pid: u32,
    pub exit: ChildExit,
}

impl ReapedChild {
    pub fn exited(pid: u32, code: i32) -> Self {
        Self {
            pid,
            exit: ChildExit::Exited(code),
        }
    }
}

/// Spawn/reap state machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChurnPhase {
    Spawning,
    /// Batch reap once the pending set reached the threshold
    Reaping,
    /// Final reap after the spawn budget is spent
    Draining,
}

/// One completed reap pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReapPass {
    /// Spawns completed when the pass ran
    pub after_spawn: u64,
    pub reaped: usize,
    pub phase: ChurnPhase,
}

/// Totals for a finished spawn/reap run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChurnReport {
    pub spawned: u64,
    pub reaped: u64,
    /// Workers that exited non-zero or by signal
    pub abnormal_exits: u64,
    pub passes: Vec<ReapPass>,
}
