/*!
 * Process Executor
 * Spawns worker executables and reaps them with waitpid
 */

use super::traits::ProcessLauncher;
use super::types::{ChildExit, ProcessError, ProcessResult, ReapedChild};
use crate::core::config::Invocation;
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, trace};

/// Launches workers as real OS processes
///
/// Children are not waited on through `std::process::Child`; any
/// exited child of this process is collected by `wait_any`.
#[derive(Debug, Clone)]
pub struct OsLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl OsLauncher {
    /// Launcher running `program` in worker mode
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Invocation::worker_args().iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Replace the worker arguments
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl ProcessLauncher for OsLauncher {
    fn spawn_worker(&mut self) -> ProcessResult<u32> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed {
                path: self.program.display().to_string(),
                reason: e.to_string(),
            })?;

        let pid = child.id();
        trace!(pid, "spawned worker");
        // Dropping Child neither kills nor waits
        Ok(pid)
    }

    fn wait_any(&mut self) -> ProcessResult<ReapedChild> {
        loop {
            match waitpid(None::<Pid>, None) {
                Ok(WaitStatus::Exited(pid, code)) => {
                    return Ok(ReapedChild {
                        pid: pid.as_raw() as u32,
                        exit: ChildExit::Exited(code),
                    });
                }
                Ok(WaitStatus::Signaled(pid, signal, _)) => {
                    return Ok(ReapedChild {
                        pid: pid.as_raw() as u32,
                        exit: ChildExit::Signaled(signal as i32),
                    });
                }
                Ok(other) => {
                    debug!(status = ?other, "non-terminal wait status, waiting again");
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(ProcessError::ReapFailed(e.desc().to_string())),
            }
        }
    }
}
