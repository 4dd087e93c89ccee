/*!
 * Process Traits
 * Worker creation and reaping primitives
 */

use super::types::{ProcessResult, ReapedChild};

/// Creates workers and collects them
#[cfg_attr(test, mockall::automock)]
pub trait ProcessLauncher: Send {
    /// Start one worker, returning its OS PID
    fn spawn_worker(&mut self) -> ProcessResult<u32>;

    /// Block until any child exits and collect it
    fn wait_any(&mut self) -> ProcessResult<ReapedChild>;
}

impl<L: ProcessLauncher + ?Sized> ProcessLauncher for Box<L> {
    fn spawn_worker(&mut self) -> ProcessResult<u32> {
        (**self).spawn_worker()
    }

    fn wait_any(&mut self) -> ProcessResult<ReapedChild> {
        (**self).wait_any()
    }
}
