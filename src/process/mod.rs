/*!
 * Process Module
 * Worker spawning, reaping and churn accounting
 */

pub mod churn;
pub mod executor;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use churn::{ChurnSettings, PendingChildren, SpawnReapLoop};
pub use executor::OsLauncher;
pub use traits::ProcessLauncher;
pub use types::{
    ChildExit, ChurnPhase, ChurnReport, ProcessError, ProcessResult, ReapPass, ReapedChild,
};
