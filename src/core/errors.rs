/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use miette::Diagnostic;
use thiserror::Error;

// Re-export subsystem errors
pub use crate::capture::types::CaptureError;
pub use crate::process::types::ProcessError;

/// Harness operation result
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Top-level harness errors
///
/// Every variant is fatal: the run aborts and the process exits non-zero.
/// Transient capture contention never reaches this type.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum HarnessError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Process(#[from] ProcessError),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code(config::invalid),
        help("Check STRESS_* environment variables and the STRESS_CONFIG file.")
    )]
    InvalidConfig(String),

    #[error("Failed to load configuration file {path}: {reason}")]
    #[diagnostic(
        code(config::file),
        help("STRESS_CONFIG must name a readable JSON file.")
    )]
    ConfigFile { path: String, reason: String },

    #[error("Unrecognized arguments: {0}")]
    #[diagnostic(
        code(invocation::unrecognized),
        help("Run without arguments to orchestrate, or with --worker to act as a worker.")
    )]
    InvalidInvocation(String),

    #[error("Capture thread failure: {0}")]
    #[diagnostic(code(capture::thread))]
    CaptureThread(String),
}
