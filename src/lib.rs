/*!
 * Stackshot Stress Harness Library
 * Continuous system snapshot capture under process spawn/exit churn
 */

pub mod capture;
pub mod core;
pub mod harness;
pub mod monitoring;
pub mod process;
pub mod worker;

// Re-exports
pub use crate::core::errors::*;
pub use crate::core::{HarnessConfig, HostClass, Invocation};
pub use capture::{CaptureClient, CaptureFacility, CaptureFlags, CaptureOutcome, CaptureStatus};
pub use harness::{abort_run, Harness, HarnessBuilder, RunSummary};
pub use monitoring::init_tracing;
pub use process::{ChurnReport, OsLauncher, ProcessLauncher, SpawnReapLoop};
